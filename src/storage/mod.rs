//! # Property Store Trait
//!
//! This is THE contract between the engine and any storage.
//! Facets, statistics and listings are all expressed as calls on it.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory rows for testing/embedding |
//! | `SqliteStore` | `sqlite` | `current_imoveis` table via rusqlite |

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::{ChangeEvent, ChangeKind, Payload, Property, PropertyKey};
use crate::planner::{Field, PredicateSet, RowQuery};
use crate::Result;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

// ============================================================================
// Stored row
// ============================================================================

/// A row as the store holds it: the key columns plus the parsed payload.
///
/// `payload` is `None` when the stored document could not be parsed. Such a
/// row still counts toward totals and the UF dimension but never matches a
/// payload clause and is never listed.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRow {
    pub uf: String,
    pub numero_imovel: String,
    pub payload: Option<Payload>,
}

impl StoreRow {
    pub fn key(&self) -> PropertyKey {
        PropertyKey {
            uf: self.uf.clone(),
            numero_imovel: self.numero_imovel.clone(),
        }
    }

    /// Project to a listing record; `None` for a malformed payload.
    pub fn into_property(self) -> Option<Property> {
        let payload = self.payload?;
        Some(Property {
            uf: self.uf,
            numero_imovel: self.numero_imovel,
            payload,
        })
    }
}

impl From<Property> for StoreRow {
    fn from(p: Property) -> Self {
        Self {
            uf: p.uf,
            numero_imovel: p.numero_imovel,
            payload: Some(p.payload),
        }
    }
}

impl From<&ChangeEvent> for StoreRow {
    /// The row a change event is filtered as: its key plus its view payload.
    fn from(event: &ChangeEvent) -> Self {
        Self {
            uf: event.uf.clone(),
            numero_imovel: event.numero_imovel.clone(),
            payload: event.view().cloned(),
        }
    }
}

/// Keep events of the requested kinds, one per kind and key (first wins),
/// then drop those whose view payload fails `predicates`.
pub(crate) fn select_changes(
    events: impl IntoIterator<Item = ChangeEvent>,
    kinds: &[ChangeKind],
    predicates: &PredicateSet,
) -> Vec<ChangeEvent> {
    let mut seen: HashSet<(ChangeKind, PropertyKey)> = HashSet::new();
    events
        .into_iter()
        .filter(|e| kinds.contains(&e.kind))
        .filter(|e| seen.insert((e.kind, e.key())))
        .filter(|e| predicates.matches(&StoreRow::from(e)))
        .collect()
}

/// Parse a raw `payload_json` column, logging and dropping malformed ones.
pub(crate) fn parse_payload_column(uf: &str, numero_imovel: &str, raw: Option<&str>) -> Option<Payload> {
    let raw = raw?;
    match Payload::from_json_str(raw) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::debug!(uf, numero_imovel, error = %e, "skipping malformed payload");
            None
        }
    }
}

// ============================================================================
// PropertyStore Trait
// ============================================================================

/// The read-side storage contract.
///
/// Only `scan` is required. The aggregate methods have scan-based defaults
/// so that any store is complete; stores with a query engine override them
/// to push the work down.
#[async_trait]
pub trait PropertyStore: Send + Sync + 'static {
    /// All rows matching `predicates`, in storage-native order.
    async fn scan(&self, predicates: &PredicateSet) -> Result<Vec<StoreRow>>;

    /// Number of rows matching `predicates`.
    async fn count(&self, predicates: &PredicateSet) -> Result<u64> {
        Ok(self.scan(predicates).await?.len() as u64)
    }

    /// Distinct values of `field` with their row counts, over rows matching
    /// `predicates`. Rows without the field are left out. Unordered.
    async fn group_count(&self, predicates: &PredicateSet, field: Field) -> Result<Vec<(String, u64)>> {
        let rows = self.scan(predicates).await?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for row in &rows {
            if let Some(value) = field.extract(row) {
                *counts.entry(value.to_string()).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    /// Parsed currency values of payload `key` over matching rows.
    /// Rows whose value is missing or does not parse are left out.
    async fn currency_values(&self, predicates: &PredicateSet, key: &'static str) -> Result<Vec<f64>> {
        let rows = self.scan(predicates).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.payload.as_ref()?.currency(key))
            .collect())
    }

    /// Matching records, sorted by `query.sort` when given, truncated to
    /// `query.limit`. Rows with a malformed payload are skipped.
    async fn fetch(&self, query: &RowQuery<'_>) -> Result<Vec<Property>> {
        let rows = self.scan(query.predicates).await?;
        let mut props: Vec<Property> = rows.into_iter().filter_map(StoreRow::into_property).collect();
        if let Some(sort) = query.sort {
            props.sort_by(|a, b| sort.compare(a, b));
        }
        props.truncate(query.limit);
        Ok(props)
    }

    /// Change events recorded for `day` whose kind is in `kinds`, filtered
    /// by `predicates` against each event's view payload. Stores without a
    /// change log have no events.
    async fn changes_for_day(
        &self,
        day: NaiveDate,
        kinds: &[ChangeKind],
        predicates: &PredicateSet,
    ) -> Result<Vec<ChangeEvent>> {
        let _ = (day, kinds, predicates);
        Ok(Vec::new())
    }

    /// Release any resources held by the store.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
