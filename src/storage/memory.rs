//! In-memory property store.
//!
//! This is the reference implementation of `PropertyStore`.
//! Rows live in a `Vec` (insertion order is the storage-native order) with
//! a key → position index, protected by a single RwLock.
//!
//! ## Limitations
//!
//! - **Full scans**: every query walks all rows. No secondary indexes.
//! - **Loading only**: `insert` exists to populate the store; there is no
//!   delete. Re-inserting a key replaces the row in place.
//! - **Change log is append-only**: `record_change` keeps events in arrival
//!   order; nothing reconciles them with the current rows.
//!
//! Use this store for:
//! - Testing the planner, facet, stats and listing engines
//! - Embedding the catalog in applications that load their own data

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;

use crate::model::{ChangeEvent, ChangeKind, Property, PropertyKey};
use crate::planner::{Field, PredicateSet};
use crate::Result;
use super::{parse_payload_column, select_changes, PropertyStore, StoreRow};

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory auction record storage. Cloning shares the same rows.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryTable>>,
}

#[derive(Default)]
struct MemoryTable {
    rows: Vec<StoreRow>,
    /// (uf, numero_imovel) → index into `rows`
    positions: HashMap<PropertyKey, usize>,
    changes: Vec<ChangeEvent>,
}

impl MemoryTable {
    fn upsert(&mut self, row: StoreRow) {
        let key = row.key();
        match self.positions.get(&key) {
            Some(&idx) => self.rows[idx] = row,
            None => {
                self.positions.insert(key, self.rows.len());
                self.rows.push(row);
            }
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from records, in order.
    pub fn from_properties(props: impl IntoIterator<Item = Property>) -> Self {
        let store = Self::new();
        store.extend(props);
        store
    }

    /// Insert or replace a record.
    pub fn insert(&self, prop: Property) {
        self.inner.write().upsert(StoreRow::from(prop));
    }

    pub fn extend(&self, props: impl IntoIterator<Item = Property>) {
        let mut table = self.inner.write();
        for prop in props {
            table.upsert(StoreRow::from(prop));
        }
    }

    /// Insert a row with a raw `payload_json` document, as read from the
    /// `current_imoveis` table. A malformed document is kept as a row
    /// without payload.
    pub fn insert_raw(&self, uf: &str, numero_imovel: &str, payload_json: &str) {
        let payload = parse_payload_column(uf, numero_imovel, Some(payload_json));
        self.inner.write().upsert(StoreRow {
            uf: uf.to_string(),
            numero_imovel: numero_imovel.to_string(),
            payload,
        });
    }

    /// Append an event to the change log.
    pub fn record_change(&self, event: ChangeEvent) {
        self.inner.write().changes.push(event);
    }

    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().rows.is_empty()
    }
}

// ============================================================================
// PropertyStore impl
// ============================================================================

#[async_trait]
impl PropertyStore for MemoryStore {
    async fn scan(&self, predicates: &PredicateSet) -> Result<Vec<StoreRow>> {
        let table = self.inner.read();
        Ok(table.rows.iter().filter(|r| predicates.matches(r)).cloned().collect())
    }

    async fn count(&self, predicates: &PredicateSet) -> Result<u64> {
        let table = self.inner.read();
        Ok(table.rows.iter().filter(|r| predicates.matches(r)).count() as u64)
    }

    async fn group_count(&self, predicates: &PredicateSet, field: Field) -> Result<Vec<(String, u64)>> {
        let table = self.inner.read();
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for row in table.rows.iter().filter(|r| predicates.matches(r)) {
            if let Some(value) = field.extract(row) {
                *counts.entry(value).or_default() += 1;
            }
        }
        Ok(counts.into_iter().map(|(v, n)| (v.to_string(), n)).collect())
    }

    async fn currency_values(&self, predicates: &PredicateSet, key: &'static str) -> Result<Vec<f64>> {
        let table = self.inner.read();
        Ok(table
            .rows
            .iter()
            .filter(|r| predicates.matches(r))
            .filter_map(|r| r.payload.as_ref()?.currency(key))
            .collect())
    }

    async fn changes_for_day(
        &self,
        day: NaiveDate,
        kinds: &[ChangeKind],
        predicates: &PredicateSet,
    ) -> Result<Vec<ChangeEvent>> {
        let table = self.inner.read();
        let events = table.changes.iter().filter(|e| e.dt == day).cloned();
        Ok(select_changes(events, kinds, predicates))
    }
}

// ============================================================================
// Tests
// ============================================================================
