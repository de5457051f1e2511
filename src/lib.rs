//! # leiloes-rs: Faceted Browsing for Property-Auction Records
//!
//! Each record is keyed by `(uf, numero_imovel)` and carries a
//! semi-structured payload (`Cidade`, `Bairro`, `Preço`, `Modalidade de
//! venda`, ...). The engine answers four questions about the corpus:
//!
//! 1. **Baseline stats**: total records, distinct states, distinct cities
//!    (served from a refreshable snapshot).
//! 2. **Facets**: for each dimension, the distinct values still available
//!    under the *other* active filters, with counts.
//! 3. **Filtered stats**: mean and median appraisal value of a subset.
//! 4. **Listings**: filtered, price-sorted, limited records.
//!
//! It also reads the daily change log (records that entered, left or
//! changed on a date) under the same filters.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `PropertyStore` is the contract between the engine and storage
//! 2. **Parameters out of band**: filters become `(clauses, params)`, never SQL text
//! 3. **One predicate set per filter**: facets, stats and listings share the planner
//! 4. **Snapshot is a baseline only**: filtered answers are always computed live
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use leiloes_rs::{Catalog, FilterSelection, Property, SortKey};
//!
//! # async fn example() -> leiloes_rs::Result<()> {
//! let catalog = Catalog::open_memory().await?;
//! catalog.store().insert(
//!     Property::new("SP", "0001")
//!         .with_field("Cidade", "Campinas")
//!         .with_field("Preço", "250.000,00"),
//! );
//! catalog.init().await?;
//!
//! let filter = FilterSelection::new().with_uf("SP").with_cities("Campinas");
//! let facets = catalog.get_facets(&filter).await?;
//! let cheapest = catalog
//!     .list_properties(&filter, Some(SortKey::PriceAsc), None)
//!     .await?;
//! println!("{} cities, {} listed", facets.cities.len(), cheapest.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | (default) | In-memory rows for testing/embedding |
//! | SQLite | `sqlite` | `current_imoveis` table via rusqlite |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod planner;
pub mod execution;
pub mod storage;
pub mod cache;
pub mod config;

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::task::JoinHandle;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    Property, PropertyKey, Payload, Dimension,
    FilterSelection, FilterQuery, PriceRange,
    ChangeEvent, ChangeKind,
    parse_currency, fields,
};

// ============================================================================
// Re-exports: Planner / Execution / Storage / Cache
// ============================================================================

pub use planner::{Clause, Field, Param, PredicateSet, PredicateBuilder, RowQuery, SortKey};
pub use execution::{FacetEntry, Facets, FilteredStats};
pub use storage::{PropertyStore, StoreRow, MemoryStore};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
pub use cache::{CacheSnapshot, RefreshOutcome, SnapshotCache, SnapshotStats};
pub use config::{CatalogConfig, CityCountMode};

// ============================================================================
// Top-level Catalog handle
// ============================================================================

/// The primary entry point. A `Catalog` wraps a property store and the
/// baseline snapshot, and answers facet/stat/listing requests.
pub struct Catalog<S: PropertyStore> {
    store: Arc<S>,
    cache: Arc<SnapshotCache>,
    config: CatalogConfig,
}

impl<S: PropertyStore> Catalog<S> {
    /// Create a Catalog over the given store. Fails on an invalid config.
    pub fn with_store(store: S, config: CatalogConfig) -> Result<Self> {
        Self::from_shared(Arc::new(store), config)
    }

    /// Create a Catalog over a store that is shared with other owners.
    pub fn from_shared(store: Arc<S>, config: CatalogConfig) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(SnapshotCache::new(config.city_count));
        Ok(Self { store, cache, config })
    }

    /// First full scan of the corpus. Failures are returned but leave the
    /// catalog usable; the catch-up task will retry.
    pub async fn init(&self) -> Result<RefreshOutcome> {
        self.cache.init(self.store.as_ref()).await
    }

    /// Baseline totals from the last committed snapshot (zeros before the
    /// first successful refresh).
    pub fn get_stats(&self) -> SnapshotStats {
        self.cache.snapshot().stats()
    }

    /// Per-dimension facets under the sibling constraints of `filter`.
    ///
    /// An empty filter is answered from the snapshot when one is ready.
    pub async fn get_facets(&self, filter: &FilterSelection) -> Result<Facets> {
        if !filter.is_hierarchy_consistent() {
            tracing::debug!(?filter, "filter skips a hierarchy level, dependent facets stay empty");
        }
        if filter.is_empty() {
            let snapshot = self.cache.snapshot();
            if snapshot.ready {
                return Ok(Facets {
                    ufs: snapshot.facets.ufs.clone(),
                    modalidades: snapshot.facets.modalidades.clone(),
                    ..Facets::default()
                });
            }
        }
        execution::facets::compute_facets(self.store.as_ref(), filter).await
    }

    /// Mean and median appraisal value over the rows matching `filter`.
    pub async fn get_filtered_stats(&self, filter: &FilterSelection) -> Result<FilteredStats> {
        let predicates = planner::plan(filter);
        execution::stats::filtered_stats(self.store.as_ref(), &predicates).await
    }

    /// Matching records, optionally price-sorted, truncated to `limit`
    /// (config default when `None`, capped at `max_limit`).
    pub async fn list_properties(
        &self,
        filter: &FilterSelection,
        sort: Option<SortKey>,
        limit: Option<usize>,
    ) -> Result<Vec<Property>> {
        let predicates = planner::plan(filter);
        let limit = self.config.effective_limit(limit);
        execution::listing::list_properties(self.store.as_ref(), &predicates, sort, limit).await
    }

    /// Change events of the given kinds recorded on `day`, filtered like a
    /// listing. Exits are matched on the payload they had before leaving;
    /// entries and updates on their new payload.
    pub async fn changes_for_day(
        &self,
        day: NaiveDate,
        kinds: &[ChangeKind],
        filter: &FilterSelection,
    ) -> Result<Vec<ChangeEvent>> {
        let predicates = planner::plan(filter);
        let events = self.store.changes_for_day(day, kinds, &predicates).await?;
        tracing::debug!(%day, kinds = kinds.len(), events = events.len(), "change feed");
        Ok(events)
    }

    /// [`changes_for_day`](Self::changes_for_day) for the local calendar date.
    pub async fn changes_today(&self, kinds: &[ChangeKind], filter: &FilterSelection) -> Result<Vec<ChangeEvent>> {
        self.changes_for_day(chrono::Local::now().date_naive(), kinds, filter).await
    }

    /// Force a full rescan. Collapses into an in-flight refresh if any.
    pub async fn refresh_snapshot(&self) -> Result<RefreshOutcome> {
        self.cache.refresh(self.store.as_ref()).await
    }

    /// Last committed snapshot.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.cache.snapshot()
    }

    /// Start the background task that retries the scan while the snapshot
    /// is not ready or empty. Requires a running tokio runtime.
    pub fn spawn_snapshot_catch_up(&self) -> JoinHandle<()> {
        Arc::clone(&self.cache).spawn_catch_up(
            Arc::clone(&self.store),
            self.config.refresh_interval(),
        )
    }

    /// Release the store. Aborting any catch-up task is the caller's job.
    pub async fn close(self) -> Result<()> {
        tracing::info!("closing catalog");
        self.store.shutdown().await
    }

    /// Access the underlying store (for loading or advanced use).
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }
}

/// In-memory catalog for testing and embedding.
impl Catalog<storage::MemoryStore> {
    pub async fn open_memory() -> Result<Self> {
        Self::with_store(storage::MemoryStore::new(), CatalogConfig::default())
    }
}

#[cfg(feature = "sqlite")]
impl Catalog<storage::SqliteStore> {
    /// Open (or create) a SQLite database holding `current_imoveis`.
    pub fn open_sqlite(path: impl AsRef<std::path::Path>, config: CatalogConfig) -> Result<Self> {
        config.validate()?;
        let store = storage::SqliteStore::open(path)?;
        Self::with_store(store, config)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
