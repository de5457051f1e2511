//! Baseline snapshot: zero-filter totals and facets.
//!
//! One full scan of the corpus produces a `CacheSnapshot`; the snapshot is
//! published by swapping an `Arc` under a short write lock, so readers
//! always get a complete snapshot and never wait on a scan.
//!
//! ## Refresh discipline
//!
//! - At most one scan in flight. A trigger that finds one running returns
//!   `RefreshOutcome::InFlight` without scanning.
//! - A failed scan keeps the previous snapshot (including `ready`).
//! - The catch-up task only rescans while the snapshot is not ready or
//!   empty. Filter changes never touch the snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::CityCountMode;
use crate::execution::facets::{to_entries, FacetEntry};
use crate::model::fields;
use crate::planner::PredicateSet;
use crate::storage::{PropertyStore, StoreRow};
use crate::Result;

/// `getStats()` payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    pub total: u64,
    pub uf_count: u64,
    pub city_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFacets {
    pub ufs: Vec<FacetEntry>,
    pub modalidades: Vec<FacetEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub total: u64,
    pub uf_count: u64,
    pub city_count: u64,
    pub facets: SnapshotFacets,
    pub ready: bool,
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            total: self.total,
            uf_count: self.uf_count,
            city_count: self.city_count,
        }
    }

    /// Fold a full scan into a snapshot. Rows without a payload count toward
    /// `total` and their UF only.
    pub fn from_rows(rows: &[StoreRow], city_count: CityCountMode, at: DateTime<Utc>) -> Self {
        let mut ufs: HashMap<&str, u64> = HashMap::new();
        let mut modalities: HashMap<&str, u64> = HashMap::new();
        let mut cities: HashSet<(&str, &str)> = HashSet::new();

        for row in rows {
            *ufs.entry(row.uf.as_str()).or_default() += 1;
            let Some(payload) = &row.payload else { continue };
            if let Some(city) = payload.get(fields::CIDADE) {
                let scope = match city_count {
                    CityCountMode::Global => "",
                    CityCountMode::PerUf => row.uf.as_str(),
                };
                cities.insert((scope, city));
            }
            if let Some(modality) = payload.get(fields::MODALIDADE) {
                *modalities.entry(modality).or_default() += 1;
            }
        }

        let owned = |m: HashMap<&str, u64>| m.into_iter().map(|(k, n)| (k.to_string(), n)).collect::<Vec<_>>();
        Self {
            total: rows.len() as u64,
            uf_count: ufs.len() as u64,
            city_count: cities.len() as u64,
            facets: SnapshotFacets {
                ufs: to_entries(owned(ufs)),
                modalidades: to_entries(owned(modalities)),
            },
            ready: true,
            last_refreshed: Some(at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A full scan ran and its snapshot was published.
    Refreshed,
    /// Another refresh was already running; nothing was done.
    InFlight,
    /// Catch-up found a ready, non-empty snapshot; nothing was done.
    Skipped,
}

/// Process-wide holder of the baseline snapshot.
pub struct SnapshotCache {
    current: RwLock<Arc<CacheSnapshot>>,
    refreshing: AtomicBool,
    scans: AtomicU64,
    city_count: CityCountMode,
}

/// Clears the in-flight flag when the refresh ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SnapshotCache {
    /// Empty, not-ready cache.
    pub fn new(city_count: CityCountMode) -> Self {
        Self {
            current: RwLock::new(Arc::new(CacheSnapshot::default())),
            refreshing: AtomicBool::new(false),
            scans: AtomicU64::new(0),
            city_count,
        }
    }

    /// Last committed snapshot.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current.read().clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Number of full scans started since creation.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Acquire)
    }

    pub fn needs_catch_up(&self) -> bool {
        let snap = self.snapshot();
        !snap.ready || snap.total == 0
    }

    /// Initial population. Same as `refresh`.
    pub async fn init<S: PropertyStore + ?Sized>(&self, store: &S) -> Result<RefreshOutcome> {
        self.refresh(store).await
    }

    /// Full scan and publish, unless a refresh is already in flight.
    ///
    /// On failure the error is logged and returned; the previous snapshot
    /// stays in place.
    pub async fn refresh<S: PropertyStore + ?Sized>(&self, store: &S) -> Result<RefreshOutcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.refreshing) else {
            tracing::warn!("snapshot refresh already in flight, skipping trigger");
            return Ok(RefreshOutcome::InFlight);
        };

        self.scans.fetch_add(1, Ordering::AcqRel);
        tracing::info!("scanning corpus for baseline snapshot");

        let rows = match store.scan(&PredicateSet::all()).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "snapshot refresh failed, keeping previous snapshot");
                return Err(e);
            }
        };

        let snapshot = CacheSnapshot::from_rows(&rows, self.city_count, Utc::now());
        tracing::info!(
            total = snapshot.total,
            ufs = snapshot.uf_count,
            cities = snapshot.city_count,
            "baseline snapshot ready"
        );
        *self.current.write() = Arc::new(snapshot);
        Ok(RefreshOutcome::Refreshed)
    }

    /// Refresh only if the snapshot is not ready or holds zero records.
    pub async fn catch_up<S: PropertyStore + ?Sized>(&self, store: &S) -> Result<RefreshOutcome> {
        if !self.needs_catch_up() {
            return Ok(RefreshOutcome::Skipped);
        }
        self.refresh(store).await
    }

    /// Run `catch_up` every `every` on the current tokio runtime. The first
    /// attempt happens one period after the call; abort the handle to stop.
    pub fn spawn_catch_up<S: PropertyStore>(self: Arc<Self>, store: Arc<S>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.catch_up(store.as_ref()).await {
                    tracing::warn!(error = %e, "catch-up refresh failed");
                }
            }
        })
    }
}
