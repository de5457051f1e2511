//! Query execution engine.
//!
//! Executes planned predicate sets against a `PropertyStore`: facet
//! aggregation, appraisal statistics and listings.

pub mod facets;
pub mod stats;
pub mod listing;

pub use facets::{FacetEntry, Facets, compute_facets, facet_for};
pub use stats::{FilteredStats, filtered_stats, mean, median};
pub use listing::{list_properties, DEFAULT_LIMIT};
