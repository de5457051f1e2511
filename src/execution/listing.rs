//! Filtered, sorted, limited listings.

use crate::model::Property;
use crate::planner::{PredicateSet, RowQuery, SortKey};
use crate::storage::PropertyStore;
use crate::Result;

/// Listing size when the caller gives none.
pub const DEFAULT_LIMIT: usize = 24;

/// Records matching `predicates`. Without a sort key rows come back in the
/// store's native order; the limit applies after sorting.
pub async fn list_properties<S: PropertyStore + ?Sized>(
    store: &S,
    predicates: &PredicateSet,
    sort: Option<SortKey>,
    limit: usize,
) -> Result<Vec<Property>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    store.fetch(&RowQuery { predicates, sort, limit }).await
}
