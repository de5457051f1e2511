//! Facet aggregation under sibling constraints.
//!
//! Each dimension is counted with its own constraint removed, so a facet
//! shows what remains available for that dimension given the *other*
//! choices, including the count of the currently selected value.
//!
//! | Facet | Applies | Computed when |
//! |-------|---------|---------------|
//! | UF | City, Neighborhood, Modality | always |
//! | City | UF, Modality | UF is set |
//! | Neighborhood | UF, City, Modality | UF and City are set |
//! | Modality | UF, City, Neighborhood | always |
//!
//! The price range, when present, applies to every facet.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::{Dimension, FilterSelection};
use crate::planner::{plan, Field};
use crate::storage::PropertyStore;
use crate::Result;

/// One facet value. `label` and `value` are the same string today; they are
/// kept apart so a display name can be introduced without changing callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetEntry {
    pub label: String,
    pub value: String,
    pub count: u64,
}

impl FacetEntry {
    pub fn new(value: impl Into<String>, count: u64) -> Self {
        let value = value.into();
        Self { label: value.clone(), value, count }
    }
}

/// All four facets, each sorted by label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facets {
    pub ufs: Vec<FacetEntry>,
    pub cities: Vec<FacetEntry>,
    pub neighborhoods: Vec<FacetEntry>,
    pub modalidades: Vec<FacetEntry>,
}

/// The selection a dimension's facet is counted under, or `None` when the
/// hierarchy says the facet is empty.
pub fn sibling_selection(filter: &FilterSelection, dimension: Dimension) -> Option<FilterSelection> {
    match dimension {
        Dimension::Uf => Some(filter.without(Dimension::Uf)),
        Dimension::City => filter
            .constrains(Dimension::Uf)
            .then(|| filter.without(Dimension::City).without(Dimension::Neighborhood)),
        Dimension::Neighborhood => (filter.constrains(Dimension::Uf) && filter.constrains(Dimension::City))
            .then(|| filter.without(Dimension::Neighborhood)),
        Dimension::Modality => Some(filter.without(Dimension::Modality)),
    }
}

/// Facet of a single dimension.
pub async fn facet_for<S: PropertyStore + ?Sized>(
    store: &S,
    filter: &FilterSelection,
    dimension: Dimension,
) -> Result<Vec<FacetEntry>> {
    let Some(siblings) = sibling_selection(filter, dimension) else {
        return Ok(Vec::new());
    };
    let predicates = plan(&siblings);
    let counts = store.group_count(&predicates, Field::for_dimension(dimension)).await?;
    Ok(to_entries(counts))
}

/// All four facets, queried concurrently.
pub async fn compute_facets<S: PropertyStore + ?Sized>(store: &S, filter: &FilterSelection) -> Result<Facets> {
    let (ufs, cities, neighborhoods, modalidades) = tokio::try_join!(
        facet_for(store, filter, Dimension::Uf),
        facet_for(store, filter, Dimension::City),
        facet_for(store, filter, Dimension::Neighborhood),
        facet_for(store, filter, Dimension::Modality),
    )?;
    Ok(Facets { ufs, cities, neighborhoods, modalidades })
}

/// Turn `(value, count)` pairs into entries sorted by label.
pub fn to_entries(counts: impl IntoIterator<Item = (String, u64)>) -> Vec<FacetEntry> {
    let mut entries: Vec<FacetEntry> = counts
        .into_iter()
        .map(|(value, count)| FacetEntry::new(value, count))
        .collect();
    entries.sort_by(|a, b| compare_labels(&a.label, &b.label));
    entries
}

/// Label order for pt-BR text: case and accents are ignored first
/// ("Águas" sorts with "aguas", before "Bauru"), then raw bytes break ties.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    let folded = |s: &str| s.chars().flat_map(fold_char).collect::<String>();
    folded(a).cmp(&folded(b)).then_with(|| a.cmp(b))
}

fn fold_char(c: char) -> impl Iterator<Item = char> {
    let base = match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        'ñ' | 'Ñ' => 'n',
        other => return other.to_lowercase().collect::<Vec<_>>().into_iter(),
    };
    vec![base].into_iter()
}
