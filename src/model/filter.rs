//! Filter selection: the caller's partial, hierarchical choice of values.

use serde::{Deserialize, Serialize};

use super::payload::fields;
use crate::planner::SortKey;

/// A filterable dimension. `Uf ⊇ City ⊇ Neighborhood` is a hierarchy;
/// `Modality` is orthogonal to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Uf,
    City,
    Neighborhood,
    Modality,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Uf,
        Dimension::City,
        Dimension::Neighborhood,
        Dimension::Modality,
    ];

    /// Payload key backing this dimension (`Uf` is a column, not a payload key).
    pub fn payload_key(self) -> Option<&'static str> {
        match self {
            Dimension::Uf => None,
            Dimension::City => Some(fields::CIDADE),
            Dimension::Neighborhood => Some(fields::BAIRRO),
            Dimension::Modality => Some(fields::MODALIDADE),
        }
    }
}

/// Inclusive bounds on the parsed `Preço`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl PriceRange {
    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Optional single UF plus optional value sets for the other dimensions.
///
/// Sets keep first-seen order and never contain duplicates or blanks. No
/// hierarchy validation happens here: a neighborhood set without a city is
/// representable and simply produces an empty neighborhood facet.
///
/// Deserialized selections go through the same normalization as the
/// builder methods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSelection")]
pub struct FilterSelection {
    pub uf: Option<String>,
    pub cities: Vec<String>,
    pub neighborhoods: Vec<String>,
    pub modalities: Vec<String>,
    pub price: PriceRange,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state. Trimmed and upper-cased; blank clears it.
    pub fn with_uf(mut self, uf: impl AsRef<str>) -> Self {
        self.uf = normalize_uf(uf.as_ref());
        self
    }

    /// Set cities from a comma-delimited list.
    pub fn with_cities(mut self, raw: &str) -> Self {
        self.cities = split_multi(raw);
        self
    }

    /// Set neighborhoods from a comma-delimited list.
    pub fn with_neighborhoods(mut self, raw: &str) -> Self {
        self.neighborhoods = split_multi(raw);
        self
    }

    /// Set sale modalities from a comma-delimited list.
    pub fn with_modalities(mut self, raw: &str) -> Self {
        self.modalities = split_multi(raw);
        self
    }

    pub fn with_price(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.price = PriceRange { min, max };
        self
    }

    /// No constraint on any dimension and no price bound.
    pub fn is_empty(&self) -> bool {
        self.uf.is_none()
            && self.cities.is_empty()
            && self.neighborhoods.is_empty()
            && self.modalities.is_empty()
            && self.price.is_unbounded()
    }

    pub fn constrains(&self, dimension: Dimension) -> bool {
        match dimension {
            Dimension::Uf => self.uf.is_some(),
            Dimension::City => !self.cities.is_empty(),
            Dimension::Neighborhood => !self.neighborhoods.is_empty(),
            Dimension::Modality => !self.modalities.is_empty(),
        }
    }

    /// Copy of this selection with one dimension's constraint removed.
    pub fn without(&self, dimension: Dimension) -> Self {
        let mut copy = self.clone();
        match dimension {
            Dimension::Uf => copy.uf = None,
            Dimension::City => copy.cities.clear(),
            Dimension::Neighborhood => copy.neighborhoods.clear(),
            Dimension::Modality => copy.modalities.clear(),
        }
        copy
    }

    /// Neighborhoods imply cities, cities imply a UF.
    pub fn is_hierarchy_consistent(&self) -> bool {
        (!self.constrains(Dimension::City) || self.constrains(Dimension::Uf))
            && (!self.constrains(Dimension::Neighborhood) || self.constrains(Dimension::City))
    }
}

/// Wire form of a selection, before normalization.
#[derive(Deserialize, Default)]
#[serde(default)]
struct RawSelection {
    uf: Option<String>,
    cities: Vec<String>,
    neighborhoods: Vec<String>,
    modalities: Vec<String>,
    price: PriceRange,
}

impl From<RawSelection> for FilterSelection {
    fn from(raw: RawSelection) -> Self {
        Self {
            uf: raw.uf.as_deref().and_then(normalize_uf),
            cities: normalize_values(&raw.cities),
            neighborhoods: normalize_values(&raw.neighborhoods),
            modalities: normalize_values(&raw.modalities),
            price: raw.price,
        }
    }
}

/// Split a comma-delimited multi-value input: items are trimmed, blanks
/// dropped, duplicates removed keeping the first occurrence.
pub fn split_multi(raw: &str) -> Vec<String> {
    normalize_values(raw.split(','))
}

fn normalize_values<I>(items: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.as_ref().trim();
        if !item.is_empty() && !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

fn normalize_uf(raw: &str) -> Option<String> {
    let uf = raw.trim();
    (!uf.is_empty()).then(|| uf.to_uppercase())
}

/// Raw request parameters, named as the HTTP layer receives them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterQuery {
    pub uf: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub modalidade: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub sort: Option<String>,
    pub limit: Option<usize>,
}

impl FilterQuery {
    pub fn selection(&self) -> FilterSelection {
        FilterSelection {
            uf: self.uf.as_deref().and_then(normalize_uf),
            cities: self.city.as_deref().map(split_multi).unwrap_or_default(),
            neighborhoods: self.neighborhood.as_deref().map(split_multi).unwrap_or_default(),
            modalities: self.modalidade.as_deref().map(split_multi).unwrap_or_default(),
            price: PriceRange { min: self.price_min, max: self.price_max },
        }
    }

    /// Recognised sort key; unknown values mean "no sort".
    pub fn sort_key(&self) -> Option<SortKey> {
        self.sort.as_deref().and_then(SortKey::parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_multi_dedups_and_trims() {
        assert_eq!(
            split_multi(" Campinas, Santos ,,Campinas,  "),
            vec!["Campinas".to_string(), "Santos".to_string()]
        );
        assert!(split_multi("").is_empty());
        assert!(split_multi(" , ,").is_empty());
    }

    #[test]
    fn test_uf_normalized() {
        assert_eq!(FilterSelection::new().with_uf(" sp ").uf.as_deref(), Some("SP"));
        assert_eq!(FilterSelection::new().with_uf("  ").uf, None);
    }

    #[test]
    fn test_without_clears_one_dimension() {
        let f = FilterSelection::new()
            .with_uf("SP")
            .with_cities("Campinas")
            .with_modalities("Venda Online");
        let g = f.without(Dimension::City);
        assert_eq!(g.uf.as_deref(), Some("SP"));
        assert!(g.cities.is_empty());
        assert_eq!(g.modalities, vec!["Venda Online".to_string()]);
        assert!(f.constrains(Dimension::City));
    }

    #[test]
    fn test_hierarchy_consistency() {
        assert!(FilterSelection::new().is_hierarchy_consistent());
        assert!(FilterSelection::new().with_uf("SP").with_cities("Campinas").is_hierarchy_consistent());
        assert!(!FilterSelection::new().with_cities("Campinas").is_hierarchy_consistent());
        assert!(!FilterSelection::new().with_uf("SP").with_neighborhoods("Centro").is_hierarchy_consistent());
    }

    #[test]
    fn test_query_to_selection() {
        let q = FilterQuery {
            uf: Some("rj".into()),
            city: Some("Niterói,Rio de Janeiro".into()),
            modalidade: Some("Leilão SFI - Edital Único".into()),
            sort: Some("price_desc".into()),
            ..FilterQuery::default()
        };
        let f = q.selection();
        assert_eq!(f.uf.as_deref(), Some("RJ"));
        assert_eq!(f.cities.len(), 2);
        assert!(f.neighborhoods.is_empty());
        assert_eq!(q.sort_key(), Some(SortKey::PriceDesc));
    }

    #[test]
    fn test_unknown_sort_ignored() {
        let q = FilterQuery { sort: Some("relevance".into()), ..FilterQuery::default() };
        assert_eq!(q.sort_key(), None);
    }

    #[test]
    fn test_deserialized_selection_is_normalized() {
        let blank: FilterSelection = serde_json::from_str(r#"{"uf":"","cities":["",""]}"#).unwrap();
        assert_eq!(blank.uf, None);
        assert!(blank.cities.is_empty());
        assert!(blank.is_empty());

        let f: FilterSelection = serde_json::from_str(
            r#"{"uf":" sp ","cities":[" Campinas","Campinas ","  "],"modalities":["Venda Online"],"price":{"min":null,"max":200.0}}"#,
        )
        .unwrap();
        assert_eq!(f.uf.as_deref(), Some("SP"));
        assert_eq!(f.cities, vec!["Campinas".to_string()]);
        assert_eq!(f.modalities, vec!["Venda Online".to_string()]);
        assert_eq!(f.price.max, Some(200.0));
        let built = FilterSelection::new()
            .with_uf("SP")
            .with_cities("Campinas")
            .with_modalities("Venda Online")
            .with_price(None, Some(200.0));
        assert_eq!(f, built);
    }

    #[test]
    fn test_price_bound_makes_selection_non_empty() {
        assert!(PriceRange::default().is_unbounded());
        let f = FilterSelection::new().with_price(None, Some(200.0));
        assert!(!f.price.is_unbounded());
        assert!(!f.is_empty());
    }
}
