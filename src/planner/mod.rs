//! Query planner: turns a `FilterSelection` into a parameterized predicate set.
//!
//! The planner is backend-agnostic. It produces typed clauses whose values
//! live in a separate positional parameter list; backends either evaluate
//! the clauses directly (`PredicateSet::matches`) or render them to their
//! own query language with placeholders. Filter values never end up in
//! query text.

use std::cmp::Ordering;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::model::{fields, parse_currency, Dimension, FilterSelection, Property};
use crate::storage::StoreRow;

/// Where a clause reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// The `uf` column.
    Uf,
    /// A canonical payload key.
    Payload(&'static str),
}

impl Field {
    pub fn for_dimension(dimension: Dimension) -> Self {
        match dimension.payload_key() {
            Some(key) => Field::Payload(key),
            None => Field::Uf,
        }
    }

    /// Read this field from a stored row. A row whose payload failed to
    /// parse has no payload fields.
    pub fn extract<'r>(&self, row: &'r StoreRow) -> Option<&'r str> {
        match self {
            Field::Uf => Some(row.uf.as_str()),
            Field::Payload(key) => row.payload.as_ref().and_then(|p| p.get(key)),
        }
    }
}

/// A positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Number(f64),
}

impl Param {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Param::Text(s) => Some(s),
            Param::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Param::Number(n) => Some(*n),
            Param::Text(_) => None,
        }
    }
}

/// One conjunct. Parameter references are 0-based indexes into
/// `PredicateSet::params`.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// `field = $param`
    Eq { field: Field, param: usize },
    /// `field IN ($params...)`
    In { field: Field, params: Range<usize> },
    /// `currency(payload[key]) >= $param`
    CurrencyAtLeast { key: &'static str, param: usize },
    /// `currency(payload[key]) <= $param`
    CurrencyAtMost { key: &'static str, param: usize },
}

/// Ordered clauses (AND-ed) plus their out-of-band parameters.
///
/// An empty set matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateSet {
    clauses: Vec<Clause>,
    params: Vec<Param>,
}

impl PredicateSet {
    /// The unconstrained set.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// True when any clause reads from the payload.
    pub fn touches_payload(&self) -> bool {
        self.clauses.iter().any(|c| !matches!(c, Clause::Eq { field: Field::Uf, .. } | Clause::In { field: Field::Uf, .. }))
    }

    /// Evaluate every clause against a row.
    pub fn matches(&self, row: &StoreRow) -> bool {
        self.clauses.iter().all(|clause| self.clause_matches(clause, row))
    }

    fn clause_matches(&self, clause: &Clause, row: &StoreRow) -> bool {
        match clause {
            Clause::Eq { field, param } => {
                field.extract(row).is_some_and(|v| Some(v) == self.text(*param))
            }
            Clause::In { field, params } => match field.extract(row) {
                Some(v) => self.params
                    .get(params.clone())
                    .unwrap_or_default()
                    .iter()
                    .any(|p| p.as_text() == Some(v)),
                None => false,
            },
            Clause::CurrencyAtLeast { key, param } => {
                match (Field::Payload(*key).extract(row).and_then(parse_currency), self.number(*param)) {
                    (Some(v), Some(min)) => v >= min,
                    _ => false,
                }
            }
            Clause::CurrencyAtMost { key, param } => {
                match (Field::Payload(*key).extract(row).and_then(parse_currency), self.number(*param)) {
                    (Some(v), Some(max)) => v <= max,
                    _ => false,
                }
            }
        }
    }

    fn text(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).and_then(Param::as_text)
    }

    fn number(&self, idx: usize) -> Option<f64> {
        self.params.get(idx).and_then(Param::as_number)
    }
}

/// Incremental construction of a `PredicateSet`.
#[derive(Debug, Default)]
pub struct PredicateBuilder {
    set: PredicateSet,
}

impl PredicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `field = value`.
    pub fn eq(mut self, field: Field, value: impl Into<String>) -> Self {
        let param = self.push(Param::Text(value.into()));
        self.set.clauses.push(Clause::Eq { field, param });
        self
    }

    /// `field ∈ values`. Duplicates are dropped; an empty slice adds nothing.
    pub fn any_of(mut self, field: Field, values: &[String]) -> Self {
        let start = self.set.params.len();
        for value in values {
            let seen = self.set.params[start..].iter().any(|p| p.as_text() == Some(value.as_str()));
            if !seen {
                self.push(Param::Text(value.clone()));
            }
        }
        let end = self.set.params.len();
        if end > start {
            self.set.clauses.push(Clause::In { field, params: start..end });
        }
        self
    }

    pub fn currency_at_least(mut self, key: &'static str, min: f64) -> Self {
        let param = self.push(Param::Number(min));
        self.set.clauses.push(Clause::CurrencyAtLeast { key, param });
        self
    }

    pub fn currency_at_most(mut self, key: &'static str, max: f64) -> Self {
        let param = self.push(Param::Number(max));
        self.set.clauses.push(Clause::CurrencyAtMost { key, param });
        self
    }

    pub fn build(self) -> PredicateSet {
        self.set
    }

    fn push(&mut self, param: Param) -> usize {
        self.set.params.push(param);
        self.set.params.len() - 1
    }
}

/// Plan a filter selection. Clause order is fixed: UF, City, Neighborhood,
/// Modality, then price bounds. Unconstrained dimensions add no clause.
pub fn plan(filter: &FilterSelection) -> PredicateSet {
    let mut builder = PredicateBuilder::new();
    if let Some(uf) = &filter.uf {
        builder = builder.eq(Field::Uf, uf.clone());
    }
    builder = builder
        .any_of(Field::for_dimension(Dimension::City), &filter.cities)
        .any_of(Field::for_dimension(Dimension::Neighborhood), &filter.neighborhoods)
        .any_of(Field::for_dimension(Dimension::Modality), &filter.modalities);
    if let Some(min) = filter.price.min {
        builder = builder.currency_at_least(fields::PRECO, min);
    }
    if let Some(max) = filter.price.max {
        builder = builder.currency_at_most(fields::PRECO, max);
    }

    let set = builder.build();
    tracing::trace!(
        clauses = set.clauses.len(),
        params = set.params.len(),
        payload = set.touches_payload(),
        "planned filter"
    );
    set
}

// ============================================================================
// Sorting
// ============================================================================

/// Listing order by parsed `Preço`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    PriceAsc,
    PriceDesc,
}

impl SortKey {
    /// `price_asc` / `price_desc`; anything else is not a sort key.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "price_asc" => Some(SortKey::PriceAsc),
            "price_desc" => Some(SortKey::PriceDesc),
            other => {
                tracing::debug!(sort = other, "ignoring unknown sort key");
                None
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::PriceAsc => "price_asc",
            SortKey::PriceDesc => "price_desc",
        }
    }

    /// Total order used by every backend.
    ///
    /// Ascending: parsed prices low to high, unparseable prices last, ties
    /// broken by `(uf, numero_imovel)`. Descending is the exact reverse.
    pub fn compare(self, a: &Property, b: &Property) -> Ordering {
        let ascending = compare_prices(a.price(), b.price()).then_with(|| {
            (a.uf.as_str(), a.numero_imovel.as_str()).cmp(&(b.uf.as_str(), b.numero_imovel.as_str()))
        });
        match self {
            SortKey::PriceAsc => ascending,
            SortKey::PriceDesc => ascending.reverse(),
        }
    }
}

fn compare_prices(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// A listing request as handed to a store.
#[derive(Debug, Clone, Copy)]
pub struct RowQuery<'a> {
    pub predicates: &'a PredicateSet,
    pub sort: Option<SortKey>,
    pub limit: usize,
}
