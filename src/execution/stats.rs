//! Appraisal statistics over a filtered subset.

use serde::{Deserialize, Serialize};

use crate::model::fields;
use crate::planner::PredicateSet;
use crate::storage::PropertyStore;
use crate::Result;

/// Mean and median of the parsed `Valor de avaliação`.
///
/// With no contributing rows both figures are `0`; `count` tells that case
/// apart from a genuine zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FilteredStats {
    pub average: f64,
    pub median: f64,
    /// Rows whose appraisal value parsed.
    pub count: u64,
}

impl FilteredStats {
    pub fn from_values(mut values: Vec<f64>) -> Self {
        Self {
            average: mean(&values).unwrap_or(0.0),
            median: median(&mut values).unwrap_or(0.0),
            count: values.len() as u64,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Continuous 50th percentile: the middle value, or the mean of the two
/// middle values for an even count. Reorders `values`.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Statistics of the appraisal value over rows matching `predicates`.
pub async fn filtered_stats<S: PropertyStore + ?Sized>(store: &S, predicates: &PredicateSet) -> Result<FilteredStats> {
    let values = store.currency_values(predicates, fields::VALOR_AVALIACAO).await?;
    Ok(FilteredStats::from_values(values))
}
