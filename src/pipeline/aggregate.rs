//! Place and ICB aggregation over practice rows.
//!
//! Aggregation works on the raw loaded values. Nothing is rounded here:
//! rounding before the index division gives materially different results.

use crate::models::{AggregatedGroup, Measure, MeasureValues, PracticeRecord};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// How one measure column is reduced over a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationFn {
    #[default]
    Sum,
    Mean,
    Min,
    Max,
}

/// `{column -> function}` entry of the aggregation mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub column: Measure,
    #[serde(default)]
    pub function: AggregationFn,
}

impl AggregationSpec {
    pub fn sum(column: Measure) -> Self {
        Self {
            column,
            function: AggregationFn::Sum,
        }
    }
}

/// Sum over every measure, the mapping the published tool uses.
pub fn default_aggregations() -> Vec<AggregationSpec> {
    Measure::ALL.iter().copied().map(AggregationSpec::sum).collect()
}

/// Which practice rows belong to a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Practices whose display identifier is in the set.
    Members(BTreeSet<String>),
    /// Practices whose ICB equals the name.
    Region(String),
}

impl Selector {
    pub fn members<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selector::Members(ids.into_iter().map(Into::into).collect())
    }

    pub fn region(name: impl Into<String>) -> Self {
        Selector::Region(name.into())
    }

    pub fn matches(&self, record: &PracticeRecord) -> bool {
        match self {
            Selector::Members(ids) => ids.contains(&record.display),
            Selector::Region(name) => record.icb == *name,
        }
    }

    /// Stable hash of the selector contents, used as a cache key.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn finish(&self, function: AggregationFn, rows: usize) -> f64 {
        match function {
            AggregationFn::Sum => self.sum,
            AggregationFn::Mean => self.sum / rows as f64,
            AggregationFn::Min => self.min,
            AggregationFn::Max => self.max,
        }
    }
}

/// Aggregate the rows picked by `selector` into one group called `label`.
///
/// Returns `None` when no row matches; callers treat that as "not available
/// in this period". Measures absent from `specs` stay at zero.
pub fn aggregate(
    records: &[PracticeRecord],
    selector: &Selector,
    label: &str,
    specs: &[AggregationSpec],
) -> Option<AggregatedGroup> {
    let mut accumulators = [Accumulator::default(); Measure::COUNT];
    let mut rows = 0usize;

    for record in records.iter().filter(|r| selector.matches(r)) {
        rows += 1;
        for spec in specs {
            accumulators[spec.column.position()].push(record.values[spec.column]);
        }
    }

    if rows == 0 {
        return None;
    }

    let mut values = MeasureValues::new();
    for spec in specs {
        values[spec.column] = accumulators[spec.column.position()].finish(spec.function, rows);
    }

    Some(AggregatedGroup {
        label: label.to_string(),
        values,
        rows,
    })
}
