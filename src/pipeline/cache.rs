//! Memoised aggregation results.
//!
//! Keys combine the dataset year, the dataset fingerprint, the selector
//! contents, the group label and the aggregation mapping, so an edited place
//! or a reloaded dataset never hits a stale entry.

use super::aggregate::{aggregate, AggregationSpec, Selector};
use crate::models::{AggregatedGroup, PracticeRecord};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub year: String,
    pub dataset: u64,
    pub selector: u64,
    pub label: String,
    pub aggregations: u64,
}

impl CacheKey {
    pub fn new(
        year: &str,
        dataset: u64,
        selector: &Selector,
        label: &str,
        specs: &[AggregationSpec],
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        specs.hash(&mut hasher);
        Self {
            year: year.to_string(),
            dataset,
            selector: selector.fingerprint(),
            label: label.to_string(),
            aggregations: hasher.finish(),
        }
    }
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

/// Thread-safe aggregation cache shared by the orchestrator's workers.
#[derive(Debug, Default)]
pub struct AggregationCache {
    entries: Mutex<HashMap<CacheKey, Option<AggregatedGroup>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl AggregationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate `records` for `selector`, reusing a previous result.
    ///
    /// Empty results are cached too.
    pub fn aggregate(
        &self,
        year: &str,
        dataset: u64,
        records: &[PracticeRecord],
        selector: &Selector,
        label: &str,
        specs: &[AggregationSpec],
    ) -> Option<AggregatedGroup> {
        let key = CacheKey::new(year, dataset, selector, label, specs);

        if let Some(cached) = self.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached.clone();
        }

        // Computed outside the lock; two workers racing on one key produce
        // identical groups.
        self.misses.fetch_add(1, Ordering::Relaxed);
        let group = aggregate(records, selector, label, specs);
        debug!(
            "Aggregated {} for {}: {} rows",
            label,
            year,
            group.as_ref().map(|g| g.rows).unwrap_or(0)
        );

        self.lock().insert(key, group.clone());
        group
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.lock().len(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Option<AggregatedGroup>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
