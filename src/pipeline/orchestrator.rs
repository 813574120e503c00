//! Multi-year orchestration.
//!
//! For every dataset year and every place, in registry order:
//!
//! 1. aggregate the place's ICB and the place's member practices,
//! 2. compute ICB rates and place indices,
//! 3. emit the ICB row the first time the ICB is seen, with each place row
//!    appended under its ICB,
//! 4. round the assembled table once.
//!
//! A place that cannot be evaluated in a year is reported and skipped; the
//! remaining places and years still run.

use super::aggregate::{default_aggregations, AggregationSpec, Selector};
use super::cache::{AggregationCache, CacheStats};
use super::index::{default_index_pairs, IndexCalculator, IndexPair};
use super::rounding::RoundingPolicy;
use crate::dataset::{Dataset, FailedYear};
use crate::error::PipelineError;
use crate::models::{Availability, IndexRow, Measure, Place, PlaceReport, RowKind, YearTable};
use crate::places::PlaceRegistry;
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

/// Everything the pipeline needs besides the data.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Denominator of every rate.
    pub population: Measure,
    pub aggregations: Vec<AggregationSpec>,
    pub indices: Vec<IndexPair>,
    pub rounding: RoundingPolicy,
    /// Evaluate years and places on the rayon pool.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            population: Measure::GpPop,
            aggregations: default_aggregations(),
            indices: default_index_pairs(),
            rounding: RoundingPolicy::default(),
            parallel: true,
        }
    }
}

/// Result of evaluating one place against one year.
struct PlaceOutcome {
    report: PlaceReport,
    icb_row: Option<IndexRow>,
    place_row: Option<IndexRow>,
}

impl PlaceOutcome {
    fn unavailable(place: &Place, reason: impl Into<String>) -> Self {
        Self {
            report: PlaceReport {
                place: place.name.clone(),
                icb: place.icb.clone(),
                availability: Availability::Unavailable {
                    reason: reason.into(),
                },
            },
            icb_row: None,
            place_row: None,
        }
    }

    fn failed(place: &Place, year: &str, error: &PipelineError) -> Self {
        if error.is_recoverable() {
            warn!("{} in {}: {}", place.name, year, error);
        } else {
            error!("{} in {}: {}", place.name, year, error);
        }
        Self::unavailable(place, error.to_string())
    }
}

/// Rows of one ICB in a year table.
struct IcbGroup {
    icb: String,
    row: Option<IndexRow>,
    places: Vec<IndexRow>,
}

/// Runs the pipeline over every dataset year for a registry of places.
pub struct Orchestrator {
    config: PipelineConfig,
    cache: AggregationCache,
    progress: Option<ProgressBar>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cache: AggregationCache::new(),
            progress: None,
        }
    }

    /// Tick `progress` once per evaluated (year, place).
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Evaluate a snapshot of `registry` against every dataset.
    ///
    /// Each failed year gets a table with no rows in which every place is
    /// unavailable. Tables come back sorted by year label.
    pub fn run(
        &self,
        datasets: &[Dataset],
        failed: &[FailedYear],
        registry: &PlaceRegistry,
    ) -> Vec<YearTable> {
        let places = registry.snapshot();

        if let Some(progress) = &self.progress {
            progress.set_length((datasets.len() * places.len()) as u64);
        }

        let mut tables: Vec<YearTable> = if self.config.parallel {
            datasets
                .par_iter()
                .map(|dataset| self.run_year(dataset, &places))
                .collect()
        } else {
            datasets
                .iter()
                .map(|dataset| self.run_year(dataset, &places))
                .collect()
        };

        tables.extend(failed.iter().map(|year| self.failed_year(year, &places)));
        tables.sort_by(|a, b| a.year.cmp(&b.year));

        tables
    }

    /// Table of a year whose dataset could not be loaded.
    fn failed_year(&self, failed: &FailedYear, places: &[Place]) -> YearTable {
        let places = places
            .iter()
            .map(|place| PlaceOutcome::unavailable(place, failed.reason.clone()).report)
            .collect();

        YearTable {
            year: failed.year.clone(),
            measures: self.config.aggregations.iter().map(|s| s.column).collect(),
            index_names: self.config.indices.iter().map(|p| p.name.clone()).collect(),
            rows: Vec::new(),
            places,
        }
    }

    /// Build the rounded table of one year.
    pub fn run_year(&self, dataset: &Dataset, places: &[Place]) -> YearTable {
        info!(
            "Evaluating {} places for {}",
            places.len(),
            dataset.display_year()
        );

        // collect() keeps input order, so grouping below is deterministic.
        let outcomes: Vec<PlaceOutcome> = if self.config.parallel {
            places
                .par_iter()
                .map(|place| self.evaluate_place(dataset, place))
                .collect()
        } else {
            places
                .iter()
                .map(|place| self.evaluate_place(dataset, place))
                .collect()
        };

        let mut groups: Vec<IcbGroup> = Vec::new();
        let mut reports = Vec::with_capacity(outcomes.len());

        for outcome in outcomes {
            let position = match groups.iter().position(|g| g.icb == outcome.report.icb) {
                Some(position) => position,
                None => {
                    groups.push(IcbGroup {
                        icb: outcome.report.icb.clone(),
                        row: None,
                        places: Vec::new(),
                    });
                    groups.len() - 1
                }
            };

            let group = &mut groups[position];
            if group.row.is_none() {
                group.row = outcome.icb_row;
            }
            group.places.extend(outcome.place_row);
            reports.push(outcome.report);
        }

        let mut rows: Vec<IndexRow> = groups
            .into_iter()
            .flat_map(|group| group.row.into_iter().chain(group.places))
            .collect();
        self.config.rounding.apply(&mut rows);

        YearTable {
            year: dataset.year.clone(),
            measures: self.config.aggregations.iter().map(|s| s.column).collect(),
            index_names: self.config.indices.iter().map(|p| p.name.clone()).collect(),
            rows,
            places: reports,
        }
    }

    fn evaluate_place(&self, dataset: &Dataset, place: &Place) -> PlaceOutcome {
        let outcome = self.evaluate_place_inner(dataset, place);
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
        outcome
    }

    fn evaluate_place_inner(&self, dataset: &Dataset, place: &Place) -> PlaceOutcome {
        let calculator = IndexCalculator::new(self.config.population, &self.config.indices);

        let missing: Vec<String> = dataset
            .missing_practices(&place.practices)
            .into_iter()
            .map(String::from)
            .collect();
        for practice in &missing {
            debug!(
                "{} is not available in {} ({})",
                practice,
                dataset.display_year(),
                place.name
            );
        }

        let Some(region) = self.cache.aggregate(
            &dataset.year,
            dataset.fingerprint,
            &dataset.records,
            &Selector::region(place.icb.as_str()),
            &place.icb,
            &self.config.aggregations,
        ) else {
            warn!(
                "{}: ICB {} not found in {}",
                place.name,
                place.icb,
                dataset.display_year()
            );
            return PlaceOutcome::unavailable(place, "ICB not found in this period");
        };

        let rates = match calculator.region_rates(&region) {
            Ok(rates) => rates,
            Err(e) => return PlaceOutcome::failed(place, &dataset.display_year(), &e),
        };

        let icb_row = IndexRow {
            label: place.icb.clone(),
            kind: RowKind::Icb,
            icb: place.icb.clone(),
            values: region.values,
            indices: rates.clone(),
        };

        let Some(members) = self.cache.aggregate(
            &dataset.year,
            dataset.fingerprint,
            &dataset.records,
            &Selector::members(place.practices.iter().cloned()),
            &place.name,
            &self.config.aggregations,
        ) else {
            warn!(
                "{} is not available in {}: none of its practices were found",
                place.name,
                dataset.display_year()
            );
            let mut outcome =
                PlaceOutcome::unavailable(place, "no member practices found in this period");
            outcome.icb_row = Some(icb_row);
            return outcome;
        };

        match calculator.place_indices(&members, &rates) {
            Ok(indices) => {
                let availability = if missing.is_empty() {
                    Availability::Complete
                } else {
                    Availability::Partial { missing }
                };

                PlaceOutcome {
                    report: PlaceReport {
                        place: place.name.clone(),
                        icb: place.icb.clone(),
                        availability,
                    },
                    icb_row: Some(icb_row),
                    place_row: Some(IndexRow {
                        label: place.name.clone(),
                        kind: RowKind::Place,
                        icb: place.icb.clone(),
                        values: members.values,
                        indices,
                    }),
                }
            }
            Err(e) => {
                let mut outcome = PlaceOutcome::failed(place, &dataset.display_year(), &e);
                outcome.icb_row = Some(icb_row);
                outcome
            }
        }
    }
}
