//! Need index calculation.
//!
//! ```text
//! icb_rate[i]    = icb[numerator_i] / icb[population]
//! place_index[i] = (place[numerator_i] / place[population]) / icb_rate[i]
//! ```
//!
//! The division order is fixed so results match the published spreadsheet.

use crate::error::{PipelineError, Result};
use crate::models::{AggregatedGroup, Measure};
use serde::{Deserialize, Serialize};

/// A numerator column paired with the name of the index it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexPair {
    pub numerator: Measure,
    pub name: String,
}

impl IndexPair {
    pub fn new(numerator: Measure, name: impl Into<String>) -> Self {
        Self {
            numerator,
            name: name.into(),
        }
    }
}

/// The nine published index pairs, in output order.
pub fn default_index_pairs() -> Vec<IndexPair> {
    vec![
        IndexPair::new(Measure::GeneralAcute, "G&A Index"),
        IndexPair::new(Measure::Community, "Community Index"),
        IndexPair::new(Measure::MentalHealth, "Mental Health Index"),
        IndexPair::new(Measure::Maternity, "Maternity Index"),
        IndexPair::new(Measure::Prescribing, "Prescribing Index"),
        IndexPair::new(Measure::OverallCore, "Overall Core Index"),
        IndexPair::new(Measure::PrimaryCare, "Primary Medical Care Index"),
        IndexPair::new(
            Measure::PrimaryMedicalCareNeed,
            "Primary Medical Care Need Index",
        ),
        IndexPair::new(Measure::HealthInequalities, "Health Inequalities Index"),
    ]
}

/// Computes ICB rates and place indices for a configured set of pairs.
#[derive(Debug, Clone, Copy)]
pub struct IndexCalculator<'a> {
    population: Measure,
    pairs: &'a [IndexPair],
}

impl<'a> IndexCalculator<'a> {
    pub fn new(population: Measure, pairs: &'a [IndexPair]) -> Self {
        Self { population, pairs }
    }

    /// Per-capita rate of each numerator over the ICB population.
    pub fn region_rates(&self, region: &AggregatedGroup) -> Result<Vec<f64>> {
        self.pairs
            .iter()
            .map(|pair| {
                checked_div(
                    region.values[pair.numerator],
                    region.values[self.population],
                    &region.label,
                    &pair.name,
                )
            })
            .collect()
    }

    /// Place rates expressed as multiples of the ICB rates.
    pub fn place_indices(&self, place: &AggregatedGroup, region_rates: &[f64]) -> Result<Vec<f64>> {
        if region_rates.len() != self.pairs.len() {
            return Err(PipelineError::DataIntegrity(format!(
                "expected {} ICB rates for {}, got {}",
                self.pairs.len(),
                place.label,
                region_rates.len()
            )));
        }

        self.pairs
            .iter()
            .zip(region_rates)
            .map(|(pair, rate)| {
                let place_rate = checked_div(
                    place.values[pair.numerator],
                    place.values[self.population],
                    &place.label,
                    &pair.name,
                )?;
                checked_div(place_rate, *rate, &place.label, &pair.name)
            })
            .collect()
    }
}

fn checked_div(numerator: f64, denominator: f64, group: &str, index: &str) -> Result<f64> {
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(PipelineError::DataIntegrity(format!(
            "{} for {} has denominator {}",
            index, group, denominator
        )));
    }

    let value = numerator / denominator;
    if !value.is_finite() {
        return Err(PipelineError::DataIntegrity(format!(
            "{} for {} is not finite ({} / {})",
            index, group, numerator, denominator
        )));
    }

    Ok(value)
}
