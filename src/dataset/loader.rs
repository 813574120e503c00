//! CSV loading for practice-level datasets.
//!
//! Headers are accepted in the raw published form (`Practice_Code`,
//! `G&A WP`, ...) or in the renamed form used by output tables. Missing
//! and zero measures are coerced to 1 under the default policy.

use super::Dataset;
use crate::error::{PipelineError, Result};
use crate::models::{Measure, MeasureValues, PracticeRecord};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

const CODE_HEADERS: [&str; 2] = ["Practice_Code", "GP Practice code"];
const NAME_HEADERS: [&str; 2] = ["GP_Practice_Name", "GP Practice name"];
const ICB_HEADERS: [&str; 2] = ["ICS22name", "ICB name"];

const MISSING_MARKERS: [&str; 5] = ["na", "nan", "null", "none", "n/a"];

/// What to do with a null, empty or zero measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingValuePolicy {
    /// Replace with 1 so no denominator can be zero.
    #[default]
    CoerceToOne,
    /// Fail the dataset load.
    Reject,
}

/// Column positions resolved from the header row.
struct Columns {
    code: usize,
    name: usize,
    icb: usize,
    measures: [usize; Measure::COUNT],
}

impl Columns {
    fn resolve(headers: &StringRecord, source: &str) -> Result<Self> {
        let missing = |what: &str| PipelineError::dataset(source, format!("missing column '{}'", what));

        let code = find_column(headers, &CODE_HEADERS).ok_or_else(|| missing(CODE_HEADERS[1]))?;
        let name = find_column(headers, &NAME_HEADERS).ok_or_else(|| missing(NAME_HEADERS[1]))?;
        let icb = find_column(headers, &ICB_HEADERS).ok_or_else(|| missing(ICB_HEADERS[1]))?;

        let mut measures = [0usize; Measure::COUNT];
        for measure in Measure::ALL {
            measures[measure.position()] = headers
                .iter()
                .position(|h| Measure::from_header(clean_header(h)) == Some(measure))
                .ok_or_else(|| missing(measure.column()))?;
        }

        Ok(Self {
            code,
            name,
            icb,
            measures,
        })
    }
}

fn find_column(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| aliases.iter().any(|alias| *alias == clean_header(h)))
}

fn clean_header(header: &str) -> &str {
    header.trim_start_matches('\u{feff}').trim()
}

/// Load one dataset file. The year label is the file stem.
pub fn load_dataset(path: &Path, policy: MissingValuePolicy) -> Result<Dataset> {
    let year = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PipelineError::dataset(path.display().to_string(), "no file stem"))?
        .to_string();

    let bytes = std::fs::read(path)?;
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    let fingerprint = hasher.finish();

    let source = path.display().to_string();
    let records = parse_dataset(bytes.as_slice(), &source, policy)?;
    info!("Loaded {} practices for {} from {}", records.len(), year, source);

    Ok(Dataset::new(year, path, fingerprint, records))
}

/// Parse practice rows from CSV. `source` names the input in errors.
pub fn parse_dataset<R: Read>(
    reader: R,
    source: &str,
    policy: MissingValuePolicy,
) -> Result<Vec<PracticeRecord>> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let columns = Columns::resolve(rdr.headers()?, source)?;

    let mut records = Vec::new();
    let mut coerced = 0usize;

    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        // Header is line 1.
        let line = record.position().map(|p| p.line()).unwrap_or(row as u64 + 2);

        let code = record.get(columns.code).unwrap_or("");
        let name = record.get(columns.name).unwrap_or("");
        if code.is_empty() {
            warn!("{}: skipping line {} with no practice code", source, line);
            continue;
        }

        let mut values = MeasureValues::new();
        for measure in Measure::ALL {
            let raw = record.get(columns.measures[measure.position()]).unwrap_or("");
            let (value, was_coerced) = parse_measure(raw, policy).map_err(|reason| {
                PipelineError::DataIntegrity(format!(
                    "{} line {} column '{}': {}",
                    source, line, measure, reason
                ))
            })?;
            if was_coerced {
                coerced += 1;
            }
            values[measure] = value;
        }

        let icb = record.get(columns.icb).unwrap_or("");
        records.push(PracticeRecord::new(code, name, icb, values));
    }

    if coerced > 0 {
        debug!("{}: coerced {} null or zero values to 1", source, coerced);
    }

    Ok(records)
}

/// Returns the value and whether it was coerced.
fn parse_measure(raw: &str, policy: MissingValuePolicy) -> std::result::Result<(f64, bool), String> {
    let raw = raw.trim();
    let missing = raw.is_empty() || MISSING_MARKERS.contains(&raw.to_lowercase().as_str());

    let value = if missing {
        None
    } else {
        let parsed: f64 = raw
            .parse()
            .map_err(|_| format!("'{}' is not a number", raw))?;
        if !parsed.is_finite() {
            return Err(format!("'{}' is not finite", raw));
        }
        Some(parsed)
    };

    match (value, policy) {
        (Some(v), _) if v != 0.0 => Ok((v, false)),
        (_, MissingValuePolicy::CoerceToOne) => Ok((1.0, true)),
        (None, MissingValuePolicy::Reject) => Err("value is missing".to_string()),
        (Some(_), MissingValuePolicy::Reject) => Err("value is zero".to_string()),
    }
}
