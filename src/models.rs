//! Data models for the place-based allocation pipeline.
//!
//! This module contains the core data structures shared by the dataset
//! loader, the place registry, the pipeline and the report writers.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::ops::{Index, IndexMut};

/// A numeric column of the practice dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Measure {
    #[serde(rename = "GP pop")]
    GpPop,
    #[serde(rename = "Weighted G&A pop")]
    GeneralAcute,
    #[serde(rename = "Weighted Community pop")]
    Community,
    #[serde(rename = "Weighted Mental Health pop")]
    MentalHealth,
    #[serde(rename = "Weighted Maternity pop")]
    Maternity,
    #[serde(rename = "Weighted Prescribing pop")]
    Prescribing,
    #[serde(rename = "Overall Weighted pop")]
    OverallCore,
    #[serde(rename = "Weighted Primary Care")]
    PrimaryCare,
    #[serde(rename = "Weighted Primary Medical Care Need")]
    PrimaryMedicalCareNeed,
    #[serde(rename = "Weighted Health Inequalities pop")]
    HealthInequalities,
}

impl Measure {
    pub const COUNT: usize = 10;

    pub const ALL: [Measure; Measure::COUNT] = [
        Measure::GpPop,
        Measure::GeneralAcute,
        Measure::Community,
        Measure::MentalHealth,
        Measure::Maternity,
        Measure::Prescribing,
        Measure::OverallCore,
        Measure::PrimaryCare,
        Measure::PrimaryMedicalCareNeed,
        Measure::HealthInequalities,
    ];

    /// Column name used in output tables and configuration.
    pub fn column(&self) -> &'static str {
        match self {
            Measure::GpPop => "GP pop",
            Measure::GeneralAcute => "Weighted G&A pop",
            Measure::Community => "Weighted Community pop",
            Measure::MentalHealth => "Weighted Mental Health pop",
            Measure::Maternity => "Weighted Maternity pop",
            Measure::Prescribing => "Weighted Prescribing pop",
            Measure::OverallCore => "Overall Weighted pop",
            Measure::PrimaryCare => "Weighted Primary Care",
            Measure::PrimaryMedicalCareNeed => "Weighted Primary Medical Care Need",
            Measure::HealthInequalities => "Weighted Health Inequalities pop",
        }
    }

    /// Header used by the published practice-level CSV files.
    pub fn raw_header(&self) -> &'static str {
        match self {
            Measure::GpPop => "pop 2022/23",
            Measure::GeneralAcute => "G&A WP",
            Measure::Community => "CS WP",
            Measure::MentalHealth => "MH WP",
            Measure::Maternity => "Mat WP",
            Measure::Prescribing => "Prescr WP",
            Measure::OverallCore => "Final WP",
            Measure::PrimaryCare => "Final PMC WP",
            Measure::PrimaryMedicalCareNeed => "Primary Medical Care WP",
            Measure::HealthInequalities => "Health Ineq WP",
        }
    }

    /// Resolve a CSV header, accepting either the raw or the renamed form.
    ///
    /// The raw population header carries its year (`pop 2024/25`), so any
    /// `pop <year>` header maps to [`Measure::GpPop`].
    pub fn from_header(header: &str) -> Option<Self> {
        let header = header.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.column() == header || m.raw_header() == header)
            .or_else(|| {
                header
                    .strip_prefix("pop ")
                    .filter(|year| year.starts_with(|c: char| c.is_ascii_digit()))
                    .map(|_| Measure::GpPop)
            })
    }

    pub(crate) fn position(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One `f64` per [`Measure`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeasureValues([f64; Measure::COUNT]);

impl MeasureValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filled(value: f64) -> Self {
        Self([value; Measure::COUNT])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Measure, f64)> + '_ {
        Measure::ALL.iter().map(move |m| (*m, self[*m]))
    }
}

impl Index<Measure> for MeasureValues {
    type Output = f64;

    fn index(&self, measure: Measure) -> &f64 {
        &self.0[measure.position()]
    }
}

impl IndexMut<Measure> for MeasureValues {
    fn index_mut(&mut self, measure: Measure) -> &mut f64 {
        &mut self.0[measure.position()]
    }
}

impl Serialize for MeasureValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Measure::COUNT))?;
        for (measure, value) in self.iter() {
            map.serialize_entry(measure.column(), &value)?;
        }
        map.end()
    }
}

/// One row of a practice-level dataset. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct PracticeRecord {
    pub code: String,
    pub name: String,
    /// `"<code>: <name>"`, the identifier places refer to.
    pub display: String,
    pub icb: String,
    pub values: MeasureValues,
}

impl PracticeRecord {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        icb: impl Into<String>,
        values: MeasureValues,
    ) -> Self {
        let code = code.into();
        let name = name.into();
        let display = practice_display(&code, &name);
        Self {
            code,
            name,
            display,
            icb: icb.into(),
            values,
        }
    }
}

/// Build the display identifier of a practice.
pub fn practice_display(code: &str, name: &str) -> String {
    format!("{}: {}", code, name)
}

/// A user-defined grouping of practices within one ICB.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Place {
    pub name: String,
    pub icb: String,
    /// Member practice display identifiers, in the order they were chosen.
    pub practices: Vec<String>,
}

impl Place {
    pub fn new<I, S>(name: impl Into<String>, icb: impl Into<String>, practices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            icb: icb.into(),
            practices: practices.into_iter().map(Into::into).collect(),
        }
    }
}

/// Aggregated measures over a set of practice rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedGroup {
    pub label: String,
    pub values: MeasureValues,
    /// Number of practice rows that contributed.
    pub rows: usize,
}

/// Discriminates ICB rows from place rows in an output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowKind {
    Place,
    #[serde(rename = "ICB")]
    Icb,
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKind::Place => write!(f, "Place"),
            RowKind::Icb => write!(f, "ICB"),
        }
    }
}

/// One row of a year table.
///
/// ICB rows hold rates relative to the national baseline embedded in the
/// weighted populations; place rows hold indices relative to their ICB.
/// The two are not on the same scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRow {
    /// Place name or ICB name.
    pub label: String,
    pub kind: RowKind,
    pub icb: String,
    pub values: MeasureValues,
    /// Index values, paired by position with [`YearTable::index_names`].
    pub indices: Vec<f64>,
}

/// How much of a place could be evaluated in one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Complete,
    /// Some member practices are absent; indices cover the rest.
    Partial { missing: Vec<String> },
    /// No row was produced for this place.
    Unavailable { reason: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        !matches!(self, Availability::Unavailable { .. })
    }
}

/// Per-place outcome of one year's evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceReport {
    pub place: String,
    pub icb: String,
    pub availability: Availability,
}

/// The fully indexed, fully rounded table of one dataset year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearTable {
    /// File-stem year label, e.g. `2024_25`.
    pub year: String,
    /// Aggregated measures, in output column order.
    pub measures: Vec<Measure>,
    pub index_names: Vec<String>,
    pub rows: Vec<IndexRow>,
    pub places: Vec<PlaceReport>,
}

impl YearTable {
    /// Year label for display, e.g. `2024/25`.
    pub fn display_year(&self) -> String {
        display_year(&self.year)
    }

    #[cfg(test)]
    pub fn row(&self, label: &str, kind: RowKind) -> Option<&IndexRow> {
        self.rows.iter().find(|r| r.kind == kind && r.label == label)
    }

    pub fn index_value(&self, row: &IndexRow, index_name: &str) -> Option<f64> {
        let position = self.index_names.iter().position(|n| n == index_name)?;
        row.indices.get(position).copied()
    }

    pub fn unavailable(&self) -> impl Iterator<Item = &PlaceReport> {
        self.places.iter().filter(|p| !p.availability.is_available())
    }
}

/// Metadata about one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub data_dir: String,
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
    /// Year labels evaluated, in order.
    pub years: Vec<String>,
    /// Place names evaluated, in registry order.
    pub places: Vec<String>,
    pub duration_seconds: f64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub tables: Vec<YearTable>,
}

impl RunReport {
    /// Every (year, place) that produced no row.
    pub fn unavailable(&self) -> impl Iterator<Item = (&YearTable, &PlaceReport)> {
        self.tables
            .iter()
            .flat_map(|table| table.unavailable().map(move |place| (table, place)))
    }
}

/// Turn a file-stem year label into its display form.
pub fn display_year(year: &str) -> String {
    year.replace('_', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_headers() {
        assert_eq!(Measure::from_header("G&A WP"), Some(Measure::GeneralAcute));
        assert_eq!(
            Measure::from_header(" Weighted G&A pop "),
            Some(Measure::GeneralAcute)
        );
        assert_eq!(Measure::from_header("pop 2022/23"), Some(Measure::GpPop));
        assert_eq!(Measure::from_header("pop 2025/26"), Some(Measure::GpPop));
        assert_eq!(Measure::from_header("pop"), None);
        assert_eq!(Measure::from_header("Latitude"), None);
    }

    #[test]
    fn test_measure_values_indexing() {
        let mut values = MeasureValues::new();
        values[Measure::Maternity] = 12.5;
        assert_eq!(values[Measure::Maternity], 12.5);
        assert_eq!(values[Measure::GpPop], 0.0);
        assert_eq!(values.iter().count(), Measure::COUNT);
    }

    #[test]
    fn test_measure_values_serialize_by_column() {
        let values = MeasureValues::filled(1.0);
        let json = serde_json::to_value(values).unwrap();
        assert_eq!(json["GP pop"], 1.0);
        assert_eq!(json["Weighted Health Inequalities pop"], 1.0);
    }

    #[test]
    fn test_practice_display() {
        let record = PracticeRecord::new(
            "B85005",
            "SHEPLEY PRIMARY CARE LIMITED",
            "NHS West Yorkshire ICB",
            MeasureValues::filled(1.0),
        );
        assert_eq!(record.display, "B85005: SHEPLEY PRIMARY CARE LIMITED");
    }

    #[test]
    fn test_display_year() {
        assert_eq!(display_year("2024_25"), "2024/25");
        assert_eq!(display_year("2025_26"), "2025/26");
    }

    #[test]
    fn test_availability_serialization() {
        let partial = Availability::Partial {
            missing: vec!["X1: GONE".to_string()],
        };
        let json = serde_json::to_value(&partial).unwrap();
        assert_eq!(json["status"], "partial");
        assert!(partial.is_available());

        let unavailable = Availability::Unavailable {
            reason: "no practices".to_string(),
        };
        assert!(!unavailable.is_available());
    }
}
