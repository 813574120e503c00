//! Output writers: per-year CSV tables, the JSON report, the Markdown
//! summary and the registry snapshot.

mod generator;
mod table;

use generator::{write_json_report, write_markdown_summary};
use table::write_year_csv;

use crate::cli::OutputFormat;
use crate::models::RunReport;
use crate::pipeline::RoundingPolicy;
use crate::places::PlaceRegistry;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes every output of a run into one directory.
pub struct OutputWriter {
    dir: PathBuf,
    policy: RoundingPolicy,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>, policy: RoundingPolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the run's outputs. Returns the paths written, in order.
    pub fn write(
        &self,
        report: &RunReport,
        registry: &PlaceRegistry,
        format: OutputFormat,
        summary: bool,
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output directory {}", self.dir.display()))?;

        let mut written = Vec::new();

        match format {
            OutputFormat::Csv => {
                for table in &report.tables {
                    let path = self.dir.join(format!("allocations_{}.csv", table.year));
                    write_year_csv(table, &self.policy, &path)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    written.push(path);
                }
            }
            OutputFormat::Json => {
                let path = self.dir.join("allocations.json");
                write_json_report(report, &path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                written.push(path);
            }
        }

        if summary {
            let path = self.dir.join("summary.md");
            write_markdown_summary(report, &self.policy, &path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            written.push(path);
        }

        let path = self.dir.join("places.json");
        registry
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);

        for path in &written {
            info!("Wrote {}", path.display());
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunMetadata, YearTable};
    use chrono::Utc;

    fn report() -> RunReport {
        let table = |year: &str| YearTable {
            year: year.to_string(),
            measures: vec![],
            index_names: vec![],
            rows: vec![],
            places: vec![],
        };
        RunReport {
            metadata: RunMetadata {
                data_dir: "data".to_string(),
                generated_at: Utc::now(),
                tool_version: "1.0.0".to_string(),
                years: vec!["2024_25".to_string(), "2025_26".to_string()],
                places: vec![],
                duration_seconds: 0.0,
            },
            tables: vec![table("2024_25"), table("2025_26")],
        }
    }

    #[test]
    fn test_write_csv_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path().join("out"), RoundingPolicy::default());

        let written = writer
            .write(&report(), &PlaceRegistry::with_default(), OutputFormat::Csv, true)
            .unwrap();

        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "allocations_2024_25.csv",
                "allocations_2025_26.csv",
                "summary.md",
                "places.json"
            ]
        );
        assert!(written.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_write_json_without_summary() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), RoundingPolicy::default());

        let written = writer
            .write(&report(), &PlaceRegistry::with_default(), OutputFormat::Json, false)
            .unwrap();

        assert_eq!(written.len(), 2);
        assert!(dir.path().join("allocations.json").exists());
        assert!(!dir.path().join("summary.md").exists());
    }
}
