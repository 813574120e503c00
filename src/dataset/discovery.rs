//! Dataset discovery.
//!
//! Every `*.csv` file directly inside the data directory is one dataset
//! year, labelled by its file stem.

use crate::models::display_year;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A dataset file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    /// File-stem year label, e.g. `2024_25`.
    pub year: String,
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

impl DatasetFile {
    pub fn display_year(&self) -> String {
        display_year(&self.year)
    }
}

/// Finds dataset files in a data directory.
pub struct DatasetScanner {
    data_dir: PathBuf,
    /// Year labels to keep; empty keeps all.
    years: Vec<String>,
}

impl DatasetScanner {
    pub fn new(data_dir: PathBuf, years: Vec<String>) -> Self {
        Self { data_dir, years }
    }

    /// Scan for dataset files, sorted by year label.
    pub fn scan(&self) -> Result<Vec<DatasetFile>> {
        if !self.data_dir.is_dir() {
            return Err(anyhow::anyhow!(
                "Data directory not found: {}",
                self.data_dir.display()
            ));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.data_dir).min_depth(1).max_depth(1) {
            let entry = entry
                .with_context(|| format!("Cannot read {}", self.data_dir.display()))?;
            let path = entry.path();

            if !entry.file_type().is_file() || !self.matches(path) {
                continue;
            }

            let Some(year) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !self.years.is_empty() && !self.years.iter().any(|y| y == year) {
                debug!("Skipping dataset {} (not selected)", year);
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(DatasetFile {
                year: year.to_string(),
                path: path.to_path_buf(),
                size,
            });
        }

        files.sort_by(|a, b| a.year.cmp(&b.year));
        Ok(files)
    }

    /// Requested years that have no file.
    pub fn missing_years(&self, found: &[DatasetFile]) -> Vec<String> {
        self.years
            .iter()
            .filter(|y| !found.iter().any(|f| &f.year == *y))
            .cloned()
            .collect()
    }

    /// Check if a file is a dataset.
    fn matches(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if hidden {
            return false;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false)
    }
}
