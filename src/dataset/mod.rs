//! Practice-level datasets, one per allocation year.

mod discovery;
mod loader;

pub use discovery::{DatasetFile, DatasetScanner};
pub use loader::{load_dataset, MissingValuePolicy};

use crate::models::{display_year, PracticeRecord};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use tracing::{error, warn};

/// All practice rows of one dataset year.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// File-stem year label, e.g. `2024_25`.
    pub year: String,
    pub source: PathBuf,
    /// Hash of the source bytes; changes whenever the file does.
    pub fingerprint: u64,
    pub records: Vec<PracticeRecord>,
    displays: HashSet<String>,
}

impl Dataset {
    pub fn new(
        year: impl Into<String>,
        source: impl Into<PathBuf>,
        fingerprint: u64,
        records: Vec<PracticeRecord>,
    ) -> Self {
        let displays = records.iter().map(|r| r.display.clone()).collect();
        Self {
            year: year.into(),
            source: source.into(),
            fingerprint,
            records,
            displays,
        }
    }

    pub fn display_year(&self) -> String {
        display_year(&self.year)
    }

    pub fn contains_practice(&self, display: &str) -> bool {
        self.displays.contains(display)
    }

    /// Member identifiers of `practices` that this year does not contain.
    pub fn missing_practices<'a>(&self, practices: &'a [String]) -> Vec<&'a str> {
        practices
            .iter()
            .filter(|p| !self.contains_practice(p))
            .map(String::as_str)
            .collect()
    }

    /// Distinct ICB names, sorted.
    pub fn icbs(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.icb.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Practice display identifiers in one ICB, in file order.
    pub fn practices_in_icb(&self, icb: &str) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.icb == icb)
            .map(|r| r.display.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A dataset year whose file could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedYear {
    pub year: String,
    pub reason: String,
}

/// Load every file in `files`. A file that fails to load is reported as a
/// failed year and the remaining years still load.
pub fn load_datasets(
    files: &[DatasetFile],
    policy: MissingValuePolicy,
) -> (Vec<Dataset>, Vec<FailedYear>) {
    let mut datasets = Vec::with_capacity(files.len());
    let mut failed = Vec::new();

    for file in files {
        match load_dataset(&file.path, policy) {
            Ok(dataset) => {
                if dataset.is_empty() {
                    warn!(
                        "{} holds no practice rows; every place will be unavailable for {}",
                        dataset.source.display(),
                        dataset.display_year()
                    );
                }
                datasets.push(dataset);
            }
            Err(e) => {
                error!("Failed to load dataset {}: {}", file.path.display(), e);
                failed.push(FailedYear {
                    year: file.year.clone(),
                    reason: format!("dataset could not be loaded: {}", e),
                });
            }
        }
    }

    (datasets, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeasureValues;

    fn dataset() -> Dataset {
        let values = MeasureValues::filled(1.0);
        Dataset::new(
            "2024_25",
            "data/2024_25.csv",
            42,
            vec![
                PracticeRecord::new("B1", "ONE", "NHS South ICB", values),
                PracticeRecord::new("A1", "TWO", "NHS North ICB", values),
                PracticeRecord::new("B2", "THREE", "NHS South ICB", values),
            ],
        )
    }

    #[test]
    fn test_lookup_helpers() {
        let dataset = dataset();
        assert_eq!(dataset.display_year(), "2024/25");
        assert!(dataset.contains_practice("B1: ONE"));
        assert!(!dataset.contains_practice("B1"));
        assert_eq!(dataset.icbs(), vec!["NHS North ICB", "NHS South ICB"]);
        assert_eq!(
            dataset.practices_in_icb("NHS South ICB"),
            vec!["B1: ONE", "B2: THREE"]
        );
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn test_missing_practices() {
        let dataset = dataset();
        let members = vec!["B1: ONE".to_string(), "Z9: CLOSED".to_string()];
        assert_eq!(dataset.missing_practices(&members), vec!["Z9: CLOSED"]);
    }

    #[test]
    fn test_bad_year_does_not_stop_other_years() {
        let dir = tempfile::tempdir().unwrap();
        let header = "Practice_Code,GP_Practice_Name,ICS22name,pop 2022/23,G&A WP,CS WP,MH WP,Mat WP,Prescr WP,Final WP,Final PMC WP,Primary Medical Care WP,Health Ineq WP";
        std::fs::write(
            dir.path().join("2024_25.csv"),
            format!("{}\nB1,ONE,NHS South ICB,100,150,1,1,1,1,1,1,1,1\n", header),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("2025_26.csv"),
            format!("{}\nB1,ONE,NHS South ICB,lots,150,1,1,1,1,1,1,1,1\n", header),
        )
        .unwrap();

        let files = DatasetScanner::new(dir.path().to_path_buf(), vec![])
            .scan()
            .unwrap();
        let (datasets, failed) = load_datasets(&files, MissingValuePolicy::default());

        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].year, "2024_25");
        assert_eq!(datasets[0].source, dir.path().join("2024_25.csv"));
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].year, "2025_26");
        assert!(failed[0].reason.contains("lots"));
    }
}
