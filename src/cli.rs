//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// placeindex - place-based need indices for ICB allocations
///
/// Aggregates practice-level weighted populations into user-defined places,
/// expresses each place's need relative to its ICB, and writes one rounded
/// table per dataset year.
///
/// Examples:
///   placeindex --data ./data --places places.json
///   placeindex --data ./data --year 2024_25,2025_26 --format json
///   placeindex --data ./data --dry-run
///   placeindex --init-config
///   placeindex --init-places --places places.json
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Directory holding one CSV file per dataset year
    ///
    /// File stems are the year labels, e.g. 2024_25.csv.
    /// Overrides [data] dir in .placeindex.toml.
    #[arg(short, long, value_name = "DIR", env = "PLACEINDEX_DATA")]
    pub data: Option<PathBuf>,

    /// Place registry file (session JSON)
    ///
    /// If not specified, the default place is used.
    #[arg(short, long, value_name = "FILE")]
    pub places: Option<PathBuf>,

    /// Output directory for tables and summary
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Dataset years to include (comma-separated)
    ///
    /// Example: --year 2024_25,2025_26
    #[arg(short, long, value_name = "YEARS", value_delimiter = ',')]
    pub year: Option<Vec<String>>,

    /// Output format (csv, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .placeindex.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Evaluate years and places on a single thread
    #[arg(long)]
    pub sequential: bool,

    /// Exit with code 2 if any place is unavailable in any year
    #[arg(long)]
    pub strict: bool,

    /// Do not write summary.md
    #[arg(long)]
    pub no_summary: bool,

    /// Dry run: list datasets and places without computing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .placeindex.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Write the default place registry to --places (or places.json)
    #[arg(long)]
    pub init_places: bool,

    /// Add or redefine a place in the registry, then exit
    ///
    /// Example: --add-place "North" --icb "NHS West Yorkshire ICB"
    ///          --practice "B85005: SHEPLEY PRIMARY CARE LIMITED"
    #[arg(
        long,
        value_name = "NAME",
        requires_all = ["icb", "practice"],
        conflicts_with = "remove_place"
    )]
    pub add_place: Option<String>,

    /// ICB of the place given to --add-place
    #[arg(long, value_name = "ICB", requires = "add_place")]
    pub icb: Option<String>,

    /// Member practice of the place given to --add-place (repeatable)
    #[arg(long, value_name = "PRACTICE", requires = "add_place")]
    pub practice: Vec<String>,

    /// Remove a place from the registry, then exit
    #[arg(long, value_name = "NAME")]
    pub remove_place: Option<String>,
}

/// Output format for the year tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One CSV file per year (default)
    #[default]
    Csv,
    /// A single JSON file with every year
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Selected year labels; empty selects all.
    pub fn years(&self) -> Vec<String> {
        self.year
            .as_ref()
            .map(|years| {
                years
                    .iter()
                    .map(|y| y.trim().replace('/', "_"))
                    .filter(|y| !y.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True when the run only edits the place registry.
    pub fn edits_places(&self) -> bool {
        self.add_place.is_some() || self.remove_place.is_some()
    }

    /// Where --init-places and registry edits write.
    pub fn places_path(&self) -> PathBuf {
        self.places
            .clone()
            .unwrap_or_else(|| PathBuf::from("places.json"))
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.init_places {
            if self.places_path().exists() {
                return Err(format!(
                    "Place registry already exists: {}",
                    self.places_path().display()
                ));
            }
            return Ok(());
        }

        if self.edits_places() {
            return Ok(());
        }

        if let Some(ref years) = self.year {
            if years.iter().all(|y| y.trim().is_empty()) {
                return Err("--year needs at least one year label".to_string());
            }
        }

        // Validate place registry path if provided
        if let Some(ref places) = self.places {
            if !places.is_file() {
                return Err(format!(
                    "Place registry file does not exist: {}",
                    places.display()
                ));
            }
        }

        if let Some(ref data) = self.data {
            if !data.is_dir() {
                return Err(format!(
                    "Data directory does not exist: {}",
                    data.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `[general] verbose`; `--quiet` wins over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            data: None,
            places: None,
            output: None,
            year: None,
            format: None,
            config: None,
            verbose: false,
            quiet: false,
            sequential: false,
            strict: false,
            no_summary: false,
            dry_run: false,
            init_config: false,
            init_places: false,
            add_place: None,
            icb: None,
            practice: vec![],
            remove_place: None,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "placeindex",
            "--year",
            "2024_25,2025/26",
            "--format",
            "json",
            "--sequential",
            "--strict",
        ])
        .unwrap();

        assert_eq!(args.years(), vec!["2024_25", "2025_26"]);
        assert_eq!(args.format, Some(OutputFormat::Json));
        assert!(args.sequential);
        assert!(args.strict);
    }

    #[test]
    fn test_parse_add_place() {
        let args = Args::try_parse_from([
            "placeindex",
            "--add-place",
            "North",
            "--icb",
            "NHS West Yorkshire ICB",
            "--practice",
            "B85005: SHEPLEY PRIMARY CARE LIMITED",
            "--practice",
            "B85022: HONLEY SURGERY",
        ])
        .unwrap();

        assert!(args.edits_places());
        assert_eq!(args.practice.len(), 2);

        // A place needs an ICB and practices.
        assert!(Args::try_parse_from(["placeindex", "--add-place", "North"]).is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_paths() {
        let mut args = make_args();
        args.places = Some(PathBuf::from("/definitely/not/places.json"));
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.data = Some(PathBuf::from("/definitely/not/data"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_empty_year() {
        let mut args = make_args();
        args.year = Some(vec![" ".to_string()]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_places_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("places.json");
        std::fs::write(&path, "{}").unwrap();

        let mut args = make_args();
        args.init_places = true;
        args.places = Some(path);
        assert!(args.validate().is_err());

        args.places = Some(dir.path().join("new.json"));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
    }

    #[test]
    fn test_log_level_from_config_verbose() {
        let mut args = make_args();
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
