//! Configuration file handling.
//!
//! This module handles loading, validating and merging configuration from
//! `.placeindex.toml` files.

use crate::cli::{Args, OutputFormat};
use crate::dataset::MissingValuePolicy;
use crate::models::Measure;
use crate::pipeline::{
    default_aggregations, default_index_pairs, AggregationSpec, IndexPair, PipelineConfig,
    RoundingPolicy,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".placeindex.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Dataset settings.
    #[serde(default)]
    pub data: DataConfig,

    /// Aggregation, index and rounding settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Evaluate years and places in parallel.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            parallel: true,
        }
    }
}

/// Dataset settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding one CSV per dataset year.
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,

    /// Handling of null, empty and zero measures.
    #[serde(default)]
    pub missing_value_policy: MissingValuePolicy,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            missing_value_policy: MissingValuePolicy::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Denominator column of every rate.
    #[serde(default = "default_population")]
    pub population: Measure,

    /// Rounding step for measure columns.
    #[serde(default = "default_measure_precision")]
    pub measure_precision: f64,

    /// Rounding step for stored indices.
    #[serde(default = "default_index_precision")]
    pub index_precision: f64,

    /// Rounding step for displayed indices.
    #[serde(default = "default_display_precision")]
    pub display_precision: f64,

    /// Column to aggregation function mapping.
    #[serde(default = "default_aggregations")]
    pub aggregations: Vec<AggregationSpec>,

    /// Numerator column and index name pairs, in output order.
    #[serde(default = "default_index_pairs")]
    pub indices: Vec<IndexPair>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            population: default_population(),
            measure_precision: default_measure_precision(),
            index_precision: default_index_precision(),
            display_precision: default_display_precision(),
            aggregations: default_aggregations(),
            indices: default_index_pairs(),
        }
    }
}

fn default_population() -> Measure {
    Measure::GpPop
}

fn default_measure_precision() -> f64 {
    RoundingPolicy::default().measure
}

fn default_index_precision() -> f64 {
    RoundingPolicy::default().index
}

fn default_display_precision() -> f64 {
    RoundingPolicy::default().display
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory the tables, summary and registry snapshot are written to.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default)]
    pub format: OutputFormat,

    /// Write summary.md next to the tables.
    #[serde(default = "default_true")]
    pub write_summary: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: OutputFormat::default(),
            write_summary: true,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref data) = args.data {
            self.data.dir = data.clone();
        }
        if let Some(ref output) = args.output {
            self.output.dir = output.clone();
        }
        if let Some(format) = args.format {
            self.output.format = format;
        }

        // Flags always override
        if args.sequential {
            self.general.parallel = false;
        }
        if args.no_summary {
            self.output.write_summary = false;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check the pipeline settings can produce a table.
    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.pipeline;

        for (name, step) in [
            ("measure_precision", pipeline.measure_precision),
            ("index_precision", pipeline.index_precision),
            ("display_precision", pipeline.display_precision),
        ] {
            if !step.is_finite() || step <= 0.0 {
                bail!("pipeline.{} must be a positive number, got {}", name, step);
            }
        }

        let mut aggregated = HashSet::new();
        for spec in &pipeline.aggregations {
            if !aggregated.insert(spec.column) {
                bail!("Column '{}' is aggregated more than once", spec.column);
            }
        }

        if !aggregated.contains(&pipeline.population) {
            bail!(
                "Population column '{}' is not in pipeline.aggregations",
                pipeline.population
            );
        }

        if pipeline.indices.is_empty() {
            bail!("pipeline.indices must list at least one index");
        }

        let mut names = HashSet::new();
        for pair in &pipeline.indices {
            if pair.name.trim().is_empty() {
                bail!("Index for '{}' has an empty name", pair.numerator);
            }
            if !names.insert(pair.name.as_str()) {
                bail!("Index name '{}' is used more than once", pair.name);
            }
            if !aggregated.contains(&pair.numerator) {
                bail!(
                    "Numerator '{}' of {} is not in pipeline.aggregations",
                    pair.numerator,
                    pair.name
                );
            }
        }

        Ok(())
    }

    /// Build the pipeline configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            population: self.pipeline.population,
            aggregations: self.pipeline.aggregations.clone(),
            indices: self.pipeline.indices.clone(),
            rounding: self.rounding(),
            parallel: self.general.parallel,
        }
    }

    pub fn rounding(&self) -> RoundingPolicy {
        RoundingPolicy {
            measure: self.pipeline.measure_precision,
            index: self.pipeline.index_precision,
            display: self.pipeline.display_precision,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::aggregate::AggregationFn;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.general.parallel);
        assert_eq!(config.data.dir, PathBuf::from("data"));
        assert_eq!(config.pipeline.population, Measure::GpPop);
        assert_eq!(config.pipeline.aggregations.len(), Measure::COUNT);
        assert_eq!(config.pipeline.indices.len(), 9);
        assert_eq!(config.output.format, OutputFormat::Csv);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true
parallel = false

[data]
dir = "datasets"
missing_value_policy = "reject"

[pipeline]
index_precision = 0.0001

[[pipeline.aggregations]]
column = "GP pop"

[[pipeline.aggregations]]
column = "Weighted G&A pop"
function = "mean"

[[pipeline.indices]]
numerator = "Weighted G&A pop"
name = "G&A Index"

[output]
format = "json"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert!(!config.general.parallel);
        assert_eq!(config.data.dir, PathBuf::from("datasets"));
        assert_eq!(config.data.missing_value_policy, MissingValuePolicy::Reject);
        assert_eq!(config.pipeline.index_precision, 0.0001);
        assert_eq!(config.pipeline.display_precision, 0.01);
        assert_eq!(config.pipeline.aggregations.len(), 2);
        assert_eq!(config.pipeline.aggregations[1].function, AggregationFn::Mean);
        assert_eq!(config.pipeline.indices.len(), 1);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.write_summary);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_pipelines() {
        let mut config = Config::default();
        config.pipeline.index_precision = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.aggregations = vec![AggregationSpec::sum(Measure::GeneralAcute)];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config
            .pipeline
            .aggregations
            .push(AggregationSpec::sum(Measure::GpPop));
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.indices[1].name = "G&A Index".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.indices.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_with_args() {
        let args = Args::try_parse_from([
            "placeindex",
            "--output",
            "out",
            "--format",
            "json",
            "--sequential",
            "--no-summary",
        ])
        .unwrap();

        let mut config = Config::default();
        config.merge_with_args(&args);

        assert_eq!(config.output.dir, PathBuf::from("out"));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(!config.general.parallel);
        assert!(!config.output.write_summary);

        let pipeline = config.pipeline_config();
        assert!(!pipeline.parallel);
        assert_eq!(pipeline.rounding, RoundingPolicy::default());
    }

    #[test]
    fn test_config_verbose_selects_debug_logging() {
        let config: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        let args = Args::try_parse_from(["placeindex"]).unwrap();
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::DEBUG);

        let quiet = Args::try_parse_from(["placeindex", "--quiet"]).unwrap();
        assert_eq!(quiet.log_level(config.general.verbose), tracing::Level::ERROR);

        let config = Config::default();
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::INFO);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[data]"));
        assert!(toml_str.contains("[[pipeline.aggregations]]"));
        assert!(toml_str.contains("[output]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.pipeline.indices, default_index_pairs());
    }
}
