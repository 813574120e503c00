//! placeindex - place-based need indices for ICB allocations
//!
//! A CLI tool that aggregates practice-level weighted populations into
//! user-defined places, computes each place's need indices relative to its
//! ICB for every dataset year, and writes spreadsheet-rounded tables.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (missing data, bad config, unreadable dataset, etc.)
//!   2 - A place was unavailable in some year and --strict was set

mod cli;
mod config;
mod dataset;
mod error;
mod models;
mod pipeline;
mod places;
mod report;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::Args;
use config::{Config, CONFIG_FILE};
use dataset::{load_datasets, Dataset, DatasetFile, DatasetScanner, FailedYear};
use indicatif::{ProgressBar, ProgressStyle};
use models::{display_year, Availability, Place, RunMetadata, RunReport};
use pipeline::Orchestrator;
use places::PlaceRegistry;
use report::OutputWriter;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config and --init-places early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }
    if args.init_places {
        return handle_init_places(&args);
    }

    // Load configuration first; [general] verbose selects the log level
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&args, &config);

    info!("placeindex v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    // Handle --add-place / --remove-place: edit the registry and exit
    if args.edits_places() {
        if let Err(e) = handle_edit_places(&args) {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    match run(args, config) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .placeindex.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize data paths, aggregations, indices and rounding.");
    Ok(())
}

/// Handle --init-places: write the default place registry.
fn handle_init_places(args: &Args) -> Result<()> {
    let path = args.places_path();

    PlaceRegistry::with_default()
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✅ Created {} with the default place.", path.display());
    println!("   Edit it to define your places before running.");
    Ok(())
}

/// Handle --add-place and --remove-place against the registry file.
fn handle_edit_places(args: &Args) -> Result<()> {
    let path = args.places_path();

    let mut registry = if path.exists() {
        PlaceRegistry::load(&path)
            .with_context(|| format!("Failed to load places from {}", path.display()))?
    } else {
        PlaceRegistry::with_default()
    };

    if let Some(ref name) = args.add_place {
        let icb = args.icb.clone().unwrap_or_default();
        let action = if registry.get(name).is_some() {
            "Updated"
        } else {
            "Saved"
        };
        registry.add(Place::new(name.clone(), icb, args.practice.iter().cloned()))?;
        println!("✅ {} place '{}' ({} practices).", action, name, args.practice.len());
    }

    if let Some(ref name) = args.remove_place {
        let removed = registry.remove(name)?;
        println!("🗑️  Removed place '{}'.", removed.name);
    }

    registry
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("   Registry now holds: {}", registry.names().join(", "));
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete workflow. Returns exit code (0 or 2).
fn run(args: Args, mut config: Config) -> Result<i32> {
    let start_time = Instant::now();

    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    // Step 1: Find the datasets
    println!("📂 Scanning datasets in {}", config.data.dir.display());
    let scanner = DatasetScanner::new(config.data.dir.clone(), args.years());
    let files = scanner.scan()?;

    for year in scanner.missing_years(&files) {
        warn!("No dataset found for {}", year);
    }
    if files.is_empty() {
        bail!("No dataset files found in {}", config.data.dir.display());
    }

    // Step 2: Load the places
    let registry = load_registry(&args)?;
    if registry.is_empty() {
        bail!("The place registry holds no places");
    }

    // Step 3: Load every year; a year that fails is reported, not fatal
    println!("📊 Loading {} datasets...", files.len());
    let (datasets, failed) = load_datasets(&files, config.data.missing_value_policy);

    for year in &failed {
        println!("   ⚠️  {} skipped: {}", display_year(&year.year), year.reason);
    }
    if datasets.is_empty() {
        bail!("None of the {} dataset files could be loaded", files.len());
    }

    // Handle --dry-run: check places against the data and exit
    if args.dry_run {
        return handle_dry_run(&files, &datasets, &failed, &registry);
    }

    // Step 4: Compute indices
    println!(
        "\n🧮 Computing indices for {} places across {} years...",
        registry.len(),
        datasets.len()
    );

    let progress = if args.quiet {
        None
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} places")?
                .progress_chars("#>-"),
        );
        Some(pb)
    };

    let mut orchestrator = Orchestrator::new(config.pipeline_config());
    if let Some(ref pb) = progress {
        orchestrator = orchestrator.with_progress(pb.clone());
    }

    let tables = orchestrator.run(&datasets, &failed, &registry);

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let stats = orchestrator.cache_stats();
    debug!(
        "Aggregation cache: {} hits, {} misses, {} entries",
        stats.hits, stats.misses, stats.entries
    );

    // Step 5: Write outputs
    println!("\n📝 Writing outputs...");

    let duration = start_time.elapsed().as_secs_f64();
    let report = RunReport {
        metadata: RunMetadata {
            data_dir: config.data.dir.display().to_string(),
            generated_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            years: tables.iter().map(|t| t.year.clone()).collect(),
            places: registry.names().into_iter().map(String::from).collect(),
            duration_seconds: duration,
        },
        tables,
    };

    let writer = OutputWriter::new(config.output.dir.clone(), config.rounding());
    let written = writer.write(
        &report,
        &registry,
        config.output.format,
        config.output.write_summary,
    )?;

    // Print notices and summary
    print_availability(&report);

    let unavailable = report.unavailable().count();
    println!("\n📊 Run Summary:");
    println!("   Years: {}", report.tables.len());
    println!("   Failed years: {}", failed.len());
    println!("   Places: {}", registry.len());
    println!("   Unavailable (year, place): {}", unavailable);
    println!("   Duration: {:.1}s", duration);
    println!(
        "\n✅ Done! {} files written to: {}",
        written.len(),
        writer.dir().display()
    );

    if args.strict && unavailable > 0 {
        eprintln!(
            "\n⛔ {} place evaluations were unavailable. Failing (exit code 2).",
            unavailable
        );
        return Ok(2);
    }

    Ok(0)
}

/// Print missing-practice and unavailable-place notices per year.
fn print_availability(report: &RunReport) {
    for table in &report.tables {
        for place in &table.places {
            match &place.availability {
                Availability::Complete => {}
                Availability::Partial { missing } => {
                    for practice in missing {
                        println!(
                            "   ⚠️  {} ({}): {} is not available in this time period",
                            place.place,
                            table.display_year(),
                            practice
                        );
                    }
                }
                Availability::Unavailable { reason } => {
                    println!(
                        "   ⚠️  {} is not available in {}: {}",
                        place.place,
                        table.display_year(),
                        reason
                    );
                }
            }
        }
    }
}

/// Handle --dry-run: print what would be computed, exit.
fn handle_dry_run(
    files: &[DatasetFile],
    datasets: &[Dataset],
    failed: &[FailedYear],
    registry: &PlaceRegistry,
) -> Result<i32> {
    println!("\n🔍 Dry run: checking places against {} datasets.\n", files.len());

    for year in failed {
        println!("   ❌ {}: {}", display_year(&year.year), year.reason);
    }

    for dataset in datasets {
        let size = files
            .iter()
            .find(|f| f.path == dataset.source)
            .map_or(0, |f| f.size);
        println!(
            "   📄 {} ({} bytes): {} practices in {} ICBs",
            dataset.display_year(),
            size,
            dataset.len(),
            dataset.icbs().len()
        );

        for place in registry.places() {
            let in_icb = dataset.practices_in_icb(&place.icb).len();
            let missing = dataset.missing_practices(&place.practices);
            println!(
                "     📍 {} ({}): {}/{} practices found, ICB has {}",
                place.name,
                place.icb,
                place.practices.len() - missing.len(),
                place.practices.len(),
                in_icb
            );
            for practice in missing {
                println!("        ⚠️  {} is not available in this time period", practice);
            }
        }
    }

    println!("\n✅ Dry run complete. No outputs were written.");
    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is installed, so problems go to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}. Using defaults.", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}

/// Load the place registry, or the default place if none was given.
fn load_registry(args: &Args) -> Result<PlaceRegistry> {
    match args.places {
        Some(ref path) => PlaceRegistry::load(path)
            .with_context(|| format!("Failed to load places from {}", path.display())),
        None => {
            info!("No place registry given, using the default place");
            Ok(PlaceRegistry::with_default())
        }
    }
}
