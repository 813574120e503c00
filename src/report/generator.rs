//! Markdown summary and JSON report generation.
//!
//! The summary shows, per year and place, the Core and Primary Medical Care
//! indices with their sub-indices at display precision, each with its
//! difference from the ICB.

use crate::models::{Availability, IndexRow, RowKind, RunMetadata, RunReport, YearTable};
use crate::pipeline::RoundingPolicy;
use anyhow::Result;
use std::io::Write;
use std::path::Path;

const CORE_INDEX: &str = "Overall Core Index";
const CORE_SUB_INDICES: [(&str, &str); 7] = [
    ("G&A Index", "Gen & Acute"),
    ("Community Index", "Community"),
    ("Mental Health Index", "Mental Health"),
    ("Maternity Index", "Maternity"),
    ("Prescribing Index", "Prescribing"),
    ("Primary Medical Care Need Index", "Primary Medical in Core"),
    ("Health Inequalities Index", "Health Inequalities"),
];

const PRIMARY_CARE_INDEX: &str = "Primary Medical Care Index";
const PRIMARY_CARE_SUB_INDICES: [(&str, &str); 2] = [
    ("Primary Medical Care Need Index", "Primary Medical Care Need"),
    ("Health Inequalities Index", "Health Inequalities"),
];

/// Generate the complete Markdown summary.
pub fn generate_markdown_summary(report: &RunReport, policy: &RoundingPolicy) -> String {
    let mut output = String::new();

    output.push_str("# Place-Based Need Indices\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));

    for table in &report.tables {
        output.push_str(&generate_year_section(table, policy));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &RunMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Data:** `{}`\n", metadata.data_dir));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    let years: Vec<String> = metadata
        .years
        .iter()
        .map(|y| crate::models::display_year(y))
        .collect();
    section.push_str(&format!("- **Years:** {}\n", years.join(", ")));
    section.push_str(&format!("- **Places:** {}\n", metadata.places.join(", ")));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the section for one year.
fn generate_year_section(table: &YearTable, policy: &RoundingPolicy) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", table.display_year()));

    let place_rows: Vec<&IndexRow> = table
        .rows
        .iter()
        .filter(|r| r.kind == RowKind::Place)
        .collect();

    if place_rows.is_empty() {
        section.push_str("No place could be evaluated for this year.\n\n");
    }

    for row in place_rows {
        section.push_str(&generate_place_section(table, row, policy));
    }

    section.push_str(&generate_availability_section(table));

    section
}

/// Generate the index blocks of one place.
fn generate_place_section(table: &YearTable, row: &IndexRow, policy: &RoundingPolicy) -> String {
    let mut section = String::new();

    section.push_str(&format!("### {} ({})\n\n", row.label, row.icb));

    let core = generate_index_block(table, row, policy, CORE_INDEX, "Core Index", &CORE_SUB_INDICES);
    let primary_care = generate_index_block(
        table,
        row,
        policy,
        PRIMARY_CARE_INDEX,
        "Primary Medical Care Index",
        &PRIMARY_CARE_SUB_INDICES,
    );

    match (core, primary_care) {
        (None, None) => section.push_str(&generate_all_indices_table(table, row, policy)),
        (core, primary_care) => {
            section.push_str(&core.unwrap_or_default());
            section.push_str(&primary_care.unwrap_or_default());
        }
    }

    section
}

/// Headline index with its sub-index table. `None` if the headline index is
/// not configured.
fn generate_index_block(
    table: &YearTable,
    row: &IndexRow,
    policy: &RoundingPolicy,
    headline: &str,
    title: &str,
    sub_indices: &[(&str, &str)],
) -> Option<String> {
    let value = table.index_value(row, headline)?;
    let mut block = String::new();

    block.push_str(&format!(
        "**{}: {}** ({} vs ICB)\n\n",
        title,
        policy.display(value),
        policy.display_delta(value)
    ));

    let rows: Vec<(&str, f64)> = sub_indices
        .iter()
        .filter_map(|(name, label)| table.index_value(row, name).map(|v| (*label, v)))
        .collect();

    if !rows.is_empty() {
        block.push_str("| Sub-index | Index | vs ICB |\n");
        block.push_str("|:---|:---:|:---:|\n");
        for (label, value) in rows {
            block.push_str(&format!(
                "| {} | {} | {} |\n",
                label,
                policy.display(value),
                policy.display_delta(value)
            ));
        }
        block.push('\n');
    }

    Some(block)
}

/// Fallback when neither headline index is configured.
fn generate_all_indices_table(table: &YearTable, row: &IndexRow, policy: &RoundingPolicy) -> String {
    let mut block = String::new();

    block.push_str("| Index | Value | vs ICB |\n");
    block.push_str("|:---|:---:|:---:|\n");
    for (name, value) in table.index_names.iter().zip(&row.indices) {
        block.push_str(&format!(
            "| {} | {} | {} |\n",
            name,
            policy.display(*value),
            policy.display_delta(*value)
        ));
    }
    block.push('\n');

    block
}

/// List unavailable places and missing practices of one year.
fn generate_availability_section(table: &YearTable) -> String {
    let notices: Vec<String> = table
        .places
        .iter()
        .flat_map(|report| match &report.availability {
            Availability::Complete => vec![],
            Availability::Partial { missing } => missing
                .iter()
                .map(|practice| {
                    format!(
                        "- {}: `{}` is not available in this time period",
                        report.place, practice
                    )
                })
                .collect(),
            Availability::Unavailable { reason } => {
                vec![format!("- **{}** is not available: {}", report.place, reason)]
            }
        })
        .collect();

    if notices.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("### Availability\n\n");
    for notice in notices {
        section.push_str(&notice);
        section.push('\n');
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(
        "*Place indices are relative to their ICB (ICB = 1.00). ICB rows are relative to national need and cannot be compared with place indices.*\n",
    );

    footer
}

/// Write the Markdown summary to a file.
pub fn write_markdown_summary(report: &RunReport, policy: &RoundingPolicy, path: &Path) -> Result<()> {
    let content = generate_markdown_summary(report, policy);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write a JSON report to a file.
pub fn write_json_report(report: &RunReport, path: &Path) -> Result<()> {
    let content = generate_json_report(report)?;

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
