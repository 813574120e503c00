//! CSV rendering of year tables.

use crate::error::Result;
use crate::models::{IndexRow, YearTable};
use crate::pipeline::rounding::{decimal_places, round_value, RoundingPolicy};
use csv::WriterBuilder;
use serde_json::Value;
use std::io::Write;
use std::path::Path;

/// Lines written above every table.
pub const TABLE_NOTES: [&str; 3] = [
    "PLEASE READ: Below you can find the results for the places you created, and for the ICB they belong to, for the year you selected.",
    "Note that the need indices for the places are relative to the ICB (where the ICBs need index = 1.00), while the need index for the ICB is relative to national need (where the national need index = 1.00).",
    "This means that the need indices of the individual places cannot be compared to the need index of the ICB. For more information, see the FAQ.",
];

/// Column headers, in output order.
pub fn table_header(table: &YearTable) -> Vec<String> {
    ["Place / ICB", "Type", "ICB name"]
        .into_iter()
        .map(String::from)
        .chain(table.measures.iter().map(|m| m.column().to_string()))
        .chain(table.index_names.iter().cloned())
        .collect()
}

/// Cells of one row with every numeric column rounded by `policy`.
pub fn table_cells(table: &YearTable, row: &IndexRow, policy: &RoundingPolicy) -> Vec<Value> {
    let labels = [
        Value::from(row.label.as_str()),
        Value::from(row.kind.to_string()),
        Value::from(row.icb.as_str()),
    ];

    let measures = table
        .measures
        .iter()
        .map(|m| round_value(&Value::from(row.values[*m]), policy.measure));
    let indices = row
        .indices
        .iter()
        .map(|i| round_value(&Value::from(*i), policy.index));

    labels.into_iter().chain(measures).chain(indices).collect()
}

fn format_cell(value: &Value, places: usize) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => match n.as_f64() {
            Some(f) => format!("{:.*}", places, f),
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Write the notes, a blank line and the table to `writer`.
pub fn write_year_table<W: Write>(
    table: &YearTable,
    policy: &RoundingPolicy,
    mut writer: W,
) -> Result<()> {
    {
        let mut notes = WriterBuilder::new().from_writer(&mut writer);
        for note in TABLE_NOTES {
            notes.write_record([note])?;
        }
        notes.flush()?;
    }
    writer.write_all(b"\n")?;

    let mut wtr = WriterBuilder::new().from_writer(writer);
    let header = table_header(table);
    wtr.write_record(&header)?;

    let measure_places = decimal_places(policy.measure);
    let index_places = decimal_places(policy.index);
    let first_index = 3 + table.measures.len();

    for row in &table.rows {
        let record: Vec<String> = table_cells(table, row, policy)
            .iter()
            .enumerate()
            .map(|(column, cell)| {
                let places = if column >= first_index {
                    index_places
                } else {
                    measure_places
                };
                format_cell(cell, places)
            })
            .collect();
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write one year table to `path`.
pub fn write_year_csv(table: &YearTable, policy: &RoundingPolicy, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_year_table(table, policy, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Measure, MeasureValues, RowKind};

    fn table() -> YearTable {
        let mut icb = MeasureValues::filled(2.0);
        icb[Measure::GpPop] = 300.0;
        icb[Measure::GeneralAcute] = 400.0;
        let mut place = MeasureValues::filled(1.0);
        place[Measure::GpPop] = 100.0;
        place[Measure::GeneralAcute] = 150.0;

        YearTable {
            year: "2024_25".to_string(),
            measures: Measure::ALL.to_vec(),
            index_names: vec!["G&A Index".to_string(), "Community Index".to_string()],
            rows: vec![
                IndexRow {
                    label: "NHS Test, ICB".to_string(),
                    kind: RowKind::Icb,
                    icb: "NHS Test, ICB".to_string(),
                    values: icb,
                    indices: vec![1.333, 0.007],
                },
                IndexRow {
                    label: "P".to_string(),
                    kind: RowKind::Place,
                    icb: "NHS Test, ICB".to_string(),
                    values: place,
                    indices: vec![1.125, 1.0],
                },
            ],
            places: vec![],
        }
    }

    #[test]
    fn test_header_order() {
        let header = table_header(&table());
        assert_eq!(header[0], "Place / ICB");
        assert_eq!(header[3], "GP pop");
        assert_eq!(header[12], "Weighted Health Inequalities pop");
        assert_eq!(header[13], "G&A Index");
        assert_eq!(header.len(), 15);
    }

    #[test]
    fn test_cells_keep_labels_and_round_numbers() {
        let table = table();
        let policy = RoundingPolicy {
            index: 0.01,
            ..RoundingPolicy::default()
        };
        let cells = table_cells(&table, &table.rows[1], &policy);

        assert_eq!(cells[0], Value::from("P"));
        assert_eq!(cells[1], Value::from("Place"));
        assert_eq!(cells[3], Value::from(100.0));
        assert_eq!(cells[13], Value::from(1.13));
    }

    #[test]
    fn test_write_year_table() {
        let mut out = Vec::new();
        write_year_table(&table(), &RoundingPolicy::default(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("\"PLEASE READ"));
        assert!(lines[1].starts_with("\"Note that"));
        assert_eq!(lines[3], "");
        assert!(lines[4].starts_with("Place / ICB,Type,ICB name,GP pop"));
        assert!(lines[5].starts_with("\"NHS Test, ICB\",ICB,\"NHS Test, ICB\",300,400,2,"));
        assert!(lines[5].ends_with(",1.333,0.007"));
        assert!(lines[6].starts_with("P,Place,"));
        assert!(lines[6].ends_with(",1.125,1.000"));
    }

    #[test]
    fn test_write_year_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allocations_2024_25.csv");
        write_year_csv(&table(), &RoundingPolicy::default(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("G&A Index"));
    }
}
