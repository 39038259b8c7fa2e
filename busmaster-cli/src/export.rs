//! Dataset export (CSV and JSON lines)

use anyhow::{Context, Result};
use busmaster_decoder::Dataset;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Delimited text, one line per row
    Csv,
    /// One JSON object per row
    Json,
}

impl OutputFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "csv" | "txt" => Some(OutputFormat::Csv),
            "json" | "jsonl" | "ndjson" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// How decoded values are written
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: OutputFormat,
    pub delimiter: char,
    /// Fixed number of decimals; shortest exact form when `None`
    pub precision: Option<usize>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Csv,
            delimiter: ';',
            precision: None,
        }
    }
}

/// Write the dataset to `path`, replacing any existing file
pub fn export(dataset: &Dataset, path: &Path, options: &ExportOptions) -> Result<()> {
    log::info!("Writing {} rows to {:?}", dataset.rows.len(), path);

    let file = File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?;
    let mut writer = BufWriter::new(file);

    match options.format {
        OutputFormat::Csv => write_csv(dataset, &mut writer, options)?,
        OutputFormat::Json => write_json_lines(dataset, &mut writer)?,
    }

    writer
        .flush()
        .with_context(|| format!("Failed to write output file: {:?}", path))?;
    Ok(())
}

/// Header `time` plus one column per signal; absent values are empty cells
pub fn write_csv<W: Write>(dataset: &Dataset, writer: &mut W, options: &ExportOptions) -> Result<()> {
    let delimiter = options.delimiter.to_string();

    let header: Vec<String> = std::iter::once("time")
        .chain(dataset.columns.iter().map(String::as_str))
        .map(|field| quote_field(field, options.delimiter))
        .collect();
    writeln!(writer, "{}", header.join(&delimiter))?;

    for row in &dataset.rows {
        let mut fields = Vec::with_capacity(dataset.columns.len() + 1);
        fields.push(quote_field(row.timestamp.as_str(), options.delimiter));
        for cell in row.cells(&dataset.columns) {
            fields.push(match cell {
                Some(value) => format_value(value, options.precision),
                None => String::new(),
            });
        }
        writeln!(writer, "{}", fields.join(&delimiter))?;
    }

    Ok(())
}

/// One object per row: `{"time": ..., "<signal>": value or null, ...}`
pub fn write_json_lines<W: Write>(dataset: &Dataset, writer: &mut W) -> Result<()> {
    for row in &dataset.rows {
        let mut object = serde_json::Map::with_capacity(dataset.columns.len() + 1);
        object.insert(
            "time".to_string(),
            serde_json::Value::String(row.timestamp.as_str().to_string()),
        );
        for (column, cell) in dataset.columns.iter().zip(row.cells(&dataset.columns)) {
            let value = cell
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null);
            object.insert(column.clone(), value);
        }

        serde_json::to_writer(&mut *writer, &object)?;
        writeln!(writer)?;
    }

    Ok(())
}

fn format_value(value: f64, precision: Option<usize>) -> String {
    match precision {
        Some(decimals) => format!("{:.*}", decimals, value),
        None => value.to_string(),
    }
}

fn quote_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains(['"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
