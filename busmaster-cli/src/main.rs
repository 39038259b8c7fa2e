//! BusMaster Log Converter CLI Application
//!
//! This is the command-line interface for the BusMaster log converter.
//! It uses the busmaster-decoder library and adds:
//! - TOML configuration files merged under command-line arguments
//! - CSV and JSON-lines export
//! - A decoding summary

use anyhow::{Context, Result};
use busmaster_decoder::{DatabaseStats, Dataset, Decoder};
use clap::Parser;
use std::path::PathBuf;

mod config;
mod export;

use config::{AppConfig, CliOverrides, RunSettings};
use export::OutputFormat;

/// BusMaster Log Converter - Decode CAN logs into physical signal values
#[derive(Parser, Debug)]
#[command(name = "busmaster-cli")]
#[command(about = "Convert BusMaster CAN logs to CSV/JSON using DBC files", long_about = None)]
#[command(version)]
struct Args {
    /// BusMaster log file to decode
    #[arg(value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,

    /// DBC file(s) with the message definitions; later files win on ID clashes
    #[arg(value_name = "DBC_FILE")]
    dbc_files: Vec<PathBuf>,

    /// Output file (default: output.csv)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// CSV field delimiter (default: ';')
    #[arg(short, long, value_name = "CHAR")]
    delimiter: Option<char>,

    /// Output format (default: from the output extension, else csv)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Write values with a fixed number of decimals
    #[arg(long, value_name = "DIGITS")]
    precision: Option<usize>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Decode on a single thread
    #[arg(long)]
    sequential: bool,

    /// Only decode frames from this channel (can be repeated)
    #[arg(long = "channel", value_name = "N")]
    channels: Vec<u8>,

    /// Only decode this CAN ID, decimal or 0x-hex (can be repeated)
    #[arg(long = "message-id", value_name = "ID", value_parser = parse_can_id)]
    message_ids: Vec<u32>,

    /// Drop rows of frames that produced no signal value
    #[arg(long)]
    skip_empty: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            log_file: self.log_file.clone(),
            dbc_files: self.dbc_files.clone(),
            output: self.output.clone(),
            format: self.format,
            delimiter: self.delimiter,
            precision: self.precision,
            sequential: self.sequential,
            skip_empty: self.skip_empty,
            channels: self.channels.clone(),
            message_ids: self.message_ids.clone(),
        }
    }
}

fn parse_can_id(text: &str) -> std::result::Result<u32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid CAN ID '{}': {}", text, e))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("BusMaster Log Converter v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", busmaster_decoder::VERSION);

    let file_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    let settings = RunSettings::resolve(args.overrides(), file_config)?;
    settings.check_inputs()?;

    let mut decoder = Decoder::new();
    for dbc_path in &settings.dbc_files {
        decoder
            .add_dbc(dbc_path)
            .with_context(|| format!("Failed to load DBC file: {:?}", dbc_path))?;
    }

    let stats = decoder.database_stats();
    log::info!(
        "Signal database: {} messages, {} signals",
        stats.num_messages,
        stats.num_signals
    );

    let dataset = decoder
        .decode_file(&settings.log_file, &settings.decoder)
        .with_context(|| format!("Failed to decode log file: {:?}", settings.log_file))?;

    export::export(&dataset, &settings.output, &settings.export)?;

    if !args.quiet {
        print_summary(&settings, &stats, &dataset);
    }

    Ok(())
}

fn print_summary(settings: &RunSettings, stats: &DatabaseStats, dataset: &Dataset) {
    let diagnostics = &dataset.diagnostics;

    println!("Signal database: {} messages, {} signals", stats.num_messages, stats.num_signals);
    println!("Frames read:     {}", diagnostics.frames);
    if diagnostics.filtered > 0 {
        println!("Filtered out:    {}", diagnostics.filtered);
    }
    println!("Frames decoded:  {}", diagnostics.decoded_frames);
    println!("Signal values:   {}", diagnostics.signals_decoded);
    println!(
        "Unknown frames:  {} ({} distinct IDs)",
        diagnostics.unknown_frames(),
        diagnostics.unknown_ids.len()
    );
    if !diagnostics.warnings.is_empty() {
        println!(
            "Warnings:        {} ({} DLC, {} DBC size, {} signal)",
            diagnostics.warnings.len(),
            diagnostics.length_mismatches,
            diagnostics.definition_length_mismatches,
            diagnostics.signal_failures
        );
    }
    if let Some(span) = capture_span(dataset) {
        println!("Capture span:    {:.3} s", span);
    }
    println!(
        "Wrote {} rows x {} columns to {:?}",
        dataset.rows.len(),
        dataset.columns.len() + 1,
        settings.output
    );
}

/// Seconds between the first and last row, when both timestamps parse
///
/// A log crossing midnight wraps the time of day, so a negative difference
/// is taken as one day later.
fn capture_span(dataset: &Dataset) -> Option<f64> {
    let first = dataset.rows.first()?.timestamp.time_of_day()?;
    let last = dataset.rows.last()?.timestamp.time_of_day()?;

    let mut span = last.signed_duration_since(first);
    if span < chrono::Duration::zero() {
        span = span + chrono::Duration::days(1);
    }
    Some(span.num_milliseconds() as f64 / 1000.0)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
