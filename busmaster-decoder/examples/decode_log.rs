//! Standalone BusMaster log decoder tool
//!
//! This tool decodes a BusMaster log file using DBC signal definitions
//! and prints the decoded rows and a summary.
//!
//! Usage:
//!   decode_log <trace.log> [--dbc <file.dbc>]... [--limit <count>] [--verbose]
//!
//! Example:
//!   decode_log trace.log --dbc powertrain.dbc --limit 100

use busmaster_decoder::{Dataset, Decoder, DecoderConfig};
use std::env;
use std::path::PathBuf;

fn print_summary(dataset: &Dataset) {
    let diagnostics = &dataset.diagnostics;

    println!("\n=== DECODING SUMMARY ===");
    println!("Total frames processed: {}", diagnostics.frames);
    println!("Decoded frames: {}", diagnostics.decoded_frames);
    println!("Unknown frames: {}", diagnostics.unknown_frames());
    println!("Total signals decoded: {}", diagnostics.signals_decoded);
    println!("Rows: {}", dataset.rows.len());
    println!("Warnings: {}", diagnostics.warnings.len());

    if !diagnostics.unknown_ids.is_empty() {
        println!("\nTop 10 Unknown CAN IDs:");
        let mut sorted: Vec<_> = diagnostics.unknown_ids.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(a.1));
        for (can_id, count) in sorted.iter().take(10) {
            println!("  0x{:X}: {} times", can_id, count);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <trace.log> [--dbc <file.dbc>]... [--limit <count>] [--verbose]", args[0]);
        eprintln!("\nExample:");
        eprintln!("  {} trace.log --dbc powertrain.dbc --limit 100", args[0]);
        std::process::exit(1);
    }

    let log_file = PathBuf::from(&args[1]);
    let mut dbc_files = Vec::new();
    let mut limit: Option<usize> = None;
    let mut verbose = false;

    // Parse arguments
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--dbc" => {
                i += 1;
                if i < args.len() {
                    dbc_files.push(PathBuf::from(&args[i]));
                }
            }
            "--limit" => {
                i += 1;
                if i < args.len() {
                    limit = Some(args[i].parse()?);
                }
            }
            "--verbose" | "-v" => {
                verbose = true;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
            }
        }
        i += 1;
    }

    println!("=== BusMaster Log Decoder ===");
    println!("Log file: {:?}", log_file);
    println!("DBC files: {}", dbc_files.len());
    if let Some(n) = limit {
        println!("Limit: {} rows", n);
    }
    println!();

    let mut decoder = Decoder::new();
    for dbc_file in &dbc_files {
        println!("Loading DBC: {:?}", dbc_file);
        decoder.add_dbc(dbc_file)?;
    }

    let db_stats = decoder.database_stats();
    println!("\n=== SIGNAL DATABASE ===");
    println!("Messages: {}", db_stats.num_messages);
    println!("Signals: {}", db_stats.num_signals);
    println!();

    println!("=== DECODING LOG FILE ===\n");
    let dataset = decoder.decode_file(&log_file, &DecoderConfig::new())?;

    for (index, row) in dataset.rows.iter().enumerate() {
        if let Some(max) = limit {
            if index >= max {
                println!("\n... (limit of {} rows reached)", max);
                break;
            }
        }

        if row.is_empty() && !verbose {
            continue;
        }

        let values: Vec<String> = row
            .values
            .iter()
            .map(|(name, value)| format!("{}={:.3}", name, value))
            .collect();
        println!("[{}] {}", row.timestamp, values.join(" "));
    }

    if verbose {
        for diagnostic in &dataset.diagnostics.warnings {
            println!(
                "  warning: frame {} ({}) 0x{:X}: {}",
                diagnostic.index + 1,
                diagnostic.timestamp,
                diagnostic.can_id,
                diagnostic.warning
            );
        }
    }

    print_summary(&dataset);

    Ok(())
}
