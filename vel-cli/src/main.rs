//! VEL CLI Tool
//!
//! Command-line interface for inspecting and repackaging VEL enhancement
//! payloads: scan an elementary stream, extract its payloads into a
//! sidecar container, or summarize an existing sidecar.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use vel_core::{read_sidecar, scan, write_sidecar, PayloadStore};

#[derive(Parser)]
#[command(name = "vel")]
#[command(about = "VEL (Video Enhancement Layer) - enhancement payload tooling")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan an elementary stream for embedded enhancement payloads
    Scan {
        /// Input elementary-stream file path
        input: PathBuf,

        /// List every payload instead of the first few
        #[arg(long)]
        verbose: bool,
    },

    /// Extract embedded payloads into a sidecar container
    Extract {
        /// Input elementary-stream file path
        input: PathBuf,

        /// Output sidecar file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show information about a sidecar container
    Info {
        /// Input sidecar file path
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { input, verbose } => scan_stream(input, verbose)?,
        Commands::Extract { input, output } => extract_payloads(input, output)?,
        Commands::Info { input } => sidecar_info(input)?,
    }

    Ok(())
}

fn scan_stream(input: PathBuf, verbose: bool) -> Result<()> {
    println!("Scanning stream: {}", input.display());

    let bytes = std::fs::read(&input).context("Failed to read input stream")?;
    let store = scan(&bytes);

    print_store(&store, verbose);

    Ok(())
}

fn extract_payloads(input: PathBuf, output: PathBuf) -> Result<()> {
    println!("Scanning stream: {}", input.display());

    let bytes = std::fs::read(&input).context("Failed to read input stream")?;
    let store = scan(&bytes);

    if store.is_empty() {
        println!("No enhancement payloads found, nothing to write");
        return Ok(());
    }

    let file = File::create(&output).context("Failed to create output file")?;
    let mut writer = BufWriter::new(file);
    write_sidecar(&store, &mut writer).context("Failed to write sidecar")?;

    println!(
        "Successfully wrote {} payloads to {}",
        store.payload_count(),
        output.display()
    );

    Ok(())
}

fn sidecar_info(input: PathBuf) -> Result<()> {
    println!("Reading sidecar: {}", input.display());

    let bytes = std::fs::read(&input).context("Failed to read sidecar file")?;
    let store = read_sidecar(&bytes).context("Failed to parse sidecar")?;

    print_store(&store, true);

    Ok(())
}

fn print_store(store: &PayloadStore, all: bool) {
    println!("\n=== Enhancement Payloads ===");
    println!("Payloads: {}", store.payload_count());

    let total = store.payload_bytes();
    println!(
        "Total payload size: {} bytes ({:.2} KB)",
        total,
        total as f64 / 1024.0
    );

    let limit = if all { store.payload_count() } else { 10 };
    for (i, payload) in store.iter().take(limit).enumerate() {
        println!("  Frame {}: {} bytes", i + 1, payload.len());
    }
    if store.payload_count() > limit {
        println!("  ... and {} more payloads", store.payload_count() - limit);
    }
}
