//! VMA Trace
//!
//! Reads the memory log of an OS simulator and prints the virtual address
//! space of each process after every allocation and deallocation.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use vmatrace::memory::DEFAULT_PAGE_SIZE;
use vmatrace::report::{ReportFilter, write_report};

/// Rebuild per-process regions and free ranges from a memory trace
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the log file
    logfile: PathBuf,

    /// Page size used to round the headroom after each allocation
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u64,

    /// Initial address space size. Defaults to the largest allocation end of
    /// the trace rounded up to the next page
    #[arg(long)]
    extent: Option<u64>,

    /// Only report this process
    #[arg(long)]
    pid: Option<u32>,

    /// Only report the final state of each process
    #[arg(long)]
    final_only: bool,

    /// Write the report to this file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let log_level = std::env::var("VMATRACE_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    info!("Replaying trace: {}", args.logfile.display());
    let replay = vmatrace::replay_file(&args.logfile, args.page_size, args.extent)?;

    let filter = ReportFilter {
        pid: args.pid,
        final_only: args.final_only,
    };
    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };
    let written = write_report(&mut out, &replay.snapshots, filter)?;
    info!("Reported {} snapshots", written);
    Ok(())
}
