use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use convert2pdf_rs::core::worker;
use convert2pdf_rs::prelude::*;

/// Exit status when no input file was found
const EXIT_NO_INPUTS: u8 = 2;

#[derive(Parser)]
#[command(name = "convert2pdf")]
#[command(about = "Convert documents, markup and PDFs to PDF in parallel", long_about = None)]
#[command(version)]
struct Cli {
    /// Files, directories or glob patterns to convert
    #[arg(required_unless_present = "worker")]
    paths: Vec<String>,

    /// Write every PDF into this directory instead of next to its source
    #[arg(short, long, env = "CONVERT2PDF_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Number of parallel worker processes (0 = number of CPUs)
    #[arg(short, long, default_value_t = 0, env = "CONVERT2PDF_JOBS")]
    jobs: usize,

    /// Per-file timeout in seconds
    #[arg(long, default_value_t = 60, env = "CONVERT2PDF_TIMEOUT")]
    timeout: u64,

    /// Rewrite PDF inputs through Ghostscript with this profile
    #[arg(long, value_enum, env = "CONVERT2PDF_OPTIMIZE")]
    optimize: Option<OptimizeProfile>,

    /// Send office documents to a running unoserver listener
    #[arg(long, env = "CONVERT2PDF_OFFICE_LISTENER")]
    office_listener: bool,

    /// Replace PDFs that already exist
    #[arg(long, env = "CONVERT2PDF_OVERWRITE")]
    overwrite: bool,

    /// Only print the planned conversions
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Run in batch mode (no progress bar)
    #[arg(long)]
    batch: bool,

    /// Also write a text report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    #[arg(long, hide = true)]
    worker: bool,
}

impl Cli {
    fn to_config(&self) -> RunConfig {
        RunConfig {
            input_paths: self.paths.clone(),
            output_dir: self.output_dir.clone(),
            workers: RunConfig::resolve_workers(self.jobs),
            timeout: Duration::from_secs(self.timeout),
            optimize: self.optimize,
            office_listener: self.office_listener,
            overwrite: self.overwrite,
            dry_run: self.dry_run,
            verbose: self.verbose,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.worker {
        worker::serve(io::stdin().lock(), io::stdout().lock())?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = cli.to_config();
    config.validate()?;
    run(&config, cli.batch, cli.report.as_deref())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(config: &RunConfig, batch: bool, report: Option<&Path>) -> Result<ExitCode> {
    let files = resolve_inputs(&config.input_paths)?;
    if files.is_empty() {
        eprintln!("No input files found.");
        return Ok(ExitCode::from(EXIT_NO_INPUTS));
    }

    let plan = plan(
        &files,
        &PlanOptions {
            policy: config.destination_policy(),
            overwrite: config.overwrite,
            dry_run: config.dry_run,
        },
    )?;

    if config.dry_run {
        for task in &plan.tasks {
            println!("DRY-RUN: {} -> {}", task.source.display(), task.destination.display());
        }
        for skipped in &plan.skipped {
            println!(
                "SKIP: {} -> {} ({})",
                skipped.source.display(),
                skipped.destination.display(),
                skipped.reason
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    // Set up graceful shutdown handler
    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown_requested.clone();
    ctrlc::set_handler(move || {
        eprintln!("\n⚠️  Interrupt received. Finishing conversions already running...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Error setting Ctrl-C handler")?;

    let tools = toolchain().clone();
    if config.verbose {
        for line in tools.describe() {
            println!("{line}");
        }
    }
    if config.office_listener && tools.listener_client.is_none() {
        warn!("--office-listener given but unoconvert is not installed; starting the office suite per file");
    }
    if config.optimize.is_some() && tools.optimizer.is_none() {
        warn!("--optimize given but Ghostscript is not installed; PDFs will be copied unchanged");
    }

    println!("PDF Converter (Rust Edition)");
    println!(
        "Converting {} file(s) with {} worker process(es)",
        plan.tasks.len(),
        config.workers
    );
    println!();

    let progress = if batch || plan.tasks.is_empty() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(plan.tasks.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        pb
    };

    let runner = WorkerProcess::current_exe(
        tools,
        GatewayOptions {
            timeout: config.timeout,
            optimize: config.optimize,
            office_listener: config.office_listener,
        },
    )?;
    let engine = Engine::new(config.workers)
        .with_progress(progress.clone())
        .with_interrupt(shutdown_requested.clone())
        .verbose(config.verbose);

    let outcomes = engine.execute(plan.tasks, &runner)?;

    if shutdown_requested.load(Ordering::SeqCst) {
        progress.finish_and_clear();
        eprintln!("⏹️  Graceful shutdown complete");
    } else {
        progress.finish_with_message("Conversion complete!");
    }
    println!();

    let summary = Summary::tally(&outcomes, &plan.skipped);
    print!("{}", summary.render(config.verbose));

    if let Some(path) = report {
        write_report(path, &summary)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("Detailed report saved to: {}", path.display());
    }

    Ok(ExitCode::from(summary.exit_code()))
}
