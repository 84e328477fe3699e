use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod cleanup;
mod config;
mod error;
mod fs_utils;
mod job;
mod naming;
mod packaging;
mod process;
mod progress;
mod sink;

use crate::cleanup::{CleanupReport, remove_originals};
use crate::config::Settings;
use crate::fs_utils::{encode_size, select_entries};
use crate::job::{Job, RunReport};
use crate::naming::{plan_jobs, prepare_destinations};
use crate::packaging::ZipArchiver;
use crate::process::{Scheduler, resolve_concurrency};
use crate::progress::{BarProgress, LogProgress, ProgressSink};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INVALID_INPUT: i32 = 3;
pub const EXIT_SOME_FAILED: i32 = 4;
pub const EXIT_ALL_FAILED: i32 = 5;
pub const EXIT_DELETE_FAILED: i32 = 6;
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "zipall",
    version,
    about = "Zip all entries in the input directory.",
    long_about = "Zip every entry found at a given depth under <input> into its own archive,\n\
                  mirroring the directory structure under <output>."
)]
pub struct Cli {
    /// Input directory
    #[arg(value_name = "input", required_unless_present = "generate_yaml_config")]
    pub input: Option<PathBuf>,

    /// Output directory. Use input directory as output directory by default.
    #[arg(value_name = "output")]
    pub output: Option<PathBuf>,

    /// # of concurrent jobs; 0 or negative uses every core [default: -1]
    #[arg(short, long, value_name = "n", allow_negative_numbers = true)]
    pub jobs: Option<i64>,

    /// Zip entries in the input directory with the specified depth [default: 0]
    #[arg(short, long, value_name = "n")]
    pub depth: Option<usize>,

    /// Compress level, 0-9 [default: 1]
    #[arg(long, value_name = "n", allow_negative_numbers = true)]
    pub cl: Option<i32>,

    /// Delete original entries that were archived successfully
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub delete: bool,

    /// Enable zipping file entries. Only directories are zipped by default.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub zipfiles: bool,

    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Skip entries whose relative path matches (can be specified multiple times)
    #[arg(short = 's', long)]
    pub skip: Vec<String>,

    /// Dry run (just list planned archives)
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Log each finished job instead of drawing a progress bar
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_progress: bool,

    /// Generate YAML config to stdout
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub generate_yaml_config: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    pub quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    debug!("Parsed CLI arguments: {:?}", cli);

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            debug!("Run failed: {:?}", e);
            eprintln!("Error: {e:#}");
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

fn init_logging(verbose: u8, quiet: bool) {
    let log_level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    let merged = config::merged_config(cli)?;

    if cli.generate_yaml_config {
        println!("{}", serde_yaml::to_string(&merged)?);
        return Ok(EXIT_OK);
    }

    let settings = Settings::resolve(cli, &merged)?;

    let entries = match select_entries(
        &settings.input,
        settings.depth,
        settings.include_files,
        &settings.skip,
    ) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(EXIT_INVALID_INPUT);
        }
    };
    info!("Zip {} entries.", entries.len());

    let jobs = plan_jobs(entries, &settings.output, settings.level)?;

    if settings.dry_run {
        println!("--- DRY RUN ---");
        for job in &jobs {
            println!("{} -> {}", job.entry.path.display(), job.destination.display());
        }
        println!("Total entries: {}", jobs.len());
        return Ok(EXIT_OK);
    }

    info!("Create directories");
    let unprepared = prepare_destinations(&jobs);
    if unprepared > 0 {
        warn!("{} output directories could not be created", unprepared);
    }

    let workers = resolve_concurrency(settings.jobs);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all() // Enables both IO and time drivers
        .build()?;
    let (report, cleanup, interrupted) = runtime.block_on(archive_all(&settings, jobs, workers));

    print_summary(&report, cleanup.as_ref());
    Ok(exit_code(&report, cleanup.as_ref(), interrupted))
}

async fn archive_all(
    settings: &Settings,
    jobs: Vec<Job>,
    workers: usize,
) -> (RunReport, Option<CleanupReport>, bool) {
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: waiting for running jobs, no new jobs will start");
            watcher.cancel();
        }
    });

    let progress: Box<dyn ProgressSink> = if settings.progress {
        Box::new(BarProgress::new())
    } else {
        Box::new(LogProgress)
    };

    let scheduler = Scheduler::new(ZipArchiver, workers).with_cancellation(cancel.clone());
    let report = scheduler.run(jobs, progress.as_ref()).await;
    info!("Done");

    let cleanup = if !settings.delete {
        None
    } else if cancel.is_cancelled() {
        warn!("Run was interrupted, not deleting any originals");
        None
    } else {
        let cleanup = remove_originals(&report).await;
        info!("Done");
        Some(cleanup)
    };

    (report, cleanup, cancel.is_cancelled())
}

fn print_summary(report: &RunReport, cleanup: Option<&CleanupReport>) {
    println!(
        "Archived {}/{} entries ({})",
        report.succeeded(),
        report.total(),
        encode_size(report.archived_bytes())
    );
    if report.failed() > 0 {
        println!("Failed: {}", report.failed());
        for (job, err) in report.failures() {
            println!("  {} ({}): {}", job.entry.path.display(), err.kind(), err);
        }
    }
    if report.cancelled() > 0 {
        println!("Cancelled: {}", report.cancelled());
    }
    if let Some(cleanup) = cleanup {
        println!(
            "Deleted {} originals, {} kept, {} failed",
            cleanup.removed.len(),
            cleanup.kept.len(),
            cleanup.errors.len()
        );
        for err in &cleanup.errors {
            println!("  {err}");
        }
    }
}

fn exit_code(report: &RunReport, cleanup: Option<&CleanupReport>, interrupted: bool) -> i32 {
    if interrupted {
        return EXIT_INTERRUPTED;
    }
    if report.is_success() {
        return match cleanup {
            Some(c) if !c.is_success() => EXIT_DELETE_FAILED,
            _ => EXIT_OK,
        };
    }
    if report.cancelled() > 0 {
        EXIT_INTERRUPTED
    } else if report.failed() == report.total() {
        EXIT_ALL_FAILED
    } else {
        EXIT_SOME_FAILED
    }
}
