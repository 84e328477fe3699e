//! Progress reporting for archiving runs.
//!
//! The scheduler only talks to [`ProgressSink`]; the binary picks a terminal
//! bar or plain log lines.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::job::{JobOutcome, JobStatus};

/// Receives scheduler events. Calls come from the dispatching task, one at a time.
pub trait ProgressSink: Send + Sync {
    fn started(&self, _total: usize) {}

    fn job_finished(&self, outcome: &JobOutcome, completed: usize, total: usize);

    fn finished(&self) {}
}

/// Progress bar on stderr. Hidden automatically when stderr is not a terminal.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}<{eta_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        bar.set_style(style);
        Self { bar }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn started(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn job_finished(&self, outcome: &JobOutcome, _completed: usize, _total: usize) {
        if let JobStatus::Failed(err) = &outcome.status {
            self.bar.suspend(|| {
                warn!(
                    "Failed {} ({}): {}",
                    outcome.job.entry.path.display(),
                    err.kind(),
                    err
                )
            });
        }
        self.bar
            .set_message(outcome.job.entry.relative.display().to_string());
        self.bar.inc(1);
    }

    fn finished(&self) {
        self.bar.finish_and_clear();
    }
}

/// One log line per finished job.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn job_finished(&self, outcome: &JobOutcome, completed: usize, total: usize) {
        let entry = outcome.job.entry.path.display();
        match &outcome.status {
            JobStatus::Succeeded(_) => info!(
                "[{completed}/{total}] {} -> {}",
                entry,
                outcome.job.destination.display()
            ),
            JobStatus::Failed(err) => {
                warn!("[{completed}/{total}] Failed {} ({}): {}", entry, err.kind(), err)
            }
            JobStatus::Cancelled => info!("[{completed}/{total}] Cancelled {}", entry),
        }
    }
}
