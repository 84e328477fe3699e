//! Result-gated removal of archived originals.

use std::path::PathBuf;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::DeletionError;
use crate::job::RunReport;

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Originals kept because their job did not succeed or the archive went missing.
    pub kept: Vec<PathBuf>,
    pub errors: Vec<DeletionError>,
}

impl CleanupReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Deletes the original of every job that succeeded, recursively for
/// directories. A failed deletion is recorded and the next one is attempted.
pub async fn remove_originals(run: &RunReport) -> CleanupReport {
    let mut report = CleanupReport::default();
    info!("Delete {} entries", run.succeeded());

    for outcome in &run.outcomes {
        let entry = &outcome.job.entry;
        if !outcome.succeeded() {
            debug!("Keeping {} (not archived)", entry.path.display());
            report.kept.push(entry.path.clone());
            continue;
        }
        if !fs::try_exists(&outcome.job.destination).await.unwrap_or(false) {
            warn!(
                "Keeping {}: archive {} is missing",
                entry.path.display(),
                outcome.job.destination.display()
            );
            report.kept.push(entry.path.clone());
            continue;
        }

        let removed = if entry.is_dir() {
            fs::remove_dir_all(&entry.path).await
        } else {
            fs::remove_file(&entry.path).await
        };
        match removed {
            Ok(()) => {
                debug!("Deleted {}", entry.path.display());
                report.removed.push(entry.path.clone());
            }
            Err(source) => {
                let err = DeletionError {
                    path: entry.path.clone(),
                    source,
                };
                warn!("{}", err);
                report.errors.push(err);
            }
        }
    }

    report
}
