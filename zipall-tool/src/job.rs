//! Job values and the per-run report built from their outcomes.

use std::fmt;
use std::path::PathBuf;

use crate::error::WorkerError;
use crate::fs_utils::Entry;

/// Archive one entry into `destination` at deflate level `level`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub entry: Entry,
    pub destination: PathBuf,
    pub level: i32,
}

#[derive(Debug)]
pub enum JobStatus {
    /// Archive committed; carries its size in bytes.
    Succeeded(u64),
    Failed(WorkerError),
    /// Never dispatched because the run was interrupted.
    Cancelled,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub job: Job,
    pub status: JobStatus,
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded(_))
    }
}

/// Outcomes of one scheduler run, in dispatch order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<JobOutcome>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn cancelled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, JobStatus::Cancelled))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Job, &WorkerError)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            JobStatus::Failed(err) => Some((&o.job, err)),
            _ => None,
        })
    }

    /// Total bytes of committed archives.
    pub fn archived_bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                JobStatus::Succeeded(bytes) => bytes,
                _ => 0,
            })
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.succeeded() == self.total()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[ZIP] total={} succeeded={} failed={} cancelled={}",
            self.total(),
            self.succeeded(),
            self.failed(),
            self.cancelled()
        )
    }
}
