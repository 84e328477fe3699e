use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::WorkerError;
use crate::job::{Job, JobOutcome, JobStatus, RunReport};
use crate::packaging::Archiver;
use crate::progress::ProgressSink;

/// Maps the `--jobs` value to a worker count. Zero or negative means one
/// worker per available core.
pub fn resolve_concurrency(requested: i64) -> usize {
    if requested > 0 {
        requested as usize
    } else {
        thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }
}

/// Runs jobs through an [`Archiver`] with at most `limit` in flight.
///
/// Jobs are dispatched in the order given and each runs in its own task, so a
/// failing or panicking job never affects its siblings. Once the cancellation
/// token fires, jobs not yet dispatched are recorded as cancelled while the
/// in-flight ones finish.
pub struct Scheduler<A> {
    archiver: Arc<A>,
    limit: usize,
    cancel: CancellationToken,
}

impl<A: Archiver> Scheduler<A> {
    pub fn new(archiver: A, limit: usize) -> Self {
        Self {
            archiver: Arc::new(archiver),
            limit: limit.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs every job to completion and returns outcomes in dispatch order.
    pub async fn run(&self, jobs: Vec<Job>, progress: &dyn ProgressSink) -> RunReport {
        let total = jobs.len();
        let completed = AtomicUsize::new(0);
        info!("Start {} jobs with {} workers", total, self.limit);
        progress.started(total);

        let mut finished: Vec<(usize, JobOutcome)> = stream::iter(jobs.into_iter().enumerate())
            .map(|(index, job)| async move { (index, self.dispatch(job).await) })
            .buffer_unordered(self.limit)
            .inspect(|(_, outcome)| {
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                progress.job_finished(outcome, done, total);
            })
            .collect()
            .await;

        progress.finished();
        finished.sort_by_key(|(index, _)| *index);
        RunReport {
            outcomes: finished.into_iter().map(|(_, outcome)| outcome).collect(),
        }
    }

    async fn dispatch(&self, job: Job) -> JobOutcome {
        if self.cancel.is_cancelled() {
            return JobOutcome {
                job,
                status: JobStatus::Cancelled,
            };
        }

        debug!("Dispatch {}", job.entry.relative.display());
        let archiver = Arc::clone(&self.archiver);
        let task_job = job.clone();
        let handle = tokio::spawn(async move { archiver.archive(&task_job).await });

        let status = match handle.await {
            Ok(Ok(bytes)) => JobStatus::Succeeded(bytes),
            Ok(Err(err)) => JobStatus::Failed(err),
            Err(join_err) => JobStatus::Failed(WorkerError::Aborted(join_err.to_string())),
        };
        JobOutcome { job, status }
    }
}
