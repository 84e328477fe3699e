//! Error taxonomy for a zipall run.
//!
//! Only `InvalidInputError` and `PlanError` stop a run, and both are raised
//! before any archive is written. `WorkerError` and `DeletionError` are
//! recorded per entry and surface in the final summary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The input root cannot be archived from.
#[derive(Error, Debug)]
pub enum InvalidInputError {
    #[error("input directory doesn't exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("specified input is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("cannot access input directory {}: {source}", path.display())]
    Inaccessible { path: PathBuf, source: io::Error },

    #[error("input directory cannot be searched: {} ({reason})", path.display())]
    Unmatchable { path: PathBuf, reason: String },
}

/// Planning refused to produce a set of jobs.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("archive for {} would overwrite {}", source_path.display(), destination.display())]
    DestinationCollision {
        source_path: PathBuf,
        destination: PathBuf,
    },

    #[error("archive {} would be written inside selected entry {}", destination.display(), entry.display())]
    DestinationInsideEntry { destination: PathBuf, entry: PathBuf },
}

/// Coarse classification of a job failure, used in summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Permission,
    DiskFull,
    SourceUnreadable,
    Io,
    Archive,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Permission => "permission denied",
            Self::DiskFull => "disk full",
            Self::SourceUnreadable => "source unreadable",
            Self::Io => "i/o error",
            Self::Archive => "archive error",
        };
        f.write_str(label)
    }
}

/// Failure of a single archiving job.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("failed to encode archive {}: {source}", path.display())]
    Zip {
        path: PathBuf,
        source: async_zip::error::ZipError,
    },

    #[error("archiving task aborted: {0}")]
    Aborted(String),
}

impl WorkerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Read { source, .. } => match source.kind() {
                io::ErrorKind::PermissionDenied => FailureKind::Permission,
                _ => FailureKind::SourceUnreadable,
            },
            Self::Write { source, .. } => classify_io(source),
            Self::Walk { source, .. } => match source.io_error() {
                Some(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                    FailureKind::Permission
                }
                _ => FailureKind::SourceUnreadable,
            },
            Self::Zip { .. } => FailureKind::Archive,
            Self::Aborted(_) => FailureKind::Io,
        }
    }
}

fn classify_io(err: &io::Error) -> FailureKind {
    match err.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
            FailureKind::Permission
        }
        io::ErrorKind::StorageFull => FailureKind::DiskFull,
        _ => FailureKind::Io,
    }
}

/// Removing an original after it was archived failed.
#[derive(Error, Debug)]
#[error("failed to delete {}: {source}", path.display())]
pub struct DeletionError {
    pub path: PathBuf,
    pub source: io::Error,
}
