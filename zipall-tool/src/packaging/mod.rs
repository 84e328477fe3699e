use std::future::Future;
use std::path::{Component, Path, PathBuf};

use tokio::fs::File;
use tokio::task;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::WorkerError;
use crate::fs_utils::EntryKind;
use crate::job::Job;
use crate::packaging::zip::{is_zip_file, write_zip};
use crate::sink::{StagedFile, is_staging_name};

pub mod zip;

/// Represents a file to include in the ZIP archive.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name_in_archive: String,
}

/// Turns one job into one archive on disk.
///
/// Implementations must leave no readable archive under the destination name
/// when they fail. On success they return the archive size in bytes.
pub trait Archiver: Send + Sync + 'static {
    fn archive(&self, job: &Job) -> impl Future<Output = Result<u64, WorkerError>> + Send;
}

/// Deflate ZIP archiver backed by `async_zip`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    async fn archive(&self, job: &Job) -> Result<u64, WorkerError> {
        let mut staged = StagedFile::create(&job.destination).await?;
        let filled = fill(job, staged.file()).await;
        match filled {
            Ok(()) => staged.commit().await,
            Err(e) => {
                staged.discard().await;
                Err(e)
            }
        }
    }
}

async fn fill(job: &Job, sink: &mut File) -> Result<(), WorkerError> {
    let source = &job.entry.path;
    match job.entry.kind {
        EntryKind::Directory => {
            let files = list_files(source.clone()).await?;
            debug!("{}: {} files", job.entry.relative.display(), files.len());
            write_zip(sink, &files, job.level, &job.destination).await
        }
        EntryKind::File if is_zip_file(source).await => {
            debug!("{} is already a zip, copying", source.display());
            copy_verbatim(source, sink, &job.destination).await
        }
        EntryKind::File => {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let files = [FileEntry {
                path: source.clone(),
                name_in_archive: name,
            }];
            write_zip(sink, &files, job.level, &job.destination).await
        }
    }
}

async fn copy_verbatim(source: &Path, sink: &mut File, destination: &Path) -> Result<(), WorkerError> {
    let mut reader = File::open(source).await.map_err(|e| WorkerError::Read {
        path: source.to_path_buf(),
        source: e,
    })?;
    tokio::io::copy(&mut reader, sink)
        .await
        .map_err(|e| WorkerError::Write {
            path: destination.to_path_buf(),
            source: e,
        })?;
    Ok(())
}

/// Lists every regular file under `root` on the blocking pool.
async fn list_files(root: PathBuf) -> Result<Vec<FileEntry>, WorkerError> {
    task::spawn_blocking(move || collect_files(&root))
        .await
        .map_err(|e| WorkerError::Aborted(e.to_string()))?
}

/// Files under `root`, named relative to it with `/` separators and sorted by
/// name. Directories and unfinished archives are not recorded. Symlinks count
/// only when they resolve to a regular file.
fn collect_files(root: &Path) -> Result<Vec<FileEntry>, WorkerError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| WorkerError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        if !entry.path().is_file() {
            debug!("Skipping {} (not a regular file)", entry.path().display());
            continue;
        }
        if is_staging_name(&entry.file_name().to_string_lossy()) {
            debug!("Skipping {} (unfinished archive)", entry.path().display());
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        files.push(FileEntry {
            path: entry.path().to_path_buf(),
            name_in_archive: archive_name(relative),
        });
    }

    Ok(files)
}

fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_utils::{Entry, select_entries, tests::sample_tree};
    use crate::naming::plan_jobs;
    use crate::packaging::zip::read_archive;
    use std::fs;

    fn file_job(path: PathBuf, destination: PathBuf) -> Job {
        Job {
            entry: Entry {
                relative: PathBuf::from(path.file_name().unwrap()),
                path,
                kind: EntryKind::File,
            },
            destination,
            level: 1,
        }
    }

    #[tokio::test]
    async fn directory_round_trips_with_relative_names() {
        let dir = sample_tree();
        fs::create_dir_all(dir.path().join("a/deep/er")).unwrap();
        fs::create_dir_all(dir.path().join("a/empty")).unwrap();
        fs::write(dir.path().join("a/deep/er/w.txt"), b"w contents").unwrap();
        let out = tempfile::tempdir().unwrap();

        let entries = select_entries(dir.path(), 0, false, &[]).unwrap();
        let jobs = plan_jobs(entries, out.path(), 1).unwrap();
        let size = ZipArchiver.archive(&jobs[0]).await.unwrap();
        assert_eq!(size, fs::metadata(out.path().join("a.zip")).unwrap().len());

        let contents = read_archive(&out.path().join("a.zip")).await;
        let names: Vec<_> = contents.keys().cloned().collect();
        assert_eq!(names, vec!["deep/er/w.txt", "x.txt", "y.txt"]);
        assert_eq!(contents["x.txt"], b"x contents");
        assert_eq!(contents["deep/er/w.txt"], b"w contents");
    }

    #[tokio::test]
    async fn single_file_is_stored_under_its_base_name() {
        let dir = sample_tree();
        let dest = dir.path().join("a/x.txt.zip");
        let job = file_job(dir.path().join("a/x.txt"), dest.clone());

        ZipArchiver.archive(&job).await.unwrap();

        let contents = read_archive(&dest).await;
        assert_eq!(contents.len(), 1);
        assert_eq!(contents["x.txt"], b"x contents");
    }

    #[tokio::test]
    async fn existing_zip_is_copied_verbatim() {
        let dir = sample_tree();
        let inner = dir.path().join("inner.zip");
        ZipArchiver
            .archive(&file_job(dir.path().join("b/z.txt"), inner.clone()))
            .await
            .unwrap();

        let outer = dir.path().join("inner.zip.zip");
        ZipArchiver
            .archive(&file_job(inner.clone(), outer.clone()))
            .await
            .unwrap();

        assert_eq!(fs::read(&inner).unwrap(), fs::read(&outer).unwrap());
    }

    #[tokio::test]
    async fn failure_leaves_no_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.txt.zip");
        let job = file_job(dir.path().join("missing.txt"), dest.clone());

        let err = ZipArchiver.archive(&job).await.unwrap_err();
        assert!(matches!(err, WorkerError::Read { .. }));
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlinks_are_not_collected() {
        let dir = sample_tree();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), dir.path().join("a/broken")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("b/z.txt"), dir.path().join("a/link.txt")).unwrap();

        let names: Vec<_> = collect_files(&dir.path().join("a"))
            .unwrap()
            .into_iter()
            .map(|f| f.name_in_archive)
            .collect();
        assert_eq!(names, vec!["link.txt", "x.txt", "y.txt"]);
    }

    #[test]
    fn staging_files_are_not_collected() {
        let dir = sample_tree();
        fs::write(dir.path().join("a/.a.zip.partial"), b"PK\x03\x04half").unwrap();

        let names: Vec<_> = collect_files(&dir.path().join("a"))
            .unwrap()
            .into_iter()
            .map(|f| f.name_in_archive)
            .collect();
        assert_eq!(names, vec!["x.txt", "y.txt"]);
    }
}
