use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::WorkerError;

/// An archive being written next to its final destination.
///
/// Bytes go to a hidden `.<name>.partial` file that is renamed over the
/// destination only by [`StagedFile::commit`], so readers never see a
/// truncated archive under the real name.
pub struct StagedFile {
    staging: PathBuf,
    destination: PathBuf,
    file: File,
}

impl StagedFile {
    /// Opens the staging file. Automatically creates parent directories if they don't exist.
    pub async fn create(destination: &Path) -> Result<Self, WorkerError> {
        let staging = staging_path(destination);
        let write_err = |source| WorkerError::Write {
            path: destination.to_path_buf(),
            source,
        };

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let file = File::create(&staging).await.map_err(write_err)?;

        Ok(Self {
            staging,
            destination: destination.to_path_buf(),
            file,
        })
    }

    pub fn file(&mut self) -> &mut File {
        &mut self.file
    }

    /// Flushes the staging file and moves it into place. Returns the archive size.
    pub async fn commit(mut self) -> Result<u64, WorkerError> {
        let result = self.finish().await;
        if result.is_err() {
            remove_quietly(&self.staging).await;
        }
        result
    }

    async fn finish(&mut self) -> Result<u64, WorkerError> {
        let write_err = |source| WorkerError::Write {
            path: self.destination.clone(),
            source,
        };
        self.file.flush().await.map_err(write_err)?;
        self.file.sync_all().await.map_err(write_err)?;
        fs::rename(&self.staging, &self.destination)
            .await
            .map_err(write_err)?;
        let meta = fs::metadata(&self.destination).await.map_err(write_err)?;
        Ok(meta.len())
    }

    /// Drops everything written so far.
    pub async fn discard(self) {
        let Self { staging, file, .. } = self;
        drop(file);
        remove_quietly(&staging).await;
    }
}

const STAGING_SUFFIX: &str = ".partial";

fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}{STAGING_SUFFIX}"))
}

/// True for file names produced by [`StagedFile`] for a `.zip` destination.
pub fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(&format!(".zip{STAGING_SUFFIX}"))
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        debug!("Could not remove staging file {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_file_is_a_hidden_sibling() {
        assert_eq!(
            staging_path(Path::new("/out/a/b.zip")),
            PathBuf::from("/out/a/.b.zip.partial")
        );
    }

    #[test]
    fn staging_names_are_recognised() {
        let staged = staging_path(Path::new("/out/a.zip"));
        assert!(is_staging_name(&staged.file_name().unwrap().to_string_lossy()));
        assert!(!is_staging_name("a.zip"));
        assert!(!is_staging_name("notes.partial"));
    }

    #[tokio::test]
    async fn commit_moves_staged_bytes_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/out.zip");

        let mut staged = StagedFile::create(&dest).await.unwrap();
        staged.file().write_all(b"payload").await.unwrap();
        assert!(!dest.exists());

        let size = staged.commit().await.unwrap();
        assert_eq!(size, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
        assert!(!staging_path(&dest).exists());
    }

    #[tokio::test]
    async fn discard_leaves_no_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.zip");

        let mut staged = StagedFile::create(&dest).await.unwrap();
        staged.file().write_all(b"half an archi").await.unwrap();
        staged.discard().await;

        assert!(!dest.exists());
        assert!(!staging_path(&dest).exists());
    }
}
