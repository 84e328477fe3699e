use std::path::Path;

use async_zip::base::write::ZipFileWriter;
use async_zip::{Compression, DeflateOption, ZipEntryBuilder};
use futures::AsyncWriteExt;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::WorkerError;
use crate::packaging::FileEntry;

const READ_BUFFER: usize = 64 * 1024;

/// Local file header, empty archive and spanned archive markers.
const ZIP_SIGNATURES: [[u8; 4]; 3] = [*b"PK\x03\x04", *b"PK\x05\x06", *b"PK\x07\x08"];

/// Streams `files` into a deflate ZIP written to `sink`.
///
/// Each file is read in chunks straight into its entry, so memory use does not
/// depend on file size. `archive` only names the output in errors.
pub async fn write_zip(
    sink: &mut File,
    files: &[FileEntry],
    level: i32,
    archive: &Path,
) -> Result<(), WorkerError> {
    let zip_err = |source| WorkerError::Zip {
        path: archive.to_path_buf(),
        source,
    };

    let mut writer = ZipFileWriter::with_tokio(sink);
    let mut buf = vec![0u8; READ_BUFFER];

    for fe in files {
        let read_err = |source| WorkerError::Read {
            path: fe.path.clone(),
            source,
        };
        let mut source = File::open(&fe.path).await.map_err(read_err)?;

        let builder = ZipEntryBuilder::new(fe.name_in_archive.clone().into(), Compression::Deflate)
            .deflate_option(DeflateOption::Other(level));
        let mut entry = writer.write_entry_stream(builder).await.map_err(zip_err)?;

        loop {
            let n = match source.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(read_err(e)),
            };
            entry
                .write_all(&buf[..n])
                .await
                .map_err(|source| WorkerError::Write {
                    path: archive.to_path_buf(),
                    source,
                })?;
        }

        entry.close().await.map_err(zip_err)?;
    }

    writer.close().await.map_err(zip_err)?;
    Ok(())
}

/// True for `*.zip` files that start with a ZIP signature.
pub async fn is_zip_file(path: &Path) -> bool {
    let has_suffix = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if !has_suffix {
        return false;
    }

    let Ok(mut file) = File::open(path).await else {
        return false;
    };
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic).await {
        Ok(_) => ZIP_SIGNATURES.contains(&magic),
        Err(_) => false,
    }
}

/// Reads every entry of an archive into memory, keyed by name.
#[cfg(test)]
pub(crate) async fn read_archive(path: &Path) -> std::collections::BTreeMap<String, Vec<u8>> {
    use async_zip::tokio::read::fs::ZipFileReader;

    let reader = ZipFileReader::new(path).await.unwrap();
    let names: Vec<String> = reader
        .file()
        .entries()
        .iter()
        .map(|e| e.filename().as_str().unwrap().to_string())
        .collect();

    let mut contents = std::collections::BTreeMap::new();
    for (index, name) in names.into_iter().enumerate() {
        let mut entry = reader.reader_with_entry(index).await.unwrap();
        let mut data = Vec::new();
        entry.read_to_end_checked(&mut data).await.unwrap();
        contents.insert(name, data);
    }
    contents
}
