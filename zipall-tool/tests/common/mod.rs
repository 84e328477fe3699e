//! Shared helpers for the zipall integration tests.

// Each test crate uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub use assert_cmd::Command;
use async_zip::tokio::read::fs::ZipFileReader;
use tempfile::TempDir;

/// Command pointing at the freshly built `zipall` binary, with the
/// environment scrubbed of `ZIPALL_*` overrides.
pub fn zipall_cmd() -> Command {
    let mut cmd = Command::cargo_bin("zipall").expect("Failed to find zipall binary for testing");
    for (key, _) in std::env::vars() {
        if key.starts_with("ZIPALL_") {
            cmd.env_remove(key);
        }
    }
    cmd.arg("--no-progress");
    cmd
}

/// Builds `root/{a/{x.txt,y.txt}, b/{z.txt}}`.
pub fn sample_tree() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("a")).unwrap();
    fs::create_dir_all(root.join("b")).unwrap();
    fs::write(root.join("a/x.txt"), b"x contents").unwrap();
    fs::write(root.join("a/y.txt"), b"y contents").unwrap();
    fs::write(root.join("b/z.txt"), b"z contents").unwrap();
    dir
}

/// Every entry of a ZIP archive keyed by its stored name.
pub fn read_archive(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let reader = ZipFileReader::new(path).await.unwrap();
        let names: Vec<String> = reader
            .file()
            .entries()
            .iter()
            .map(|e| e.filename().as_str().unwrap().to_string())
            .collect();

        let mut contents = BTreeMap::new();
        for (index, name) in names.into_iter().enumerate() {
            let mut entry = reader.reader_with_entry(index).await.unwrap();
            let mut data = Vec::new();
            entry.read_to_end_checked(&mut data).await.unwrap();
            contents.insert(name, data);
        }
        contents
    })
}

/// Sorted file names (not directories) directly inside `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().unwrap().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
