use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};

use crate::error::InvalidInputError;

/// What a selected entry is on disk. Symlinks are classified by their target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One filesystem object selected for independent archiving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub relative: PathBuf,
    pub kind: EntryKind,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Compile user supplied skip patterns.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).with_context(|| format!("invalid skip pattern: {p}")))
        .collect()
}

/// Fails unless `root` exists and is a directory.
pub fn validate_input_root(root: &Path) -> Result<(), InvalidInputError> {
    match fs::metadata(root) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(InvalidInputError::NotFound {
            path: root.to_path_buf(),
        }),
        Err(source) => Err(InvalidInputError::Inaccessible {
            path: root.to_path_buf(),
            source,
        }),
        Ok(meta) if !meta.is_dir() => Err(InvalidInputError::NotADirectory {
            path: root.to_path_buf(),
        }),
        Ok(_) => Ok(()),
    }
}

/// Lists the entries exactly `depth` levels below `root` (0 = immediate children),
/// sorted by relative path.
///
/// Files are only returned when `include_files` is set. Entries whose relative
/// path matches one of `skip` are left out. A depth past the bottom of the tree
/// simply yields nothing.
pub fn select_entries(
    root: &Path,
    depth: usize,
    include_files: bool,
    skip: &[Pattern],
) -> Result<Vec<Entry>, InvalidInputError> {
    validate_input_root(root)?;

    let mut pattern = PathBuf::from(Pattern::escape(&root.to_string_lossy()));
    for _ in 0..=depth {
        pattern.push("*");
    }
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let paths = glob::glob_with(&pattern.to_string_lossy(), options).map_err(|e| {
        InvalidInputError::Unmatchable {
            path: root.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    let mut result = Vec::new();
    for found in paths {
        let found = match found {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping unreadable path {}: {}", e.path().display(), e.error());
                continue;
            }
        };

        // Every match sits depth + 1 components under the root.
        let mut tail: Vec<_> = found.components().rev().take(depth + 1).collect();
        tail.reverse();
        let relative: PathBuf = tail.iter().collect();

        if is_skipped(&relative, skip) {
            debug!("Skipping {} (matches skip pattern)", relative.display());
            continue;
        }

        let kind = if found.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        if kind == EntryKind::File && !include_files {
            continue;
        }

        result.push(Entry {
            path: root.join(&relative),
            relative,
            kind,
        });
    }

    result.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(result)
}

fn is_skipped(relative: &Path, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|p| p.matches_path(relative))
}

/// Convert bytes into a human-friendly string using binary (KiB, MiB, GiB...) units.
pub fn encode_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    // 1.0 MiB prints as 1 MiB
    if (size * 10.0) % 10.0 == 0.0 {
        format!("{:.0} {}", size, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
