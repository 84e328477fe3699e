use std::collections::{BTreeSet, HashMap};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::PlanError;
use crate::fs_utils::Entry;
use crate::job::Job;

pub const ARCHIVE_SUFFIX: &str = ".zip";

/// `output_root / relative` with `.zip` appended. Existing suffixes are kept,
/// so `a/b.zip` maps to `a/b.zip.zip`.
pub fn destination_for(entry: &Entry, output_root: &Path) -> PathBuf {
    let mut name: OsString = output_root.join(&entry.relative).into_os_string();
    name.push(ARCHIVE_SUFFIX);
    PathBuf::from(name)
}

/// Builds one job per entry.
///
/// A destination must never land on or inside a selected entry: the archive
/// would either replace a source that is being read (directory `a` next to
/// file `a.zip`) or be written into a directory that is walked, and with
/// `--delete` removed together with it. Such plans are refused as a whole.
pub fn plan_jobs(
    entries: Vec<Entry>,
    output_root: &Path,
    level: i32,
) -> Result<Vec<Job>, PlanError> {
    let sources: HashMap<PathBuf, PathBuf> = entries
        .iter()
        .map(|e| (resolve(&e.path), e.path.clone()))
        .collect();
    let resolved_output = resolve(output_root);

    let mut jobs = Vec::with_capacity(entries.len());
    for entry in entries {
        let destination = destination_for(&entry, output_root);
        let resolved = destination_for(&entry, &resolved_output);
        let hit = resolved
            .ancestors()
            .find_map(|a| sources.get(a).map(|source| (a, source)));
        if let Some((at, source)) = hit {
            return Err(if at == resolved.as_path() {
                PlanError::DestinationCollision {
                    source_path: entry.path,
                    destination,
                }
            } else {
                PlanError::DestinationInsideEntry {
                    destination,
                    entry: source.clone(),
                }
            });
        }
        jobs.push(Job {
            entry,
            destination,
            level,
        });
    }
    Ok(jobs)
}

/// Creates the parent directory of every destination. Failures are logged and
/// counted; the affected jobs fail on their own when they try to write.
pub fn prepare_destinations(jobs: &[Job]) -> usize {
    let parents: BTreeSet<&Path> = jobs.iter().filter_map(|j| j.destination.parent()).collect();

    let mut failures = 0;
    for parent in parents {
        match fs::create_dir_all(parent) {
            Ok(()) => debug!("Prepared {}", parent.display()),
            Err(e) => {
                warn!("Failed to create directory {}: {}", parent.display(), e);
                failures += 1;
            }
        }
    }
    failures
}

/// Canonical form of `path`. Missing trailing components are appended to the
/// canonical form of the closest existing ancestor.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(real) = fs::canonicalize(path) {
        return real;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => resolve(parent).join(name),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_utils::{EntryKind, select_entries, tests::sample_tree};
    use std::collections::HashSet;

    fn entry(relative: &str, kind: EntryKind) -> Entry {
        Entry {
            path: Path::new("/in").join(relative),
            relative: PathBuf::from(relative),
            kind,
        }
    }

    #[test]
    fn suffix_is_appended_not_replaced() {
        let out = Path::new("/out");
        assert_eq!(
            destination_for(&entry("foo/bar", EntryKind::Directory), out),
            PathBuf::from("/out/foo/bar.zip")
        );
        assert_eq!(
            destination_for(&entry("foo/bar.zip", EntryKind::File), out),
            PathBuf::from("/out/foo/bar.zip.zip")
        );
        assert_eq!(
            destination_for(&entry("notes.txt", EntryKind::File), out),
            PathBuf::from("/out/notes.txt.zip")
        );
    }

    #[test]
    fn destinations_are_one_to_one_with_entries() {
        let dir = sample_tree();
        let out = tempfile::tempdir().unwrap();
        let entries = select_entries(dir.path(), 1, true, &[]).unwrap();
        let count = entries.len();

        let jobs = plan_jobs(entries, out.path(), 1).unwrap();
        let unique: HashSet<_> = jobs.iter().map(|j| j.destination.clone()).collect();
        assert_eq!(jobs.len(), count);
        assert_eq!(unique.len(), count);
        assert!(jobs.iter().all(|j| j.destination.starts_with(out.path())));
        assert!(jobs.iter().all(|j| j.level == 1));
    }

    #[test]
    fn in_place_collision_with_a_selected_entry_is_refused() {
        let dir = sample_tree();
        fs::write(dir.path().join("a.zip"), b"PK\x05\x06").unwrap();
        let entries = select_entries(dir.path(), 0, true, &[]).unwrap();

        let err = plan_jobs(entries, dir.path(), 1).unwrap_err();
        match err {
            PlanError::DestinationCollision { source_path, .. } => {
                assert_eq!(source_path, dir.path().join("a"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn output_inside_a_selected_entry_is_refused() {
        let dir = sample_tree();
        let entries = select_entries(dir.path(), 0, false, &[]).unwrap();

        let err = plan_jobs(entries.clone(), &dir.path().join("a"), 1).unwrap_err();
        match err {
            PlanError::DestinationInsideEntry { entry, .. } => {
                assert_eq!(entry, dir.path().join("a"))
            }
            other => panic!("unexpected error: {other}"),
        }

        // Not created yet, still nested under `b`.
        let err = plan_jobs(entries, &dir.path().join("b/archives/new"), 1).unwrap_err();
        assert!(matches!(err, PlanError::DestinationInsideEntry { .. }));
    }

    #[test]
    fn output_next_to_entries_is_accepted() {
        let dir = sample_tree();
        let entries = select_entries(dir.path(), 1, true, &[]).unwrap();

        let jobs = plan_jobs(entries, &dir.path().join("archives"), 1).unwrap();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].destination, dir.path().join("archives/a/x.txt.zip"));
    }

    #[test]
    fn same_names_are_fine_when_writing_elsewhere() {
        let dir = sample_tree();
        let out = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.zip"), b"PK\x05\x06").unwrap();
        let entries = select_entries(dir.path(), 0, true, &[]).unwrap();

        let jobs = plan_jobs(entries, out.path(), 1).unwrap();
        assert_eq!(jobs.len(), 3);
    }

    #[test]
    fn prepare_creates_parents_idempotently() {
        let out = tempfile::tempdir().unwrap();
        let jobs: Vec<Job> = ["a/x.txt", "a/y.txt", "b/c/z.txt"]
            .iter()
            .map(|rel| {
                let entry = entry(rel, EntryKind::File);
                Job {
                    destination: destination_for(&entry, out.path()),
                    entry,
                    level: 1,
                }
            })
            .collect();

        assert_eq!(prepare_destinations(&jobs), 0);
        assert_eq!(prepare_destinations(&jobs), 0);
        assert!(out.path().join("a").is_dir());
        assert!(out.path().join("b/c").is_dir());
    }

    #[test]
    fn prepare_counts_directories_it_could_not_create() {
        let out = tempfile::tempdir().unwrap();
        fs::write(out.path().join("taken"), b"file").unwrap();
        let entry = entry("taken/x.txt", EntryKind::File);
        let jobs = vec![Job {
            destination: destination_for(&entry, out.path()),
            entry,
            level: 1,
        }];

        assert_eq!(prepare_destinations(&jobs), 1);
    }
}
