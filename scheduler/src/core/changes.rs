//! Change detection between workspace file snapshots.
//!
//! A snapshot maps workspace-relative paths to modification times. The
//! diff is pure: snapshotting the filesystem lives in
//! [`crate::io::executor`].

use std::collections::BTreeMap;
use std::time::SystemTime;

/// Relative path -> mtime, ordered for deterministic output.
pub type FileSnapshot = BTreeMap<String, SystemTime>;

/// Files that are new in `after`, or whose mtime increased.
///
/// Deletions are not reported; the caller only cares what the assistant
/// produced or touched.
pub fn diff_snapshots(before: &FileSnapshot, after: &FileSnapshot) -> Vec<String> {
    let mut changed = Vec::new();

    for (path, mtime) in after {
        match before.get(path) {
            None => changed.push(path.clone()),
            Some(previous) if mtime > previous => changed.push(path.clone()),
            Some(_) => {}
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn snapshot(entries: &[(&str, u64)]) -> FileSnapshot {
        entries
            .iter()
            .map(|(path, secs)| {
                (
                    (*path).to_string(),
                    SystemTime::UNIX_EPOCH + Duration::from_secs(*secs),
                )
            })
            .collect()
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let snap = snapshot(&[("src/main.rs", 100), ("README.md", 50)]);
        assert!(diff_snapshots(&snap, &snap).is_empty());
    }

    #[test]
    fn new_file_is_reported() {
        let before = snapshot(&[("README.md", 50)]);
        let after = snapshot(&[("README.md", 50), ("src/lib.rs", 120)]);
        assert_eq!(diff_snapshots(&before, &after), vec!["src/lib.rs"]);
    }

    #[test]
    fn touched_file_is_reported() {
        let before = snapshot(&[("src/lib.rs", 100)]);
        let after = snapshot(&[("src/lib.rs", 160)]);
        assert_eq!(diff_snapshots(&before, &after), vec!["src/lib.rs"]);
    }

    #[test]
    fn deleted_file_is_not_reported() {
        let before = snapshot(&[("src/lib.rs", 100), ("scratch.txt", 90)]);
        let after = snapshot(&[("src/lib.rs", 100)]);
        assert!(diff_snapshots(&before, &after).is_empty());
    }

    #[test]
    fn output_is_sorted_by_path() {
        let before = FileSnapshot::new();
        let after = snapshot(&[("b.rs", 10), ("a.rs", 10), ("c.rs", 10)]);
        assert_eq!(diff_snapshots(&before, &after), vec!["a.rs", "b.rs", "c.rs"]);
    }
}
