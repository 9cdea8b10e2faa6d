//! Promote a finished generation from the temporary tree to the final one
//!
//! Files are copied only when their contents changed, so timestamps of
//! untouched files survive. Anything in the final tree that the new
//! generation did not produce is deleted, including directories left
//! empty. The temporary tree is removed last.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;

/// What [`sync_output`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub copied: usize,
    pub unchanged: usize,
    pub removed: usize,
}

/// Mirror `source` into `target`, then delete `source`
///
/// Only call this once every generation step succeeded: a half-written
/// `source` would replace a good `target`.
pub fn sync_output(source: &Path, target: &Path) -> Result<SyncSummary> {
    let mut summary = SyncSummary::default();
    std::fs::create_dir_all(target)?;

    let produced = relative_files(source)?;
    for relative in &produced {
        let from = source.join(relative);
        let to = target.join(relative);

        let contents = std::fs::read(&from)?;
        if std::fs::read(&to).is_ok_and(|existing| existing == contents) {
            summary.unchanged += 1;
            continue;
        }
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&to, contents)?;
        debug!(file = %relative.display(), "updated");
        summary.copied += 1;
    }

    let keep: HashSet<&PathBuf> = produced.iter().collect();
    for relative in relative_files(target)? {
        if !keep.contains(&relative) {
            std::fs::remove_file(target.join(&relative))?;
            debug!(file = %relative.display(), "removed stale file");
            summary.removed += 1;
        }
    }
    remove_empty_dirs(target)?;

    std::fs::remove_dir_all(source)?;

    info!(
        copied = summary.copied,
        unchanged = summary.unchanged,
        removed = summary.removed,
        target = %target.display(),
        "synced generated output"
    );
    Ok(summary)
}

fn relative_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
    }
    Ok(files)
}

// Deepest first, so a parent emptied by its children goes too
fn remove_empty_dirs(root: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = entry?;
        if entry.file_type().is_dir() && std::fs::read_dir(entry.path())?.next().is_none() {
            std::fs::remove_dir(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_sync_copies_changed_and_removes_stale() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("skaffolds.tmp");
        let target = temp.path().join("skaffolds");

        write(&source, "redis/values.yaml", "a: 1\n");
        write(&source, "redis/fleet.yaml", "dependsOn: []\n");
        write(&target, "redis/values.yaml", "a: 0\n");
        write(&target, "redis/fleet.yaml", "dependsOn: []\n");
        write(&target, "old-component/values.yaml", "x: 1\n");

        let summary = sync_output(&source, &target).unwrap();

        assert_eq!(
            summary,
            SyncSummary {
                copied: 1,
                unchanged: 1,
                removed: 1
            }
        );
        assert_eq!(
            std::fs::read_to_string(target.join("redis/values.yaml")).unwrap(),
            "a: 1\n"
        );
        assert!(!target.join("old-component").exists());
        assert!(!source.exists());
    }

    #[test]
    fn test_sync_into_missing_target() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("tmp");
        let target = temp.path().join("out");
        write(&source, "a/manifests/secret.yaml", "kind: Secret\n");

        let summary = sync_output(&source, &target).unwrap();
        assert_eq!(summary.copied, 1);
        assert!(target.join("a/manifests/secret.yaml").is_file());
    }
}
