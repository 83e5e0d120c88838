//! Degenerate single-snapshot backend over a plain directory.
//!
//! Materializes the source directory into the target once and exposes it as
//! one synthetic revision `"0"` with metadata derived from the directory
//! itself. Useful for running history-consuming tooling against code that
//! is not under version control.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;
use walkdir::WalkDir;

use crate::config::RevisionSelector;
use crate::error::VcsError;
use crate::traits::{Backend, CommitMetadata, RawChange, RenameConfig};
use crate::types::RevisionId;

const SNAPSHOT_REVISION: &str = "0";

pub struct SnapshotBackend {
    source: PathBuf,
    target: PathBuf,
}

impl SnapshotBackend {
    pub fn new(source: PathBuf, target: PathBuf) -> Self {
        Self { source, target }
    }

    fn snapshot_id() -> RevisionId {
        RevisionId::from(SNAPSHOT_REVISION)
    }
}

impl Backend for SnapshotBackend {
    fn initialize(&self) -> Result<(), VcsError> {
        if !self.source.is_dir() {
            return Err(VcsError::config(format!(
                "'{}' is not a directory",
                self.source.display()
            )));
        }
        info!(source = %self.source.display(), dest = %self.target.display(), "copying snapshot");
        for entry in WalkDir::new(&self.source) {
            let entry = entry.map_err(|e| VcsError::Backend(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(&self.source)
                .map_err(|e| VcsError::Backend(e.to_string()))?;
            let destination = self.target.join(relative);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&destination)?;
            } else if entry.file_type().is_file() {
                if let Some(parent) = destination.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(entry.path(), &destination)?;
            }
        }
        Ok(())
    }

    fn validate_selector(&self, _selector: &RevisionSelector) -> Result<(), VcsError> {
        Ok(())
    }

    fn list_revisions(&self, selector: &RevisionSelector) -> Result<Vec<RevisionId>, VcsError> {
        let matched = match selector {
            RevisionSelector::All | RevisionSelector::DateRange { .. } => true,
            RevisionSelector::IdRange { from, to } => {
                from == SNAPSHOT_REVISION || to == SNAPSHOT_REVISION
            }
            RevisionSelector::OrdinalRange { start, .. } => *start == 0,
        };
        Ok(if matched {
            vec![Self::snapshot_id()]
        } else {
            Vec::new()
        })
    }

    fn checkout(&self, revision: &RevisionId) -> Result<(), VcsError> {
        if revision != &Self::snapshot_id() {
            return Err(VcsError::Backend(format!(
                "unknown snapshot revision: {revision}"
            )));
        }
        // The snapshot is materialized once at initialization.
        Ok(())
    }

    fn raw_changes(
        &self,
        _from: &RevisionId,
        _to: &RevisionId,
    ) -> Result<Vec<RawChange>, VcsError> {
        // A single revision has no predecessor to diff against.
        Ok(Vec::new())
    }

    fn read_bytes(&self, path: &Path, revision: &RevisionId) -> Result<Vec<u8>, VcsError> {
        if revision != &Self::snapshot_id() {
            return Err(VcsError::content_not_found(path, revision.as_str()));
        }
        std::fs::read(self.target.join(path)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VcsError::content_not_found(path, revision.as_str())
            } else {
                e.into()
            }
        })
    }

    fn commit_metadata(&self, revision: &RevisionId) -> Result<CommitMetadata, VcsError> {
        if revision != &Self::snapshot_id() {
            return Err(VcsError::Backend(format!(
                "unknown snapshot revision: {revision}"
            )));
        }
        let modified: DateTime<Utc> = std::fs::metadata(&self.target)
            .and_then(|m| m.modified())
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(CommitMetadata {
            id: Self::snapshot_id(),
            author: Some("snapshot".into()),
            message: Some(String::new()),
            timestamp: Some(modified),
            parent_ids: Vec::new(),
        })
    }

    fn metadata_dir(&self) -> Option<&'static str> {
        None
    }

    fn rename_config(&self) -> RenameConfig {
        RenameConfig {
            native: false,
            threshold: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend() -> (TempDir, SnapshotBackend) {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        std::fs::create_dir_all(source.join("sub")).unwrap();
        std::fs::write(source.join("a.txt"), b"alpha\n").unwrap();
        std::fs::write(source.join("sub/b.txt"), b"beta\n").unwrap();
        let target = temp.path().join("target");
        (temp, SnapshotBackend::new(source, target))
    }

    #[test]
    fn test_initialize_copies_tree() {
        let (_temp, backend) = backend();
        backend.initialize().unwrap();
        assert_eq!(
            backend
                .read_bytes(Path::new("sub/b.txt"), &SnapshotBackend::snapshot_id())
                .unwrap(),
            b"beta\n"
        );
    }

    #[test]
    fn test_single_revision_listing() {
        let (_temp, backend) = backend();
        let all = backend.list_revisions(&RevisionSelector::All).unwrap();
        assert_eq!(all, vec![RevisionId::from("0")]);

        let out_of_range = backend
            .list_revisions(&RevisionSelector::OrdinalRange { start: 1, end: 5 })
            .unwrap();
        assert!(out_of_range.is_empty());
    }

    #[test]
    fn test_missing_content() {
        let (_temp, backend) = backend();
        backend.initialize().unwrap();
        let err = backend
            .read_bytes(Path::new("nope.txt"), &SnapshotBackend::snapshot_id())
            .unwrap_err();
        assert!(matches!(err, VcsError::ContentNotFound { .. }));
    }
}
