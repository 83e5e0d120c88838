use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::RevisionSelector;
use crate::error::VcsError;
use crate::types::RevisionId;

/// How a raw backend diff entry classifies a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawChangeKind {
    Added,
    Removed,
    Modified,
    /// New file copied from an existing one; normalizes to an addition
    Copied,
    /// Move reported by the backend's own rename detector
    Renamed,
}

/// One entry of a backend-native change list. Paths are relative to the
/// repository root; `old_path` is set only for renames.
#[derive(Debug, Clone)]
pub struct RawChange {
    pub kind: RawChangeKind,
    pub path: PathBuf,
    pub old_path: Option<PathBuf>,
}

/// Commit metadata as reported by a backend.
///
/// Author, message and timestamp stay optional here: their absence is a
/// consistency violation diagnosed by the model builder, not something a
/// backend silently papers over.
#[derive(Debug, Clone)]
pub struct CommitMetadata {
    pub id: RevisionId,
    pub author: Option<String>,
    pub message: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub parent_ids: Vec<RevisionId>,
}

/// Per-backend rename detection settings
#[derive(Debug, Clone, Copy)]
pub struct RenameConfig {
    /// Whether raw changes already carry backend-detected renames
    pub native: bool,
    /// Minimum content-similarity score for the generic recovery pass
    pub threshold: f32,
}

/// The per-backend strategy interface.
///
/// One implementation per backend; the engine composes exactly one of them.
/// Not `Sync` because git2::Repository is not; the engine serializes all
/// calls by construction.
pub trait Backend: Send {
    /// Materialize the repository into the target directory. Called exactly
    /// once, before any other operation.
    fn initialize(&self) -> Result<(), VcsError>;

    /// Reject selectors the backend cannot express (malformed ids and the
    /// like) before any state transition. Clamping rules are applied later,
    /// in `list_revisions`; they are not errors.
    fn validate_selector(&self, selector: &RevisionSelector) -> Result<(), VcsError>;

    /// Resolve the selector into revision ids, oldest first regardless of
    /// the backend's native log order. An empty history or a selector that
    /// matches nothing yields an empty list, not an error.
    fn list_revisions(&self, selector: &RevisionSelector) -> Result<Vec<RevisionId>, VcsError>;

    /// Materialize the given revision's tree into the target directory,
    /// overwriting prior contents. Idempotent; no partial checkout is
    /// observable to callers.
    fn checkout(&self, revision: &RevisionId) -> Result<(), VcsError>;

    /// Per-file change classification between two revisions, restricted to
    /// files under the configured root filter. Never called for the first
    /// delivered revision; the engine substitutes the full file listing.
    fn raw_changes(
        &self,
        from: &RevisionId,
        to: &RevisionId,
    ) -> Result<Vec<RawChange>, VcsError>;

    /// File content at a historical revision, without requiring that
    /// revision to be checked out and without touching the working copy.
    fn read_bytes(&self, path: &Path, revision: &RevisionId) -> Result<Vec<u8>, VcsError>;

    /// Author, message, timestamp and parent ids for a revision
    fn commit_metadata(&self, revision: &RevisionId) -> Result<CommitMetadata, VcsError>;

    /// Name of the backend's own metadata directory inside the working
    /// copy (excluded from file listings), if it has one
    fn metadata_dir(&self) -> Option<&'static str>;

    fn rename_config(&self) -> RenameConfig;
}

/// Whether a repo-relative path falls under the configured root filter
pub(crate) fn under_root(path: &Path, root: Option<&str>) -> bool {
    match root {
        None => true,
        Some(root) => path.starts_with(root),
    }
}

/// Slice an oldest-first revision list by an ordinal [start, end) range
pub(crate) fn apply_ordinal(ids: Vec<RevisionId>, start: usize, end: usize) -> Vec<RevisionId> {
    if start >= ids.len() {
        return Vec::new();
    }
    let end = end.min(ids.len());
    ids[start..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_root() {
        assert!(under_root(Path::new("src/a.rs"), None));
        assert!(under_root(Path::new("src/a.rs"), Some("src")));
        assert!(!under_root(Path::new("doc/a.md"), Some("src")));
        assert!(!under_root(Path::new("srcx/a.rs"), Some("src")));
    }

    #[test]
    fn test_apply_ordinal() {
        let ids: Vec<RevisionId> = ["a", "b", "c"].iter().map(|s| (*s).into()).collect();
        assert_eq!(apply_ordinal(ids.clone(), 0, 3).len(), 3);
        assert_eq!(apply_ordinal(ids.clone(), 1, 2), vec![RevisionId::from("b")]);
        assert_eq!(apply_ordinal(ids.clone(), 1, 10).len(), 2);
        assert!(apply_ordinal(ids, 5, 9).is_empty());
    }
}
