use std::path::{Path, PathBuf};
use std::sync::Weak;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::EngineShared;
use crate::error::VcsError;
use crate::linediff;

/// Backend-native identifier of a single revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionId(String);

impl RevisionId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RevisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RevisionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RevisionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An immutable snapshot: a revision id plus the ordered set of files
/// present at that point. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct Revision {
    id: RevisionId,
    files: Vec<VcsFile>,
}

impl Revision {
    pub(crate) fn new(id: RevisionId, files: Vec<VcsFile>) -> Self {
        Self { id, files }
    }

    pub fn id(&self) -> &RevisionId {
        &self.id
    }

    /// Files present at this revision, ordered by relative path
    pub fn files(&self) -> &[VcsFile] {
        &self.files
    }
}

/// A file identity at a specific revision.
///
/// Two instances may share a relative path across different revisions; they
/// are distinct entities. Content and charset resolution are lazy and go
/// through a weak back-reference to the owning engine, so a file handle
/// never keeps a dropped engine alive.
#[derive(Debug, Clone)]
pub struct VcsFile {
    absolute: PathBuf,
    relative: PathBuf,
    revision: RevisionId,
    shared: Weak<EngineShared>,
}

impl VcsFile {
    pub(crate) fn new(
        absolute: PathBuf,
        relative: PathBuf,
        revision: RevisionId,
        shared: Weak<EngineShared>,
    ) -> Self {
        Self {
            absolute,
            relative,
            revision,
            shared,
        }
    }

    /// Absolute path under the engine's target directory
    pub fn absolute_path(&self) -> &Path {
        &self.absolute
    }

    /// Path relative to the target directory
    pub fn relative_path(&self) -> &Path {
        &self.relative
    }

    /// The revision this file identity belongs to
    pub fn revision_id(&self) -> &RevisionId {
        &self.revision
    }

    /// Read the file content at this file's revision.
    ///
    /// When the owning revision is the one currently checked out, this reads
    /// straight from the working directory. For any other revision the
    /// content is fetched through the backend's show-at-revision primitive,
    /// so the working copy is never touched.
    pub fn read_all_bytes(&self) -> Result<Vec<u8>, VcsError> {
        let shared = self.upgrade()?;
        if shared.is_current(&self.revision) {
            return Ok(std::fs::read(&self.absolute)?);
        }
        shared.read_historic(&self.relative, &self.revision)
    }

    /// Best-effort encoding guess for this file's content. Not
    /// authoritative; `None` when the content is not recognized.
    pub fn guess_charset(&self) -> Result<Option<&'static str>, VcsError> {
        let bytes = self.read_all_bytes()?;
        Ok(crate::charset::guess_charset(&bytes))
    }

    fn upgrade(&self) -> Result<std::sync::Arc<EngineShared>, VcsError> {
        self.shared
            .upgrade()
            .ok_or_else(|| VcsError::Backend("engine has been dropped".into()))
    }
}

/// Commit metadata plus the file changes attributed to it
#[derive(Debug, Clone)]
pub struct Commit {
    pub id: RevisionId,
    pub author: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Empty for the root commit, two or more for merges
    pub parent_ids: Vec<RevisionId>,
    pub file_changes: Vec<FileChange>,
}

impl Commit {
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() >= 2
    }
}

/// Kind of change applied to a single file between two revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileChangeKind {
    Addition,
    Removal,
    Modification,
    Relocation,
}

/// A single file change.
///
/// Exactly one of {new file only, old file only, both} holds: additions
/// carry only a new file, removals only an old file, modifications both at
/// the same relative path, relocations both at different paths.
#[derive(Debug, Clone)]
pub struct FileChange {
    old_file: Option<VcsFile>,
    new_file: Option<VcsFile>,
}

impl FileChange {
    pub(crate) fn addition(new_file: VcsFile) -> Self {
        Self {
            old_file: None,
            new_file: Some(new_file),
        }
    }

    pub(crate) fn removal(old_file: VcsFile) -> Self {
        Self {
            old_file: Some(old_file),
            new_file: None,
        }
    }

    pub(crate) fn edit(old_file: VcsFile, new_file: VcsFile) -> Self {
        Self {
            old_file: Some(old_file),
            new_file: Some(new_file),
        }
    }

    pub fn old_file(&self) -> Option<&VcsFile> {
        self.old_file.as_ref()
    }

    pub fn new_file(&self) -> Option<&VcsFile> {
        self.new_file.as_ref()
    }

    pub fn kind(&self) -> FileChangeKind {
        match (&self.old_file, &self.new_file) {
            (None, Some(_)) => FileChangeKind::Addition,
            (Some(_), None) => FileChangeKind::Removal,
            (Some(old), Some(new)) if old.relative_path() == new.relative_path() => {
                FileChangeKind::Modification
            }
            (Some(_), Some(_)) => FileChangeKind::Relocation,
            (None, None) => unreachable!("file change with neither side"),
        }
    }

    /// Compute the ordered insert/delete line records for this change.
    ///
    /// Only meaningful when both sides are present; additions and removals
    /// yield an empty list without touching any content.
    pub fn line_changes(&self) -> Result<Vec<LineChange>, VcsError> {
        let (old, new) = match (&self.old_file, &self.new_file) {
            (Some(old), Some(new)) => (old, new),
            _ => return Ok(Vec::new()),
        };
        let old_lines = linediff::split_lines(&old.read_all_bytes()?);
        let new_lines = linediff::split_lines(&new.read_all_bytes()?);
        let hunks = linediff::diff_lines(&old_lines, &new_lines);
        Ok(linediff::to_line_changes(&hunks))
    }
}

/// Kind of a single line record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineChangeKind {
    Insert,
    Delete,
}

/// One inserted or deleted line. Line numbers are 1-based; deletions are
/// numbered in the old file, insertions in the new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineChange {
    pub kind: LineChangeKind,
    pub line: usize,
    pub content: String,
}

/// Four-way classification of path differences between two revisions.
///
/// All paths are absolute under the engine's target directory. The four
/// collections are pairwise disjoint; `validate` enforces this.
#[derive(Debug, Clone, Default)]
pub struct Changes {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    /// (old path, new path) pairs recovered as relocations
    pub relocated: Vec<(PathBuf, PathBuf)>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && self.relocated.is_empty()
    }

    /// Check the disjointness invariant over all four collections
    pub fn validate(&self) -> Result<(), VcsError> {
        let mut seen = std::collections::HashSet::new();
        let buckets = self
            .added
            .iter()
            .chain(self.removed.iter())
            .chain(self.modified.iter())
            .chain(self.relocated.iter().map(|(old, _)| old))
            .chain(self.relocated.iter().map(|(_, new)| new));
        for path in buckets {
            if !seen.insert(path) {
                return Err(VcsError::consistency(format!(
                    "path '{}' appears in more than one change bucket",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// The unit yielded by one iteration step: a revision, its commit, and the
/// optional predecessor revision (absent only for the very first version).
#[derive(Debug, Clone)]
pub struct Version {
    pub predecessor: Option<Revision>,
    pub revision: Revision,
    pub commit: Commit,
}

impl Version {
    /// The file changes between the predecessor and this revision
    pub fn file_changes(&self) -> &[FileChange] {
        &self.commit.file_changes
    }
}
