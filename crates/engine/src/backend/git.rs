//! Git backend built on git2.
//!
//! The repository is cloned into the target directory on initialization;
//! revisions are materialized with a forced tree checkout plus a detached
//! HEAD, so the working copy always matches exactly one commit.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use git2::build::CheckoutBuilder;
use git2::{BranchType, Delta, DiffFindOptions, Oid, Repository, Sort};
use tracing::info;

use crate::config::RevisionSelector;
use crate::error::VcsError;
use crate::traits::{
    apply_ordinal, under_root, Backend, CommitMetadata, RawChange, RawChangeKind, RenameConfig,
};
use crate::types::RevisionId;

const RENAME_THRESHOLD: f32 = 0.5;

pub struct GitBackend {
    locator: String,
    target: PathBuf,
    root: Option<String>,
    branch: Option<String>,
    repo: Mutex<Option<Repository>>,
}

impl GitBackend {
    pub fn new(
        locator: String,
        target: PathBuf,
        root: Option<String>,
        branch: Option<String>,
    ) -> Self {
        Self {
            locator,
            target,
            root,
            branch,
            repo: Mutex::new(None),
        }
    }

    /// A Git revision id is a 5 to 40 character hex string
    pub fn is_valid_revision_id(id: &str) -> bool {
        (5..=40).contains(&id.len()) && id.chars().all(|c| c.is_ascii_hexdigit())
    }

    fn with_repo<R>(
        &self,
        f: impl FnOnce(&Repository) -> Result<R, VcsError>,
    ) -> Result<R, VcsError> {
        let guard = self
            .repo
            .lock()
            .map_err(|_| VcsError::Backend("repository lock poisoned".into()))?;
        let repo = guard
            .as_ref()
            .ok_or_else(|| VcsError::Backend("repository not initialized".into()))?;
        f(repo)
    }

    /// Tip commit of the configured branch, or HEAD when none is set
    fn tip(&self, repo: &Repository) -> Result<Oid, VcsError> {
        if let Some(branch) = &self.branch {
            let local = repo.find_branch(branch, BranchType::Local);
            let found = match local {
                Ok(b) => b,
                Err(_) => repo
                    .find_branch(&format!("origin/{branch}"), BranchType::Remote)
                    .map_err(|_| {
                        VcsError::Backend(format!("branch '{branch}' not found"))
                    })?,
            };
            return found
                .get()
                .target()
                .ok_or_else(|| VcsError::Backend(format!("branch '{branch}' has no target")));
        }
        let head = repo.head().map_err(VcsError::backend)?;
        head.target()
            .ok_or_else(|| VcsError::Backend("HEAD has no target".into()))
    }

    /// The full history below the tip, oldest first, with commit times
    fn full_history(&self, repo: &Repository) -> Result<Vec<(Oid, i64)>, VcsError> {
        let tip = match self.tip(repo) {
            Ok(tip) => tip,
            // An unborn HEAD means an empty history, not an error.
            Err(_) if self.branch.is_none() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut revwalk = repo.revwalk().map_err(VcsError::backend)?;
        revwalk
            .set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)
            .map_err(VcsError::backend)?;
        revwalk.push(tip).map_err(VcsError::backend)?;

        let mut history = Vec::new();
        for oid in revwalk {
            let oid = oid.map_err(VcsError::backend)?;
            let commit = repo.find_commit(oid).map_err(VcsError::backend)?;
            history.push((oid, commit.time().seconds()));
        }
        Ok(history)
    }

    fn commit_oid(id: &RevisionId) -> Result<Oid, VcsError> {
        Oid::from_str(id.as_str())
            .map_err(|_| VcsError::Backend(format!("invalid commit id: {id}")))
    }
}

// ============================================================================
// Backend Implementation
// ============================================================================

impl Backend for GitBackend {
    fn initialize(&self) -> Result<(), VcsError> {
        info!(repository = %self.locator, dest = %self.target.display(), "cloning");
        let repo = Repository::clone(&self.locator, &self.target).map_err(VcsError::backend)?;
        let mut guard = self
            .repo
            .lock()
            .map_err(|_| VcsError::Backend("repository lock poisoned".into()))?;
        *guard = Some(repo);
        Ok(())
    }

    fn validate_selector(&self, selector: &RevisionSelector) -> Result<(), VcsError> {
        if let RevisionSelector::IdRange { from, to } = selector {
            for id in [from, to] {
                if !Self::is_valid_revision_id(id) {
                    return Err(VcsError::config(format!(
                        "'{id}' is not a Git revision id (5 to 40 hex characters)"
                    )));
                }
            }
        }
        Ok(())
    }

    fn list_revisions(&self, selector: &RevisionSelector) -> Result<Vec<RevisionId>, VcsError> {
        self.with_repo(|repo| {
            let history = self.full_history(repo)?;
            let ids = |entries: &[(Oid, i64)]| {
                entries
                    .iter()
                    .map(|(oid, _)| RevisionId::from(oid.to_string()))
                    .collect::<Vec<_>>()
            };
            Ok(match selector {
                RevisionSelector::All => ids(&history),
                RevisionSelector::DateRange { since, until } => {
                    let range = since.timestamp()..=until.timestamp();
                    let filtered: Vec<(Oid, i64)> = history
                        .into_iter()
                        .filter(|(_, time)| range.contains(time))
                        .collect();
                    ids(&filtered)
                }
                RevisionSelector::IdRange { from, to } => {
                    let from = from.to_ascii_lowercase();
                    let to = to.to_ascii_lowercase();
                    let all = ids(&history);
                    let start = all.iter().position(|id| id.as_str().starts_with(&from));
                    let end = all.iter().position(|id| id.as_str().starts_with(&to));
                    match (start, end) {
                        (Some(start), Some(end)) if start <= end => all[start..=end].to_vec(),
                        _ => Vec::new(),
                    }
                }
                RevisionSelector::OrdinalRange { start, end } => {
                    apply_ordinal(ids(&history), *start, *end)
                }
            })
        })
    }

    fn checkout(&self, revision: &RevisionId) -> Result<(), VcsError> {
        self.with_repo(|repo| {
            let oid = Self::commit_oid(revision)?;
            let commit = repo.find_commit(oid).map_err(VcsError::backend)?;

            let mut checkout = CheckoutBuilder::new();
            checkout.force().remove_untracked(true);
            repo.checkout_tree(commit.as_object(), Some(&mut checkout))
                .map_err(VcsError::backend)?;
            repo.set_head_detached(oid).map_err(VcsError::backend)?;
            Ok(())
        })
    }

    fn raw_changes(
        &self,
        from: &RevisionId,
        to: &RevisionId,
    ) -> Result<Vec<RawChange>, VcsError> {
        self.with_repo(|repo| {
            let from_commit = repo
                .find_commit(Self::commit_oid(from)?)
                .map_err(VcsError::backend)?;
            let to_commit = repo
                .find_commit(Self::commit_oid(to)?)
                .map_err(VcsError::backend)?;

            let from_tree = from_commit.tree().map_err(VcsError::backend)?;
            let to_tree = to_commit.tree().map_err(VcsError::backend)?;

            let mut diff = repo
                .diff_tree_to_tree(Some(&from_tree), Some(&to_tree), None)
                .map_err(VcsError::backend)?;

            let mut find = DiffFindOptions::new();
            find.renames(true)
                .rename_threshold((RENAME_THRESHOLD * 100.0) as u16);
            diff.find_similar(Some(&mut find)).map_err(VcsError::backend)?;

            let mut changes = Vec::new();
            for delta in diff.deltas() {
                let path = delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .ok_or_else(|| VcsError::Backend("diff delta without a path".into()))?
                    .to_path_buf();
                if !under_root(&path, self.root.as_deref()) {
                    continue;
                }

                let (kind, old_path) = match delta.status() {
                    Delta::Added => (RawChangeKind::Added, None),
                    Delta::Deleted => (RawChangeKind::Removed, None),
                    Delta::Modified | Delta::Typechange => (RawChangeKind::Modified, None),
                    Delta::Copied => (RawChangeKind::Copied, None),
                    Delta::Renamed => (
                        RawChangeKind::Renamed,
                        delta.old_file().path().map(Path::to_path_buf),
                    ),
                    _ => continue,
                };
                changes.push(RawChange {
                    kind,
                    path,
                    old_path,
                });
            }
            Ok(changes)
        })
    }

    fn read_bytes(&self, path: &Path, revision: &RevisionId) -> Result<Vec<u8>, VcsError> {
        self.with_repo(|repo| {
            let commit = repo
                .find_commit(Self::commit_oid(revision)?)
                .map_err(VcsError::backend)?;
            let tree = commit.tree().map_err(VcsError::backend)?;
            let entry = tree.get_path(path).map_err(|e| {
                if e.code() == git2::ErrorCode::NotFound {
                    VcsError::content_not_found(path, revision.as_str())
                } else {
                    VcsError::backend(e)
                }
            })?;
            let object = entry.to_object(repo).map_err(VcsError::backend)?;
            let blob = object
                .into_blob()
                .map_err(|_| VcsError::content_not_found(path, revision.as_str()))?;
            Ok(blob.content().to_vec())
        })
    }

    fn commit_metadata(&self, revision: &RevisionId) -> Result<CommitMetadata, VcsError> {
        self.with_repo(|repo| {
            let commit = repo
                .find_commit(Self::commit_oid(revision)?)
                .map_err(VcsError::backend)?;

            let timestamp: Option<DateTime<Utc>> =
                DateTime::from_timestamp(commit.time().seconds(), 0);
            let author = commit.author().name().map(String::from);
            let message = commit.message().map(String::from);
            let parent_ids = commit
                .parent_ids()
                .map(|oid| RevisionId::from(oid.to_string()))
                .collect();

            Ok(CommitMetadata {
                id: RevisionId::from(commit.id().to_string()),
                author,
                message,
                timestamp,
                parent_ids,
            })
        })
    }

    fn metadata_dir(&self) -> Option<&'static str> {
        Some(".git")
    }

    fn rename_config(&self) -> RenameConfig {
        RenameConfig {
            native: true,
            threshold: RENAME_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_id_validation() {
        assert!(GitBackend::is_valid_revision_id("abc12"));
        assert!(GitBackend::is_valid_revision_id(
            "0123456789abcdef0123456789abcdef01234567"
        ));
        assert!(GitBackend::is_valid_revision_id("DEADBEEF"));
        assert!(!GitBackend::is_valid_revision_id("abcd"));
        assert!(!GitBackend::is_valid_revision_id(
            "0123456789abcdef0123456789abcdef012345678"
        ));
        assert!(!GitBackend::is_valid_revision_id("xyz123"));
        assert!(!GitBackend::is_valid_revision_id(""));
    }

    #[test]
    fn test_id_range_selector_validation() {
        let backend = GitBackend::new(
            "/some/repo".into(),
            PathBuf::from("/tmp/out"),
            None,
            None,
        );
        let valid = RevisionSelector::IdRange {
            from: "abc12".into(),
            to: "def3456".into(),
        };
        assert!(backend.validate_selector(&valid).is_ok());

        let invalid = RevisionSelector::IdRange {
            from: "not-hex".into(),
            to: "def3456".into(),
        };
        assert!(matches!(
            backend.validate_selector(&invalid),
            Err(VcsError::Configuration(_))
        ));
    }
}
