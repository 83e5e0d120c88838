//! Assembly of the domain objects delivered by one iteration step.
//!
//! Consistency violations here are fatal: a commit id that does not match
//! the requested revision, missing commit fields, or a change set that
//! references a predecessor the engine does not have all indicate a backend
//! adapter bug, never a transient condition.

use std::sync::Arc;

use crate::engine::EngineShared;
use crate::error::VcsError;
use crate::traits::CommitMetadata;
use crate::types::{Changes, Commit, FileChange, Revision, RevisionId, Version};

pub(crate) fn build_version(
    shared: &Arc<EngineShared>,
    metadata: CommitMetadata,
    revision: Revision,
    predecessor: Option<Revision>,
    changes: Changes,
) -> Result<Version, VcsError> {
    changes.validate()?;

    if metadata.id != *revision.id() {
        return Err(VcsError::consistency(format!(
            "backend reported commit {} for requested revision {}",
            metadata.id,
            revision.id()
        )));
    }
    let author = require(metadata.author, "author", revision.id())?;
    let message = require(metadata.message, "message", revision.id())?;
    let timestamp = require(metadata.timestamp, "timestamp", revision.id())?;

    let predecessor_id = predecessor.as_ref().map(|r| r.id().clone());
    let old_revision = || -> Result<RevisionId, VcsError> {
        predecessor_id.clone().ok_or_else(|| {
            VcsError::consistency(format!(
                "change set for revision {} references a missing predecessor",
                revision.id()
            ))
        })
    };

    let mut file_changes = Vec::new();
    for path in &changes.added {
        let file = shared.make_file(path.clone(), revision.id().clone())?;
        file_changes.push(FileChange::addition(file));
    }
    for path in &changes.removed {
        let file = shared.make_file(path.clone(), old_revision()?)?;
        file_changes.push(FileChange::removal(file));
    }
    for path in &changes.modified {
        let old = shared.make_file(path.clone(), old_revision()?)?;
        let new = shared.make_file(path.clone(), revision.id().clone())?;
        file_changes.push(FileChange::edit(old, new));
    }
    for (old_path, new_path) in &changes.relocated {
        let old = shared.make_file(old_path.clone(), old_revision()?)?;
        let new = shared.make_file(new_path.clone(), revision.id().clone())?;
        file_changes.push(FileChange::edit(old, new));
    }

    let commit = Commit {
        id: revision.id().clone(),
        author,
        message,
        timestamp,
        parent_ids: metadata.parent_ids,
        file_changes,
    };

    Ok(Version {
        predecessor,
        revision,
        commit,
    })
}

fn require<T>(value: Option<T>, field: &str, revision: &RevisionId) -> Result<T, VcsError> {
    value.ok_or_else(|| {
        VcsError::consistency(format!("backend reported no {field} for revision {revision}"))
    })
}
