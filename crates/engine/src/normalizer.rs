//! Normalization of backend-native change lists into canonical `Changes`.
//!
//! Classification first (copies count as additions), then rename recovery:
//! backend-detected renames pass through, and a generic content-similarity
//! pass pairs the remaining removed/added files whose score reaches the
//! backend's threshold. Once a path is consumed by a relocation it is not
//! eligible for another pairing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::VcsError;
use crate::linediff;
use crate::traits::{RawChange, RawChangeKind};
use crate::types::Changes;

/// Loads repo-relative file content for similarity scoring. The old side
/// reads at the previous revision, the new side at the current one.
pub(crate) type ContentLoader<'a> = &'a dyn Fn(&Path) -> Result<Vec<u8>, VcsError>;

pub(crate) fn normalize(
    raw: Vec<RawChange>,
    target: &Path,
    threshold: f32,
    old_content: ContentLoader<'_>,
    new_content: ContentLoader<'_>,
) -> Result<Changes, VcsError> {
    let mut added: Vec<PathBuf> = Vec::new();
    let mut removed: Vec<PathBuf> = Vec::new();
    let mut modified: Vec<PathBuf> = Vec::new();
    let mut relocated: Vec<(PathBuf, PathBuf)> = Vec::new();

    for change in raw {
        match change.kind {
            RawChangeKind::Added | RawChangeKind::Copied => added.push(change.path),
            RawChangeKind::Removed => removed.push(change.path),
            RawChangeKind::Modified => modified.push(change.path),
            RawChangeKind::Renamed => {
                let old = change.old_path.ok_or_else(|| {
                    VcsError::consistency(format!(
                        "rename of '{}' reported without an old path",
                        change.path.display()
                    ))
                })?;
                relocated.push((old, change.path));
            }
        }
    }

    recover_renames(
        &mut added,
        &mut removed,
        &mut relocated,
        threshold,
        old_content,
        new_content,
    )?;

    let changes = Changes {
        added: added.into_iter().map(|p| target.join(p)).collect(),
        removed: removed.into_iter().map(|p| target.join(p)).collect(),
        modified: modified.into_iter().map(|p| target.join(p)).collect(),
        relocated: relocated
            .into_iter()
            .map(|(old, new)| (target.join(old), target.join(new)))
            .collect(),
    };
    changes.validate()?;
    Ok(changes)
}

/// Pair removed/added files by content similarity, best score first
fn recover_renames(
    added: &mut Vec<PathBuf>,
    removed: &mut Vec<PathBuf>,
    relocated: &mut Vec<(PathBuf, PathBuf)>,
    threshold: f32,
    old_content: ContentLoader<'_>,
    new_content: ContentLoader<'_>,
) -> Result<(), VcsError> {
    if added.is_empty() || removed.is_empty() {
        return Ok(());
    }

    let mut old_bytes: HashMap<PathBuf, Vec<u8>> = HashMap::new();
    for path in removed.iter() {
        old_bytes.insert(path.clone(), old_content(path)?);
    }
    let mut new_bytes: HashMap<PathBuf, Vec<u8>> = HashMap::new();
    for path in added.iter() {
        new_bytes.insert(path.clone(), new_content(path)?);
    }

    let mut candidates: Vec<(f32, PathBuf, PathBuf)> = Vec::new();
    for old_path in removed.iter() {
        for new_path in added.iter() {
            let score = linediff::similarity(&old_bytes[old_path], &new_bytes[new_path]);
            if score >= threshold {
                candidates.push((score, old_path.clone(), new_path.clone()));
            }
        }
    }
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    for (score, old_path, new_path) in candidates {
        let still_removed = removed.iter().position(|p| p == &old_path);
        let still_added = added.iter().position(|p| p == &new_path);
        if let (Some(old_idx), Some(new_idx)) = (still_removed, still_added) {
            debug!(
                old = %old_path.display(),
                new = %new_path.display(),
                score,
                "recovered relocation"
            );
            removed.remove(old_idx);
            added.remove(new_idx);
            relocated.push((old_path, new_path));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: RawChangeKind, path: &str) -> RawChange {
        RawChange {
            kind,
            path: PathBuf::from(path),
            old_path: None,
        }
    }

    fn loader(contents: Vec<(&str, &[u8])>) -> impl Fn(&Path) -> Result<Vec<u8>, VcsError> {
        let map: HashMap<PathBuf, Vec<u8>> = contents
            .into_iter()
            .map(|(path, bytes)| (PathBuf::from(path), bytes.to_vec()))
            .collect();
        move |path: &Path| {
            map.get(path)
                .cloned()
                .ok_or_else(|| VcsError::content_not_found(path, "test"))
        }
    }

    fn no_content(_: &Path) -> Result<Vec<u8>, VcsError> {
        panic!("content must not be loaded for this case");
    }

    #[test]
    fn test_classification() {
        let target = Path::new("/t");
        let raw_changes = vec![
            raw(RawChangeKind::Added, "new.txt"),
            raw(RawChangeKind::Removed, "gone.txt"),
            raw(RawChangeKind::Modified, "edited.txt"),
            raw(RawChangeKind::Copied, "copy.txt"),
        ];
        let old = loader(vec![("gone.txt", b"completely unrelated\n")]);
        let new = loader(vec![
            ("new.txt", b"fresh content\n"),
            ("copy.txt", b"other content\n"),
        ]);
        let changes = normalize(raw_changes, target, 0.7, &old, &new).unwrap();
        assert_eq!(changes.added.len(), 2);
        assert_eq!(changes.removed, vec![PathBuf::from("/t/gone.txt")]);
        assert_eq!(changes.modified, vec![PathBuf::from("/t/edited.txt")]);
        assert!(changes.relocated.is_empty());
        changes.validate().unwrap();
    }

    #[test]
    fn test_identical_content_becomes_relocation() {
        let target = Path::new("/t");
        let raw_changes = vec![
            raw(RawChangeKind::Removed, "old.txt"),
            raw(RawChangeKind::Added, "new.txt"),
        ];
        let old = loader(vec![("old.txt", b"line one\nline two\n")]);
        let new = loader(vec![("new.txt", b"line one\nline two\n")]);
        let changes = normalize(raw_changes, target, 0.7, &old, &new).unwrap();
        assert!(changes.added.is_empty());
        assert!(changes.removed.is_empty());
        assert_eq!(
            changes.relocated,
            vec![(PathBuf::from("/t/old.txt"), PathBuf::from("/t/new.txt"))]
        );
    }

    #[test]
    fn test_dissimilar_content_stays_add_remove() {
        let target = Path::new("/t");
        let raw_changes = vec![
            raw(RawChangeKind::Removed, "old.txt"),
            raw(RawChangeKind::Added, "new.txt"),
        ];
        let old = loader(vec![("old.txt", b"alpha\nbeta\n")]);
        let new = loader(vec![("new.txt", b"gamma\ndelta\n")]);
        let changes = normalize(raw_changes, target, 0.7, &old, &new).unwrap();
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.removed.len(), 1);
        assert!(changes.relocated.is_empty());
    }

    #[test]
    fn test_best_scoring_pair_wins() {
        let target = Path::new("/t");
        let raw_changes = vec![
            raw(RawChangeKind::Removed, "r1.txt"),
            raw(RawChangeKind::Removed, "r2.txt"),
            raw(RawChangeKind::Added, "a1.txt"),
            raw(RawChangeKind::Added, "a2.txt"),
        ];
        // r1 matches a1 exactly and a2 partially; r2 matches a2 partially.
        let old = loader(vec![
            ("r1.txt", b"a\nb\nc\nd\n"),
            ("r2.txt", b"a\nb\nx\ny\n"),
        ]);
        let new = loader(vec![
            ("a1.txt", b"a\nb\nc\nd\n"),
            ("a2.txt", b"a\nb\nx\nz\n"),
        ]);
        let changes = normalize(raw_changes, target, 0.5, &old, &new).unwrap();
        assert_eq!(changes.relocated.len(), 2);
        assert!(changes
            .relocated
            .contains(&(PathBuf::from("/t/r1.txt"), PathBuf::from("/t/a1.txt"))));
        assert!(changes
            .relocated
            .contains(&(PathBuf::from("/t/r2.txt"), PathBuf::from("/t/a2.txt"))));
    }

    #[test]
    fn test_consumed_path_not_paired_twice() {
        let target = Path::new("/t");
        let raw_changes = vec![
            raw(RawChangeKind::Removed, "r1.txt"),
            raw(RawChangeKind::Removed, "r2.txt"),
            raw(RawChangeKind::Added, "a1.txt"),
        ];
        let old = loader(vec![
            ("r1.txt", b"same\ncontent\n"),
            ("r2.txt", b"same\ncontent\n"),
        ]);
        let new = loader(vec![("a1.txt", b"same\ncontent\n")]);
        let changes = normalize(raw_changes, target, 0.7, &old, &new).unwrap();
        assert_eq!(changes.relocated.len(), 1);
        assert_eq!(changes.removed.len(), 1);
        assert!(changes.added.is_empty());
        changes.validate().unwrap();
    }

    #[test]
    fn test_native_rename_passes_through() {
        let target = Path::new("/t");
        let raw_changes = vec![RawChange {
            kind: RawChangeKind::Renamed,
            path: PathBuf::from("new.txt"),
            old_path: Some(PathBuf::from("old.txt")),
        }];
        let changes = normalize(raw_changes, target, 0.7, &no_content, &no_content).unwrap();
        assert_eq!(
            changes.relocated,
            vec![(PathBuf::from("/t/old.txt"), PathBuf::from("/t/new.txt"))]
        );
    }

    #[test]
    fn test_rename_without_old_path_is_fatal() {
        let target = Path::new("/t");
        let raw_changes = vec![raw(RawChangeKind::Renamed, "new.txt")];
        let err = normalize(raw_changes, target, 0.7, &no_content, &no_content).unwrap_err();
        assert!(matches!(err, VcsError::ModelConsistency(_)));
    }
}
