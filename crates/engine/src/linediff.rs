//! Minimal line edit scripts between two line sequences.
//!
//! Thin layer over the `similar` crate's Myers diff: raw diff ops are folded
//! into hunks, each stating a deleted run in the old file and/or an inserted
//! run in the new one. Applying all hunks forward transforms old into new;
//! applying them backward transforms new into old.
//!
//! Line numbers are 1-based. An empty file contributes zero lines, not one
//! empty line.

use similar::{capture_diff_slices, Algorithm, DiffOp};

use crate::types::{LineChange, LineChangeKind};

/// One contiguous edit: a deleted run starting at `old_start` and/or an
/// inserted run starting at `new_start` (both 1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub deleted: Vec<String>,
    pub new_start: usize,
    pub inserted: Vec<String>,
}

/// Split raw content into lines for diffing. Lossy on invalid UTF-8.
pub fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Compute the minimal edit script between two line sequences
pub fn diff_lines(old: &[String], new: &[String]) -> Vec<Hunk> {
    let ops = capture_diff_slices(Algorithm::Myers, old, new);
    let mut hunks = Vec::new();
    for op in ops {
        match op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_index,
                old_len,
                new_index,
            } => hunks.push(Hunk {
                old_start: old_index + 1,
                deleted: old[old_index..old_index + old_len].to_vec(),
                new_start: new_index + 1,
                inserted: Vec::new(),
            }),
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => hunks.push(Hunk {
                old_start: old_index + 1,
                deleted: Vec::new(),
                new_start: new_index + 1,
                inserted: new[new_index..new_index + new_len].to_vec(),
            }),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => hunks.push(Hunk {
                old_start: old_index + 1,
                deleted: old[old_index..old_index + old_len].to_vec(),
                new_start: new_index + 1,
                inserted: new[new_index..new_index + new_len].to_vec(),
            }),
        }
    }
    hunks
}

/// Apply the hunks to the old sequence, yielding the new one
pub fn apply_forward(old: &[String], hunks: &[Hunk]) -> Vec<String> {
    let mut result = Vec::new();
    let mut pos = 0;
    for hunk in hunks {
        let stop = hunk.old_start - 1;
        result.extend_from_slice(&old[pos..stop]);
        pos = stop + hunk.deleted.len();
        result.extend(hunk.inserted.iter().cloned());
    }
    result.extend_from_slice(&old[pos..]);
    result
}

/// Apply the hunks to the new sequence in reverse, yielding the old one
pub fn apply_backward(new: &[String], hunks: &[Hunk]) -> Vec<String> {
    let mut result = Vec::new();
    let mut pos = 0;
    for hunk in hunks {
        let stop = hunk.new_start - 1;
        result.extend_from_slice(&new[pos..stop]);
        pos = stop + hunk.inserted.len();
        result.extend(hunk.deleted.iter().cloned());
    }
    result.extend_from_slice(&new[pos..]);
    result
}

/// Flatten hunks into ordered insert/delete line records. Deletions carry
/// old-file line numbers, insertions new-file line numbers.
pub fn to_line_changes(hunks: &[Hunk]) -> Vec<LineChange> {
    let mut changes = Vec::new();
    for hunk in hunks {
        for (offset, line) in hunk.deleted.iter().enumerate() {
            changes.push(LineChange {
                kind: LineChangeKind::Delete,
                line: hunk.old_start + offset,
                content: line.clone(),
            });
        }
        for (offset, line) in hunk.inserted.iter().enumerate() {
            changes.push(LineChange {
                kind: LineChangeKind::Insert,
                line: hunk.new_start + offset,
                content: line.clone(),
            });
        }
    }
    changes
}

/// Content-similarity score in [0, 1] over two raw byte buffers, computed
/// on their line sequences. Identical buffers score 1.0.
pub(crate) fn similarity(old: &[u8], new: &[u8]) -> f32 {
    if old == new {
        return 1.0;
    }
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    if old_lines.is_empty() && new_lines.is_empty() {
        return 1.0;
    }
    let ops = capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines);
    similar::get_diff_ratio(&ops, old_lines.len(), new_lines.len())
}
