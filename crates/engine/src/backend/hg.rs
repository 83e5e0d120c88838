//! Mercurial backend wrapping the `hg` command-line client.
//!
//! Revision ids are local revision numbers (negative numbers are clamped to
//! 0). Listing goes through one templated `log` call; metadata is parsed
//! from `log -Tjson`; change sets come from `status --rev --rev -C`, whose
//! copy reporting doubles as a native rename detector when the copy source
//! is removed in the same range.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::backend::cli::CliRunner;
use crate::config::RevisionSelector;
use crate::error::VcsError;
use crate::traits::{
    apply_ordinal, under_root, Backend, CommitMetadata, RawChange, RawChangeKind, RenameConfig,
};
use crate::types::RevisionId;

const RENAME_THRESHOLD: f32 = 0.6;

/// The fields of one `hg log -Tjson` entry this backend consumes
#[derive(Debug, Clone, Deserialize)]
struct HgLogEntry {
    rev: i64,
    user: Option<String>,
    desc: Option<String>,
    /// [seconds since epoch, timezone offset]
    date: Option<Vec<f64>>,
}

pub struct HgBackend {
    locator: String,
    target: PathBuf,
    root: Option<String>,
    cli: CliRunner,
}

impl HgBackend {
    pub fn new(locator: String, target: PathBuf, root: Option<String>) -> Self {
        Self {
            locator,
            target,
            root,
            cli: CliRunner::new("hg"),
        }
    }

    pub fn is_available() -> bool {
        CliRunner::new("hg").is_available()
    }

    /// Negative revision numbers are clamped to 0
    fn clamp_revision(revision: i64) -> u64 {
        revision.max(0) as u64
    }

    fn parse_revision_number(id: &str) -> Result<i64, VcsError> {
        id.trim().parse::<i64>().map_err(|_| {
            VcsError::config(format!("'{id}' is not a Mercurial revision number"))
        })
    }

    /// Lines of `hg log -T "{rev} {date|hgdate}\n"`: revision number plus
    /// commit time in seconds, oldest first
    fn parse_rev_dates(output: &str) -> Vec<(u64, i64)> {
        let mut entries: Vec<(u64, i64)> = output
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let rev = fields.next()?.parse::<u64>().ok()?;
                let seconds = fields.next()?.parse::<i64>().ok()?;
                Some((rev, seconds))
            })
            .collect();
        entries.sort_unstable();
        entries
    }

    /// Entries of `hg status --rev A --rev B -C`. Copy sources are reported
    /// indented under their destination; a source that is also removed in
    /// the range makes the pair a rename.
    fn parse_status(output: &str) -> Vec<RawChange> {
        #[derive(Debug)]
        struct Entry {
            status: char,
            path: PathBuf,
            source: Option<PathBuf>,
        }

        let mut entries: Vec<Entry> = Vec::new();
        for line in output.lines() {
            if line.len() < 3 {
                continue;
            }
            if let Some(source) = line.strip_prefix("  ") {
                if let Some(last) = entries.last_mut() {
                    last.source = Some(PathBuf::from(source.trim()));
                }
                continue;
            }
            let status = line.as_bytes()[0] as char;
            let path = PathBuf::from(line[1..].trim());
            entries.push(Entry {
                status,
                path,
                source: None,
            });
        }

        let removed: std::collections::HashSet<PathBuf> = entries
            .iter()
            .filter(|e| e.status == 'R')
            .map(|e| e.path.clone())
            .collect();

        let mut renamed_sources = std::collections::HashSet::new();
        let mut changes = Vec::new();
        for entry in &entries {
            match entry.status {
                'M' => changes.push(RawChange {
                    kind: RawChangeKind::Modified,
                    path: entry.path.clone(),
                    old_path: None,
                }),
                'A' => match &entry.source {
                    Some(source) if removed.contains(source) => {
                        renamed_sources.insert(source.clone());
                        changes.push(RawChange {
                            kind: RawChangeKind::Renamed,
                            path: entry.path.clone(),
                            old_path: Some(source.clone()),
                        });
                    }
                    Some(_) => changes.push(RawChange {
                        kind: RawChangeKind::Copied,
                        path: entry.path.clone(),
                        old_path: None,
                    }),
                    None => changes.push(RawChange {
                        kind: RawChangeKind::Added,
                        path: entry.path.clone(),
                        old_path: None,
                    }),
                },
                _ => {}
            }
        }
        for entry in &entries {
            if entry.status == 'R' && !renamed_sources.contains(&entry.path) {
                changes.push(RawChange {
                    kind: RawChangeKind::Removed,
                    path: entry.path.clone(),
                    old_path: None,
                });
            }
        }
        changes
    }

    fn parse_log_json(output: &str) -> Result<HgLogEntry, VcsError> {
        let mut entries: Vec<HgLogEntry> = serde_json::from_str(output)
            .map_err(|e| VcsError::Backend(format!("unparsable hg log JSON: {e}")))?;
        entries
            .pop()
            .ok_or_else(|| VcsError::Backend("empty hg log JSON output".into()))
    }
}

// ============================================================================
// Backend Implementation
// ============================================================================

impl Backend for HgBackend {
    fn initialize(&self) -> Result<(), VcsError> {
        info!(repository = %self.locator, dest = %self.target.display(), "cloning");
        let parent = match self.target.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
            Some(parent) => parent,
            None => return Err(VcsError::Backend("target directory has no parent".into())),
        };
        let target = self
            .target
            .to_str()
            .ok_or_else(|| VcsError::Backend("target directory is not valid UTF-8".into()))?;
        self.cli
            .run(parent, ["clone", "--quiet", self.locator.as_str(), target])?;
        Ok(())
    }

    fn validate_selector(&self, selector: &RevisionSelector) -> Result<(), VcsError> {
        if let RevisionSelector::IdRange { from, to } = selector {
            let from = Self::clamp_revision(Self::parse_revision_number(from)?);
            let to = Self::clamp_revision(Self::parse_revision_number(to)?);
            if from > to {
                return Err(VcsError::config(format!(
                    "inverted revision range: {from} is after {to}"
                )));
            }
        }
        Ok(())
    }

    fn list_revisions(&self, selector: &RevisionSelector) -> Result<Vec<RevisionId>, VcsError> {
        let output = self
            .cli
            .run(&self.target, ["log", "-T", "{rev} {date|hgdate}\n"])?;
        let history = Self::parse_rev_dates(&output);

        let filtered: Vec<u64> = match selector {
            RevisionSelector::All | RevisionSelector::OrdinalRange { .. } => {
                history.into_iter().map(|(rev, _)| rev).collect()
            }
            RevisionSelector::IdRange { from, to } => {
                let from = Self::clamp_revision(Self::parse_revision_number(from)?);
                let to = Self::clamp_revision(Self::parse_revision_number(to)?);
                history
                    .into_iter()
                    .map(|(rev, _)| rev)
                    .filter(|rev| (from..=to).contains(rev))
                    .collect()
            }
            RevisionSelector::DateRange { since, until } => {
                let range = since.timestamp()..=until.timestamp();
                history
                    .into_iter()
                    .filter(|(_, seconds)| range.contains(seconds))
                    .map(|(rev, _)| rev)
                    .collect()
            }
        };

        let ids: Vec<RevisionId> = filtered
            .into_iter()
            .map(|rev| RevisionId::from(rev.to_string()))
            .collect();
        Ok(match selector {
            RevisionSelector::OrdinalRange { start, end } => apply_ordinal(ids, *start, *end),
            _ => ids,
        })
    }

    fn checkout(&self, revision: &RevisionId) -> Result<(), VcsError> {
        self.cli.run(
            &self.target,
            ["update", "--quiet", "--clean", "--rev", revision.as_str()],
        )?;
        Ok(())
    }

    fn raw_changes(
        &self,
        from: &RevisionId,
        to: &RevisionId,
    ) -> Result<Vec<RawChange>, VcsError> {
        let output = self.cli.run(
            &self.target,
            [
                "status",
                "--rev",
                from.as_str(),
                "--rev",
                to.as_str(),
                "-C",
            ],
        )?;
        Ok(Self::parse_status(&output)
            .into_iter()
            .filter(|change| under_root(&change.path, self.root.as_deref()))
            .collect())
    }

    fn read_bytes(&self, path: &Path, revision: &RevisionId) -> Result<Vec<u8>, VcsError> {
        let path_arg = path
            .to_str()
            .ok_or_else(|| VcsError::Backend("path is not valid UTF-8".into()))?;
        match self
            .cli
            .run_bytes(&self.target, ["cat", "-r", revision.as_str(), path_arg])
        {
            Ok(bytes) => Ok(bytes),
            Err(VcsError::Backend(message))
                if message.contains("no such file") || message.contains("not found") =>
            {
                Err(VcsError::content_not_found(path, revision.as_str()))
            }
            Err(other) => Err(other),
        }
    }

    fn commit_metadata(&self, revision: &RevisionId) -> Result<CommitMetadata, VcsError> {
        let output = self
            .cli
            .run(&self.target, ["log", "-r", revision.as_str(), "-Tjson"])?;
        let entry = Self::parse_log_json(&output)?;

        let parents_output = self.cli.run(
            &self.target,
            ["log", "-r", revision.as_str(), "-T", "{p1rev} {p2rev}"],
        )?;
        let parent_ids = parents_output
            .split_whitespace()
            .filter_map(|field| field.parse::<i64>().ok())
            .filter(|rev| *rev >= 0)
            .map(|rev| RevisionId::from(rev.to_string()))
            .collect();

        let timestamp: Option<DateTime<Utc>> = entry
            .date
            .as_ref()
            .and_then(|date| date.first())
            .and_then(|seconds| DateTime::from_timestamp(*seconds as i64, 0));

        Ok(CommitMetadata {
            id: RevisionId::from(entry.rev.to_string()),
            author: entry.user,
            message: entry.desc,
            timestamp,
            parent_ids,
        })
    }

    fn metadata_dir(&self) -> Option<&'static str> {
        Some(".hg")
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
    fn test_clamp_revision() {
        assert_eq!(HgBackend::clamp_revision(-7), 0);
        assert_eq!(HgBackend::clamp_revision(0), 0);
        assert_eq!(HgBackend::clamp_revision(3), 3);
    }

    #[test]
    fn test_parse_rev_dates_orders_oldest_first() {
        let output = "2 1588500000 0\n0 1588300000 0\n1 1588400000 0\n";
        assert_eq!(
            HgBackend::parse_rev_dates(output),
            vec![(0, 1588300000), (1, 1588400000), (2, 1588500000)]
        );
    }

    #[test]
    fn test_parse_status_plain_changes() {
        let output = "M b.txt\nA c.txt\nR a.txt\n";
        let changes = HgBackend::parse_status(output);
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].kind, RawChangeKind::Modified);
        assert_eq!(changes[1].kind, RawChangeKind::Added);
        assert_eq!(changes[2].kind, RawChangeKind::Removed);
        assert_eq!(changes[2].path, PathBuf::from("a.txt"));
    }

    #[test]
    fn test_parse_status_rename() {
        let output = "A d.txt\n  b.txt\nR b.txt\n";
        let changes = HgBackend::parse_status(output);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, RawChangeKind::Renamed);
        assert_eq!(changes[0].path, PathBuf::from("d.txt"));
        assert_eq!(changes[0].old_path, Some(PathBuf::from("b.txt")));
    }

    #[test]
    fn test_parse_status_copy_keeps_source() {
        let output = "A copy.txt\n  original.txt\n";
        let changes = HgBackend::parse_status(output);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, RawChangeKind::Copied);
        assert!(changes[0].old_path.is_none());
    }

    #[test]
    fn test_parse_log_json() {
        let output = r#"[
 {
  "rev": 2,
  "node": "3d0c8c7e5a1b9c2d4e6f8a0b1c2d3e4f5a6b7c8d",
  "branch": "default",
  "user": "Alice <alice@example.com>",
  "date": [1588334000, 0],
  "desc": "second commit",
  "parents": ["0000000000000000000000000000000000000000"]
 }
]"#;
        let entry = HgBackend::parse_log_json(output).unwrap();
        assert_eq!(entry.rev, 2);
        assert_eq!(entry.user.as_deref(), Some("Alice <alice@example.com>"));
        assert_eq!(entry.desc.as_deref(), Some("second commit"));
        assert_eq!(entry.date, Some(vec![1588334000.0, 0.0]));
    }

    #[test]
    fn test_inverted_id_range_rejected() {
        let backend = HgBackend::new("/repo".into(), PathBuf::from("/tmp/out"), None);
        let selector = RevisionSelector::IdRange {
            from: "5".into(),
            to: "2".into(),
        };
        assert!(matches!(
            backend.validate_selector(&selector),
            Err(VcsError::Configuration(_))
        ));
    }

    #[test]
    fn test_negative_range_clamps_instead_of_failing() {
        let backend = HgBackend::new("/repo".into(), PathBuf::from("/tmp/out"), None);
        let selector = RevisionSelector::IdRange {
            from: "-3".into(),
            to: "2".into(),
        };
        assert!(backend.validate_selector(&selector).is_ok());
    }
}
