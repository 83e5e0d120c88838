//! Subversion backend wrapping the `svn` command-line client.
//!
//! Handles checkout/update materialization, `log` based revision listing,
//! `diff --summarize` change sets and `cat` content access. Subversion has
//! no native rename detector; recovery relies on the generic similarity
//! pass. Revision numbers below 1 are clamped to 1, and dates before
//! 1980-01-01 to that floor, since the protocol has no earlier history.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use tracing::info;

use crate::backend::cli::CliRunner;
use crate::config::RevisionSelector;
use crate::error::VcsError;
use crate::traits::{
    apply_ordinal, under_root, Backend, CommitMetadata, RawChange, RawChangeKind, RenameConfig,
};
use crate::types::RevisionId;

const RENAME_THRESHOLD: f32 = 0.6;

/// One parsed `svn log` entry
#[derive(Debug, Clone, PartialEq, Eq)]
struct SvnLogEntry {
    revision: u64,
    author: Option<String>,
    date: Option<DateTime<Utc>>,
    message: String,
}

pub struct SvnBackend {
    locator: String,
    target: PathBuf,
    root: Option<String>,
    cli: CliRunner,
}

impl SvnBackend {
    pub fn new(locator: String, target: PathBuf, root: Option<String>) -> Self {
        Self {
            locator,
            target,
            root,
            cli: CliRunner::new("svn"),
        }
    }

    pub fn is_available() -> bool {
        CliRunner::new("svn").is_available()
    }

    /// Repository URL for the locator; local paths become file:// URLs
    fn url(&self) -> String {
        if self.locator.contains("://") {
            self.locator.clone()
        } else {
            format!("file://{}", self.locator)
        }
    }

    /// Revision numbers below 1 are clamped to 1
    fn clamp_revision(revision: i64) -> u64 {
        revision.max(1) as u64
    }

    /// Dates before the protocol floor are clamped to it
    fn clamp_date(date: DateTime<Utc>) -> DateTime<Utc> {
        let floor = Utc.with_ymd_and_hms(1980, 1, 1, 0, 0, 0).unwrap();
        date.max(floor)
    }

    fn parse_revision_number(id: &str) -> Result<i64, VcsError> {
        id.trim().trim_start_matches('r').parse::<i64>().map_err(|_| {
            VcsError::config(format!("'{id}' is not a Subversion revision number"))
        })
    }

    /// Revision numbers from `svn log --quiet`, oldest first
    fn parse_log_revisions(output: &str) -> Vec<u64> {
        let mut revisions: Vec<u64> = output
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                let rest = line.strip_prefix('r')?;
                let number = rest.split(' ').next()?.trim_end_matches('|').trim();
                number.parse::<u64>().ok()
            })
            .collect();
        revisions.sort_unstable();
        revisions.dedup();
        revisions
    }

    /// A single entry from non-quiet `svn log` output
    fn parse_log_entry(output: &str) -> Option<SvnLogEntry> {
        let mut lines = output.lines().filter(|l| !l.starts_with("----------"));
        let header = lines.next()?;
        let mut fields = header.split(" | ");

        let revision = fields.next()?.trim().strip_prefix('r')?.parse::<u64>().ok()?;
        let author = fields.next().map(|s| s.trim().to_string());
        let date = fields.next().and_then(|raw| {
            let raw = raw.split(" (").next()?.trim();
            DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z")
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        });

        let message = lines
            .skip_while(|l| l.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Some(SvnLogEntry {
            revision,
            author,
            date,
            message,
        })
    }

    /// Change entries from `svn diff --summarize` output
    fn parse_diff_summary(output: &str) -> Vec<RawChange> {
        let mut changes = Vec::new();
        for line in output.lines() {
            if line.len() < 3 {
                continue;
            }
            // Column 0 is the item status, column 1 the property status;
            // property-only changes carry a blank item column.
            let kind = match line.as_bytes()[0] {
                b'A' => RawChangeKind::Added,
                b'D' => RawChangeKind::Removed,
                b'M' => RawChangeKind::Modified,
                _ => continue,
            };
            let path = line[2..].trim();
            if path.is_empty() {
                continue;
            }
            changes.push(RawChange {
                kind,
                path: PathBuf::from(path),
                old_path: None,
            });
        }
        changes
    }

    fn resolve_range(&self, selector: &RevisionSelector) -> String {
        match selector {
            RevisionSelector::All | RevisionSelector::OrdinalRange { .. } => "1:HEAD".into(),
            RevisionSelector::IdRange { from, to } => {
                // Selector validation already proved both parse.
                let from = Self::parse_revision_number(from).map(Self::clamp_revision);
                let to = Self::parse_revision_number(to).map(Self::clamp_revision);
                match (from, to) {
                    (Ok(from), Ok(to)) => format!("{from}:{to}"),
                    _ => "1:HEAD".into(),
                }
            }
            RevisionSelector::DateRange { since, until } => {
                let since = Self::clamp_date(*since);
                let until = Self::clamp_date(*until);
                format!(
                    "{{{}}}:{{{}}}",
                    since.format("%Y-%m-%dT%H:%M:%SZ"),
                    until.format("%Y-%m-%dT%H:%M:%SZ")
                )
            }
        }
    }
}

// ============================================================================
// Backend Implementation
// ============================================================================

impl Backend for SvnBackend {
    fn initialize(&self) -> Result<(), VcsError> {
        info!(repository = %self.url(), dest = %self.target.display(), "checking out");
        let parent = match self.target.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
            Some(parent) => parent,
            None => return Err(VcsError::Backend("target directory has no parent".into())),
        };
        let target = self
            .target
            .to_str()
            .ok_or_else(|| VcsError::Backend("target directory is not valid UTF-8".into()))?;
        let url = self.url();
        self.cli
            .run(parent, ["checkout", "--quiet", url.as_str(), target])?;
        Ok(())
    }

    fn validate_selector(&self, selector: &RevisionSelector) -> Result<(), VcsError> {
        if let RevisionSelector::IdRange { from, to } = selector {
            let from = Self::clamp_revision(Self::parse_revision_number(from)?);
            let to = Self::clamp_revision(Self::parse_revision_number(to)?);
            if from > to {
                return Err(VcsError::config(format!(
                    "inverted revision range: r{from} is after r{to}"
                )));
            }
        }
        Ok(())
    }

    fn list_revisions(&self, selector: &RevisionSelector) -> Result<Vec<RevisionId>, VcsError> {
        let range = self.resolve_range(selector);
        let output = self
            .cli
            .run(&self.target, ["log", "--quiet", "-r", range.as_str()])?;
        let mut revisions = Self::parse_log_revisions(&output);
        if let RevisionSelector::OrdinalRange { start, end } = selector {
            let ids = revisions
                .drain(..)
                .map(|r| RevisionId::from(r.to_string()))
                .collect();
            return Ok(apply_ordinal(ids, *start, *end));
        }
        Ok(revisions
            .into_iter()
            .map(|r| RevisionId::from(r.to_string()))
            .collect())
    }

    fn checkout(&self, revision: &RevisionId) -> Result<(), VcsError> {
        self.cli.run(
            &self.target,
            ["update", "--quiet", "-r", revision.as_str()],
        )?;
        Ok(())
    }

    fn raw_changes(
        &self,
        from: &RevisionId,
        to: &RevisionId,
    ) -> Result<Vec<RawChange>, VcsError> {
        let range = format!("{from}:{to}");
        let output = self
            .cli
            .run(&self.target, ["diff", "--summarize", "-r", range.as_str()])?;
        Ok(Self::parse_diff_summary(&output)
            .into_iter()
            .filter(|change| under_root(&change.path, self.root.as_deref()))
            .collect())
    }

    fn read_bytes(&self, path: &Path, revision: &RevisionId) -> Result<Vec<u8>, VcsError> {
        let pegged = format!("{}@{}", path.display(), revision);
        match self
            .cli
            .run_bytes(&self.target, ["cat", "-r", revision.as_str(), pegged.as_str()])
        {
            Ok(bytes) => Ok(bytes),
            Err(VcsError::Backend(message))
                if message.contains("E200009")
                    || message.contains("E160013")
                    || message.contains("W160013")
                    || message.contains("path not found") =>
            {
                Err(VcsError::content_not_found(path, revision.as_str()))
            }
            Err(other) => Err(other),
        }
    }

    fn commit_metadata(&self, revision: &RevisionId) -> Result<CommitMetadata, VcsError> {
        let output = self
            .cli
            .run(&self.target, ["log", "-r", revision.as_str()])?;
        let entry = Self::parse_log_entry(&output).ok_or_else(|| {
            VcsError::Backend(format!("unparsable svn log output for r{revision}"))
        })?;

        // Subversion history is linear; the parent is simply the previous
        // revision number.
        let parent_ids = if entry.revision > 1 {
            vec![RevisionId::from((entry.revision - 1).to_string())]
        } else {
            Vec::new()
        };

        Ok(CommitMetadata {
            id: RevisionId::from(entry.revision.to_string()),
            author: entry.author,
            message: Some(entry.message),
            timestamp: entry.date,
            parent_ids,
        })
    }

    fn metadata_dir(&self) -> Option<&'static str> {
        Some(".svn")
    }

    fn rename_config(&self) -> RenameConfig {
        RenameConfig {
            native: false,
            threshold: RENAME_THRESHOLD,
        }
    }
}
