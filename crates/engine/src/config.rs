use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::VcsError;
use crate::factory::VcsBackendType;

/// Selects which revisions of the repository's history to walk.
///
/// Regardless of the selector, revisions are always delivered
/// oldest-to-newest.
#[derive(Debug, Clone, Default)]
pub enum RevisionSelector {
    /// The whole history
    #[default]
    All,
    /// Revisions committed within [since, until]
    DateRange {
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    },
    /// Revisions between two backend-native ids, inclusive on both ends
    IdRange { from: String, to: String },
    /// Revisions by position in the oldest-first history, [start, end)
    OrdinalRange { start: usize, end: usize },
}

/// Engine configuration.
///
/// `validate` runs before any repository is touched or cloned; every
/// rejected field is a `VcsError::Configuration`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Local path or remote URL of the repository to walk
    pub repository: String,
    /// Optional subdirectory filter; only paths under it participate in
    /// change detection and file listing
    pub root: Option<String>,
    /// Working directory the engine materializes revisions into. Must not
    /// pre-exist; its parent must be writable.
    pub target: PathBuf,
    pub selector: RevisionSelector,
    /// Branch to walk (Git only); the backend default when absent
    pub branch: Option<String>,
    /// Explicit backend choice; auto-detected from the locator when absent
    pub backend: Option<VcsBackendType>,
    /// Overrides the backend's rename-detection threshold, in [0, 1]
    pub rename_threshold: Option<f32>,
    /// Capacity of the historical-content cache, in entries
    pub cache_capacity: usize,
}

impl EngineConfig {
    pub fn new(repository: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            root: None,
            target: target.into(),
            selector: RevisionSelector::default(),
            branch: None,
            backend: None,
            rename_threshold: None,
            cache_capacity: 64,
        }
    }

    pub fn validate(&self) -> Result<(), VcsError> {
        if self.repository.trim().is_empty() {
            return Err(VcsError::config("repository locator must not be empty"));
        }
        if self.target.exists() {
            return Err(VcsError::config(format!(
                "target directory '{}' already exists",
                self.target.display()
            )));
        }
        match self.target.parent() {
            Some(parent) if parent.as_os_str().is_empty() => {}
            Some(parent) => {
                if !parent.is_dir() {
                    return Err(VcsError::config(format!(
                        "parent of target directory '{}' does not exist",
                        self.target.display()
                    )));
                }
                if parent
                    .metadata()
                    .map(|m| m.permissions().readonly())
                    .unwrap_or(true)
                {
                    return Err(VcsError::config(format!(
                        "parent of target directory '{}' is not writable",
                        self.target.display()
                    )));
                }
            }
            None => {
                return Err(VcsError::config("target directory must not be a filesystem root"));
            }
        }
        if let Some(root) = &self.root {
            if PathBuf::from(root).is_absolute() {
                return Err(VcsError::config("root filter must be a relative path"));
            }
        }
        match &self.selector {
            RevisionSelector::All => {}
            RevisionSelector::DateRange { since, until } => {
                if since > until {
                    return Err(VcsError::config(format!(
                        "inverted date range: {since} is after {until}"
                    )));
                }
            }
            RevisionSelector::IdRange { from, to } => {
                if from.trim().is_empty() || to.trim().is_empty() {
                    return Err(VcsError::config("revision ids in an id range must not be empty"));
                }
            }
            RevisionSelector::OrdinalRange { start, end } => {
                if start >= end {
                    return Err(VcsError::config(format!(
                        "inverted ordinal range: [{start}, {end})"
                    )));
                }
            }
        }
        if let Some(threshold) = self.rename_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(VcsError::config(format!(
                    "rename threshold {threshold} is outside [0, 1]"
                )));
            }
        }
        if self.cache_capacity == 0 {
            return Err(VcsError::config("cache capacity must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn base_config(target: PathBuf) -> EngineConfig {
        EngineConfig::new("/some/repo", target)
    }

    #[test]
    fn test_valid_config() {
        let temp = TempDir::new().unwrap();
        let config = base_config(temp.path().join("out"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_locator() {
        let temp = TempDir::new().unwrap();
        let mut config = base_config(temp.path().join("out"));
        config.repository = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(VcsError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_existing_target() {
        let temp = TempDir::new().unwrap();
        let config = base_config(temp.path().to_path_buf());
        assert!(matches!(
            config.validate(),
            Err(VcsError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_missing_parent() {
        let temp = TempDir::new().unwrap();
        let config = base_config(temp.path().join("missing").join("out"));
        assert!(matches!(
            config.validate(),
            Err(VcsError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_inverted_date_range() {
        let temp = TempDir::new().unwrap();
        let mut config = base_config(temp.path().join("out"));
        config.selector = RevisionSelector::DateRange {
            since: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            until: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        };
        assert!(matches!(
            config.validate(),
            Err(VcsError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_inverted_ordinal_range() {
        let temp = TempDir::new().unwrap();
        let mut config = base_config(temp.path().join("out"));
        config.selector = RevisionSelector::OrdinalRange { start: 3, end: 3 };
        assert!(matches!(
            config.validate(),
            Err(VcsError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let temp = TempDir::new().unwrap();
        let mut config = base_config(temp.path().join("out"));
        config.rename_threshold = Some(1.5);
        assert!(matches!(
            config.validate(),
            Err(VcsError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_absolute_root_filter() {
        let temp = TempDir::new().unwrap();
        let mut config = base_config(temp.path().join("out"));
        config.root = Some("/abs/path".into());
        assert!(matches!(
            config.validate(),
            Err(VcsError::Configuration(_))
        ));
    }
}
