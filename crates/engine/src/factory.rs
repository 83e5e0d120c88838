use std::path::Path;

use crate::backend::fs::SnapshotBackend;
use crate::backend::hg::HgBackend;
use crate::backend::svn::SvnBackend;
use crate::config::EngineConfig;
use crate::error::VcsError;
use crate::traits::Backend;

/// Type of VCS backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsBackendType {
    Git,
    Subversion,
    Mercurial,
    /// A plain directory exposed as a single synthetic revision
    SingleSnapshot,
}

/// Factory for creating backends from a configuration
pub struct BackendFactory;

impl BackendFactory {
    /// Create the backend for the configuration, auto-detecting the type
    /// from the locator when none is set explicitly
    pub(crate) fn create(config: &EngineConfig) -> Result<Box<dyn Backend>, VcsError> {
        let backend_type = match config.backend {
            Some(backend_type) => backend_type,
            None => Self::detect(&config.repository)?,
        };
        if config.branch.is_some() && backend_type != VcsBackendType::Git {
            return Err(VcsError::config(
                "a branch can only be configured for the Git backend",
            ));
        }
        match backend_type {
            VcsBackendType::Git => Self::create_git(config),
            VcsBackendType::Subversion => Ok(Box::new(SvnBackend::new(
                config.repository.clone(),
                config.target.clone(),
                config.root.clone(),
            ))),
            VcsBackendType::Mercurial => Ok(Box::new(HgBackend::new(
                config.repository.clone(),
                config.target.clone(),
                config.root.clone(),
            ))),
            VcsBackendType::SingleSnapshot => Ok(Box::new(SnapshotBackend::new(
                Path::new(&config.repository).to_path_buf(),
                config.target.clone(),
            ))),
        }
    }

    #[cfg(feature = "git")]
    fn create_git(config: &EngineConfig) -> Result<Box<dyn Backend>, VcsError> {
        Ok(Box::new(crate::backend::git::GitBackend::new(
            config.repository.clone(),
            config.target.clone(),
            config.root.clone(),
            config.branch.clone(),
        )))
    }

    #[cfg(not(feature = "git"))]
    fn create_git(_config: &EngineConfig) -> Result<Box<dyn Backend>, VcsError> {
        Err(VcsError::config(
            "the Git backend is not enabled in this build",
        ))
    }

    /// Determine the backend type from a repository locator. Local paths
    /// are sniffed for VCS metadata directories; remote URLs dispatch on
    /// their scheme.
    pub fn detect(locator: &str) -> Result<VcsBackendType, VcsError> {
        if locator.starts_with("git://")
            || locator.starts_with("git@")
            || locator.ends_with(".git")
        {
            return Ok(VcsBackendType::Git);
        }
        if locator.starts_with("svn://") || locator.starts_with("svn+ssh://") {
            return Ok(VcsBackendType::Subversion);
        }
        if locator.contains("://") {
            return Err(VcsError::config(format!(
                "cannot infer a backend from '{locator}'; set the backend explicitly"
            )));
        }

        let path = Path::new(locator);
        if path.join(".git").exists() {
            Ok(VcsBackendType::Git)
        } else if path.join(".svn").exists() {
            Ok(VcsBackendType::Subversion)
        } else if path.join(".hg").exists() {
            Ok(VcsBackendType::Mercurial)
        } else if path.is_dir() {
            Ok(VcsBackendType::SingleSnapshot)
        } else {
            Err(VcsError::config(format!(
                "repository '{locator}' does not exist"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_remote_schemes() {
        assert_eq!(
            BackendFactory::detect("git://example.com/repo").unwrap(),
            VcsBackendType::Git
        );
        assert_eq!(
            BackendFactory::detect("git@example.com:user/repo.git").unwrap(),
            VcsBackendType::Git
        );
        assert_eq!(
            BackendFactory::detect("https://example.com/user/repo.git").unwrap(),
            VcsBackendType::Git
        );
        assert_eq!(
            BackendFactory::detect("svn://example.com/repo").unwrap(),
            VcsBackendType::Subversion
        );
        assert_eq!(
            BackendFactory::detect("svn+ssh://example.com/repo").unwrap(),
            VcsBackendType::Subversion
        );
    }

    #[test]
    fn test_detect_ambiguous_url_fails() {
        assert!(matches!(
            BackendFactory::detect("https://example.com/repo"),
            Err(VcsError::Configuration(_))
        ));
    }

    #[test]
    fn test_detect_local_metadata_dirs() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        std::fs::create_dir_all(repo.join(".hg")).unwrap();
        assert_eq!(
            BackendFactory::detect(repo.to_str().unwrap()).unwrap(),
            VcsBackendType::Mercurial
        );
    }

    #[test]
    fn test_detect_plain_directory_is_snapshot() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            BackendFactory::detect(temp.path().to_str().unwrap()).unwrap(),
            VcsBackendType::SingleSnapshot
        );
    }

    #[test]
    fn test_detect_missing_path_fails() {
        assert!(matches!(
            BackendFactory::detect("/does/not/exist"),
            Err(VcsError::Configuration(_))
        ));
    }
}
