//! The revision-walking state machine.
//!
//! `VcsEngine` owns the ordered revision list, the cursor, and the previous
//! revision's materialized file set. It is a pull iterator: callers drive
//! progression, so the on-disk working copy always reflects exactly the
//! version last returned. No internal concurrency; one engine instance
//! exclusively owns its target directory.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::cache::ContentCache;
use crate::config::{EngineConfig, RevisionSelector};
use crate::error::VcsError;
use crate::factory::BackendFactory;
use crate::model;
use crate::normalizer;
use crate::traits::Backend;
use crate::types::{Changes, Revision, RevisionId, VcsFile, Version};

/// State shared between the engine and the `VcsFile` handles it hands out.
///
/// Files hold a `Weak` reference, so outliving handles never keep the
/// backend alive; their reads just start failing once the engine is gone.
pub(crate) struct EngineShared {
    backend: Box<dyn Backend>,
    target: PathBuf,
    root: Option<String>,
    current: Mutex<Option<RevisionId>>,
    cache: Mutex<ContentCache>,
}

impl EngineShared {
    pub(crate) fn new(
        backend: Box<dyn Backend>,
        target: PathBuf,
        root: Option<String>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            backend,
            target,
            root,
            current: Mutex::new(None),
            cache: Mutex::new(ContentCache::new(cache_capacity)),
        }
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub(crate) fn target(&self) -> &Path {
        &self.target
    }

    /// Whether the given revision is the one currently checked out
    pub(crate) fn is_current(&self, revision: &RevisionId) -> bool {
        match self.current.lock() {
            Ok(guard) => guard.as_ref() == Some(revision),
            Err(_) => false,
        }
    }

    fn set_current(&self, revision: RevisionId) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = Some(revision);
        }
    }

    /// Content at a non-current revision, via the backend's show-at-revision
    /// primitive and the bounded cache. Never touches the working copy.
    pub(crate) fn read_historic(
        &self,
        path: &Path,
        revision: &RevisionId,
    ) -> Result<Vec<u8>, VcsError> {
        let key = path.to_path_buf();
        {
            let mut cache = self
                .cache
                .lock()
                .map_err(|_| VcsError::Backend("content cache lock poisoned".into()))?;
            if let Some(hit) = cache.get(revision, &key) {
                return Ok(hit.to_vec());
            }
        }
        let bytes = Arc::new(self.backend.read_bytes(path, revision)?);
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| VcsError::Backend("content cache lock poisoned".into()))?;
        cache.put(revision.clone(), key, Arc::clone(&bytes));
        Ok(bytes.to_vec())
    }

    /// Build a file handle for an absolute path under the target directory
    pub(crate) fn make_file(
        self: &Arc<Self>,
        absolute: PathBuf,
        revision: RevisionId,
    ) -> Result<VcsFile, VcsError> {
        let relative = absolute
            .strip_prefix(&self.target)
            .map_err(|_| {
                VcsError::consistency(format!(
                    "path '{}' is outside the target directory",
                    absolute.display()
                ))
            })?
            .to_path_buf();
        Ok(VcsFile::new(
            absolute,
            relative,
            revision,
            Arc::downgrade(self),
        ))
    }

    /// List the working-directory tree (post-checkout), filtered by the root
    /// filter and the backend's metadata directory, ordered by path
    fn list_tree(self: &Arc<Self>, revision: &RevisionId) -> Result<Vec<VcsFile>, VcsError> {
        let base = match &self.root {
            Some(root) => self.target.join(root),
            None => self.target.clone(),
        };
        if !base.exists() {
            return Ok(Vec::new());
        }
        let metadata_dir = self.backend.metadata_dir();
        let mut paths = Vec::new();
        let walker = WalkDir::new(&base).into_iter().filter_entry(|entry| {
            metadata_dir.map_or(true, |dir| entry.file_name().to_str() != Some(dir))
        });
        for entry in walker {
            let entry = entry.map_err(|e| VcsError::Backend(e.to_string()))?;
            if entry.file_type().is_file() {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        paths
            .into_iter()
            .map(|absolute| self.make_file(absolute, revision.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Uninitialized,
    Ready,
    Exhausted,
}

/// Walks a repository's history one revision at a time.
///
/// Created from a validated `EngineConfig`; the backing repository is
/// cloned/checked out into the target directory on the first call to
/// `next_version` or `list_revisions`, exactly once.
pub struct VcsEngine {
    shared: Arc<EngineShared>,
    selector: RevisionSelector,
    threshold: f32,
    state: EngineState,
    revisions: Vec<RevisionId>,
    cursor: usize,
    previous: Option<Revision>,
}

impl VcsEngine {
    /// Validate the configuration and construct an engine. Fails fast with
    /// `VcsError::Configuration` before any repository is touched.
    pub fn new(config: EngineConfig) -> Result<Self, VcsError> {
        config.validate()?;
        let backend = BackendFactory::create(&config)?;
        backend.validate_selector(&config.selector)?;
        let threshold = config
            .rename_threshold
            .unwrap_or_else(|| backend.rename_config().threshold);
        let shared = Arc::new(EngineShared::new(
            backend,
            config.target,
            config.root,
            config.cache_capacity,
        ));
        Ok(Self {
            shared,
            selector: config.selector,
            threshold,
            state: EngineState::Uninitialized,
            revisions: Vec::new(),
            cursor: 0,
            previous: None,
        })
    }

    /// The working directory this engine materializes revisions into
    pub fn target(&self) -> &Path {
        self.shared.target()
    }

    /// The ordered (oldest-first) revision ids selected for this walk.
    /// Triggers backend initialization on first use; safe to call
    /// repeatedly.
    pub fn list_revisions(&mut self) -> Result<&[RevisionId], VcsError> {
        self.ensure_initialized()?;
        Ok(&self.revisions)
    }

    /// Advance to the next version, or `None` once the history is walked.
    ///
    /// On failure the cursor does not advance: a later call re-attempts the
    /// same revision. After exhaustion every call returns `None` without
    /// further backend I/O.
    pub fn next_version(&mut self) -> Result<Option<Version>, VcsError> {
        self.ensure_initialized()?;
        if self.state == EngineState::Exhausted {
            return Ok(None);
        }
        if self.cursor >= self.revisions.len() {
            debug!("history exhausted after {} versions", self.cursor);
            self.state = EngineState::Exhausted;
            return Ok(None);
        }

        let id = self.revisions[self.cursor].clone();
        debug!(revision = %id, "materializing revision");
        self.shared.backend().checkout(&id)?;
        self.shared.set_current(id.clone());

        let files = self.shared.list_tree(&id)?;
        let revision = Revision::new(id.clone(), files);

        let changes = match &self.previous {
            // The very first version: one addition per file present.
            None => Changes {
                added: revision
                    .files()
                    .iter()
                    .map(|f| f.absolute_path().to_path_buf())
                    .collect(),
                ..Changes::default()
            },
            Some(previous) => {
                let raw = self.shared.backend().raw_changes(previous.id(), &id)?;
                let prev_id = previous.id().clone();
                let shared = Arc::clone(&self.shared);
                let old_content =
                    move |path: &Path| shared.backend().read_bytes(path, &prev_id);
                let target = self.shared.target().to_path_buf();
                let new_content = move |path: &Path| -> Result<Vec<u8>, VcsError> {
                    Ok(std::fs::read(target.join(path))?)
                };
                normalizer::normalize(
                    raw,
                    self.shared.target(),
                    self.threshold,
                    &old_content,
                    &new_content,
                )?
            }
        };

        let metadata = self.shared.backend().commit_metadata(&id)?;
        let version = model::build_version(
            &self.shared,
            metadata,
            revision.clone(),
            self.previous.clone(),
            changes,
        )?;

        self.previous = Some(revision);
        self.cursor += 1;
        self.state = EngineState::Ready;
        Ok(Some(version))
    }

    /// Iterator view over `next_version`
    pub fn versions(&mut self) -> Versions<'_> {
        Versions { engine: self }
    }

    fn ensure_initialized(&mut self) -> Result<(), VcsError> {
        if self.state != EngineState::Uninitialized {
            return Ok(());
        }
        info!(dest = %self.shared.target().display(), "initializing backend");
        self.shared.backend().initialize()?;
        self.revisions = self.shared.backend().list_revisions(&self.selector)?;
        debug!(count = self.revisions.len(), "resolved revision list");
        self.state = EngineState::Ready;
        Ok(())
    }
}

/// Iterator over the versions of a walk, yielding errors in place
pub struct Versions<'a> {
    engine: &'a mut VcsEngine,
}

impl Iterator for Versions<'_> {
    type Item = Result<Version, VcsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.engine.next_version().transpose()
    }
}
