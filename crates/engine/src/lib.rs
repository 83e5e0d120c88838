//! Incremental multi-backend repository history walker.
//!
//! This crate walks the history of a repository (Git, Subversion, Mercurial,
//! or a plain directory snapshot) one revision at a time, materializes each
//! revision on disk, computes the structural difference between consecutive
//! revisions, and normalizes everything into a single domain model
//! regardless of backend.
//!
//! # Design Goals
//!
//! - **One engine, many backends**: backends implement a small strategy
//!   trait; the engine owns sequencing, normalization, and the model
//! - **Pull iteration**: callers drive progression, so the working copy
//!   always reflects exactly the version last returned
//! - **Safe historical access**: content at non-current revisions is read
//!   through backend show-at-revision primitives, never by re-checkout
//!
//! # Example
//!
//! ```no_run
//! use vcs_engine::{EngineConfig, VcsEngine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::new("/path/to/repo", "/tmp/walk");
//! let mut engine = VcsEngine::new(config)?;
//!
//! while let Some(version) = engine.next_version()? {
//!     println!(
//!         "{}: {} file change(s)",
//!         version.commit.id,
//!         version.file_changes().len()
//!     );
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod charset;
mod config;
mod engine;
mod error;
mod factory;
mod model;
mod normalizer;
mod traits;
mod types;

pub mod backend;
pub mod linediff;

pub use config::{EngineConfig, RevisionSelector};
pub use engine::{VcsEngine, Versions};
pub use error::VcsError;
pub use factory::{BackendFactory, VcsBackendType};
pub use traits::{Backend, CommitMetadata, RawChange, RawChangeKind, RenameConfig};
pub use types::{
    Changes, Commit, FileChange, FileChangeKind, LineChange, LineChangeKind, Revision,
    RevisionId, VcsFile, Version,
};
