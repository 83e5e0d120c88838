//! Backend implementations of the strategy interface.

pub(crate) mod cli;
pub mod fs;
pub mod hg;
pub mod svn;

#[cfg(feature = "git")]
pub mod git;
