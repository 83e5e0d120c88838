//! Example: walk a repository's history and summarize each version
//!
//! Run with: cargo run --example walk_history -- <repository> <target-dir>

use std::env;

use vcs_engine::{EngineConfig, FileChangeKind, VcsEngine};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let repository = args.next().expect("usage: walk_history <repository> <target-dir>");
    let target = args.next().expect("usage: walk_history <repository> <target-dir>");

    let config = EngineConfig::new(repository, target);
    let mut engine = VcsEngine::new(config)?;

    println!("walking {} revision(s)", engine.list_revisions()?.len());

    while let Some(version) = engine.next_version()? {
        let commit = &version.commit;
        let mut added = 0;
        let mut removed = 0;
        let mut modified = 0;
        let mut relocated = 0;
        for change in version.file_changes() {
            match change.kind() {
                FileChangeKind::Addition => added += 1,
                FileChangeKind::Removal => removed += 1,
                FileChangeKind::Modification => modified += 1,
                FileChangeKind::Relocation => relocated += 1,
            }
        }
        println!(
            "{} {} [{}] +{added} -{removed} ~{modified} >{relocated} {}",
            commit.timestamp.format("%Y-%m-%d"),
            commit.id,
            commit.author,
            commit.message.lines().next().unwrap_or(""),
        );
    }

    Ok(())
}
