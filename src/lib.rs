//! # snaplink - Deduplicating hard-link snapshot backups
//!
//! A versioned file-backup engine that produces a new dated snapshot on
//! each invocation and shares unchanged file content with prior
//! snapshots through filesystem hard links rather than re-copying
//! bytes.
//!
//! ## Overview
//!
//! snaplink is built from three primitives:
//!
//! - **Fingerprints**: a stable per-file identity fusing a content hash
//!   with selected metadata ([`fingerprint`])
//! - **Index**: a persistent fingerprint→path mapping written alongside
//!   each snapshot and merged back in on subsequent runs ([`index`])
//! - **Decision engine**: a link-or-copy procedure with a mandatory
//!   byte-equality re-check before any hard link is created
//!   ([`engine`])
//!
//! An orchestrator drives one of four modes over a filtered, sorted,
//! deduplicated file stream:
//!
//! - **Backup**: copy-or-link every source into `root/YYYY-MM-DD/`
//! - **MakeIndex**: fingerprint a directory and write its sidecar
//! - **Rehardlink**: replace byte-identical files in a tree with hard
//!   links to a single canonical instance, in place
//! - **Verify**: recompute the fingerprint behind every sidecar entry
//!   and report divergence
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snaplink::{BackupOptions, Mode, Orchestrator};
//! use std::path::PathBuf;
//!
//! # fn main() -> snaplink::Result<()> {
//! let mut orchestrator = Orchestrator::direct();
//! let summary = orchestrator.run(Mode::Backup(BackupOptions {
//!     source: PathBuf::from("/home/user/documents"),
//!     backup_root: PathBuf::from("/backups"),
//!     exclusion_file: None,
//!     delete_existing: false,
//!     not_shadowed: true,
//!     link_to_directory: None,
//!     link_to_hashtables: Vec::new(),
//!     date: None,
//! }))?;
//! println!("{}", summary.render());
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety model
//!
//! The content hash is MD5: a dedup key, not a security primitive. A
//! hash collision can never corrupt a backup because the engine proves
//! byte equality before every link; a colliding pair degrades to a
//! plain copy with a warning. Read-only files are copied and never
//! linked or indexed, keeping snapshots semantically independent of
//! attribute edits on shared inodes.

pub mod engine;
pub mod error;
pub mod facts;
pub mod fingerprint;
pub mod index;
pub mod orchestrator;
pub mod patterns;
pub mod report;
pub mod resolver;
pub mod source;

mod fsops;

pub use engine::{CopyReason, Decision, DecisionEngine, FileOutcome, RetryPolicy};
pub use error::{Result, SnaplinkError};
pub use facts::FileFacts;
pub use fingerprint::{Fingerprint, Fingerprinter};
pub use index::{HashIndex, MergeStats, SIDECAR_NAME};
pub use orchestrator::{
    BackupOptions, CancelToken, MakeIndexOptions, Mode, Orchestrator, RehardlinkOptions,
    VerifyOptions,
};
pub use report::{RunSummary, SidecarVerification, VerifyReport};
pub use resolver::{IdentityResolver, PathResolver};
pub use source::{DirectProvider, SourceHandle, SourceProvider};
