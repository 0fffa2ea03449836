//! Per-file link-or-copy decision engine
//!
//! For each source file the engine produces exactly one decision and,
//! when asked to apply it, exactly one outcome. The procedure:
//!
//! 1. directories are copied (created) without fingerprinting;
//! 2. read-only files are copied without fingerprinting, keeping every
//!    snapshot semantically independent of hard-link attribute edits;
//! 3. otherwise the fingerprint is computed and the index consulted;
//! 4. an unknown fingerprint copies and records the destination;
//! 5. a candidate that vanished from disk degrades to a copy;
//! 6. a candidate whose fingerprinted attributes disagree degrades to a
//!    copy with a warning (unreachable unless the index is corrupt);
//! 7. the candidate is compared byte-by-byte; a mismatch degrades to a
//!    copy with a warning. This re-check is what makes MD5 collisions
//!    harmless;
//! 8. only a byte-identical candidate is hard-linked.
//!
//! The in-place rehardlink variant replaces a proven-identical source
//! file with a hard link to the candidate inode, retrying the
//! delete+link pair under a bounded policy because transient handle
//! races on live trees are common.

use crate::error::{Result, SnaplinkError};
use crate::facts::FileFacts;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::fsops;
use crate::index::HashIndex;
use crate::source::SourceHandle;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Why a file was copied rather than hard-linked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyReason {
    /// The entry is a directory; a directory is created instead
    Directory,
    /// The file is read-only and therefore never linked or indexed
    ReadOnly,
    /// No prior file shares this fingerprint
    NewHash,
    /// A candidate existed but its fingerprinted attributes disagree
    AttributeMismatch,
    /// A candidate existed but its bytes disagree (hash collision or a
    /// semantically different file)
    BinaryMismatch,
}

impl CopyReason {
    /// Stable lowercase token used in logs and summaries
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyReason::Directory => "directory",
            CopyReason::ReadOnly => "readonly",
            CopyReason::NewHash => "new-hash",
            CopyReason::AttributeMismatch => "hash-equal-attribute-mismatch",
            CopyReason::BinaryMismatch => "hash-equal-binary-mismatch",
        }
    }
}

impl std::fmt::Display for CopyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision for one source entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Create the destination directory
    CopyDirectory,
    /// Copy without indexing (read-only source)
    CopyReadOnly,
    /// Copy fresh bytes and record the destination under `fingerprint`
    Copy {
        /// Fingerprint of the source file
        fingerprint: Fingerprint,
        /// Why linking was not possible
        reason: CopyReason,
    },
    /// Hard-link to a proven byte-identical candidate
    Link {
        /// Fingerprint shared with the candidate
        fingerprint: Fingerprint,
        /// Absolute path of the candidate file
        candidate: PathBuf,
    },
}

/// What actually happened to one source entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// A hard link was created; `bytes` is the content size shared
    Linked {
        /// Content bytes deduplicated by the link
        bytes: u64,
    },
    /// Fresh bytes were written (or a directory created)
    Copied {
        /// Why the file was copied
        reason: CopyReason,
        /// Content bytes written
        bytes: u64,
    },
    /// The file was already a link to the candidate inode (rehardlink
    /// re-runs)
    Unchanged,
}

/// Bounded retry for the rehardlink delete+link pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts before escalating to fatal
    pub max_attempts: u32,
    /// Sleep between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 20,
            delay: Duration::from_millis(500),
        }
    }
}

/// Link-or-copy decision engine
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    fingerprinter: Fingerprinter,
    retry: RetryPolicy,
}

impl DecisionEngine {
    /// Create an engine with the default fingerprinter and retry policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the retry policy used by in-place relinking
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Engine with a rigged fingerprinter, for collision tests
    #[cfg(test)]
    pub(crate) fn with_fingerprinter(fingerprinter: Fingerprinter) -> Self {
        DecisionEngine {
            fingerprinter,
            retry: RetryPolicy::default(),
        }
    }

    /// Access the engine's fingerprinter
    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.fingerprinter
    }

    /// Decide what to do with one opened source entry
    ///
    /// Consumes the handle's content reader when a fingerprint is
    /// needed. The index is only read; updates happen when the decision
    /// is applied.
    pub fn decide(&self, handle: &mut SourceHandle, index: &HashIndex) -> Result<Decision> {
        if handle.facts.is_dir {
            return Ok(Decision::CopyDirectory);
        }
        if handle.facts.readonly {
            return Ok(Decision::CopyReadOnly);
        }

        let reader = handle.take_reader()?;
        let fingerprint = self.fingerprinter.fingerprint(reader, &handle.facts)?;
        trace!("{} <- {:?}", fingerprint, handle.display_path);

        let candidate = match index.lookup(&fingerprint) {
            Some(path) => path.to_path_buf(),
            None => {
                return Ok(Decision::Copy {
                    fingerprint,
                    reason: CopyReason::NewHash,
                })
            }
        };

        if !candidate.exists() {
            warn!(
                "{}: hash refers to nonexisting file {:?}",
                fingerprint, candidate
            );
            return Ok(Decision::Copy {
                fingerprint,
                reason: CopyReason::NewHash,
            });
        }

        // Defense in depth: these attributes are folded into the
        // fingerprint, so a mismatch means the index entry lies.
        let candidate_facts = FileFacts::probe(&candidate)?;
        if !handle.facts.attrs_match(&candidate_facts) {
            warn!(
                "{}: candidate {:?} matches hash but not attributes",
                fingerprint, candidate
            );
            return Ok(Decision::Copy {
                fingerprint,
                reason: CopyReason::AttributeMismatch,
            });
        }

        // The authoritative check. A collision (or a file whose content
        // differs between the fingerprint read and now) must never be
        // linked.
        if !fsops::byte_equal(&handle.physical_path, &candidate)? {
            warn!(
                "{}: candidate {:?} matches hash but not bytes",
                fingerprint, candidate
            );
            return Ok(Decision::Copy {
                fingerprint,
                reason: CopyReason::BinaryMismatch,
            });
        }

        Ok(Decision::Link {
            fingerprint,
            candidate,
        })
    }

    /// Apply a decision by producing `dest` inside a snapshot tree
    ///
    /// Creates intermediate directories on demand and updates the index
    /// after a successful indexed copy, so files later in the run can
    /// link to this one.
    pub fn apply_backup(
        &self,
        decision: Decision,
        handle: &SourceHandle,
        dest: &Path,
        index: &mut HashIndex,
    ) -> Result<FileOutcome> {
        match decision {
            Decision::CopyDirectory => {
                fs::create_dir_all(dest)?;
                Ok(FileOutcome::Copied {
                    reason: CopyReason::Directory,
                    bytes: 0,
                })
            }
            Decision::CopyReadOnly => {
                fsops::ensure_parent_dir(dest)?;
                let bytes = fsops::copy_with_metadata(&handle.physical_path, dest)?;
                Ok(FileOutcome::Copied {
                    reason: CopyReason::ReadOnly,
                    bytes,
                })
            }
            Decision::Copy {
                fingerprint,
                reason,
            } => {
                fsops::ensure_parent_dir(dest)?;
                let bytes = fsops::copy_with_metadata(&handle.physical_path, dest)?;
                index.insert_current(fingerprint, dest.to_path_buf());
                Ok(FileOutcome::Copied { reason, bytes })
            }
            Decision::Link {
                fingerprint,
                candidate,
            } => {
                fsops::ensure_parent_dir(dest)?;
                fsops::make_hardlink(&candidate, dest)?;
                debug!("linked {:?} -> {:?}", dest, candidate);
                // The sidecar describes this run's snapshot, so the new
                // link is recorded even though the candidate remains
                // the lookup resolution.
                index.record_run(fingerprint, dest.to_path_buf());
                Ok(FileOutcome::Linked {
                    bytes: handle.facts.len,
                })
            }
        }
    }

    /// Apply a decision in place for rehardlink mode
    ///
    /// A `Link` decision replaces the source file itself with a hard
    /// link to the candidate inode; copies keep the source as the
    /// canonical instance and record it in the index.
    pub fn apply_in_place(
        &self,
        decision: Decision,
        handle: &SourceHandle,
        index: &mut HashIndex,
    ) -> Result<FileOutcome> {
        match decision {
            Decision::CopyDirectory => Ok(FileOutcome::Copied {
                reason: CopyReason::Directory,
                bytes: 0,
            }),
            Decision::CopyReadOnly => Ok(FileOutcome::Copied {
                reason: CopyReason::ReadOnly,
                bytes: 0,
            }),
            Decision::Copy {
                fingerprint,
                reason,
            } => {
                index.insert_current(fingerprint, handle.physical_path.clone());
                Ok(FileOutcome::Copied { reason, bytes: 0 })
            }
            Decision::Link {
                fingerprint,
                candidate,
            } => {
                index.record_run(fingerprint, handle.physical_path.clone());
                if same_file::is_same_file(&candidate, &handle.physical_path)? {
                    // Already the canonical instance (or already linked
                    // to it); nothing to rewrite.
                    return Ok(FileOutcome::Unchanged);
                }
                self.relink_with_retry(&handle.physical_path, &candidate)?;
                Ok(FileOutcome::Linked {
                    bytes: handle.facts.len,
                })
            }
        }
    }

    /// Delete `source` and recreate it as a hard link to `candidate`,
    /// retrying under the configured policy
    fn relink_with_retry(&self, source: &Path, candidate: &Path) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = (|| -> std::io::Result<()> {
                if source.exists() {
                    fs::remove_file(source)?;
                }
                fs::hard_link(candidate, source)
            })();

            match result {
                Ok(()) => {
                    debug!("relinked {:?} -> {:?}", source, candidate);
                    return Ok(());
                }
                Err(e) if attempt < self.retry.max_attempts => {
                    warn!(
                        "relink {:?} attempt {}/{} failed: {}",
                        source, attempt, self.retry.max_attempts, e
                    );
                    std::thread::sleep(self.retry.delay);
                }
                Err(e) => {
                    warn!("relink {:?} giving up: {}", source, e);
                    return Err(SnaplinkError::TransientExhausted {
                        path: source.to_path_buf(),
                        attempts: attempt,
                    });
                }
            }
        }
    }
}
