//! Snapshot source provider seam
//!
//! Backups prefer reading from a point-in-time read-only view of the
//! source volume so that files mutating mid-run cannot tear. The engine
//! consumes that capability through `SourceProvider`: `open` yields a
//! reader plus metadata for a source path, and `translate` maps a
//! physical (view) path back to the user-facing one. The trivial
//! `DirectProvider` reads the live filesystem and must be
//! interchangeable with any snapshot-backed implementation.

use crate::error::{Result, SnaplinkError};
use crate::facts::FileFacts;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// An opened source file: reader, metadata view and naming
pub struct SourceHandle {
    /// User-facing path, used for logs and destination composition
    pub display_path: PathBuf,
    /// Path addressing the actual bytes (inside a snapshot view when one
    /// is active); used for re-opening during binary comparison
    pub physical_path: PathBuf,
    /// Metadata of the entry
    pub facts: FileFacts,
    reader: Option<Box<dyn Read>>,
}

impl SourceHandle {
    /// Build a handle; `reader` is `None` for directories and symlinks
    pub fn new(
        display_path: PathBuf,
        physical_path: PathBuf,
        facts: FileFacts,
        reader: Option<Box<dyn Read>>,
    ) -> Self {
        SourceHandle {
            display_path,
            physical_path,
            facts,
            reader,
        }
    }

    /// Take the content reader; errors if the entry has none
    pub fn take_reader(&mut self) -> Result<Box<dyn Read>> {
        self.reader.take().ok_or_else(|| {
            SnaplinkError::internal(format!(
                "no content stream for {:?}",
                self.display_path
            ))
        })
    }
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("display_path", &self.display_path)
            .field("physical_path", &self.physical_path)
            .field("facts", &self.facts)
            .field("reader", &self.reader.is_some())
            .finish()
    }
}

/// Yields read-only versions of source files
pub trait SourceProvider {
    /// Open a source path, returning its reader, metadata and display
    /// path
    fn open(&mut self, source_path: &Path) -> Result<SourceHandle>;

    /// Map a physical (snapshot-view) path back to the user-facing path
    fn translate(&self, physical_path: &Path) -> PathBuf;

    /// Release the snapshot view; called exactly once at orchestrator
    /// shutdown, regardless of errors
    fn release(&mut self) -> Result<()>;
}

/// Provider reading directly from the live filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectProvider;

impl SourceProvider for DirectProvider {
    fn open(&mut self, source_path: &Path) -> Result<SourceHandle> {
        let facts = FileFacts::probe(source_path)?;
        let reader: Option<Box<dyn Read>> = if facts.is_dir || facts.is_symlink {
            None
        } else {
            let file = File::open(source_path).map_err(|e| SnaplinkError::SourceUnreadable {
                path: source_path.to_path_buf(),
                source: e,
            })?;
            Some(Box::new(file))
        };
        Ok(SourceHandle::new(
            source_path.to_path_buf(),
            source_path.to_path_buf(),
            facts,
            reader,
        ))
    }

    fn translate(&self, physical_path: &Path) -> PathBuf {
        physical_path.to_path_buf()
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}
