//! Path resolver seam
//!
//! Some platforms cap the path length individual filesystem APIs accept;
//! working around the cap (substituted drives, `\\?\` prefixes,
//! junctions) is a platform concern the engine only consumes through
//! this trait. On platforms without such a limit the identity resolver
//! is used.

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Shortens paths that exceed a platform per-API length limit
///
/// Contracts the engine relies on:
/// - `shorten` is idempotent on paths that are already short enough;
/// - the returned path resolves to the same filesystem object;
/// - indirections created for one run are reused within that run;
/// - `release_all` drops every indirection and is called exactly once at
///   orchestrator shutdown.
///
/// If no shortening is possible the implementation returns an error and
/// the orchestrator skips the file with a warning.
pub trait PathResolver {
    /// Return a path below the platform limit addressing the same object
    fn shorten(&mut self, path: &Path) -> Result<PathBuf>;

    /// Release all temporary indirections created during the run
    fn release_all(&mut self) -> Result<()>;
}

/// Resolver for platforms without a practical path-length limit
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityResolver;

impl PathResolver for IdentityResolver {
    fn shorten(&mut self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }

    fn release_all(&mut self) -> Result<()> {
        Ok(())
    }
}
