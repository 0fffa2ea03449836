//! Mode orchestration
//!
//! The orchestrator drives one mode end-to-end: it composes the filtered
//! source stream, runs the decision engine over every file, applies the
//! bookkeeping, exports the per-run sidecar and releases the path
//! resolver and source provider exactly once at shutdown, whatever
//! happened in between.
//!
//! Processing is single-threaded and synchronous; files are visited in
//! the sorted-unique order of the enumerated stream, and the index is
//! updated after each successful action so a file later in the run can
//! link to one processed earlier. Between files the orchestrator
//! observes a cooperative cancellation token.

use crate::engine::{CopyReason, DecisionEngine, FileOutcome};
use crate::error::{Result, SnaplinkError};
use crate::facts::FileFacts;
use crate::fingerprint::Fingerprint;
use crate::fsops;
use crate::index::{read_sidecar, HashIndex, MergeStats, SIDECAR_NAME};
use crate::patterns::{parse_pattern_file, PatternSet};
use crate::report::{RunSummary, SidecarVerification, VerifyReport};
use crate::resolver::PathResolver;
use crate::source::SourceProvider;
use chrono::{Local, NaiveDate};
use globset::Glob;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Cooperative cancellation signal observed between files
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token in the not-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the orchestrator exits cleanly before the
    /// next file
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for a backup run
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Inclusion pattern file, or a directory (interpreted as `dir/*`)
    pub source: PathBuf,
    /// Repository root receiving dated snapshot directories
    pub backup_root: PathBuf,
    /// Optional exclusion pattern file
    pub exclusion_file: Option<PathBuf>,
    /// Replace an existing snapshot directory for the same date
    pub delete_existing: bool,
    /// Read sources directly instead of through a snapshot view
    pub not_shadowed: bool,
    /// Index this directory first and link against it
    pub link_to_directory: Option<PathBuf>,
    /// Extra sidecars (files or directory trees) to import
    pub link_to_hashtables: Vec<PathBuf>,
    /// Snapshot date override; defaults to today
    pub date: Option<NaiveDate>,
}

/// Options for an index-only run
#[derive(Debug, Clone)]
pub struct MakeIndexOptions {
    /// Directory whose files are fingerprinted
    pub directory: PathBuf,
    /// Read sources directly instead of through a snapshot view
    pub not_shadowed: bool,
}

/// Options for an in-place rehardlink run
#[derive(Debug, Clone)]
pub struct RehardlinkOptions {
    /// Directory tree rewritten in place
    pub directory: PathBuf,
    /// Extra sidecars (files or directory trees) to import
    pub link_to_hashtables: Vec<PathBuf>,
}

/// Options for a verification run
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Directory tree whose sidecars are verified
    pub directory: PathBuf,
}

/// The mode a single invocation runs in; exactly one is active
#[derive(Debug, Clone)]
pub enum Mode {
    /// Produce a new dated snapshot under the backup root
    Backup(BackupOptions),
    /// Fingerprint a directory and write its sidecar
    MakeIndex(MakeIndexOptions),
    /// Replace byte-identical files with hard links, in place
    Rehardlink(RehardlinkOptions),
    /// Recompute fingerprints for every sidecar entry and report
    Verify(VerifyOptions),
}

/// Drives one mode across a filtered file stream
#[derive(Debug)]
pub struct Orchestrator<R: PathResolver, S: SourceProvider> {
    resolver: R,
    provider: S,
    engine: DecisionEngine,
    cancel: CancelToken,
}

impl Orchestrator<crate::resolver::IdentityResolver, crate::source::DirectProvider> {
    /// Orchestrator reading the live filesystem with identity path
    /// resolution
    pub fn direct() -> Self {
        Orchestrator::new(
            crate::resolver::IdentityResolver,
            crate::source::DirectProvider,
        )
    }
}

impl<R: PathResolver, S: SourceProvider> Orchestrator<R, S> {
    /// Create an orchestrator over the given resolver and provider
    pub fn new(resolver: R, provider: S) -> Self {
        Orchestrator {
            resolver,
            provider,
            engine: DecisionEngine::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Replace the decision engine (retry policy, test rigging)
    pub fn with_engine(mut self, engine: DecisionEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Attach a cancellation token shared with the caller
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one mode end-to-end
    ///
    /// Resolver indirections and the provider's snapshot view are
    /// released exactly once, whether the mode succeeded or not.
    pub fn run(&mut self, mode: Mode) -> Result<RunSummary> {
        let started = Instant::now();
        let result = match mode {
            Mode::Backup(opts) => self.run_backup(opts),
            Mode::MakeIndex(opts) => self.run_make_index(opts),
            Mode::Rehardlink(opts) => self.run_rehardlink(opts),
            Mode::Verify(opts) => self.run_verify(opts),
        };

        let released_resolver = self.resolver.release_all();
        let released_provider = self.provider.release();

        let mut summary = result?;
        released_resolver?;
        released_provider?;
        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    fn run_backup(&mut self, opts: BackupOptions) -> Result<RunSummary> {
        if opts.backup_root.as_os_str().is_empty() {
            return Err(SnaplinkError::invalid_arguments(
                "backup requires a non-empty destination root",
            ));
        }
        if !opts.source.exists() {
            return Err(SnaplinkError::invalid_arguments(format!(
                "source {:?} does not exist",
                opts.source
            )));
        }

        let date = opts.date.unwrap_or_else(|| Local::now().date_naive());
        let snapshot_dir = opts
            .backup_root
            .join(date.format("%Y-%m-%d").to_string());
        if snapshot_dir.exists() {
            if opts.delete_existing {
                info!("deleting existing snapshot {:?}", snapshot_dir);
                fs::remove_dir_all(&snapshot_dir)?;
            } else {
                return Err(SnaplinkError::SnapshotExists(snapshot_dir));
            }
        }

        let mut summary = RunSummary::default();
        let mut index = HashIndex::new();

        // An explicit link target is indexed first so its sidecar is
        // importable like any other
        if let Some(link_dir) = &opts.link_to_directory {
            let sub = self.run_make_index(MakeIndexOptions {
                directory: link_dir.clone(),
                not_shadowed: opts.not_shadowed,
            })?;
            debug!(
                "link-to-directory indexed {} files under {:?}",
                sub.files_indexed, link_dir
            );
            summary.merge.absorb(&index.merge_from(link_dir, SIDECAR_NAME, true)?);
        }

        if opts.backup_root.exists() {
            summary
                .merge
                .absorb(&index.merge_from(&opts.backup_root, SIDECAR_NAME, true)?);
        }
        self.import_extra_sidecars(&opts.link_to_hashtables, &mut index, &mut summary.merge)?;

        let sources = compose_sources(&opts.source, opts.exclusion_file.as_deref())?;
        info!(
            "backing up {} sources into {:?} ({} known fingerprints)",
            sources.len(),
            snapshot_dir,
            index.len()
        );

        fs::create_dir_all(&snapshot_dir)?;

        for path in &sources {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.process_backup_file(path, &snapshot_dir, &mut index, &mut summary);
        }

        summary.entries_exported = index.export(&snapshot_dir, SIDECAR_NAME)?;
        Ok(summary)
    }

    fn process_backup_file(
        &mut self,
        path: &Path,
        snapshot_dir: &Path,
        index: &mut HashIndex,
        summary: &mut RunSummary,
    ) {
        let short = match self.resolver.shorten(path) {
            Ok(p) => p,
            Err(e) => {
                warn!("skipping {:?}: {}", path, e);
                summary.files_skipped += 1;
                return;
            }
        };
        let mut handle = match self.provider.open(&short) {
            Ok(h) => h,
            Err(e) => {
                warn!("failed to open {:?}: {}", path, e);
                summary.files_failed += 1;
                return;
            }
        };
        if handle.facts.is_symlink {
            warn!("skipping symbolic link {:?}", handle.display_path);
            summary.files_skipped += 1;
            return;
        }

        let dest = dest_path_for(snapshot_dir, &handle.display_path);
        let result = match self.engine.decide(&mut handle, index) {
            Ok(decision) => self.engine.apply_backup(decision, &handle, &dest, index),
            Err(e) => Err(e),
        };
        match result {
            Ok(outcome) => absorb_backup_outcome(summary, &outcome),
            Err(e) => {
                let translated_path = self.provider.translate(&handle.physical_path);
                warn!("failed {:?}: {}", translated_path, e);
                summary.files_failed += 1;
            }
        }
    }

    fn run_make_index(&mut self, opts: MakeIndexOptions) -> Result<RunSummary> {
        let directory = require_directory(&opts.directory)?;
        let mut summary = RunSummary::default();
        let mut index = HashIndex::new();

        for entry in fsops::list_recursive(&directory) {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!("walk error: {}", e);
                    summary.files_failed += 1;
                    continue;
                }
            };
            if let Err(e) = self.index_one_file(&path, &mut index, &mut summary) {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("failed to index {:?}: {}", path, e);
                summary.files_failed += 1;
            }
        }

        summary.entries_exported = index.export(&directory, SIDECAR_NAME)?;
        Ok(summary)
    }

    fn index_one_file(
        &mut self,
        path: &Path,
        index: &mut HashIndex,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let short = self.resolver.shorten(path)?;
        let mut handle = self.provider.open(&short)?;
        if handle.facts.is_dir {
            return Ok(());
        }
        if handle.facts.is_symlink {
            summary.files_skipped += 1;
            return Ok(());
        }
        if handle.facts.readonly {
            debug!("not indexing read-only file {:?}", handle.display_path);
            summary.readonly_copies += 1;
            return Ok(());
        }

        let reader = handle.take_reader()?;
        let fingerprint = self
            .engine
            .fingerprinter()
            .fingerprint(reader, &handle.facts)?;
        index.insert_current(fingerprint, path.to_path_buf());
        summary.files_indexed += 1;
        Ok(())
    }

    fn run_rehardlink(&mut self, opts: RehardlinkOptions) -> Result<RunSummary> {
        let directory = require_directory(&opts.directory)?;
        let mut summary = RunSummary::default();
        let mut index = HashIndex::new();

        // A previous run's sidecar makes re-runs idempotent; extra
        // hashtables extend the candidate pool
        summary
            .merge
            .absorb(&index.merge_from(&directory, SIDECAR_NAME, true)?);
        self.import_extra_sidecars(&opts.link_to_hashtables, &mut index, &mut summary.merge)?;

        for entry in fsops::list_recursive(&directory) {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!("walk error: {}", e);
                    summary.files_failed += 1;
                    continue;
                }
            };
            if path.file_name().map(|n| n == SIDECAR_NAME).unwrap_or(false) {
                continue;
            }
            if let Err(e) = self.relink_one_file(&path, &mut index, &mut summary) {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("failed to relink {:?}: {}", path, e);
                summary.files_failed += 1;
            }
        }

        summary.entries_exported = index.export(&directory, SIDECAR_NAME)?;
        Ok(summary)
    }

    fn relink_one_file(
        &mut self,
        path: &Path,
        index: &mut HashIndex,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let short = self.resolver.shorten(path)?;
        let mut handle = self.provider.open(&short)?;
        if handle.facts.is_symlink {
            summary.files_skipped += 1;
            return Ok(());
        }
        let decision = self.engine.decide(&mut handle, index)?;
        let outcome = self.engine.apply_in_place(decision, &handle, index)?;
        absorb_in_place_outcome(summary, &outcome);
        Ok(())
    }

    fn run_verify(&mut self, opts: VerifyOptions) -> Result<RunSummary> {
        let directory = require_directory(&opts.directory)?;
        let mut report = VerifyReport::default();

        let walker = WalkDir::new(&directory)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() || entry.file_name() != SIDECAR_NAME {
                continue;
            }
            if self.cancel.is_cancelled() {
                break;
            }
            match self.verify_sidecar(entry.path()) {
                Ok(verification) => report.sidecars.push(verification),
                Err(e) => warn!("skipping sidecar {:?}: {}", entry.path(), e),
            }
        }

        let (correct, divergent, missing) = report.totals();
        info!(
            "verified {} sidecars: {} correct, {} divergent, {} missing",
            report.sidecars.len(),
            correct,
            divergent,
            missing
        );
        Ok(RunSummary {
            verify: Some(report),
            cancelled: self.cancel.is_cancelled(),
            ..RunSummary::default()
        })
    }

    fn verify_sidecar(&mut self, sidecar: &Path) -> Result<SidecarVerification> {
        let parent = sidecar
            .parent()
            .ok_or_else(|| SnaplinkError::internal(format!("sidecar {:?} has no parent", sidecar)))?
            .to_path_buf();
        let map = read_sidecar(sidecar)?;

        let mut result = SidecarVerification {
            sidecar: sidecar.to_path_buf(),
            correct: 0,
            divergent: 0,
            missing: 0,
            divergent_paths: Vec::new(),
        };

        for (expected, relative) in map {
            let resolved = parent.join(relative.trim_start_matches(['/', '\\']));
            if !resolved.exists() {
                debug!("{}: referenced file {:?} is missing", expected, resolved);
                result.missing += 1;
                continue;
            }
            match self.recompute_fingerprint(&resolved) {
                Ok(actual) if actual == expected => result.correct += 1,
                Ok(actual) => {
                    warn!(
                        "{:?}: fingerprint diverged (expected {}, got {})",
                        resolved, expected, actual
                    );
                    result.divergent += 1;
                    result.divergent_paths.push(resolved);
                }
                Err(e) => {
                    warn!("{:?}: unreadable during verify: {}", resolved, e);
                    result.missing += 1;
                }
            }
        }
        Ok(result)
    }

    fn recompute_fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        let facts = FileFacts::probe(path)?;
        let file = File::open(path)?;
        self.engine.fingerprinter().fingerprint(file, &facts)
    }

    fn import_extra_sidecars(
        &mut self,
        sources: &[PathBuf],
        index: &mut HashIndex,
        merge: &mut MergeStats,
    ) -> Result<()> {
        for extra in sources {
            if extra.is_dir() {
                merge.absorb(&index.merge_from(extra, SIDECAR_NAME, true)?);
            } else if extra.is_file() {
                merge.absorb(&index.import_sidecar(extra, true)?);
            } else {
                warn!("link-to-hashtables source {:?} does not exist", extra);
            }
        }
        Ok(())
    }
}

/// Compose the destination path for a source inside a snapshot
/// directory
///
/// The source's root is stripped; a path prefix (drive letter on
/// platforms that have one) is mapped to its alphanumeric token so
/// sources from different drives cannot collide.
pub fn dest_path_for(snapshot_dir: &Path, source: &Path) -> PathBuf {
    let mut dest = snapshot_dir.to_path_buf();
    for component in source.components() {
        match component {
            Component::Prefix(prefix) => {
                let token: String = prefix
                    .as_os_str()
                    .to_string_lossy()
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .collect();
                if !token.is_empty() {
                    dest.push(token);
                }
            }
            Component::RootDir | Component::CurDir | Component::ParentDir => {}
            Component::Normal(part) => dest.push(part),
        }
    }
    dest
}

/// Build the sorted-unique source stream for a backup
///
/// `source` is either a directory (interpreted as `dir/*`) or a
/// line-oriented inclusion pattern file; `exclusion_file` filters the
/// result.
pub fn compose_sources(
    source: &Path,
    exclusion_file: Option<&Path>,
) -> Result<BTreeSet<PathBuf>> {
    let exclude = match exclusion_file {
        Some(path) => PatternSet::compile(&parse_pattern_file(path)?)?,
        None => PatternSet::empty(),
    };

    let includes = if source.is_dir() {
        let dir = fs::canonicalize(source)?;
        vec![format!(
            "{}{}*",
            dir.display(),
            std::path::MAIN_SEPARATOR
        )]
    } else {
        parse_pattern_file(source)?
    };

    let mut sources = BTreeSet::new();
    for pattern in &includes {
        expand_include(pattern, &exclude, &mut sources)?;
    }
    debug!(
        "composed {} unique sources from {} patterns",
        sources.len(),
        includes.len()
    );
    Ok(sources)
}

/// Expand one inclusion pattern into the source set
fn expand_include(
    pattern: &str,
    exclude: &PatternSet,
    sources: &mut BTreeSet<PathBuf>,
) -> Result<()> {
    if !pattern.contains(['*', '?']) {
        let path = PathBuf::from(pattern);
        if path.is_dir() {
            collect_tree(&path, exclude, sources);
        } else if path.exists() {
            if !exclude.is_match(&path) {
                sources.insert(path);
            }
        } else {
            warn!("inclusion pattern matches nothing: {}", pattern);
        }
        return Ok(());
    }

    let base = glob_base(pattern);
    if !base.is_dir() {
        warn!("inclusion pattern base {:?} is not a directory", base);
        return Ok(());
    }
    let matcher = Glob::new(pattern)
        .map_err(|e| SnaplinkError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?
        .compile_matcher();

    for entry in fsops::list_recursive(&base) {
        match entry {
            Ok(path) => {
                if matcher.is_match(&path) && !exclude.is_match(&path) {
                    sources.insert(path);
                }
            }
            Err(e) => warn!("walk error while expanding '{}': {}", pattern, e),
        }
    }
    Ok(())
}

/// Insert every entry of a tree, subject to exclusions
fn collect_tree(dir: &Path, exclude: &PatternSet, sources: &mut BTreeSet<PathBuf>) {
    for entry in fsops::list_recursive(dir) {
        match entry {
            Ok(path) => {
                if !exclude.is_match(&path) {
                    sources.insert(path);
                }
            }
            Err(e) => warn!("walk error under {:?}: {}", dir, e),
        }
    }
}

/// The directory part of a glob pattern: everything before the last
/// separator preceding the first wildcard
fn glob_base(pattern: &str) -> PathBuf {
    let first_glob = pattern
        .find(['*', '?'])
        .expect("glob_base called without wildcard");
    let prefix = &pattern[..first_glob];
    match prefix.rfind(['/', '\\']) {
        Some(0) => PathBuf::from(std::path::MAIN_SEPARATOR.to_string()),
        Some(pos) => PathBuf::from(&prefix[..pos]),
        None => PathBuf::from("."),
    }
}

fn require_directory(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        return Err(SnaplinkError::invalid_arguments(format!(
            "{:?} is not a directory",
            path
        )));
    }
    Ok(fs::canonicalize(path)?)
}

fn absorb_backup_outcome(summary: &mut RunSummary, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Linked { bytes } => {
            summary.files_linked += 1;
            summary.bytes_linked += bytes;
        }
        FileOutcome::Copied {
            reason: CopyReason::Directory,
            ..
        } => summary.directories_created += 1,
        FileOutcome::Copied { reason, bytes } => {
            summary.files_copied += 1;
            summary.bytes_copied += bytes;
            if *reason == CopyReason::ReadOnly {
                summary.readonly_copies += 1;
            }
        }
        FileOutcome::Unchanged => summary.files_unchanged += 1,
    }
}

fn absorb_in_place_outcome(summary: &mut RunSummary, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Linked { bytes } => {
            summary.files_linked += 1;
            summary.bytes_linked += bytes;
        }
        FileOutcome::Copied {
            reason: CopyReason::Directory,
            ..
        } => {}
        FileOutcome::Copied {
            reason: CopyReason::ReadOnly,
            ..
        } => summary.readonly_copies += 1,
        FileOutcome::Copied { .. } => summary.files_indexed += 1,
        FileOutcome::Unchanged => summary.files_unchanged += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_dest_path_for_strips_root() {
        let snap = PathBuf::from("/backups/2024-01-01");
        assert_eq!(
            dest_path_for(&snap, Path::new("/home/user/file.txt")),
            PathBuf::from("/backups/2024-01-01/home/user/file.txt")
        );
    }

    #[test]
    fn test_dest_path_for_relative_source() {
        let snap = PathBuf::from("/backups/2024-01-01");
        assert_eq!(
            dest_path_for(&snap, Path::new("data/file.txt")),
            PathBuf::from("/backups/2024-01-01/data/file.txt")
        );
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("/data/docs/*"), PathBuf::from("/data/docs"));
        assert_eq!(glob_base("/data/d?cs/x"), PathBuf::from("/data"));
        assert_eq!(glob_base("/*"), PathBuf::from("/"));
        assert_eq!(glob_base("x*"), PathBuf::from("."));
    }

    #[test]
    fn test_compose_sources_from_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::write(root.join("sub/b.txt"), b"b").unwrap();

        let sources = compose_sources(root, None).unwrap();
        let canonical = fs::canonicalize(root).unwrap();
        let expected: BTreeSet<PathBuf> = [
            canonical.join("a.txt"),
            canonical.join("sub"),
            canonical.join("sub/b.txt"),
        ]
        .into_iter()
        .collect();
        assert_eq!(sources, expected);
    }

    #[test]
    fn test_compose_sources_applies_exclusions() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("keep.txt"), b"k").unwrap();
        fs::write(root.join("drop.log"), b"d").unwrap();

        let canonical = fs::canonicalize(root).unwrap();
        let exclusions = temp.path().join("exclude.txt");
        fs::write(
            &exclusions,
            format!("{}/drop.log # noisy\n", canonical.display()),
        )
        .unwrap();

        let sources = compose_sources(root, Some(&exclusions)).unwrap();
        assert!(sources.contains(&canonical.join("keep.txt")));
        assert!(!sources.contains(&canonical.join("drop.log")));
        // The exclusion file itself lives under root and is enumerated
        assert!(sources.contains(&canonical.join("exclude.txt")));
    }

    #[test]
    fn test_compose_sources_from_pattern_file() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        fs::create_dir_all(data.join("deep")).unwrap();
        fs::write(data.join("one.txt"), b"1").unwrap();
        fs::write(data.join("deep/two.txt"), b"2").unwrap();

        let include = temp.path().join("include.txt");
        fs::write(
            &include,
            format!("{}/data/* :: everything\n", temp.path().display()),
        )
        .unwrap();

        let sources = compose_sources(&include, None).unwrap();
        assert!(sources.contains(&data.join("one.txt")));
        assert!(sources.contains(&data.join("deep/two.txt")));
        assert!(sources.contains(&data.join("deep")));
        assert!(!sources.contains(&include));
    }

    #[test]
    fn test_require_directory_rejects_files() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f");
        fs::write(&file, b"x").unwrap();
        assert!(require_directory(&file).is_err());
        assert!(require_directory(temp.path()).is_ok());
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let shared = token.clone();
        shared.cancel();
        assert!(token.is_cancelled());
    }
}
