//! Fingerprint index and sidecar persistence
//!
//! The index is an in-memory mapping from `Fingerprint` to the absolute
//! path of a file already present in the repository. It is populated by
//! merging the sidecar files of earlier snapshots, augmented during the
//! run with each newly copied file, and flushed at the end as a sidecar
//! of its own containing only this run's entries.
//!
//! ## Sidecar format
//!
//! A sidecar is a single JSON object mapping uppercase hex-dash
//! fingerprints to path strings. Each path starts with a separator and
//! is interpreted relative to the directory containing the sidecar, so
//! a repository subtree can be moved without rewriting its sidecars.
//! Writes are atomic (temp file + rename) and flushed before the
//! orchestrator reports success.
//!
//! ## Merge rules
//!
//! `merge_from` walks a repository tree in lexicographic depth-first
//! order, which together with first-write-wins makes conflicting
//! sidecars resolve reproducibly: existing keys are never overwritten.
//! Rigorous mode additionally stat-checks every resolved reference and
//! drops entries whose file no longer exists, warning per sidecar.

use crate::error::{Result, SnaplinkError};
use crate::fingerprint::Fingerprint;
use crate::fsops;
use globset::Glob;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Well-known sidecar file name written next to every snapshot
pub const SIDECAR_NAME: &str = "snaplink-hashtable.json";

/// Counters describing one or more merge operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Number of sidecar files read
    pub sidecars_read: usize,
    /// Entries inserted into the in-memory index
    pub entries_imported: usize,
    /// Entries dropped because the referenced file was missing
    pub entries_dropped: usize,
    /// Entries ignored because the fingerprint was already present
    pub duplicates_ignored: usize,
}

impl MergeStats {
    /// Fold another stats value into this one
    pub fn absorb(&mut self, other: &MergeStats) {
        self.sidecars_read += other.sidecars_read;
        self.entries_imported += other.entries_imported;
        self.entries_dropped += other.entries_dropped;
        self.duplicates_ignored += other.duplicates_ignored;
    }
}

/// In-memory fingerprint index with repository merge and sidecar export
#[derive(Debug, Default)]
pub struct HashIndex {
    /// Everything known: merged sidecars plus this run's inserts
    entries: BTreeMap<Fingerprint, PathBuf>,
    /// Only this run's inserts; the subset that gets exported
    run_entries: BTreeMap<Fingerprint, PathBuf>,
}

impl HashIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index knows no fingerprints at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries recorded during this run
    pub fn run_len(&self) -> usize {
        self.run_entries.len()
    }

    /// Look up the candidate path for a fingerprint
    pub fn lookup(&self, fp: &Fingerprint) -> Option<&Path> {
        self.entries.get(fp).map(PathBuf::as_path)
    }

    /// Record a file produced by this run
    ///
    /// Updates both the lookup map (so later files in the same run can
    /// link to this one) and the this-run export map. A fingerprint
    /// already recorded this run is silently left alone.
    pub fn insert_current(&mut self, fp: Fingerprint, absolute_path: PathBuf) {
        if self.run_entries.contains_key(&fp) {
            return;
        }
        self.entries.entry(fp).or_insert_with(|| absolute_path.clone());
        self.run_entries.insert(fp, absolute_path);
    }

    /// Record a destination produced by linking, for export only
    ///
    /// The lookup map is left alone: the candidate that was linked to
    /// stays the canonical resolution for its fingerprint. The sidecar,
    /// however, must describe this run's snapshot, so the new
    /// destination is remembered for export unless the fingerprint was
    /// already recorded this run.
    pub fn record_run(&mut self, fp: Fingerprint, absolute_path: PathBuf) {
        self.run_entries.entry(fp).or_insert(absolute_path);
    }

    /// Merge every sidecar under `root` whose file name matches
    /// `sidecar_name` (`"*"` matches any file)
    ///
    /// The walk is lexicographic depth-first; first-write-wins applies
    /// across sidecars and against entries already present. Unreadable
    /// sidecars are skipped with a warning rather than aborting the
    /// merge.
    pub fn merge_from(
        &mut self,
        root: &Path,
        sidecar_name: &str,
        rigorous: bool,
    ) -> Result<MergeStats> {
        let matcher = Glob::new(sidecar_name)
            .map_err(|e| SnaplinkError::InvalidPattern {
                pattern: sidecar_name.to_string(),
                reason: e.to_string(),
            })?
            .compile_matcher();

        let mut stats = MergeStats::default();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("merge walk error under {:?}: {}", root, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if !matcher.is_match(entry.file_name()) {
                continue;
            }
            match self.import_sidecar(entry.path(), rigorous) {
                Ok(one) => stats.absorb(&one),
                Err(e) => warn!("skipping sidecar {:?}: {}", entry.path(), e),
            }
        }

        info!(
            "merged {} sidecars under {:?}: {} imported, {} dropped, {} duplicates",
            stats.sidecars_read,
            root,
            stats.entries_imported,
            stats.entries_dropped,
            stats.duplicates_ignored
        );
        Ok(stats)
    }

    /// Import a single sidecar file
    ///
    /// Relative paths resolve against the sidecar's parent directory.
    /// In rigorous mode every resolved path is stat-checked and missing
    /// references are dropped (warned once per sidecar).
    pub fn import_sidecar(&mut self, sidecar: &Path, rigorous: bool) -> Result<MergeStats> {
        let parent = sidecar
            .parent()
            .ok_or_else(|| SnaplinkError::internal(format!("sidecar {:?} has no parent", sidecar)))?
            .to_path_buf();

        let map = read_sidecar(sidecar)?;
        let mut stats = MergeStats {
            sidecars_read: 1,
            ..MergeStats::default()
        };

        for (fp, relative) in map {
            if self.entries.contains_key(&fp) {
                stats.duplicates_ignored += 1;
                continue;
            }
            let resolved = resolve_relative(&parent, &relative);
            if rigorous && !resolved.exists() {
                debug!("{}: hash refers to nonexisting file {:?}", fp, resolved);
                stats.entries_dropped += 1;
                continue;
            }
            self.entries.insert(fp, resolved);
            stats.entries_imported += 1;
        }

        if stats.entries_dropped > 0 {
            warn!(
                "sidecar {:?}: dropped {} references to missing files",
                sidecar, stats.entries_dropped
            );
        }
        Ok(stats)
    }

    /// Write this run's entries as `{sidecar_dir}/{sidecar_name}`
    ///
    /// Absolute paths are converted to paths relative to `sidecar_dir`
    /// with a leading separator. An entry outside `sidecar_dir` would
    /// break the sidecar's relocatability and is skipped with a warning;
    /// correctly composed runs never produce one.
    pub fn export(&self, sidecar_dir: &Path, sidecar_name: &str) -> Result<usize> {
        let mut map: BTreeMap<Fingerprint, String> = BTreeMap::new();
        for (fp, absolute) in &self.run_entries {
            match absolute.strip_prefix(sidecar_dir) {
                Ok(relative) => {
                    let mut value = String::new();
                    value.push(std::path::MAIN_SEPARATOR);
                    value.push_str(&relative.to_string_lossy());
                    map.insert(*fp, value);
                }
                Err(_) => {
                    warn!(
                        "not exporting {:?}: outside sidecar directory {:?}",
                        absolute, sidecar_dir
                    );
                }
            }
        }

        let path = sidecar_dir.join(sidecar_name);
        let json = serde_json::to_vec_pretty(&map)?;
        fsops::atomic_write(&path, &json)?;
        debug!("exported {} entries to {:?}", map.len(), path);
        Ok(map.len())
    }
}

/// Parse a sidecar file into its fingerprint→relative-path map
pub fn read_sidecar(path: &Path) -> Result<BTreeMap<Fingerprint, String>> {
    let text = std::fs::read_to_string(path).map_err(|e| SnaplinkError::SidecarUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| SnaplinkError::SidecarUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Resolve a sidecar value against the sidecar's parent directory
///
/// Values begin with a separator ("/sub/file"); leading separators are
/// stripped so the remainder joins cleanly.
fn resolve_relative(parent: &Path, value: &str) -> PathBuf {
    let relative = value.trim_start_matches(['/', '\\']);
    let mut resolved = parent.to_path_buf();
    for component in Path::new(relative).components() {
        if let Component::Normal(part) = component {
            resolved.push(part);
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint::from_bytes([byte; 16])
    }

    #[test]
    fn test_insert_current_first_write_wins() {
        let mut index = HashIndex::new();
        index.insert_current(fp(1), PathBuf::from("/snap/a"));
        index.insert_current(fp(1), PathBuf::from("/snap/b"));

        assert_eq!(index.lookup(&fp(1)), Some(Path::new("/snap/a")));
        assert_eq!(index.run_len(), 1);
    }

    #[test]
    fn test_export_writes_relative_paths_with_leading_separator() {
        let temp = TempDir::new().unwrap();
        let snap = temp.path().join("2024-01-01");
        fs::create_dir_all(snap.join("sub")).unwrap();
        fs::write(snap.join("sub/file.txt"), b"x").unwrap();

        let mut index = HashIndex::new();
        index.insert_current(fp(7), snap.join("sub/file.txt"));
        let exported = index.export(&snap, SIDECAR_NAME).unwrap();
        assert_eq!(exported, 1);

        let map = read_sidecar(&snap.join(SIDECAR_NAME)).unwrap();
        let value = map.get(&fp(7)).unwrap();
        assert!(value.starts_with(std::path::MAIN_SEPARATOR));
        assert!(value.contains("file.txt"));
    }

    #[test]
    fn test_export_round_trip_addresses_same_file() {
        let temp = TempDir::new().unwrap();
        let snap = temp.path().join("2024-01-01");
        fs::create_dir_all(snap.join("deep/er")).unwrap();
        let target = snap.join("deep/er/file.bin");
        fs::write(&target, b"bytes").unwrap();

        let mut index = HashIndex::new();
        index.insert_current(fp(9), target.clone());
        index.export(&snap, SIDECAR_NAME).unwrap();

        let mut fresh = HashIndex::new();
        fresh
            .import_sidecar(&snap.join(SIDECAR_NAME), true)
            .unwrap();
        assert_eq!(fresh.lookup(&fp(9)), Some(target.as_path()));
    }

    #[test]
    fn test_export_skips_entries_outside_dir() {
        let temp = TempDir::new().unwrap();
        let snap = temp.path().join("2024-01-01");
        fs::create_dir_all(&snap).unwrap();

        let mut index = HashIndex::new();
        index.insert_current(fp(3), PathBuf::from("/elsewhere/file"));
        let exported = index.export(&snap, SIDECAR_NAME).unwrap();
        assert_eq!(exported, 0);
    }

    #[test]
    fn test_merge_first_write_wins_in_walk_order() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        // Two snapshot directories; "2024-01-01" sorts before "2024-01-02"
        for (dir, content) in [("2024-01-01", "early"), ("2024-01-02", "late")] {
            let snap = root.join(dir);
            fs::create_dir_all(&snap).unwrap();
            fs::write(snap.join("payload.txt"), content).unwrap();
            let mut writer = HashIndex::new();
            writer.insert_current(fp(5), snap.join("payload.txt"));
            writer.export(&snap, SIDECAR_NAME).unwrap();
        }

        let mut index = HashIndex::new();
        let stats = index.merge_from(root, SIDECAR_NAME, true).unwrap();
        assert_eq!(stats.sidecars_read, 2);
        assert_eq!(stats.entries_imported, 1);
        assert_eq!(stats.duplicates_ignored, 1);
        assert_eq!(
            index.lookup(&fp(5)),
            Some(root.join("2024-01-01/payload.txt").as_path())
        );
    }

    #[test]
    fn test_rigorous_merge_drops_missing_references() {
        let temp = TempDir::new().unwrap();
        let snap = temp.path().join("2024-01-01");
        fs::create_dir_all(&snap).unwrap();
        fs::write(snap.join("present.txt"), b"here").unwrap();

        let mut writer = HashIndex::new();
        writer.insert_current(fp(1), snap.join("present.txt"));
        writer.insert_current(fp(2), snap.join("vanished.txt"));
        // Bypass the outside-dir guard by creating the file, exporting,
        // then deleting it
        fs::write(snap.join("vanished.txt"), b"gone soon").unwrap();
        writer.export(&snap, SIDECAR_NAME).unwrap();
        fs::remove_file(snap.join("vanished.txt")).unwrap();

        let mut rigorous = HashIndex::new();
        let stats = rigorous.merge_from(temp.path(), SIDECAR_NAME, true).unwrap();
        assert_eq!(stats.entries_imported, 1);
        assert_eq!(stats.entries_dropped, 1);
        assert!(rigorous.lookup(&fp(1)).is_some());
        assert!(rigorous.lookup(&fp(2)).is_none());

        // Non-rigorous keeps the dangling reference
        let mut lax = HashIndex::new();
        let stats = lax.merge_from(temp.path(), SIDECAR_NAME, false).unwrap();
        assert_eq!(stats.entries_imported, 2);
        assert!(lax.lookup(&fp(2)).is_some());
    }

    #[test]
    fn test_merge_star_matches_any_sidecar_name() {
        let temp = TempDir::new().unwrap();
        let snap = temp.path().join("legacy");
        fs::create_dir_all(&snap).unwrap();
        fs::write(snap.join("data.bin"), b"bytes").unwrap();

        let mut writer = HashIndex::new();
        writer.insert_current(fp(8), snap.join("data.bin"));
        writer.export(&snap, "legacy-table.json").unwrap();

        let mut index = HashIndex::new();
        // "*" would also try data.bin itself; it is skipped with a
        // warning, not a failure
        let stats = index.merge_from(temp.path(), "*", true).unwrap();
        assert_eq!(stats.entries_imported, 1);
        assert!(index.lookup(&fp(8)).is_some());
    }

    #[test]
    fn test_sidecar_round_trip_long_values() {
        let temp = TempDir::new().unwrap();
        let snap = temp.path().join("snap");
        let long_dir: PathBuf = (0..40).fold(snap.clone(), |p, i| p.join(format!("level{:02}", i)));
        fs::create_dir_all(&long_dir).unwrap();
        let target = long_dir.join("leaf.txt");
        fs::write(&target, b"deep").unwrap();

        let mut index = HashIndex::new();
        index.insert_current(fp(4), target.clone());
        index.export(&snap, SIDECAR_NAME).unwrap();

        let mut fresh = HashIndex::new();
        fresh.import_sidecar(&snap.join(SIDECAR_NAME), true).unwrap();
        assert_eq!(fresh.lookup(&fp(4)), Some(target.as_path()));
    }
}
