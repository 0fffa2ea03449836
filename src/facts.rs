//! File metadata view used for fingerprinting and decision checks
//!
//! `FileFacts` captures the handful of attributes the engine cares about:
//! length, UTC last-write and creation times, the hidden flag and the
//! read-only flag. The view is read once per file with `symlink_metadata`
//! so symbolic links are never silently followed.

use crate::error::Result;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;

/// Metadata snapshot of a single filesystem entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFacts {
    /// Length in bytes (0 for directories)
    pub len: u64,
    /// Last write time, UTC
    pub modified: DateTime<Utc>,
    /// Creation time, UTC
    ///
    /// No portable API can *set* a file's birth time, so a copied file
    /// could never reproduce it and every candidate re-check would fail.
    /// The engine therefore feeds the last-write time through this slot;
    /// the fingerprint composition keeps its creation-time component,
    /// the component just resolves to a value the copy primitive can
    /// reproduce.
    pub created: DateTime<Utc>,
    /// Hidden flag (dotfile on Unix, attribute bit on Windows)
    pub hidden: bool,
    /// Read-only flag
    pub readonly: bool,
    /// Whether the entry is a directory
    pub is_dir: bool,
    /// Whether the entry is a symbolic link
    pub is_symlink: bool,
}

impl FileFacts {
    /// Read the facts for `path` without following symbolic links
    pub fn probe(path: &Path) -> Result<Self> {
        let metadata = fs::symlink_metadata(path)?;
        Ok(Self::from_metadata(path, &metadata))
    }

    /// Build facts from an already-fetched metadata handle
    pub fn from_metadata(path: &Path, metadata: &fs::Metadata) -> Self {
        let modified: DateTime<Utc> = metadata
            .modified()
            .map(Into::into)
            .unwrap_or_else(|_| Utc::now());

        FileFacts {
            len: if metadata.is_dir() { 0 } else { metadata.len() },
            modified,
            created: modified,
            hidden: is_hidden(path, metadata),
            readonly: metadata.permissions().readonly(),
            is_dir: metadata.is_dir(),
            is_symlink: metadata.file_type().is_symlink(),
        }
    }

    /// Whether the entry is a regular file eligible for fingerprinting
    /// and linking: not a directory, not a symlink, not read-only
    pub fn is_linkable(&self) -> bool {
        !self.is_dir && !self.is_symlink && !self.readonly
    }

    /// Whether the attributes folded into the fingerprint match another
    /// view (last-write time, creation time, hidden flag)
    ///
    /// Comparison happens at the same tick granularity the fingerprint
    /// uses, so a match here is exactly "same fingerprint inputs".
    pub fn attrs_match(&self, other: &FileFacts) -> bool {
        time_ticks(self.modified) == time_ticks(other.modified)
            && time_ticks(self.created) == time_ticks(other.created)
            && self.hidden == other.hidden
    }
}

/// Convert a UTC timestamp to a 64-bit count of 100 ns ticks since the
/// Unix epoch
pub fn time_ticks(t: DateTime<Utc>) -> i64 {
    t.timestamp() * 10_000_000 + i64::from(t.timestamp_subsec_nanos()) / 100
}

/// Fold a 64-bit tick count to 32 bits by XORing the high and low halves
pub fn fold_ticks(ticks: i64) -> i32 {
    (ticks as i32) ^ ((ticks >> 32) as i32)
}

/// Hidden detection on Unix: a leading dot in the file name
#[cfg(unix)]
fn is_hidden(path: &Path, _metadata: &fs::Metadata) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Hidden detection on Windows: the FILE_ATTRIBUTE_HIDDEN bit
#[cfg(windows)]
fn is_hidden(_path: &Path, metadata: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    metadata.file_attributes() & 0x02 != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_tick_fold() {
        assert_eq!(fold_ticks(0), 0);
        // Low half only
        assert_eq!(fold_ticks(0x1234_5678), 0x1234_5678);
        // High half folds down
        assert_eq!(fold_ticks(0x1_0000_0000), 1);
        assert_eq!(fold_ticks(0x1_0000_0001), 0);
    }

    #[test]
    fn test_time_ticks_granularity() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(time_ticks(t) % 10_000_000, 0);
        let later = t + chrono::Duration::nanoseconds(100);
        assert_eq!(time_ticks(later), time_ticks(t) + 1);
    }

    #[test]
    fn test_probe_regular_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plain.txt");
        fs::write(&path, b"data").unwrap();

        let facts = FileFacts::probe(&path).unwrap();
        assert_eq!(facts.len, 4);
        assert!(!facts.is_dir);
        assert!(!facts.is_symlink);
        assert!(!facts.readonly);
        assert!(facts.is_linkable());
    }

    #[test]
    fn test_probe_directory() {
        let temp = TempDir::new().unwrap();
        let facts = FileFacts::probe(temp.path()).unwrap();
        assert!(facts.is_dir);
        assert_eq!(facts.len, 0);
        assert!(!facts.is_linkable());
    }

    #[cfg(unix)]
    #[test]
    fn test_hidden_is_dotfile() {
        let temp = TempDir::new().unwrap();
        let visible = temp.path().join("visible");
        let hidden = temp.path().join(".hidden");
        fs::write(&visible, b"v").unwrap();
        fs::write(&hidden, b"h").unwrap();

        assert!(!FileFacts::probe(&visible).unwrap().hidden);
        assert!(FileFacts::probe(&hidden).unwrap().hidden);
    }

    #[test]
    fn test_readonly_excluded_from_linking() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("locked.txt");
        fs::write(&path, b"x").unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        let facts = FileFacts::probe(&path).unwrap();
        assert!(facts.readonly);
        assert!(!facts.is_linkable());

        // Restore so TempDir can clean up on all platforms
        let mut perms = fs::metadata(&path).unwrap().permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(&path, perms).unwrap();
    }
}
