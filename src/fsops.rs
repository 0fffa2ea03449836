//! Filesystem primitives for the backup engine
//!
//! The engine never shells out for filesystem work: byte comparison,
//! hard-link creation, metadata-preserving copies and recursive listing
//! are all direct native calls collected here.
//!
//! ## Copy semantics
//!
//! `copy_with_metadata` reproduces content bytes, the last-write time,
//! the last-access time and the read-only attribute. `std::fs::copy`
//! does not preserve timestamps, so they are fixed up afterwards; for a
//! read-only source the fixup clears the read-only bit, sets the times
//! and restores the bit, in that order. Creation time cannot be set
//! through a portable API (Unix has none), so the fixup covers mtime and
//! atime.

use crate::error::{Result, SnaplinkError};
use filetime::FileTime;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::trace;
use walkdir::WalkDir;

const COMPARE_BUF: usize = 64 * 1024;

/// Byte-by-byte equality of two files
///
/// Lengths are compared first so mismatched sizes never read content.
/// Both handles are closed before returning.
pub fn byte_equal(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = fs::metadata(a)?;
    let meta_b = fs::metadata(b)?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut reader_a = BufReader::with_capacity(COMPARE_BUF, File::open(a)?);
    let mut reader_b = BufReader::with_capacity(COMPARE_BUF, File::open(b)?);
    let mut buf_a = vec![0u8; COMPARE_BUF];
    let mut buf_b = vec![0u8; COMPARE_BUF];

    loop {
        let n_a = read_full(&mut reader_a, &mut buf_a)?;
        let n_b = read_full(&mut reader_b, &mut buf_b)?;
        if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the reader allows, tolerating short reads
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Create a hard link at `dst` referencing the inode behind `candidate`
///
/// The caller must have proven byte equality first and ensured the
/// destination's parent directory exists.
pub fn make_hardlink(candidate: &Path, dst: &Path) -> Result<()> {
    trace!("hardlink {:?} -> {:?}", dst, candidate);
    fs::hard_link(candidate, dst).map_err(|e| SnaplinkError::DestinationUnwritable {
        path: dst.to_path_buf(),
        source: e,
    })
}

/// Copy `src` to `dst`, reproducing bytes, timestamps and the read-only
/// attribute
pub fn copy_with_metadata(src: &Path, dst: &Path) -> Result<u64> {
    let bytes = fs::copy(src, dst).map_err(|e| SnaplinkError::DestinationUnwritable {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let src_meta = fs::metadata(src)?;
    let atime = FileTime::from_last_access_time(&src_meta);
    let mtime = FileTime::from_last_modification_time(&src_meta);

    // fs::copy carried the permission bits over, so a read-only source
    // yields a read-only destination that must be unlocked for the
    // timestamp fixup and relocked afterwards.
    let readonly = src_meta.permissions().readonly();
    if readonly {
        set_readonly(dst, false)?;
    }
    filetime::set_file_times(dst, atime, mtime)?;
    if readonly {
        set_readonly(dst, true)?;
    }

    Ok(bytes)
}

/// Toggle the read-only attribute of `path`
pub fn set_readonly(path: &Path, readonly: bool) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(readonly);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// Recursively list every entry under `root` in lexicographic
/// depth-first order, the root itself excluded
///
/// Symbolic links are reported but never followed. Walk errors for
/// individual entries surface as `Err` items so the caller can count
/// them without aborting the walk.
pub fn list_recursive(root: &Path) -> impl Iterator<Item = Result<PathBuf>> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            entry
                .map(|e| e.into_path())
                .map_err(SnaplinkError::from)
        })
}

/// Ensure the parent directory of `path` exists
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Atomic file write (write to temp file then rename)
///
/// The target is never visible in a partially written state; sidecar
/// exports rely on this.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_byte_equal_identical_and_different() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let c = temp.path().join("c");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();
        fs::write(&c, b"same bytez").unwrap();

        assert!(byte_equal(&a, &b).unwrap());
        assert!(!byte_equal(&a, &c).unwrap());
    }

    #[test]
    fn test_byte_equal_length_short_circuit() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, b"short").unwrap();
        fs::write(&b, b"longer content").unwrap();
        assert!(!byte_equal(&a, &b).unwrap());
    }

    #[test]
    fn test_byte_equal_crosses_buffer_boundary() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let mut data = vec![0x5Au8; COMPARE_BUF + 17];
        fs::write(&a, &data).unwrap();
        *data.last_mut().unwrap() = 0x00;
        fs::write(&b, &data).unwrap();
        assert!(!byte_equal(&a, &b).unwrap());
    }

    #[test]
    fn test_make_hardlink_shares_inode() {
        let temp = TempDir::new().unwrap();
        let original = temp.path().join("original");
        let link = temp.path().join("link");
        fs::write(&original, b"content").unwrap();

        make_hardlink(&original, &link).unwrap();
        assert!(same_file::is_same_file(&original, &link).unwrap());
        assert_eq!(fs::read(&link).unwrap(), b"content");
    }

    #[test]
    fn test_copy_preserves_mtime_and_readonly() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        fs::write(&src, b"payload").unwrap();
        set_readonly(&src, true).unwrap();

        let bytes = copy_with_metadata(&src, &dst).unwrap();
        assert_eq!(bytes, 7);

        let src_meta = fs::metadata(&src).unwrap();
        let dst_meta = fs::metadata(&dst).unwrap();
        assert_eq!(
            FileTime::from_last_modification_time(&src_meta),
            FileTime::from_last_modification_time(&dst_meta)
        );
        assert!(dst_meta.permissions().readonly());

        set_readonly(&src, false).unwrap();
        set_readonly(&dst, false).unwrap();
    }

    #[test]
    fn test_list_recursive_sorted_depth_first() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("b/inner")).unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::write(root.join("b/inner/deep.txt"), b"d").unwrap();
        fs::write(root.join("b/z.txt"), b"z").unwrap();
        fs::write(root.join("c.txt"), b"c").unwrap();

        let listed: Vec<PathBuf> = list_recursive(root).map(|r| r.unwrap()).collect();
        let expected: Vec<PathBuf> = vec![
            root.join("a.txt"),
            root.join("b"),
            root.join("b/inner"),
            root.join("b/inner/deep.txt"),
            root.join("b/z.txt"),
            root.join("c.txt"),
        ];
        assert_eq!(listed, expected);
    }

    #[test]
    fn test_atomic_write_leaves_no_temp() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        assert!(!path.with_extension("tmp").exists());
    }
}
