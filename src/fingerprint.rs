//! Stable per-file fingerprints
//!
//! A fingerprint fuses a file's content hash with the metadata that must
//! stay identical for two files to be considered the same backup object:
//! the UTC last-write time, the UTC creation time and the hidden flag.
//! The four components are concatenated and hashed again, yielding an
//! opaque 16-byte value that keys the repository index.
//!
//! ## Composition
//!
//! ```text
//! inner = MD5(content bytes)
//!       ‖ le32(fold(mtime ticks))
//!       ‖ le32(fold(ctime ticks))
//!       ‖ hidden byte (0x00 | 0x01)
//! fingerprint = MD5(inner)
//! ```
//!
//! The composition is fixed: changing any component invalidates every
//! sidecar ever written, so it is a breaking format change.
//!
//! MD5 is intentional here. The fingerprint is a deduplication key, not a
//! security primitive; a colliding pair cannot corrupt a backup because
//! the decision engine re-checks byte equality before ever creating a
//! hard link.

use crate::error::{Result, SnaplinkError};
use crate::facts::{fold_ticks, time_ticks, FileFacts};
use md5::{Digest, Md5};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/// Number of bytes in a fingerprint
pub const FINGERPRINT_LEN: usize = 16;

/// Length of the canonical hex-dash rendering: 32 hex digits + 15 dashes
pub const FINGERPRINT_STR_LEN: usize = FINGERPRINT_LEN * 3 - 1;

/// Opaque, totally-ordered identity of a regular file
///
/// Serialized as an uppercase hex-dash string (`4D-5A-...`, 47 ASCII
/// characters); parsing is case-insensitive. The ordering is the byte
/// ordering, which keeps sidecar output deterministic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Wrap raw fingerprint bytes
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Fingerprint(bytes)
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Render as the canonical uppercase hex-dash string
    pub fn to_hex_dash(&self) -> String {
        let mut out = String::with_capacity(FINGERPRINT_STR_LEN);
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                out.push('-');
            }
            out.push_str(&format!("{:02X}", byte));
        }
        out
    }

    /// Parse a hex-dash string, accepting either case
    pub fn from_hex_dash(s: &str) -> Result<Self> {
        let reject = || SnaplinkError::InvalidFingerprint(s.to_string());

        if s.len() != FINGERPRINT_STR_LEN {
            return Err(reject());
        }
        let mut bytes = [0u8; FINGERPRINT_LEN];
        let mut count = 0;
        for part in s.split('-') {
            if part.len() != 2 || count >= FINGERPRINT_LEN {
                return Err(reject());
            }
            bytes[count] = u8::from_str_radix(part, 16).map_err(|_| reject())?;
            count += 1;
        }
        if count != FINGERPRINT_LEN {
            return Err(reject());
        }
        Ok(Fingerprint(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_dash())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex_dash())
    }
}

impl FromStr for Fingerprint {
    type Err = SnaplinkError;

    fn from_str(s: &str) -> Result<Self> {
        Fingerprint::from_hex_dash(s)
    }
}

// Fingerprints key the sidecar's JSON object, so they serialize as plain
// strings rather than byte arrays.
impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex_dash())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct HexDashVisitor;

        impl Visitor<'_> for HexDashVisitor {
            type Value = Fingerprint;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a hex-dash fingerprint string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Fingerprint, E> {
                Fingerprint::from_hex_dash(v).map_err(|e| E::custom(e.to_string()))
            }
        }

        deserializer.deserialize_str(HexDashVisitor)
    }
}

/// Signature of the content-digest step, injectable for collision testing
pub(crate) type ContentDigestFn = fn(&mut dyn Read) -> std::io::Result<[u8; FINGERPRINT_LEN]>;

/// Computes fingerprints for regular files
///
/// The struct is stateless apart from the content-digest function, which
/// defaults to streaming MD5 and is only replaceable from unit tests (to
/// simulate hash collisions without actually finding one).
#[derive(Clone)]
pub struct Fingerprinter {
    content_digest: ContentDigestFn,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprinter {
    /// Create a fingerprinter using streaming MD5 for content
    pub fn new() -> Self {
        Fingerprinter {
            content_digest: md5_stream,
        }
    }

    /// Create a fingerprinter with a rigged content digest
    #[cfg(test)]
    pub(crate) fn with_content_digest(content_digest: ContentDigestFn) -> Self {
        Fingerprinter { content_digest }
    }

    /// Compute the fingerprint of an open content stream plus its facts
    ///
    /// The stream is consumed to its end. I/O failure while reading is
    /// fatal for this file; the caller reports and skips it.
    pub fn fingerprint<R: Read>(&self, mut reader: R, facts: &FileFacts) -> Result<Fingerprint> {
        let content = (self.content_digest)(&mut reader)?;

        let mut inner = [0u8; FINGERPRINT_LEN + 4 + 4 + 1];
        inner[..FINGERPRINT_LEN].copy_from_slice(&content);
        inner[FINGERPRINT_LEN..FINGERPRINT_LEN + 4]
            .copy_from_slice(&fold_ticks(time_ticks(facts.modified)).to_le_bytes());
        inner[FINGERPRINT_LEN + 4..FINGERPRINT_LEN + 8]
            .copy_from_slice(&fold_ticks(time_ticks(facts.created)).to_le_bytes());
        inner[FINGERPRINT_LEN + 8] = u8::from(facts.hidden);

        let mut hasher = Md5::new();
        hasher.update(inner);
        Ok(Fingerprint(hasher.finalize().into()))
    }
}

impl fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Fingerprinter")
    }
}

/// Streaming MD5 over a reader, 8 KiB buffer
fn md5_stream(reader: &mut dyn Read) -> std::io::Result<[u8; FINGERPRINT_LEN]> {
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_facts() -> FileFacts {
        FileFacts {
            len: 5,
            modified: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            created: Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap(),
            hidden: false,
            readonly: false,
            is_dir: false,
            is_symlink: false,
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let fp = Fingerprinter::new();
        let facts = sample_facts();
        let a = fp.fingerprint(&b"hello"[..], &facts).unwrap();
        let b = fp.fingerprint(&b"hello"[..], &facts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_content_sensitivity() {
        let fp = Fingerprinter::new();
        let facts = sample_facts();
        let a = fp.fingerprint(&b"hello"[..], &facts).unwrap();
        let b = fp.fingerprint(&b"hello!"[..], &facts).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_metadata_sensitivity() {
        let fp = Fingerprinter::new();
        let facts = sample_facts();

        let mut touched = facts.clone();
        touched.modified = facts.modified + chrono::Duration::seconds(1);
        let mut hidden = facts.clone();
        hidden.hidden = true;
        let mut reborn = facts.clone();
        reborn.created = facts.created + chrono::Duration::seconds(1);

        let base = fp.fingerprint(&b"hello"[..], &facts).unwrap();
        assert_ne!(base, fp.fingerprint(&b"hello"[..], &touched).unwrap());
        assert_ne!(base, fp.fingerprint(&b"hello"[..], &hidden).unwrap());
        assert_ne!(base, fp.fingerprint(&b"hello"[..], &reborn).unwrap());
    }

    #[test]
    fn test_hex_dash_shape() {
        let fp = Fingerprint::from_bytes([0xAB; 16]);
        let s = fp.to_hex_dash();
        assert_eq!(s.len(), FINGERPRINT_STR_LEN);
        assert_eq!(s.matches('-').count(), 15);
        assert!(s.starts_with("AB-AB"));
    }

    #[test]
    fn test_hex_dash_round_trip_case_insensitive() {
        let fp = Fingerprint::from_bytes([
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ]);
        let upper = fp.to_hex_dash();
        assert_eq!(Fingerprint::from_hex_dash(&upper).unwrap(), fp);
        assert_eq!(Fingerprint::from_hex_dash(&upper.to_lowercase()).unwrap(), fp);
    }

    #[test]
    fn test_hex_dash_rejects_malformed() {
        assert!(Fingerprint::from_hex_dash("").is_err());
        assert!(Fingerprint::from_hex_dash("AB").is_err());
        assert!(Fingerprint::from_hex_dash(&("ZZ-".repeat(15) + "ZZ")).is_err());
        // Right length, wrong grouping
        let s = "ABC-B".repeat(9) + "AB";
        assert!(Fingerprint::from_hex_dash(&s[..FINGERPRINT_STR_LEN]).is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let fp = Fingerprint::from_bytes([0x0F; 16]);
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.to_hex_dash()));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    #[test]
    fn test_rigged_digest_changes_only_content_component() {
        fn zero_digest(_r: &mut dyn Read) -> std::io::Result<[u8; 16]> {
            Ok([0u8; 16])
        }
        let rigged = Fingerprinter::with_content_digest(zero_digest);
        let facts = sample_facts();
        let a = rigged.fingerprint(&b"left"[..], &facts).unwrap();
        let b = rigged.fingerprint(&b"right"[..], &facts).unwrap();
        // Same metadata + rigged content digest = colliding fingerprints
        assert_eq!(a, b);
    }
}
