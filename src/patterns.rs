//! Inclusion and exclusion pattern files
//!
//! Pattern files are line-oriented text. A line may carry a trailing
//! comment introduced by `#`, `::` or `//`; whitespace is trimmed after
//! comment removal and empty lines are skipped. Patterns use `*` and `?`
//! wildcards, where `*` also crosses path separators (so `dir/*` covers
//! the whole subtree). Lines starting with `*` are rejected as
//! ambiguous.

use crate::error::{Result, SnaplinkError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Comment markers recognized in pattern files
pub const COMMENT_MARKERS: [&str; 3] = ["#", "::", "//"];

/// Strip the first trailing comment from a line and trim whitespace
pub fn strip_comment(line: &str) -> &str {
    let mut end = line.len();
    for marker in COMMENT_MARKERS {
        if let Some(pos) = line.find(marker) {
            end = end.min(pos);
        }
    }
    line[..end].trim()
}

/// Parse a pattern file into its list of patterns
///
/// Returns an error for any line that starts with `*` after comment
/// removal; such a pattern would match everywhere and is treated as a
/// mistake rather than silently honored.
pub fn parse_pattern_file(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    parse_pattern_lines(&text)
}

/// Parse pattern lines from already-loaded text
pub fn parse_pattern_lines(text: &str) -> Result<Vec<String>> {
    let mut patterns = Vec::new();
    for line in text.lines() {
        let pattern = strip_comment(line);
        if pattern.is_empty() {
            continue;
        }
        if pattern.starts_with('*') {
            return Err(SnaplinkError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "patterns starting with '*' are ambiguous".to_string(),
            });
        }
        patterns.push(pattern.to_string());
    }
    debug!("parsed {} patterns", patterns.len());
    Ok(patterns)
}

/// A compiled set of glob patterns matched against full paths
#[derive(Debug, Clone)]
pub struct PatternSet {
    set: GlobSet,
    patterns: Vec<String>,
}

impl PatternSet {
    /// Compile a list of patterns
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| SnaplinkError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| SnaplinkError::InvalidPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;
        Ok(PatternSet {
            set,
            patterns: patterns.to_vec(),
        })
    }

    /// An empty set matching nothing
    pub fn empty() -> Self {
        PatternSet {
            set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Whether any pattern matches the given path
    pub fn is_match(&self, path: &Path) -> bool {
        self.set.is_match(path)
    }

    /// Whether the set contains no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The source patterns the set was compiled from
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_strip_comment_markers() {
        assert_eq!(strip_comment("/data/docs  # personal files"), "/data/docs");
        assert_eq!(strip_comment("/data/docs :: colon comment"), "/data/docs");
        assert_eq!(strip_comment("/data/docs // slash comment"), "/data/docs");
        assert_eq!(strip_comment("   /data/docs   "), "/data/docs");
        assert_eq!(strip_comment("# whole line"), "");
        assert_eq!(strip_comment(""), "");
    }

    #[test]
    fn test_strip_comment_earliest_marker_wins() {
        assert_eq!(strip_comment("/a // x # y"), "/a");
        assert_eq!(strip_comment("/a # x // y"), "/a");
    }

    #[test]
    fn test_parse_lines_skips_empty() {
        let text = "\n/data/a\n\n   \n/data/b # keep\n:: full comment\n";
        let patterns = parse_pattern_lines(text).unwrap();
        assert_eq!(patterns, vec!["/data/a".to_string(), "/data/b".to_string()]);
    }

    #[test]
    fn test_parse_lines_rejects_leading_star() {
        let err = parse_pattern_lines("/ok\n*.tmp\n").unwrap_err();
        assert!(matches!(err, SnaplinkError::InvalidPattern { .. }));
    }

    #[test]
    fn test_glob_star_crosses_separators() {
        let set = PatternSet::compile(&["/data/docs/*".to_string()]).unwrap();
        assert!(set.is_match(&PathBuf::from("/data/docs/a.txt")));
        assert!(set.is_match(&PathBuf::from("/data/docs/nested/deep/b.bin")));
        assert!(!set.is_match(&PathBuf::from("/data/other/a.txt")));
    }

    #[test]
    fn test_glob_question_mark() {
        let set = PatternSet::compile(&["/logs/day-?.log".to_string()]).unwrap();
        assert!(set.is_match(&PathBuf::from("/logs/day-1.log")));
        assert!(!set.is_match(&PathBuf::from("/logs/day-12.log")));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = PatternSet::empty();
        assert!(set.is_empty());
        assert!(!set.is_match(&PathBuf::from("/anything")));
    }
}
