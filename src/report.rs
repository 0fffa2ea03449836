//! Run summaries and verification reports
//!
//! The orchestrator aggregates per-file outcomes into a `RunSummary`;
//! verify mode produces a `VerifyReport` with per-sidecar totals. Both
//! carry a colored human-readable rendering whose final line makes zero
//! failures visually distinct from any failure.

use crate::index::MergeStats;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

/// Counters aggregated over one run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Regular files copied (including read-only and degraded copies)
    pub files_copied: u64,
    /// Files reproduced as hard links
    pub files_linked: u64,
    /// Files that failed and were skipped over
    pub files_failed: u64,
    /// Files skipped (unresolvable path length, symlinks)
    pub files_skipped: u64,
    /// Files already linked to their canonical instance (rehardlink)
    pub files_unchanged: u64,
    /// Files fingerprinted into the index (make-index)
    pub files_indexed: u64,
    /// Copies forced by the read-only eligibility rule
    pub readonly_copies: u64,
    /// Destination directories created
    pub directories_created: u64,
    /// Content bytes written by copies
    pub bytes_copied: u64,
    /// Content bytes deduplicated by links
    pub bytes_linked: u64,
    /// Entries written to this run's sidecar
    pub entries_exported: usize,
    /// Index merge accounting for the run
    pub merge: MergeStats,
    /// Whether the run stopped on a cancellation signal
    pub cancelled: bool,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
    /// Verify-mode results, when applicable
    pub verify: Option<VerifyReport>,
}

impl RunSummary {
    /// Whether anything went wrong during the run
    pub fn has_failures(&self) -> bool {
        self.files_failed > 0
            || self
                .verify
                .as_ref()
                .map(|v| !v.is_clean())
                .unwrap_or(false)
    }

    /// Render the summary for terminal output
    pub fn render(&self) -> String {
        let mut lines = Vec::new();

        if let Some(verify) = &self.verify {
            lines.push(verify.render());
        } else {
            lines.push(format!(
                "  copied: {} files, {}",
                self.files_copied,
                format_bytes(self.bytes_copied)
            ));
            lines.push(format!(
                "  linked: {} files, {}",
                self.files_linked,
                format_bytes(self.bytes_linked)
            ));
            if self.files_indexed > 0 {
                lines.push(format!("  indexed: {} files", self.files_indexed));
            }
            if self.files_unchanged > 0 {
                lines.push(format!("  already linked: {} files", self.files_unchanged));
            }
            if self.readonly_copies > 0 {
                lines.push(format!("  read-only copies: {}", self.readonly_copies));
            }
            if self.files_skipped > 0 {
                lines.push(format!("  skipped: {} files", self.files_skipped));
            }
            if self.entries_exported > 0 {
                lines.push(format!("  sidecar entries: {}", self.entries_exported));
            }
            if self.merge.sidecars_read > 0 {
                lines.push(format!(
                    "  merged {} sidecars ({} entries, {} dangling dropped)",
                    self.merge.sidecars_read,
                    self.merge.entries_imported,
                    self.merge.entries_dropped
                ));
            }
        }

        if self.cancelled {
            lines.push(format!("  {}", "run cancelled before completion".yellow()));
        }

        let elapsed = humantime::format_duration(round_to_millis(self.elapsed));
        if self.has_failures() {
            lines.push(format!(
                "{} ({} failed, {})",
                "Completed with failures".red().bold(),
                self.files_failed,
                elapsed
            ));
        } else {
            lines.push(format!(
                "{} ({})",
                "Completed without failures".green().bold(),
                elapsed
            ));
        }
        lines.join("\n")
    }
}

/// Verification results for a single sidecar
#[derive(Debug, Clone)]
pub struct SidecarVerification {
    /// Path of the sidecar that was checked
    pub sidecar: PathBuf,
    /// Entries whose recomputed fingerprint matched
    pub correct: u64,
    /// Entries whose recomputed fingerprint diverged
    pub divergent: u64,
    /// Entries whose referenced file no longer exists
    pub missing: u64,
    /// Paths of divergent entries, for reporting
    pub divergent_paths: Vec<PathBuf>,
}

impl SidecarVerification {
    /// Whether every entry verified clean
    pub fn is_clean(&self) -> bool {
        self.divergent == 0 && self.missing == 0
    }
}

/// Aggregate verification results across a directory tree
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// One record per sidecar found
    pub sidecars: Vec<SidecarVerification>,
}

impl VerifyReport {
    /// Whether every sidecar verified clean
    pub fn is_clean(&self) -> bool {
        self.sidecars.iter().all(SidecarVerification::is_clean)
    }

    /// Totals over all sidecars: (correct, divergent, missing)
    pub fn totals(&self) -> (u64, u64, u64) {
        self.sidecars.iter().fold((0, 0, 0), |(c, d, m), s| {
            (c + s.correct, d + s.divergent, m + s.missing)
        })
    }

    /// Render per-sidecar lines plus a totals line
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for s in &self.sidecars {
            let status = if s.is_clean() {
                "ok".green()
            } else {
                "DIVERGED".red()
            };
            lines.push(format!(
                "  {:?}: {} correct, {} divergent, {} missing [{}]",
                s.sidecar, s.correct, s.divergent, s.missing, status
            ));
            for path in &s.divergent_paths {
                lines.push(format!("    {} {:?}", "divergent:".red(), path));
            }
        }
        let (correct, divergent, missing) = self.totals();
        lines.push(format!(
            "  total: {} correct, {} divergent, {} missing",
            correct, divergent, missing
        ));
        lines.join("\n")
    }
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Drop sub-millisecond noise before rendering a duration
fn round_to_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}
