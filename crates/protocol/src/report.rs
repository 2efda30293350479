use crate::finding::{Finding, IssueCounts};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Certification verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Blocked,
    RequiresReview,
    Sovereign,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Blocked => "blocked",
            Verdict::RequiresReview => "requires_review",
            Verdict::Sovereign => "sovereign",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score and verdict computed once from the final finding set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SovereigntyScore {
    pub score: u8,
    pub issue_counts: IssueCounts,
    pub verdict: Verdict,
}

/// Outcome of a cleaning run, consumed by packaging and presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub schema_version: u32,
    pub files_scanned: usize,
    pub files_removed: usize,
    pub files_cleaned: usize,
    pub files_verified_clean: usize,
    pub polyfills_generated: usize,
    pub packages_removed: usize,
    pub findings: Vec<Finding>,
    pub score: u8,
    pub verdict: Verdict,
    pub issue_counts: IssueCounts,
    /// Extra rewrite passes the verifier requested (0 or 1)
    pub retry_passes: u8,
    pub residual_findings: usize,
    pub catalog_version: String,
    /// Fingerprint of the final tree
    pub tree_digest: String,
}

impl Report {
    pub fn open_critical_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|finding| finding.is_open_critical())
            .count()
    }
}
