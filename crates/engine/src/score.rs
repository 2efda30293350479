use crate::config::ScoringConfig;
use crate::rewrite::MANIFEST_UNPARSABLE;
use sovereign_protocol::{Category, Finding, IssueCounts, Severity, SovereigntyScore, Verdict};

/// Conditions that cap the verdict at `requires_review`
pub fn is_structural(finding: &Finding) -> bool {
    finding.category == Category::MissingRequiredFile
        || (finding.category == Category::ProcessingFault
            && finding.description == MANIFEST_UNPARSABLE)
}

/// Score the final finding set.
///
/// Only findings the engine did not neutralize cost points. Any open
/// critical finding or structural issue rules out `sovereign`.
pub fn score(findings: &[Finding], scoring: &ScoringConfig) -> SovereigntyScore {
    let open: Vec<&Finding> = findings.iter().filter(|finding| !finding.quarantined).collect();
    let issue_counts = IssueCounts::from_findings(open.iter().copied());

    let penalty: u64 = open
        .iter()
        .map(|finding| u64::from(weight(finding.severity, scoring)))
        .sum();
    let score = 100u64.saturating_sub(penalty) as u8;

    let open_critical = issue_counts.critical > 0;
    let structural = findings.iter().any(is_structural);

    let verdict = if score < scoring.blocked_below {
        Verdict::Blocked
    } else if score >= scoring.sovereign_at_least && !open_critical && !structural {
        Verdict::Sovereign
    } else {
        Verdict::RequiresReview
    };

    log::info!(
        "Sovereignty score {score} ({verdict}): {} critical, {} major, {} minor open",
        issue_counts.critical,
        issue_counts.major,
        issue_counts.minor
    );

    SovereigntyScore {
        score,
        issue_counts,
        verdict,
    }
}

fn weight(severity: Severity, scoring: &ScoringConfig) -> u32 {
    match severity {
        Severity::Critical => scoring.critical,
        Severity::Major => scoring.major,
        Severity::Minor => scoring.minor,
    }
}
