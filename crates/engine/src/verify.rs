use crate::rewrite::{match_finding, rewrite_file, Disposition, Profile, RewritePolicy};
use rayon::prelude::*;
use sovereign_protocol::{Finding, Severity, VirtualFile, VirtualTree};
use sovereign_rules::{scan, RuleCatalog};
use std::collections::{BTreeSet, HashSet};

type FindingKey = (String, Option<String>, Option<String>);

fn key(finding: &Finding) -> FindingKey {
    let (path, rule, snippet) = finding.identity();
    (
        path.to_string(),
        rule.map(str::to_string),
        snippet.map(str::to_string),
    )
}

/// A rule match found in detection mode
#[derive(Debug, Clone)]
struct Detection {
    finding: Finding,
    /// The matching rule should have removed this span
    neutralizing: bool,
}

/// Result of the verification stage
#[derive(Debug, Clone)]
pub struct Verification {
    pub tree: VirtualTree,
    /// Findings added by verification, in path order
    pub findings: Vec<Finding>,
    pub retry_passes: u8,
    /// Paths the retry pass rewrote
    pub rewritten: BTreeSet<String>,
    /// Paths the retry pass deleted
    pub deleted: BTreeSet<String>,
    pub packages_removed: usize,
}

/// Detection-only pass: every applicable rule over every text file.
///
/// Findings are never marked quarantined since nothing is changed.
pub fn detect(tree: &VirtualTree, catalog: &RuleCatalog, policy: &RewritePolicy) -> Vec<Finding> {
    detect_all(tree, catalog, policy)
        .into_iter()
        .map(|detection| detection.finding)
        .collect()
}

fn detect_all(tree: &VirtualTree, catalog: &RuleCatalog, policy: &RewritePolicy) -> Vec<Detection> {
    let files: Vec<&VirtualFile> = tree.files().collect();
    files
        .par_iter()
        .map(|file| detect_file(file, catalog, policy))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

fn detect_file(file: &VirtualFile, catalog: &RuleCatalog, policy: &RewritePolicy) -> Vec<Detection> {
    let Some(text) = file.as_text() else {
        return Vec::new();
    };
    if text.len() as u64 > policy.max_file_bytes {
        return Vec::new();
    }
    let profile = Profile::for_kind(file.kind());
    scan(policy.rules_for(catalog, file.kind()), text)
        .iter()
        .map(|m| Detection {
            finding: match_finding(file.path(), m, profile).quarantined(false),
            neutralizing: profile.neutralizes(m.rule),
        })
        .collect()
}

/// Re-scan the assembled tree and give the rewriter one more pass over the
/// files that still match.
///
/// A match is new when no finding with the same identity exists yet. New
/// matches and critical ones send their file back to the rewriter, at most
/// `max_retry_passes` (0 or 1) times. Neutralizing matches that survive are
/// recorded as residual; new flag-only matches are appended once.
pub fn verify(
    tree: VirtualTree,
    known: &[Finding],
    catalog: &RuleCatalog,
    policy: &RewritePolicy,
    max_retry_passes: u8,
) -> Verification {
    let mut known_keys: HashSet<FindingKey> = known.iter().map(key).collect();
    let mut findings = Vec::new();
    let mut tree = tree;
    let mut retry_passes = 0;
    let mut rewritten = BTreeSet::new();
    let mut deleted = BTreeSet::new();
    let mut packages_removed = 0;

    let mut detections = detect_all(&tree, catalog, policy);
    let affected: BTreeSet<String> = detections
        .iter()
        .filter(|detection| {
            detection.neutralizing
                || detection.finding.severity == Severity::Critical
                || !known_keys.contains(&key(&detection.finding))
        })
        .map(|detection| detection.finding.path.clone())
        .collect();

    if !affected.is_empty() && max_retry_passes.min(1) > 0 {
        log::info!("Verifier sends {} file(s) back for a retry pass", affected.len());
        retry_passes = 1;

        let files: Vec<&VirtualFile> = affected.iter().filter_map(|path| tree.get(path)).collect();
        let outcomes: Vec<_> = files
            .par_iter()
            .map(|file| rewrite_file(file, catalog, policy))
            .collect();

        let mut upserts = Vec::new();
        let mut removals = Vec::new();
        for outcome in outcomes {
            packages_removed += outcome.packages_removed;
            for finding in outcome.findings {
                if known_keys.insert(key(&finding)) {
                    findings.push(finding);
                }
            }
            match outcome.disposition {
                Disposition::Rewritten(file) => {
                    rewritten.insert(outcome.path);
                    upserts.push(file);
                }
                Disposition::Deleted => {
                    deleted.insert(outcome.path.clone());
                    removals.push(outcome.path);
                }
                Disposition::Unchanged => {}
            }
        }
        tree = tree.apply(upserts, removals);
        detections = detect_all(&tree, catalog, policy);
    } else if !affected.is_empty() {
        log::debug!("Retry disabled; {} file(s) keep their matches", affected.len());
    }

    let mut residual_keys = HashSet::new();
    for detection in detections {
        let finding_key = key(&detection.finding);
        if detection.neutralizing {
            if residual_keys.insert(finding_key) {
                log::warn!(
                    "Residual match of {} in {}",
                    detection.finding.rule_id.as_deref().unwrap_or("?"),
                    detection.finding.path
                );
                findings.push(detection.finding.residual());
            }
        } else if known_keys.insert(finding_key) {
            findings.push(detection.finding);
        }
    }

    Verification {
        tree,
        findings,
        retry_passes,
        rewritten,
        deleted,
        packages_removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CleanConfig;
    use pretty_assertions::assert_eq;

    fn policy(catalog: &RuleCatalog) -> RewritePolicy {
        RewritePolicy::new(&CleanConfig::default(), catalog).unwrap()
    }

    const LOOPING: &str = r#"
version = "loop"

[[rules]]
id = "grow-marker"
category = "telemetry"
severity = "critical"
applies_to = ["source"]
pattern = 'beacon'
action = { kind = "rewrite", replacement = "beaconbeacon" }
remediation = "Never converges."
"#;

    #[test]
    fn clean_tree_needs_no_retry() {
        let catalog = RuleCatalog::builtin().unwrap();
        let tree = VirtualTree::from_texts([("src/a.ts", "export const a = 1;\n")]).unwrap();
        let verification = verify(tree.clone(), &[], &catalog, &policy(&catalog), 1);
        assert_eq!(verification.retry_passes, 0);
        assert!(verification.findings.is_empty());
        assert_eq!(verification.tree, tree);
    }

    #[test]
    fn known_flag_only_matches_are_not_duplicated() {
        let catalog = RuleCatalog::builtin().unwrap();
        let tree = VirtualTree::from_texts([("src/a.ts", "eval(x);\n")]).unwrap();
        let known = detect(&tree, &catalog, &policy(&catalog));
        assert_eq!(known.len(), 1);
        let verification = verify(tree, &known, &catalog, &policy(&catalog), 1);
        assert_eq!(verification.retry_passes, 0);
        assert!(verification.findings.is_empty());
    }

    #[test]
    fn new_flag_only_matches_are_appended_once() {
        let catalog = RuleCatalog::builtin().unwrap();
        let tree = VirtualTree::from_texts([("src/a.ts", "eval(x);\n")]).unwrap();
        let verification = verify(tree, &[], &catalog, &policy(&catalog), 1);
        assert_eq!(verification.retry_passes, 1);
        assert_eq!(verification.findings.len(), 1);
        assert!(!verification.findings[0].quarantined);
        assert!(!verification.findings[0].residual);
    }

    #[test]
    fn surviving_rewrites_become_residual_after_one_retry() {
        let catalog = RuleCatalog::from_toml_str(LOOPING).unwrap();
        let tree = VirtualTree::from_texts([("src/a.ts", "send(beacon);\n")]).unwrap();
        let verification = verify(tree, &[], &catalog, &policy(&catalog), 3);
        assert_eq!(verification.retry_passes, 1);
        assert_eq!(
            verification.tree.text("src/a.ts"),
            Some("send(beaconbeacon);\n")
        );
        let residual: Vec<_> = verification.findings.iter().filter(|f| f.residual).collect();
        assert_eq!(residual.len(), 1);
        assert!(!residual[0].quarantined);
    }

    #[test]
    fn zero_retry_bound_skips_the_rewriter() {
        let catalog = RuleCatalog::from_toml_str(LOOPING).unwrap();
        let tree = VirtualTree::from_texts([("src/a.ts", "beacon")]).unwrap();
        let verification = verify(tree.clone(), &[], &catalog, &policy(&catalog), 0);
        assert_eq!(verification.retry_passes, 0);
        assert_eq!(verification.tree, tree);
        assert_eq!(verification.findings.iter().filter(|f| f.residual).count(), 1);
    }
}
