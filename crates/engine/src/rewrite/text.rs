use super::{Disposition, FileOutcome};
use sovereign_protocol::{FileKind, Finding, Severity, VirtualFile};
use sovereign_rules::{apply_rewrites, scan, Action, Rule, RuleMatch};

/// How a kind treats catalog actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Profile {
    /// `delete-file` matches drop the file; otherwise they are only flagged
    pub deletes: bool,
    /// Upper bound for finding severity
    pub ceiling: Severity,
}

impl Profile {
    pub(crate) fn for_kind(kind: FileKind) -> Self {
        match kind {
            FileKind::Source | FileKind::Manifest => Self {
                deletes: false,
                ceiling: Severity::Critical,
            },
            FileKind::Doc | FileKind::Shell => Self {
                deletes: false,
                ceiling: Severity::Minor,
            },
            FileKind::BuildConfig
            | FileKind::Markup
            | FileKind::Stylesheet
            | FileKind::Env
            | FileKind::Sql
            | FileKind::Other => Self {
                deletes: true,
                ceiling: Severity::Critical,
            },
        }
    }

    /// Whether a match of `rule` is neutralized by this profile
    pub(crate) fn neutralizes(&self, rule: &Rule) -> bool {
        match rule.action {
            Action::Rewrite { .. } => true,
            Action::DeleteFile => self.deletes,
            Action::FlagOnly => false,
        }
    }
}

/// Finding for one rule match
pub(crate) fn match_finding(path: &str, m: &RuleMatch<'_>, profile: Profile) -> Finding {
    let rule = m.rule;
    Finding::new(
        path,
        rule.category,
        rule.severity.min(profile.ceiling),
        rule.remediation.clone(),
    )
    .at_line(m.line)
    .rule(rule.id.clone())
    .snippet(m.snippet.clone())
    .quarantined(profile.neutralizes(rule))
}

/// Run `rules` over `text`: a delete match drops the file when the profile
/// allows it, otherwise matched spans are rewritten in place.
pub(crate) fn rewrite<'r>(
    file: &VirtualFile,
    text: &str,
    rules: impl IntoIterator<Item = &'r Rule>,
    profile: Profile,
) -> FileOutcome {
    let path = file.path();
    let rules: Vec<&Rule> = rules.into_iter().collect();

    if profile.deletes {
        let lines = sovereign_rules::LineIndex::new(text);
        let deletion = rules
            .iter()
            .filter(|rule| rule.action == Action::DeleteFile)
            .find_map(|rule| sovereign_rules::find_matches(rule, text, &lines).into_iter().next());
        if let Some(m) = deletion {
            log::debug!("Deleting {path} ({})", m.rule.id);
            return FileOutcome {
                path: path.to_string(),
                disposition: Disposition::Deleted,
                findings: vec![match_finding(path, &m, profile)],
                packages_removed: 0,
            };
        }
    }

    let matches = scan(rules, text);
    let findings: Vec<Finding> = matches
        .iter()
        .map(|m| match_finding(path, m, profile))
        .collect();

    let disposition = match apply_rewrites(text, &matches) {
        Some(rewritten) if rewritten != text => Disposition::Rewritten(file.with_text(rewritten)),
        _ => Disposition::Unchanged,
    };

    FileOutcome {
        path: path.to_string(),
        disposition,
        findings,
        packages_removed: 0,
    }
}
