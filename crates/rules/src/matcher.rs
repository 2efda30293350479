use crate::rule::{Action, Rule};

/// Maximum characters kept from a matched span for audit snippets
const SNIPPET_MAX_CHARS: usize = 160;

/// One match of one rule inside a text.
#[derive(Debug, Clone)]
pub struct RuleMatch<'r> {
    pub rule: &'r Rule,
    /// Byte offsets of the matched span, `start..end`
    pub start: usize,
    pub end: usize,
    /// 1-indexed line of `start`
    pub line: usize,
    /// Expanded replacement for rewrite rules
    pub replacement: Option<String>,
    pub snippet: String,
}

impl RuleMatch<'_> {
    pub fn overlaps(&self, other: &RuleMatch<'_>) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Byte offset to line number lookup.
pub struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let newlines = text
            .bytes()
            .enumerate()
            .filter_map(|(idx, byte)| (byte == b'\n').then_some(idx))
            .collect();
        Self { newlines }
    }

    /// 1-indexed line containing byte `offset`
    pub fn line_of(&self, offset: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < offset) + 1
    }
}

/// All non-empty matches of `rule` in `text`
pub fn find_matches<'r>(rule: &'r Rule, text: &str, lines: &LineIndex) -> Vec<RuleMatch<'r>> {
    let mut matches = Vec::new();
    for caps in rule.regex.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.is_empty() {
            continue;
        }
        let replacement = match &rule.action {
            Action::Rewrite { replacement } => {
                let mut expanded = String::new();
                caps.expand(replacement, &mut expanded);
                Some(expanded)
            }
            Action::DeleteFile | Action::FlagOnly => None,
        };
        matches.push(RuleMatch {
            rule,
            start: whole.start(),
            end: whole.end(),
            line: lines.line_of(whole.start()),
            replacement,
            snippet: snippet(whole.as_str()),
        });
    }
    matches
}

/// Run every rule against `text` and keep a non-overlapping set of matches.
///
/// When spans overlap the higher severity wins; on equal severity the rule
/// that comes first in the catalog wins. The result is ordered by position.
pub fn scan<'r>(rules: impl IntoIterator<Item = &'r Rule>, text: &str) -> Vec<RuleMatch<'r>> {
    let lines = LineIndex::new(text);
    let candidates = rules
        .into_iter()
        .flat_map(|rule| find_matches(rule, text, &lines))
        .collect();
    resolve_overlaps(candidates)
}

pub fn resolve_overlaps(mut candidates: Vec<RuleMatch<'_>>) -> Vec<RuleMatch<'_>> {
    candidates.sort_by(|a, b| {
        b.rule
            .severity
            .cmp(&a.rule.severity)
            .then_with(|| a.rule.ordinal.cmp(&b.rule.ordinal))
            .then_with(|| a.start.cmp(&b.start))
    });

    let mut accepted: Vec<RuleMatch<'_>> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if accepted.iter().any(|kept| kept.overlaps(&candidate)) {
            log::trace!(
                "Dropping overlapped match of {} at {}..{}",
                candidate.rule.id,
                candidate.start,
                candidate.end
            );
            continue;
        }
        accepted.push(candidate);
    }

    accepted.sort_by(|a, b| a.start.cmp(&b.start).then(a.rule.ordinal.cmp(&b.rule.ordinal)));
    accepted
}

/// Apply the rewrite matches to `text`, leaving every other byte untouched.
///
/// `matches` must be non-overlapping and ordered by position, as returned by
/// [`scan`]. Returns `None` when nothing was rewritten.
pub fn apply_rewrites(text: &str, matches: &[RuleMatch<'_>]) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut changed = false;
    for m in matches {
        let Some(replacement) = &m.replacement else {
            continue;
        };
        out.push_str(&text[cursor..m.start]);
        out.push_str(replacement);
        cursor = m.end;
        changed = true;
    }
    if !changed {
        return None;
    }
    out.push_str(&text[cursor..]);
    Some(out)
}

fn snippet(matched: &str) -> String {
    let trimmed = matched.trim();
    if trimmed.chars().count() <= SNIPPET_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(SNIPPET_MAX_CHARS).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleCatalog;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use sovereign_protocol::{FileKind, Severity};

    fn catalog(rules: &str) -> RuleCatalog {
        RuleCatalog::from_toml_str(&format!("version = \"t\"\n{rules}")).unwrap()
    }

    fn rule(id: &str, severity: &str, pattern: &str, action: &str) -> String {
        format!(
            "[[rules]]\nid = \"{id}\"\ncategory = \"telemetry\"\nseverity = \"{severity}\"\n\
             applies_to = [\"source\"]\npattern = '{pattern}'\naction = {action}\n\
             remediation = \"r\"\n"
        )
    }

    #[test]
    fn line_index_is_one_based() {
        let index = LineIndex::new("a\nbb\nccc");
        assert_eq!(index.line_of(0), 1);
        assert_eq!(index.line_of(1), 1);
        assert_eq!(index.line_of(2), 2);
        assert_eq!(index.line_of(5), 3);
    }

    #[test]
    fn rewrites_only_matched_spans() {
        let catalog = catalog(&rule(
            "swap",
            "major",
            r"track\((\w+)\)",
            r#"{ kind = "rewrite", replacement = "noop(${1})" }"#,
        ));
        let text = "let a = 1;\ntrack(x); track(y);\n// end";
        let matches = scan(catalog.rules_for(FileKind::Source), text);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].line, 2);
        let out = apply_rewrites(text, &matches).unwrap();
        assert_eq!(out, "let a = 1;\nnoop(x); noop(y);\n// end");
    }

    #[test]
    fn overlap_prefers_severity_then_catalog_order() {
        let rules = [
            rule("first-minor", "minor", "abc", r#"{ kind = "flag-only" }"#),
            rule(
                "second-critical",
                "critical",
                "bcd",
                r#"{ kind = "rewrite", replacement = "X" }"#,
            ),
            rule("third-critical", "critical", "cde", r#"{ kind = "flag-only" }"#),
        ]
        .join("\n");
        let catalog = catalog(&rules);
        let matches = scan(catalog.rules(), "abcde");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rule.id, "second-critical");
        assert_eq!(matches[0].rule.severity, Severity::Critical);
        assert_eq!(apply_rewrites("abcde", &matches).unwrap(), "aXe");
    }

    #[test]
    fn flag_only_matches_do_not_rewrite() {
        let catalog = catalog(&rule("flag", "major", "eval", r#"{ kind = "flag-only" }"#));
        let matches = scan(catalog.rules(), "eval(x)");
        assert_eq!(matches.len(), 1);
        assert!(apply_rewrites("eval(x)", &matches).is_none());
    }

    #[test]
    fn long_snippets_are_truncated() {
        let long = "x".repeat(400);
        let out = snippet(&long);
        assert_eq!(out.chars().count(), SNIPPET_MAX_CHARS + 1);
    }

    proptest! {
        #[test]
        fn proptest_rewrite_preserves_surrounding_bytes(
            before in "[a-z \\n]{0,40}",
            after in "[a-z \\n]{0,40}",
        ) {
            let catalog = catalog(&rule(
                "marker",
                "major",
                "MARK[0-9]+",
                r#"{ kind = "rewrite", replacement = "_" }"#,
            ));
            let text = format!("{before}MARK42{after}");
            let matches = scan(catalog.rules(), &text);
            let out = apply_rewrites(&text, &matches).unwrap();
            prop_assert_eq!(out, format!("{before}_{after}"));
        }
    }
}
