//! Import rules derived from the manifest policy.
//!
//! The builtin catalog only knows the platform's own SDK names. Any package
//! the policy strips from `package.json` gets the same treatment at its
//! import sites, so a denied dependency never leaves a dangling import.

use crate::config::ManifestPolicy;
use sovereign_protocol::{Category, FileKind, Severity};
use sovereign_rules::{Action, Rule, RuleSpec};

/// Removed static imports become this comment
const IMPORT_REMOVED: &str = "// proprietary import removed";
const REQUIRE_REMOVED: &str = "{} /* proprietary module removed */";

/// Compile the policy import rules.
///
/// Ordinals start at `first_ordinal` so a catalog rule covering the same
/// span wins the overlap. Returns no rules when nothing is denied.
pub(crate) fn denied_import_rules(
    policy: &ManifestPolicy,
    first_ordinal: usize,
) -> sovereign_rules::Result<Vec<Rule>> {
    let Some(specifier) = specifier_pattern(policy) else {
        return Ok(Vec::new());
    };

    let specs = [
        RuleSpec {
            id: "denied-package-import".to_string(),
            category: Category::ProprietaryImport,
            severity: Severity::Critical,
            applies_to: vec![FileKind::Source, FileKind::Markup],
            pattern: format!(
                r#"^[ \t]*import\s+(?:[^;\n]*?\s+from\s+)?["']{specifier}["'];?[ \t]*$"#
            ),
            line_anchored: true,
            case_insensitive: false,
            action: Action::Rewrite {
                replacement: IMPORT_REMOVED.to_string(),
            },
            remediation: "Import of a package removed from the manifest.".to_string(),
        },
        RuleSpec {
            id: "denied-package-require".to_string(),
            category: Category::ProprietaryImport,
            severity: Severity::Critical,
            applies_to: vec![FileKind::Source],
            pattern: format!(r#"\brequire\s*\(\s*["']{specifier}["']\s*\)"#),
            line_anchored: false,
            case_insensitive: false,
            action: Action::Rewrite {
                replacement: REQUIRE_REMOVED.to_string(),
            },
            remediation: "require of a package removed from the manifest replaced by an empty object."
                .to_string(),
        },
        RuleSpec {
            id: "denied-package-dynamic-import".to_string(),
            category: Category::ProprietaryImport,
            severity: Severity::Major,
            applies_to: vec![FileKind::Source, FileKind::Markup],
            pattern: format!(r#"\bimport\s*\(\s*["']{specifier}["']\s*\)"#),
            line_anchored: false,
            case_insensitive: false,
            action: Action::FlagOnly,
            remediation: "Dynamic import of a package removed from the manifest; remove the code path that loads it."
                .to_string(),
        },
    ];

    specs
        .into_iter()
        .enumerate()
        .map(|(offset, spec)| Rule::compile(spec, first_ordinal + offset))
        .collect()
}

/// Alternation matching any specifier `ManifestPolicy::is_denied` accepts:
/// denied names with optional subpaths, and anything under a denied prefix.
fn specifier_pattern(policy: &ManifestPolicy) -> Option<String> {
    let names = policy
        .denied_packages
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(|name| format!(r#"{}(?:/[^"'\n]*)?"#, regex::escape(name)));
    let prefixes = policy
        .denied_prefixes
        .iter()
        .filter(|prefix| !prefix.is_empty())
        .map(|prefix| format!(r#"{}[^"'\n]*"#, regex::escape(prefix)));
    let alternatives: Vec<String> = names.chain(prefixes).collect();
    if alternatives.is_empty() {
        return None;
    }
    Some(format!("(?:{})", alternatives.join("|")))
}
