use crate::error::{Result, RuleError};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sovereign_protocol::{Category, FileKind, Severity};

/// Compiled regex size limit per rule pattern
const PATTERN_SIZE_LIMIT: usize = 2 * 1024 * 1024;

/// What the rewriter does with a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Action {
    /// Drop the whole file (takes priority over every other rule for that file)
    DeleteFile,
    /// Replace the matched span; `$1`/`${name}` expand capture groups
    Rewrite { replacement: String },
    /// Report only, leave content untouched
    FlagOnly,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::DeleteFile => "delete-file",
            Action::Rewrite { .. } => "rewrite",
            Action::FlagOnly => "flag-only",
        }
    }
}

/// Rule as written in a catalog file, or assembled by the engine at run time
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub id: String,
    pub category: Category,
    pub severity: Severity,
    pub applies_to: Vec<FileKind>,
    pub pattern: String,
    #[serde(default)]
    pub line_anchored: bool,
    #[serde(default)]
    pub case_insensitive: bool,
    pub action: Action,
    pub remediation: String,
}

/// A compiled catalog rule. Rules are immutable once the catalog is built.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub category: Category,
    pub severity: Severity,
    pub applies_to: Vec<FileKind>,
    pub pattern: String,
    pub line_anchored: bool,
    pub action: Action,
    pub remediation: String,
    /// Position in the catalog; earlier rules win severity ties
    pub ordinal: usize,
    pub(crate) regex: Regex,
}

impl Rule {
    /// Validate and compile `raw`. `ordinal` breaks severity ties when
    /// spans overlap; lower wins.
    pub fn compile(raw: RuleSpec, ordinal: usize) -> Result<Self> {
        validate_id(&raw.id)?;
        if raw.applies_to.is_empty() {
            return Err(RuleError::invalid_rule(&raw.id, "applies_to must not be empty"));
        }
        if raw.pattern.trim().is_empty() {
            return Err(RuleError::invalid_rule(&raw.id, "pattern must not be empty"));
        }
        if raw.remediation.trim().is_empty() {
            return Err(RuleError::invalid_rule(&raw.id, "remediation must not be empty"));
        }

        let regex = RegexBuilder::new(&raw.pattern)
            .multi_line(raw.line_anchored)
            .case_insensitive(raw.case_insensitive)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
            .map_err(|source| RuleError::InvalidPattern {
                id: raw.id.clone(),
                source,
            })?;

        if regex.is_match("") {
            return Err(RuleError::invalid_rule(&raw.id, "pattern matches empty text"));
        }

        Ok(Self {
            id: raw.id,
            category: raw.category,
            severity: raw.severity,
            applies_to: raw.applies_to,
            pattern: raw.pattern,
            line_anchored: raw.line_anchored,
            action: raw.action,
            remediation: raw.remediation,
            ordinal,
            regex,
        })
    }

    pub fn applies_to(&self, kind: FileKind) -> bool {
        self.applies_to.contains(&kind)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !id.starts_with('-')
        && !id.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(RuleError::invalid_rule(
            id,
            "id must be lowercase kebab-case (a-z, 0-9, '-')",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, pattern: &str) -> RuleSpec {
        RuleSpec {
            id: id.to_string(),
            category: Category::Telemetry,
            severity: Severity::Major,
            applies_to: vec![FileKind::Source],
            pattern: pattern.to_string(),
            line_anchored: false,
            case_insensitive: false,
            action: Action::FlagOnly,
            remediation: "fix it".to_string(),
        }
    }

    #[test]
    fn rejects_bad_ids() {
        assert!(Rule::compile(raw("Bad_Id", "x"), 0).is_err());
        assert!(Rule::compile(raw("-lead", "x"), 0).is_err());
        assert!(Rule::compile(raw("good-id-2", "x"), 0).is_ok());
    }

    #[test]
    fn rejects_patterns_matching_empty_text() {
        let err = Rule::compile(raw("empty", "a*"), 0).unwrap_err();
        assert!(err.to_string().contains("empty text"), "{err}");
    }

    #[test]
    fn reports_invalid_regex_with_rule_id() {
        let err = Rule::compile(raw("broken", "(unclosed"), 0).unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { ref id, .. } if id == "broken"));
    }

    #[test]
    fn action_parses_tagged_form() {
        #[derive(Deserialize)]
        struct Wrapper {
            action: Action,
        }
        let parsed: Wrapper =
            toml::from_str(r#"action = { kind = "rewrite", replacement = "x" }"#).unwrap();
        assert_eq!(
            parsed.action,
            Action::Rewrite {
                replacement: "x".to_string()
            }
        );
        let parsed: Wrapper = toml::from_str(r#"action = { kind = "delete-file" }"#).unwrap();
        assert_eq!(parsed.action, Action::DeleteFile);
    }
}
