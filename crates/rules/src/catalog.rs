use crate::error::{Result, RuleError};
use crate::rule::{Rule, RuleSpec};
use serde::Deserialize;
use sovereign_protocol::FileKind;
use std::collections::HashSet;
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("../catalog/builtin.toml");

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCatalog {
    version: String,
    #[serde(default)]
    rules: Vec<RuleSpec>,
}

/// Versioned, ordered set of compiled rules.
///
/// A catalog is built once and only read afterwards; extending it produces
/// a new catalog.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    version: String,
    rules: Vec<Rule>,
}

impl RuleCatalog {
    /// The catalog shipped with the engine
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let raw: RawCatalog = toml::from_str(raw)?;
        Self::compile(raw, Vec::new())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// New catalog with the rules of `extra` appended after this one's
    pub fn extend_with_toml(&self, extra: &str) -> Result<Self> {
        let extra: RawCatalog = toml::from_str(extra)?;
        let version = format!("{}+{}", self.version, extra.version);
        let rules = self.rules.clone();
        Self::compile(
            RawCatalog {
                version,
                rules: extra.rules,
            },
            rules,
        )
    }

    pub fn extend_with_file(&self, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        self.extend_with_toml(&raw)
    }

    fn compile(raw: RawCatalog, mut rules: Vec<Rule>) -> Result<Self> {
        if raw.version.trim().is_empty() {
            return Err(RuleError::invalid_rule("catalog", "version must not be empty"));
        }

        let mut seen: HashSet<String> = rules.iter().map(|rule| rule.id.clone()).collect();
        for raw_rule in raw.rules {
            if !seen.insert(raw_rule.id.clone()) {
                return Err(RuleError::DuplicateId(raw_rule.id));
            }
            let ordinal = rules.len();
            rules.push(Rule::compile(raw_rule, ordinal)?);
        }

        log::debug!(
            "Loaded rule catalog {} ({} rules)",
            raw.version,
            rules.len()
        );
        Ok(Self {
            version: raw.version,
            rules,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    /// Rules applying to `kind`, in catalog order
    pub fn rules_for(&self, kind: FileKind) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |rule| rule.applies_to(kind))
    }
}
