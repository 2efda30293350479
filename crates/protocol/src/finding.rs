use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finding severity. Ordering follows weight: `Minor < Major < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "info")]
    Minor,
    #[serde(alias = "warning")]
    Major,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a finding is about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Obfuscation,
    Telemetry,
    GhostHook,
    ProprietaryCdn,
    UnsafeEval,
    ProprietaryImport,
    ProprietaryDependency,
    MissingRequiredFile,
    /// Produced by the engine itself (unparsable input, scan limits), never by a rule
    ProcessingFault,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Obfuscation => "obfuscation",
            Category::Telemetry => "telemetry",
            Category::GhostHook => "ghost-hook",
            Category::ProprietaryCdn => "proprietary-cdn",
            Category::UnsafeEval => "unsafe-eval",
            Category::ProprietaryImport => "proprietary-import",
            Category::ProprietaryDependency => "proprietary-dependency",
            Category::MissingRequiredFile => "missing-required-file",
            Category::ProcessingFault => "processing-fault",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single detected issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub path: String,

    /// 1-indexed line of the match start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,

    pub category: Category,

    pub severity: Severity,

    /// Catalog rule that produced the finding (absent for engine findings)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,

    pub description: String,

    /// Original matched text, kept for audit trails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    /// True if the engine already neutralized the issue
    pub quarantined: bool,

    /// True if the issue survived the bounded verification retry
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub residual: bool,
}

impl Finding {
    pub fn new(
        path: impl Into<String>,
        category: Category,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            line: None,
            category,
            severity,
            rule_id: None,
            description: description.into(),
            snippet: None,
            quarantined: false,
            residual: false,
        }
    }

    #[must_use]
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    #[must_use]
    pub fn rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    #[must_use]
    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    #[must_use]
    pub fn quarantined(mut self, quarantined: bool) -> Self {
        self.quarantined = quarantined;
        self
    }

    #[must_use]
    pub fn residual(mut self) -> Self {
        self.residual = true;
        self.quarantined = false;
        self
    }

    /// Identity used to de-duplicate findings across passes.
    ///
    /// The line is left out: rewrites earlier in a file shift later lines.
    pub fn identity(&self) -> (&str, Option<&str>, Option<&str>) {
        (
            self.path.as_str(),
            self.rule_id.as_deref(),
            self.snippet.as_deref(),
        )
    }

    pub fn is_open_critical(&self) -> bool {
        self.severity == Severity::Critical && !self.quarantined
    }
}

/// Findings counted by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IssueCounts {
    pub critical: usize,
    pub major: usize,
    pub minor: usize,
}

impl IssueCounts {
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            counts.add(finding.severity);
        }
        counts
    }

    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Major => self.major += 1,
            Severity::Minor => self.minor += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.major + self.minor
    }
}
