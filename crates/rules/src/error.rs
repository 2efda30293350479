use thiserror::Error;

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, RuleError>;

/// Errors raised while loading or validating a rule catalog
#[derive(Error, Debug)]
pub enum RuleError {
    /// Catalog document is not valid TOML or does not match the schema
    #[error("Catalog parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pattern failed to compile
    #[error("Rule {id}: invalid pattern: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },

    /// Two rules share an id
    #[error("Duplicate rule id: {0}")]
    DuplicateId(String),

    /// Rule is structurally invalid
    #[error("Rule {id}: {reason}")]
    InvalidRule { id: String, reason: String },
}

impl RuleError {
    pub fn invalid_rule(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
