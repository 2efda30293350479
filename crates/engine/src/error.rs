use thiserror::Error;

pub type Result<T> = std::result::Result<T, CleanError>;

/// Conditions that abort a run before a report exists.
///
/// Everything recoverable is reported as a [`sovereign_protocol::Finding`]
/// instead.
#[derive(Error, Debug)]
pub enum CleanError {
    #[error("input tree is empty")]
    EmptyTree,

    #[error("input tree has {files} files, limit is {limit}")]
    TooManyFiles { files: usize, limit: usize },

    #[error("input tree is {bytes} bytes, limit is {limit}")]
    TooLarge { bytes: u64, limit: u64 },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rule catalog error: {0}")]
    Rules(#[from] sovereign_rules::RuleError),

    #[error("Invalid tree: {0}")]
    Tree(#[from] sovereign_protocol::ProtocolError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}
