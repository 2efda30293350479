use thiserror::Error;

/// Result type for data model operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while constructing virtual files and trees
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Path is empty or escapes the project root
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    /// Two files normalize to the same path
    #[error("Duplicate path in tree: {0}")]
    DuplicatePath(String),
}
