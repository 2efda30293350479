//! Shared data model of the sovereign cleaning pipeline: virtual files and
//! trees, findings, and the run report handed to packaging.

mod error;
mod file;
mod finding;
pub mod path_filters;
mod report;
mod tree;

pub use error::{ProtocolError, Result};
pub use file::{FileContent, FileKind, VirtualFile};
pub use finding::{Category, Finding, IssueCounts, Severity};
pub use report::{Report, SovereigntyScore, Verdict, REPORT_SCHEMA_VERSION};
pub use tree::VirtualTree;

/// Reserved namespace for generated compatibility modules
pub const COMPAT_NAMESPACE: &str = "src/__compat__";

/// True when `path` lives in the generated compatibility namespace
pub fn is_compat_path(path: &str) -> bool {
    path_filters::path_prefix_matches(COMPAT_NAMESPACE, path)
}
