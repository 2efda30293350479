//! # Sovereign Engine
//!
//! Cleans a project snapshot of proprietary platform coupling and
//! certifies the result.
//!
//! ## Pipeline
//!
//! ```text
//! VirtualTree (original)
//!     │
//!     ├──> Removal Filter (denylist, removal list)      → filtered
//!     │
//!     ├──> Per-File Rewriter (parallel, per-kind)       → cleaned
//!     │      └─> Findings, packages removed
//!     │
//!     ├──> Trigger Collector + Polyfill Synthesizer     → + src/__compat__/*
//!     │
//!     ├──> Verifier (detect, at most one retry pass)    → verified
//!     │
//!     ├──> Compat linker (index import at call sites)   → final
//!     │
//!     └──> Scorer                                       → Report
//!
//! Auditor and packaging gate run on the final tree.
//! ```
//!
//! ## Example
//!
//! ```rust
//! use sovereign_engine::clean;
//! use sovereign_protocol::VirtualTree;
//!
//! let tree = VirtualTree::from_texts([
//!     ("package.json", "{\n  \"dependencies\": { \"proprietary-sdk\": \"2.1.0\" }\n}\n"),
//!     ("src/app.js", "export const s = () => proprietary.auth.getSession();\n"),
//! ])
//! .unwrap();
//!
//! let output = clean(&tree, &[]).unwrap();
//! assert_eq!(output.report.packages_removed, 1);
//! assert_eq!(output.report.polyfills_generated, 1);
//! assert!(output.final_tree.contains("src/__compat__/auth-session.js"));
//! assert!(output
//!     .final_tree
//!     .text("src/app.js")
//!     .unwrap()
//!     .starts_with("import \"./__compat__/index.js\";\n"));
//! ```

mod audit;
mod config;
mod error;
mod filter;
mod gate;
mod link;
mod pipeline;
mod polyfill;
mod progress;
mod rewrite;
mod score;
mod triggers;
mod verify;

pub use audit::{audit, AuditCheck, AuditIssue, AuditReport, CheckKind};
pub use config::{CatalogConfig, CleanConfig, Denylist, Limits, ManifestPolicy, ScoringConfig};
pub use error::{CleanError, ConfigError, Result};
pub use filter::RemovalFilter;
pub use gate::{packaging_gate, GateDecision};
pub use pipeline::{clean, CleanOutput, Cleaner, REQUIRED_FILE_MISSING};
pub use polyfill::{index_module, module_path, synthesize, PolyfillModule, INDEX_MODULE};
pub use progress::{NoProgress, ProgressSink, Stage};
pub use rewrite::{
    rewrite_file, Disposition, FileOutcome, RewritePolicy, ENGINE_FAULT, FILE_TOO_LARGE,
    MANIFEST_UNPARSABLE, NOT_UTF8,
};
pub use score::{is_structural, score};
pub use triggers::{collect_triggers, PolyfillTrigger, TRIGGERS};
pub use verify::{detect, verify, Verification};
