//! # Sovereign Rules
//!
//! Static, versioned catalog of pattern rules and the span matching engine
//! the cleaner runs them with.
//!
//! ## Model
//!
//! ```text
//! builtin.toml (+ optional user catalog)
//!     │
//!     ├──> RuleCatalog (ordered, compiled once, read-only)
//!     │
//!     └──> scan(rules, text)
//!          ├─> every rule, catalog order, additive
//!          ├─> overlaps: higher severity wins, then earlier rule
//!          └─> RuleMatch[] (span, line, expanded replacement)
//!                  │
//!                  └──> apply_rewrites → only matched spans change
//! ```
//!
//! ## Example
//!
//! ```rust
//! use sovereign_protocol::FileKind;
//! use sovereign_rules::{apply_rewrites, scan, RuleCatalog};
//!
//! let catalog = RuleCatalog::builtin().unwrap();
//! let text = "const s = proprietary.auth.getSession();";
//! let matches = scan(catalog.rules_for(FileKind::Source), text);
//! let cleaned = apply_rewrites(text, &matches).unwrap();
//! assert_eq!(cleaned, "const s = globalThis.__compat.auth.getSession();");
//! ```

mod catalog;
mod error;
mod matcher;
mod rule;

pub use catalog::RuleCatalog;
pub use error::{Result, RuleError};
pub use matcher::{apply_rewrites, find_matches, resolve_overlaps, scan, LineIndex, RuleMatch};
pub use rule::{Action, Rule, RuleSpec};
