//! Per-file rewriting strategies.
//!
//! A strategy is a pure function of one file and the catalog. It never
//! fails: anything it cannot handle becomes a `processing-fault` finding
//! and the file passes through unchanged.

mod imports;
mod manifest;
mod text;

pub use manifest::MANIFEST_UNPARSABLE;
pub(crate) use manifest::DEPENDENCY_SECTIONS;
pub(crate) use text::{match_finding, Profile};

use crate::config::{CleanConfig, ManifestPolicy};
use sovereign_protocol::{Category, FileKind, Finding, Severity, VirtualFile};
use sovereign_rules::{Rule, RuleCatalog};
use std::panic::{catch_unwind, AssertUnwindSafe};

pub const FILE_TOO_LARGE: &str = "file exceeds scan limit";
pub const NOT_UTF8: &str = "not valid UTF-8";
pub const ENGINE_FAULT: &str = "engine fault";

/// Unit tests make the strategy panic on paths ending in this
pub(crate) const INJECTED_FAULT_SUFFIX: &str = ".inject-fault.ts";

/// What happened to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Unchanged,
    Rewritten(VirtualFile),
    Deleted,
}

/// Result of rewriting one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: String,
    pub disposition: Disposition,
    pub findings: Vec<Finding>,
    pub packages_removed: usize,
}

impl FileOutcome {
    pub(crate) fn unchanged(path: &str, findings: Vec<Finding>) -> Self {
        Self {
            path: path.to_string(),
            disposition: Disposition::Unchanged,
            findings,
            packages_removed: 0,
        }
    }

    fn fault(path: &str, description: &str) -> Self {
        let finding = Finding::new(
            path,
            Category::ProcessingFault,
            Severity::Minor,
            description,
        );
        Self::unchanged(path, vec![finding])
    }
}

/// Inputs a strategy needs besides the catalog
#[derive(Debug, Clone)]
pub struct RewritePolicy {
    pub max_file_bytes: u64,
    pub manifest: ManifestPolicy,
    /// Import rules for the packages `manifest` denies, ranked after `catalog`
    import_rules: Vec<Rule>,
}

impl RewritePolicy {
    pub fn new(config: &CleanConfig, catalog: &RuleCatalog) -> sovereign_rules::Result<Self> {
        Ok(Self {
            max_file_bytes: config.limits.max_file_bytes,
            manifest: config.manifest.clone(),
            import_rules: imports::denied_import_rules(&config.manifest, catalog.len())?,
        })
    }

    /// Catalog rules for `kind`, then the policy import rules
    pub(crate) fn rules_for<'a>(
        &'a self,
        catalog: &'a RuleCatalog,
        kind: FileKind,
    ) -> impl Iterator<Item = &'a Rule> {
        catalog.rules_for(kind).chain(
            self.import_rules
                .iter()
                .filter(move |rule| rule.applies_to(kind)),
        )
    }
}

/// Rewrite a single file with the strategy for its kind
pub fn rewrite_file(file: &VirtualFile, catalog: &RuleCatalog, policy: &RewritePolicy) -> FileOutcome {
    let path = file.path();

    let Some(text) = file.as_text() else {
        if file.kind() == FileKind::Other {
            return FileOutcome::unchanged(path, Vec::new());
        }
        log::warn!("Skipping {path}: {NOT_UTF8}");
        return FileOutcome::fault(path, NOT_UTF8);
    };

    if file.content().len() as u64 > policy.max_file_bytes {
        log::warn!(
            "Skipping {path}: {} bytes exceeds limit of {}",
            file.content().len(),
            policy.max_file_bytes
        );
        return FileOutcome::fault(path, FILE_TOO_LARGE);
    }

    let result = catch_unwind(AssertUnwindSafe(|| dispatch(file, text, catalog, policy)));
    match result {
        Ok(outcome) => {
            if !outcome.findings.is_empty() {
                log::debug!("{path}: {} finding(s)", outcome.findings.len());
            }
            outcome
        }
        Err(_) => {
            log::warn!("Rewrite of {path} panicked; passing it through unchanged");
            FileOutcome::fault(path, ENGINE_FAULT)
        }
    }
}

fn dispatch(
    file: &VirtualFile,
    text: &str,
    catalog: &RuleCatalog,
    policy: &RewritePolicy,
) -> FileOutcome {
    if cfg!(test) && file.path().ends_with(INJECTED_FAULT_SUFFIX) {
        panic!("injected fault in {}", file.path());
    }
    let kind = file.kind();
    match kind {
        FileKind::Manifest => manifest::rewrite(file, text, catalog, &policy.manifest),
        _ => text::rewrite(file, text, policy.rules_for(catalog, kind), Profile::for_kind(kind)),
    }
}
