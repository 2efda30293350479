use crate::audit::{audit, AuditReport};
use crate::config::CleanConfig;
use crate::error::{CleanError, ConfigError, Result};
use crate::filter::RemovalFilter;
use crate::link::link_compat_index;
use crate::polyfill::{index_module, synthesize, PolyfillModule};
use crate::progress::{NoProgress, ProgressSink, Stage};
use crate::rewrite::{rewrite_file, Disposition, FileOutcome, RewritePolicy};
use crate::score::score;
use crate::triggers::collect_triggers;
use crate::verify::{detect, verify};
use rayon::prelude::*;
use sovereign_protocol::{
    Category, FileKind, Finding, Report, Severity, VirtualFile, VirtualTree,
    REPORT_SCHEMA_VERSION,
};
use sovereign_rules::RuleCatalog;
use std::collections::{BTreeSet, HashSet};

pub const REQUIRED_FILE_MISSING: &str = "required file missing";

/// Final tree and report of a successful run
#[derive(Debug, Clone)]
pub struct CleanOutput {
    pub final_tree: VirtualTree,
    pub report: Report,
}

/// Runs the cleaning pipeline with one catalog and one configuration.
///
/// Both are fixed for the lifetime of the cleaner; a run never mutates
/// them.
#[derive(Debug, Clone)]
pub struct Cleaner {
    catalog: RuleCatalog,
    config: CleanConfig,
    filter: RemovalFilter,
    policy: RewritePolicy,
}

impl Cleaner {
    pub fn new(catalog: RuleCatalog, config: CleanConfig) -> Result<Self> {
        config.validate().map_err(ConfigError::Invalid)?;
        let filter = RemovalFilter::new(&config.denylist)?;
        let policy = RewritePolicy::new(&config, &catalog)?;
        Ok(Self {
            catalog,
            config,
            filter,
            policy,
        })
    }

    /// Builtin catalog, extended with `catalog.extra_rules_path` if set
    pub fn from_config(config: CleanConfig) -> Result<Self> {
        let mut catalog = RuleCatalog::builtin()?;
        if let Some(path) = &config.catalog.extra_rules_path {
            catalog = catalog.extend_with_file(path)?;
        }
        Self::new(catalog, config)
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &CleanConfig {
        &self.config
    }

    pub fn clean(&self, tree: &VirtualTree, removal_list: &[String]) -> Result<CleanOutput> {
        self.clean_with_progress(tree, removal_list, &NoProgress)
    }

    pub fn clean_with_progress(
        &self,
        tree: &VirtualTree,
        removal_list: &[String],
        progress: &dyn ProgressSink,
    ) -> Result<CleanOutput> {
        self.check_limits(tree)?;
        log::info!(
            "Cleaning {} files with rule catalog {}",
            tree.len(),
            self.catalog.version()
        );

        progress.stage(Stage::Filter, tree.len());
        let (filtered, filter_removed) = self.filter.filter(tree, removal_list);

        let files: Vec<&VirtualFile> = filtered.files().collect();
        progress.stage(Stage::Rewrite, files.len());
        let outcomes: Vec<FileOutcome> = files
            .par_iter()
            .map(|file| {
                let outcome = rewrite_file(file, &self.catalog, &self.policy);
                progress.advance(file.path());
                outcome
            })
            .collect();

        let mut findings = Vec::new();
        let mut upserts = Vec::new();
        let mut deleted = BTreeSet::new();
        let mut cleaned_paths = BTreeSet::new();
        let mut packages_removed = 0;
        for outcome in outcomes {
            packages_removed += outcome.packages_removed;
            findings.extend(outcome.findings);
            match outcome.disposition {
                Disposition::Rewritten(file) => {
                    cleaned_paths.insert(outcome.path);
                    upserts.push(file);
                }
                Disposition::Deleted => {
                    deleted.insert(outcome.path);
                }
                Disposition::Unchanged => {}
            }
        }
        let cleaned = filtered.apply(upserts, deleted.iter().cloned());
        log::info!(
            "Rewrote {} file(s), deleted {}, removed {} package(s)",
            cleaned_paths.len(),
            deleted.len(),
            packages_removed
        );

        progress.stage(Stage::Polyfill, 1);
        let (assembled, _) = install_polyfills(&cleaned, &findings)?;

        progress.stage(Stage::Verify, assembled.len());
        let verification = verify(
            assembled,
            &findings,
            &self.catalog,
            &self.policy,
            self.config.limits.retry_passes(),
        );
        findings.extend(verification.findings);
        packages_removed += verification.packages_removed;
        cleaned_paths.extend(verification.rewritten);
        deleted.extend(verification.deleted);
        cleaned_paths.retain(|path| !deleted.contains(path));

        // The retry pass may have fired triggers of its own.
        let (assembled, polyfills_generated) =
            install_polyfills(&verification.tree, &findings)?;
        let (final_tree, linked) = link_compat_index(&assembled);
        cleaned_paths.extend(linked);

        findings.extend(self.missing_required_files(&filtered, &final_tree));

        progress.stage(Stage::Score, findings.len());
        let sovereignty = score(&findings, &self.config.scoring);

        let open_paths: HashSet<&str> = findings
            .iter()
            .filter(|finding| !finding.quarantined)
            .map(|finding| finding.path.as_str())
            .collect();
        let files_verified_clean = final_tree
            .paths()
            .filter(|path| !open_paths.contains(path))
            .count();
        let residual_findings = findings.iter().filter(|finding| finding.residual).count();

        let report = Report {
            schema_version: REPORT_SCHEMA_VERSION,
            files_scanned: tree.len(),
            files_removed: filter_removed + deleted.len(),
            files_cleaned: cleaned_paths.len(),
            files_verified_clean,
            polyfills_generated,
            packages_removed,
            score: sovereignty.score,
            verdict: sovereignty.verdict,
            issue_counts: sovereignty.issue_counts,
            retry_passes: verification.retry_passes,
            residual_findings,
            catalog_version: self.catalog.version().to_string(),
            tree_digest: final_tree.fingerprint(),
            findings,
        };
        progress.finish();

        Ok(CleanOutput { final_tree, report })
    }

    /// Detection-only pass over `tree`; nothing is rewritten
    pub fn detect(&self, tree: &VirtualTree) -> Vec<Finding> {
        detect(tree, &self.catalog, &self.policy)
    }

    pub fn audit(&self, tree: &VirtualTree) -> AuditReport {
        audit(tree, &self.config.manifest)
    }

    fn check_limits(&self, tree: &VirtualTree) -> Result<()> {
        let limits = &self.config.limits;
        if tree.is_empty() {
            return Err(CleanError::EmptyTree);
        }
        if tree.len() > limits.max_files {
            return Err(CleanError::TooManyFiles {
                files: tree.len(),
                limit: limits.max_files,
            });
        }
        let bytes = tree.total_bytes();
        if bytes > limits.max_total_bytes {
            return Err(CleanError::TooLarge {
                bytes,
                limit: limits.max_total_bytes,
            });
        }
        Ok(())
    }

    /// Required files are only expected in JavaScript projects
    fn missing_required_files(&self, filtered: &VirtualTree, final_tree: &VirtualTree) -> Vec<Finding> {
        let javascript = filtered
            .files()
            .any(|file| FileKind::is_js_family(file.path()) || file.kind() == FileKind::Markup);
        if !javascript {
            return Vec::new();
        }
        self.config
            .manifest
            .required_files
            .iter()
            .filter(|path| !final_tree.contains(path))
            .map(|path| {
                log::warn!("Required file {path} is missing");
                Finding::new(
                    path.as_str(),
                    Category::MissingRequiredFile,
                    Severity::Major,
                    REQUIRED_FILE_MISSING,
                )
            })
            .collect()
    }
}

/// Clean `tree` with the builtin catalog and default configuration
pub fn clean(tree: &VirtualTree, removal_list: &[String]) -> Result<CleanOutput> {
    Cleaner::from_config(CleanConfig::default())?.clean(tree, removal_list)
}

/// Add one module per fired trigger and regenerate the index.
/// Returns the new tree and the number of modules synthesized.
fn install_polyfills(tree: &VirtualTree, findings: &[Finding]) -> Result<(VirtualTree, usize)> {
    let triggers = collect_triggers(findings);
    let modules = synthesize(&triggers);
    let index = index_module(tree, &modules);
    let files = modules
        .iter()
        .chain(index.as_ref())
        .map(PolyfillModule::to_file)
        .collect::<sovereign_protocol::Result<Vec<_>>>()?;
    Ok((tree.apply(files, std::iter::empty()), modules.len()))
}
