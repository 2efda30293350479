//! Build-breaking and security checks over the final tree.
//!
//! Independent of the scorer: the auditor looks at the output tree only,
//! never at the findings of the run.

use crate::config::ManifestPolicy;
use crate::link::loads_index;
use crate::polyfill::{module_path, INDEX_MODULE};
use crate::rewrite::DEPENDENCY_SECTIONS;
use crate::triggers::TRIGGERS;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sovereign_protocol::{FileKind, Severity, VirtualFile, VirtualTree};

static IMPORT_SPECIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:\bfrom\s*|\bimport\s*\(?\s*|\brequire\s*\(\s*)["']([^"'\n]+)["']"#)
        .expect("import specifier regex must compile")
});

static INDEX_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"from\s+["']\./([^"'\n]+)["']"#).expect("index import regex must compile")
});

static COMPAT_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"__compat\.([A-Za-z_]+)\.").expect("compat call regex must compile")
});

static DECODED_EVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\beval|\bnew\s+Function)\s*\(\s*atob\s*\(")
        .expect("decoded eval regex must compile")
});

static ENV_SECRET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:export[ \t]+)?[A-Za-z0-9_]*PROPRIETARY[A-Za-z0-9_]*[ \t]*=[ \t]*\S")
        .expect("env secret regex must compile")
});

const TELEMETRY_HOST: &str = "telemetry.proprietary-platform.io";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckKind {
    BuildBreaking,
    Security,
}

/// One check and whether it passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditCheck {
    pub name: &'static str,
    pub kind: CheckKind,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditIssue {
    pub check: &'static str,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

/// Outcome of an audit. Fails on any critical issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub passed: bool,
    pub checks: Vec<AuditCheck>,
    pub issues: Vec<AuditIssue>,
}

impl AuditReport {
    pub fn markdown(&self) -> String {
        let mut md = String::new();
        md.push_str("# Sovereign audit\n\n");
        md.push_str(&format!(
            "Result: **{}**\n\n",
            if self.passed { "passed" } else { "failed" }
        ));

        md.push_str("| check | kind | status |\n");
        md.push_str("|---|---|---|\n");
        for check in &self.checks {
            let kind = match check.kind {
                CheckKind::BuildBreaking => "build",
                CheckKind::Security => "security",
            };
            let status = if check.passed { "ok" } else { "FAIL" };
            md.push_str(&format!("| {} | {kind} | {status} |\n", check.name));
        }

        if !self.issues.is_empty() {
            md.push_str("\n## Issues\n\n");
            for issue in &self.issues {
                let location = issue
                    .path
                    .as_deref()
                    .map(|path| format!(" `{path}`"))
                    .unwrap_or_default();
                md.push_str(&format!(
                    "- **{}** [{}]{location}: {}\n",
                    issue.severity, issue.check, issue.message
                ));
            }
        }
        md
    }
}

struct Audit<'a> {
    tree: &'a VirtualTree,
    policy: &'a ManifestPolicy,
    checks: Vec<AuditCheck>,
    issues: Vec<AuditIssue>,
}

impl<'a> Audit<'a> {
    fn run(
        &mut self,
        name: &'static str,
        kind: CheckKind,
        check: impl FnOnce(&VirtualTree, &ManifestPolicy) -> Vec<AuditIssue>,
    ) {
        let issues = check(self.tree, self.policy);
        self.checks.push(AuditCheck {
            name,
            kind,
            passed: issues.is_empty(),
        });
        self.issues.extend(issues);
    }
}

/// Run every audit check over `tree`
pub fn audit(tree: &VirtualTree, policy: &ManifestPolicy) -> AuditReport {
    let mut audit = Audit {
        tree,
        policy,
        checks: Vec::new(),
        issues: Vec::new(),
    };

    audit.run("manifest-present", CheckKind::BuildBreaking, manifest_present);
    audit.run("manifest-parseable", CheckKind::BuildBreaking, manifest_parseable);
    audit.run(
        "no-proprietary-dependency",
        CheckKind::BuildBreaking,
        no_proprietary_dependency,
    );
    audit.run("no-proprietary-import", CheckKind::BuildBreaking, no_proprietary_import);
    audit.run("compat-index-complete", CheckKind::BuildBreaking, compat_index_complete);
    audit.run("compat-call-sites", CheckKind::BuildBreaking, compat_call_sites);
    audit.run("no-decoded-eval", CheckKind::Security, no_decoded_eval);
    audit.run("no-env-secrets", CheckKind::Security, no_env_secrets);
    audit.run("no-telemetry-host", CheckKind::Security, no_telemetry_host);

    let passed = !audit
        .issues
        .iter()
        .any(|issue| issue.severity == Severity::Critical);
    log::info!(
        "Audit {}: {} issue(s) across {} checks",
        if passed { "passed" } else { "failed" },
        audit.issues.len(),
        audit.checks.len()
    );
    AuditReport {
        passed,
        checks: audit.checks,
        issues: audit.issues,
    }
}

fn issue(check: &'static str, severity: Severity, path: Option<&str>, message: String) -> AuditIssue {
    AuditIssue {
        check,
        severity,
        path: path.map(str::to_string),
        message,
    }
}

fn texts<'t>(
    tree: &'t VirtualTree,
    kinds: &'t [FileKind],
) -> impl Iterator<Item = (&'t VirtualFile, &'t str)> + 't {
    tree.files()
        .filter(move |file| kinds.contains(&file.kind()))
        .filter_map(|file| file.as_text().map(|text| (file, text)))
}

fn manifests(tree: &VirtualTree) -> impl Iterator<Item = (&VirtualFile, &str)> {
    texts(tree, &[FileKind::Manifest])
}

fn manifest_present(tree: &VirtualTree, _policy: &ManifestPolicy) -> Vec<AuditIssue> {
    let needs_manifest = tree
        .files()
        .any(|file| FileKind::is_js_family(file.path()) || file.kind() == FileKind::Markup);
    if needs_manifest && manifests(tree).next().is_none() {
        return vec![issue(
            "manifest-present",
            Severity::Major,
            None,
            "JavaScript sources without a package.json".to_string(),
        )];
    }
    Vec::new()
}

fn manifest_parseable(tree: &VirtualTree, _policy: &ManifestPolicy) -> Vec<AuditIssue> {
    manifests(tree)
        .filter_map(|(file, text)| {
            serde_json::from_str::<serde_json::Value>(text)
                .err()
                .map(|err| {
                    issue(
                        "manifest-parseable",
                        Severity::Critical,
                        Some(file.path()),
                        format!("package.json does not parse: {err}"),
                    )
                })
        })
        .collect()
}

fn no_proprietary_dependency(tree: &VirtualTree, policy: &ManifestPolicy) -> Vec<AuditIssue> {
    let mut issues = Vec::new();
    for (file, text) in manifests(tree) {
        let Ok(manifest) = serde_json::from_str::<serde_json::Value>(text) else {
            continue;
        };
        for section in DEPENDENCY_SECTIONS {
            let Some(deps) = manifest.get(*section).and_then(|deps| deps.as_object()) else {
                continue;
            };
            for name in deps.keys().filter(|name| policy.is_denied(name)) {
                issues.push(issue(
                    "no-proprietary-dependency",
                    Severity::Critical,
                    Some(file.path()),
                    format!("{section} still lists {name}"),
                ));
            }
        }
    }
    issues
}

fn no_proprietary_import(tree: &VirtualTree, policy: &ManifestPolicy) -> Vec<AuditIssue> {
    let mut issues = Vec::new();
    for (file, text) in texts(tree, &[FileKind::Source, FileKind::Markup]) {
        for caps in IMPORT_SPECIFIER.captures_iter(text) {
            let specifier = &caps[1];
            let package = package_name(specifier);
            if policy.is_denied(package) || policy.is_denied(specifier) {
                issues.push(issue(
                    "no-proprietary-import",
                    Severity::Critical,
                    Some(file.path()),
                    format!("imports {specifier}"),
                ));
            }
        }
    }
    issues
}

/// Package part of an import specifier (`@scope/name/sub` -> `@scope/name`)
fn package_name(specifier: &str) -> &str {
    let mut parts = specifier.splitn(3, '/');
    let first = parts.next().unwrap_or(specifier);
    if first.starts_with('@') {
        match parts.next() {
            Some(second) => &specifier[..first.len() + 1 + second.len()],
            None => specifier,
        }
    } else {
        first
    }
}

fn compat_index_complete(tree: &VirtualTree, _policy: &ManifestPolicy) -> Vec<AuditIssue> {
    let index_path = module_path(INDEX_MODULE);
    let Some(index) = tree.text(&index_path) else {
        return Vec::new();
    };
    INDEX_IMPORT
        .captures_iter(index)
        .filter_map(|caps| {
            let target = module_path(&caps[1]);
            (!tree.contains(&target)).then(|| {
                issue(
                    "compat-index-complete",
                    Severity::Critical,
                    Some(index_path.as_str()),
                    format!("index imports missing module {target}"),
                )
            })
        })
        .collect()
}

fn compat_call_sites(tree: &VirtualTree, _policy: &ManifestPolicy) -> Vec<AuditIssue> {
    let index_path = module_path(INDEX_MODULE);
    let index_present = tree.contains(&index_path);
    let mut issues = Vec::new();
    for (file, text) in texts(tree, &[FileKind::Source, FileKind::Markup]) {
        if sovereign_protocol::is_compat_path(file.path()) {
            continue;
        }
        let mut seen: Vec<&str> = Vec::new();
        for caps in COMPAT_CALL.captures_iter(text) {
            let Some(export) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if seen.contains(&export) {
                continue;
            }
            seen.push(export);
            let module = TRIGGERS.iter().find(|trigger| trigger.export == export);
            let satisfied = index_present
                && module.is_some_and(|trigger| tree.contains(&module_path(trigger.module)));
            if !satisfied {
                issues.push(issue(
                    "compat-call-sites",
                    Severity::Critical,
                    Some(file.path()),
                    format!("calls __compat.{export} but no shim provides it"),
                ));
            }
        }
        if index_present && !seen.is_empty() && !loads_index(file.path(), text) {
            issues.push(issue(
                "compat-call-sites",
                Severity::Critical,
                Some(file.path()),
                format!("calls into __compat but never loads {index_path}"),
            ));
        }
    }
    issues
}

fn no_decoded_eval(tree: &VirtualTree, _policy: &ManifestPolicy) -> Vec<AuditIssue> {
    texts(
        tree,
        &[FileKind::Source, FileKind::Markup, FileKind::BuildConfig],
    )
    .filter(|(_, text)| DECODED_EVAL.is_match(text))
    .map(|(file, _)| {
        issue(
            "no-decoded-eval",
            Severity::Critical,
            Some(file.path()),
            "executes a decoded payload".to_string(),
        )
    })
    .collect()
}

fn no_env_secrets(tree: &VirtualTree, _policy: &ManifestPolicy) -> Vec<AuditIssue> {
    texts(tree, &[FileKind::Env])
        .filter(|(_, text)| ENV_SECRET.is_match(text))
        .map(|(file, _)| {
            issue(
                "no-env-secrets",
                Severity::Critical,
                Some(file.path()),
                "platform secret value still present".to_string(),
            )
        })
        .collect()
}

fn no_telemetry_host(tree: &VirtualTree, _policy: &ManifestPolicy) -> Vec<AuditIssue> {
    tree.files()
        .filter(|file| file.kind() != FileKind::Doc)
        .filter_map(|file| file.as_text().map(|text| (file, text)))
        .filter(|(_, text)| text.contains(TELEMETRY_HOST))
        .map(|(file, _)| {
            issue(
                "no-telemetry-host",
                Severity::Major,
                Some(file.path()),
                format!("still references {TELEMETRY_HOST}"),
            )
        })
        .collect()
}
