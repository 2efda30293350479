use super::text::{self, Profile};
use super::{Disposition, FileOutcome};
use crate::config::ManifestPolicy;
use serde_json::{Map, Value};
use sovereign_protocol::{Category, FileKind, Finding, Severity, VirtualFile};
use sovereign_rules::{LineIndex, RuleCatalog};

pub const MANIFEST_UNPARSABLE: &str = "manifest unparsable";

pub(crate) const DEPENDENCY_SECTIONS: &[&str] = &[
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

/// Remove denied packages from `package.json`, then run the manifest rules
/// over the result.
pub(crate) fn rewrite(
    file: &VirtualFile,
    text: &str,
    catalog: &RuleCatalog,
    policy: &ManifestPolicy,
) -> FileOutcome {
    let path = file.path();
    let mut manifest: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("{path}: {MANIFEST_UNPARSABLE}: {err}");
            let finding = Finding::new(
                path,
                Category::ProcessingFault,
                Severity::Major,
                MANIFEST_UNPARSABLE,
            );
            return FileOutcome::unchanged(path, vec![finding]);
        }
    };

    let lines = LineIndex::new(text);
    let mut findings = Vec::new();
    let mut packages_removed = 0;

    if let Some(root) = manifest.as_object_mut() {
        for section in DEPENDENCY_SECTIONS {
            let Some(Value::Object(deps)) = root.get_mut(*section) else {
                continue;
            };
            let removed = strip_denied(deps, policy);
            for (name, version) in removed {
                let version = version.as_str().unwrap_or("*").to_string();
                log::debug!("{path}: removing {name}@{version} from {section}");
                let mut finding = Finding::new(
                    path,
                    Category::ProprietaryDependency,
                    Severity::Critical,
                    format!("Proprietary package {name}@{version} removed from {section}"),
                )
                .snippet(format!("\"{name}\": \"{version}\""))
                .quarantined(true);
                if let Some(offset) = text.find(&format!("\"{name}\"")) {
                    finding = finding.at_line(lines.line_of(offset));
                }
                findings.push(finding);
                packages_removed += 1;
            }
        }
    }

    let current = if packages_removed > 0 {
        match serde_json::to_string_pretty(&manifest) {
            Ok(mut rendered) => {
                if text.ends_with('\n') {
                    rendered.push('\n');
                }
                rendered
            }
            Err(err) => {
                log::warn!("{path}: failed to re-serialize manifest: {err}");
                return FileOutcome::unchanged(path, findings);
            }
        }
    } else {
        text.to_string()
    };

    let rules = text::rewrite(
        file,
        &current,
        catalog.rules_for(FileKind::Manifest),
        Profile::for_kind(FileKind::Manifest),
    );
    findings.extend(rules.findings);

    let disposition = match rules.disposition {
        Disposition::Rewritten(rewritten) => Disposition::Rewritten(rewritten),
        _ if current != text => Disposition::Rewritten(file.with_text(current)),
        _ => Disposition::Unchanged,
    };

    FileOutcome {
        path: path.to_string(),
        disposition,
        findings,
        packages_removed,
    }
}

/// Rebuild `deps` without denied packages, keeping key order
fn strip_denied(deps: &mut Map<String, Value>, policy: &ManifestPolicy) -> Vec<(String, Value)> {
    if !deps.keys().any(|name| policy.is_denied(name)) {
        return Vec::new();
    }
    let mut kept = Map::new();
    let mut removed = Vec::new();
    for (name, version) in std::mem::take(deps) {
        if policy.is_denied(&name) {
            removed.push((name, version));
        } else {
            kept.insert(name, version);
        }
    }
    *deps = kept;
    removed
}
