use sovereign_engine::{AuditReport, GateDecision};
use sovereign_protocol::Report;
use std::path::Path;

/// Findings listed in the markdown report; the JSON report always has all
const MAX_FINDING_ROWS: usize = 200;

pub fn render_clean_report(
    project_root: &Path,
    report: &Report,
    audit: &AuditReport,
    gate: GateDecision,
) -> String {
    let mut md = String::new();
    md.push_str("# Sovereign cleaning report\n\n");
    md.push_str(&format!("- Project: `{}`\n", project_root.display()));
    md.push_str(&format!("- Rule catalog: `{}`\n", report.catalog_version));
    md.push_str(&format!("- Tree digest: `{}`\n", report.tree_digest));
    md.push_str(&format!(
        "- Score: **{}** / 100, verdict **{}**\n",
        report.score, report.verdict
    ));
    md.push_str(&format!("- Packaging gate: **{gate}**\n\n"));

    md.push_str("## Summary\n\n");
    md.push_str("| scanned | removed | cleaned | verified clean | polyfills | packages removed | retry passes |\n");
    md.push_str("|---:|---:|---:|---:|---:|---:|---:|\n");
    md.push_str(&format!(
        "| `{}` | `{}` | `{}` | `{}` | `{}` | `{}` | `{}` |\n\n",
        report.files_scanned,
        report.files_removed,
        report.files_cleaned,
        report.files_verified_clean,
        report.polyfills_generated,
        report.packages_removed,
        report.retry_passes
    ));
    md.push_str(&format!(
        "Open issues: critical `{}`, major `{}`, minor `{}`\n\n",
        report.issue_counts.critical, report.issue_counts.major, report.issue_counts.minor
    ));

    md.push_str("## Findings\n\n");
    if report.findings.is_empty() {
        md.push_str("No findings.\n\n");
    } else {
        md.push_str("| status | severity | category | location | rule | description |\n");
        md.push_str("|---|---|---|---|---|---|\n");
        for finding in report.findings.iter().take(MAX_FINDING_ROWS) {
            let status = if finding.residual {
                "residual"
            } else if finding.quarantined {
                "fixed"
            } else {
                "open"
            };
            let location = match finding.line {
                Some(line) => format!("{}:{line}", finding.path),
                None => finding.path.clone(),
            };
            md.push_str(&format!(
                "| {status} | {} | {} | `{}` | `{}` | {} |\n",
                finding.severity,
                finding.category,
                escape_cell(&location),
                finding.rule_id.as_deref().unwrap_or("-"),
                escape_cell(&truncate_one_line(&finding.description, 120)),
            ));
        }
        if report.findings.len() > MAX_FINDING_ROWS {
            md.push_str(&format!(
                "\n_{} more findings in the JSON report._\n",
                report.findings.len() - MAX_FINDING_ROWS
            ));
        }
        md.push('\n');
    }

    // Audit section reuses the auditor's own rendering one level down.
    for line in audit.markdown().lines() {
        if line.starts_with('#') {
            md.push('#');
        }
        md.push_str(line);
        md.push('\n');
    }
    md
}

fn truncate_one_line(text: &str, max_chars: usize) -> String {
    let mut one_line = text.replace(['\n', '\r'], " ");
    if one_line.chars().count() > max_chars {
        one_line = one_line.chars().take(max_chars).collect::<String>();
        one_line.push('…');
    }
    one_line
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}
