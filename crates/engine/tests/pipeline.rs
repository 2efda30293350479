use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sovereign_engine::{
    clean, packaging_gate, CleanConfig, CleanError, Cleaner, GateDecision, MANIFEST_UNPARSABLE,
};
use sovereign_protocol::{Category, Finding, Severity, Verdict, VirtualTree};
use sovereign_rules::RuleCatalog;
use std::collections::HashSet;

const APP: &str = r#"import { useState } from "react";
import { auth } from "proprietary-sdk";

export async function load() {
  const session = await proprietary.auth.getSession();
  if (proprietary.flags.isEnabled("beta")) {
    proprietaryAnalytics.track("beta", { id: session.id });
  }
  proprietary.storage.set("last", Date.now());
  return eval(session.payload);
}
"#;

const INDEX_HTML: &str = r#"<!doctype html>
<html>
  <head>
    <meta name="generator" content="Proprietary Platform Builder">
    <script src="https://cdn.proprietary-platform.io/runtime.js"></script>
    <link rel="stylesheet" href="https://cdn.proprietary-platform.io/theme.css">
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.tsx"></script>
  </body>
</html>
"#;

const VITE_CONFIG: &str = r#"import { defineConfig } from "vite";
import react from "@vitejs/plugin-react";
import proprietaryTagger from "proprietary-tagger";

export default defineConfig(({ mode }) => ({
  plugins: [react(), mode === "development" && proprietaryTagger()],
}));
"#;

fn project() -> VirtualTree {
    VirtualTree::from_texts([
        (
            "package.json",
            "{\n  \"name\": \"shop\",\n  \"dependencies\": {\n    \"proprietary-sdk\": \"2.1.0\",\n    \"react\": \"18.2.0\"\n  },\n  \"devDependencies\": {\n    \"@proprietary/vite-plugin\": \"1.0.0\",\n    \"vite\": \"5.0.0\"\n  }\n}\n",
        ),
        ("index.html", INDEX_HTML),
        ("vite.config.ts", VITE_CONFIG),
        ("src/app.ts", APP),
        ("src/main.tsx", "import { load } from \"./app\";\nload();\n"),
        (
            "src/theme.css",
            "@import url(\"https://cdn.proprietary-platform.io/fonts.css\");\nbody { margin: 0; }\n",
        ),
        (
            ".env",
            "PROPRIETARY_API_KEY=sk_live_123\nVITE_API_URL=https://api.proprietary-platform.io/v1\nPORT=3000\n",
        ),
        (
            "README.md",
            "# Shop\n\nBuilt on Proprietary Platform, see https://docs.proprietary-platform.io/start.\n",
        ),
        (".proprietaryrc", "{}\n"),
        (".platform/hooks.js", "module.exports = {};\n"),
        (
            "public/bootstrap.html",
            "<!-- @proprietary-bootstrap -->\n<script>window.boot()</script>\n",
        ),
    ])
    .unwrap()
}

fn by_rule<'a>(findings: &'a [Finding], rule: &str) -> Vec<&'a Finding> {
    findings
        .iter()
        .filter(|f| f.rule_id.as_deref() == Some(rule))
        .collect()
}

#[test]
fn proprietary_dependency_is_removed_from_manifest() {
    let tree = VirtualTree::from_texts([(
        "package.json",
        "{\n  \"dependencies\": {\n    \"proprietary-sdk\": \"2.1.0\",\n    \"react\": \"18.2.0\"\n  }\n}\n",
    )])
    .unwrap();

    let output = clean(&tree, &[]).unwrap();
    let report = &output.report;
    assert_eq!(report.packages_removed, 1);

    let dependency: Vec<_> = report
        .findings
        .iter()
        .filter(|f| f.category == Category::ProprietaryDependency)
        .collect();
    assert_eq!(dependency.len(), 1);
    assert_eq!(dependency[0].severity, Severity::Critical);
    assert!(dependency[0].quarantined);

    let manifest = output.final_tree.text("package.json").unwrap();
    assert!(!manifest.contains("proprietary-sdk"));
    assert!(manifest.contains("\"react\": \"18.2.0\""));
    assert!(manifest.ends_with("}\n"));
    assert_eq!(report.verdict, Verdict::Sovereign);
}

#[test]
fn auth_accessor_generates_one_polyfill() {
    let tree = VirtualTree::from_texts([
        ("package.json", "{\n  \"name\": \"app\"\n}\n"),
        (
            "src/session.js",
            "export const current = () => proprietary.auth.getSession();\n",
        ),
    ])
    .unwrap();

    let output = clean(&tree, &[]).unwrap();
    assert_eq!(output.report.polyfills_generated, 1);
    assert!(output.final_tree.contains("src/__compat__/auth-session.js"));

    let index = output.final_tree.text("src/__compat__/index.js").unwrap();
    assert!(index.contains("import auth from \"./auth-session.js\";"));
    assert!(index.contains("export { auth };"));
    assert_eq!(
        output.final_tree.text("src/session.js"),
        Some("import \"./__compat__/index.js\";\nexport const current = () => globalThis.__compat.auth.getSession();\n")
    );

    let cleaner = Cleaner::from_config(CleanConfig::default()).unwrap();
    let audit = cleaner.audit(&output.final_tree);
    assert!(audit.passed, "{}", audit.markdown());
    assert_eq!(packaging_gate(&output.report, &audit), GateDecision::Proceed);
}

#[test]
fn rewritten_call_sites_load_the_compat_index() {
    let tree = VirtualTree::from_texts([
        ("package.json", "{\n  \"name\": \"app\"\n}\n"),
        (
            "index.html",
            "<!doctype html>\n<html>\n  <body>\n    <script type=\"module\" src=\"/src/main.ts\"></script>\n  </body>\n</html>\n",
        ),
        ("src/main.ts", "import { current } from \"./session\";\ncurrent();\n"),
        (
            "src/session.ts",
            "export const current = () => proprietary.auth.getSession();\n",
        ),
        (
            "src/pages/flags.ts",
            "export const beta = () => proprietary.flags.isEnabled(\"beta\");\n",
        ),
    ])
    .unwrap();

    let output = clean(&tree, &[]).unwrap();
    let final_tree = &output.final_tree;
    assert_eq!(
        final_tree.text("src/session.ts"),
        Some("import \"./__compat__/index.js\";\nexport const current = () => globalThis.__compat.auth.getSession();\n")
    );
    assert_eq!(
        final_tree.text("src/pages/flags.ts"),
        Some("import \"../__compat__/index.js\";\nexport const beta = () => globalThis.__compat.flags.isEnabled(\"beta\");\n")
    );
    // files without shim calls are left alone
    assert_eq!(final_tree.text("src/main.ts"), tree.text("src/main.ts"));
    assert_eq!(final_tree.text("index.html"), tree.text("index.html"));
    assert_eq!(output.report.files_cleaned, 2);

    let cleaner = Cleaner::from_config(CleanConfig::default()).unwrap();
    let audit = cleaner.audit(final_tree);
    assert!(audit.passed, "{}", audit.markdown());
    assert_eq!(packaging_gate(&output.report, &audit), GateDecision::Proceed);

    let second = clean(final_tree, &[]).unwrap();
    assert_eq!(&second.final_tree, final_tree);
    assert_eq!(second.report.files_cleaned, 0);
}

#[test]
fn imports_of_policy_denied_packages_are_removed() {
    let tree = VirtualTree::from_texts([
        (
            "package.json",
            "{\n  \"dependencies\": {\n    \"proprietary-tagger\": \"1.0.0\",\n    \"react\": \"18.2.0\"\n  }\n}\n",
        ),
        (
            "src/tag.ts",
            "import tagger from \"proprietary-tagger\";\nexport const run = () => 1;\n",
        ),
    ])
    .unwrap();

    let output = clean(&tree, &[]).unwrap();
    assert_eq!(output.report.packages_removed, 1);
    assert_eq!(
        output.final_tree.text("src/tag.ts"),
        Some("// proprietary import removed\nexport const run = () => 1;\n")
    );
    let imports = by_rule(&output.report.findings, "denied-package-import");
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].path, "src/tag.ts");
    assert_eq!(imports[0].severity, Severity::Critical);
    assert_eq!(imports[0].category, Category::ProprietaryImport);
    assert!(imports[0].quarantined);

    let cleaner = Cleaner::from_config(CleanConfig::default()).unwrap();
    let audit = cleaner.audit(&output.final_tree);
    assert!(audit.passed, "{}", audit.markdown());
    assert_eq!(packaging_gate(&output.report, &audit), GateDecision::Proceed);
}

#[test]
fn configured_denied_package_is_flagged_when_loaded_dynamically() {
    let mut config = CleanConfig::default();
    config.manifest.denied_packages.push("acme-beacon".to_string());
    let cleaner = Cleaner::from_config(config).unwrap();
    let tree = VirtualTree::from_texts([
        ("package.json", "{\n  \"name\": \"app\"\n}\n"),
        (
            "src/lazy.ts",
            "export const load = () => import(\"acme-beacon/web\");\n",
        ),
    ])
    .unwrap();

    let output = cleaner.clean(&tree, &[]).unwrap();
    assert_eq!(output.final_tree.text("src/lazy.ts"), tree.text("src/lazy.ts"));
    let flagged = by_rule(&output.report.findings, "denied-package-dynamic-import");
    assert_eq!(flagged.len(), 1);
    assert!(!flagged[0].quarantined);
    assert_eq!(flagged[0].severity, Severity::Major);
    assert_ne!(output.report.verdict, Verdict::Sovereign);
    assert!(!cleaner.audit(&output.final_tree).passed);
}

#[test]
fn empty_tree_produces_no_report() {
    let err = clean(&VirtualTree::new(), &["a.js".to_string()]).unwrap_err();
    assert!(matches!(err, CleanError::EmptyTree));
}

#[test]
fn malformed_manifest_is_kept_and_caps_the_verdict() {
    let broken = "{ \"dependencies\": { \"proprietary-sdk\": ";
    let tree = VirtualTree::from_texts([("package.json", broken)]).unwrap();

    let output = clean(&tree, &[]).unwrap();
    assert_eq!(output.final_tree.text("package.json"), Some(broken));

    let faults: Vec<_> = output
        .report
        .findings
        .iter()
        .filter(|f| f.description == MANIFEST_UNPARSABLE)
        .collect();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].severity, Severity::Major);
    assert_eq!(faults[0].category, Category::ProcessingFault);
    assert_ne!(output.report.verdict, Verdict::Sovereign);
}

#[test]
fn full_project_is_cleaned() {
    let output = clean(&project(), &[]).unwrap();
    let report = &output.report;
    let tree = &output.final_tree;

    assert_eq!(report.files_scanned, 11);
    // .proprietaryrc, .platform/hooks.js, and the bootstrap page
    assert_eq!(report.files_removed, 3);
    assert_eq!(report.packages_removed, 2);
    assert_eq!(report.polyfills_generated, 4);
    assert_eq!(report.retry_passes, 0);
    assert_eq!(report.residual_findings, 0);

    assert!(!tree.contains(".proprietaryrc"));
    assert!(!tree.contains("public/bootstrap.html"));
    for module in ["auth-session", "feature-flags", "kv-storage", "analytics", "index"] {
        assert!(tree.contains(&format!("src/__compat__/{module}.js")), "{module}");
    }

    let app = tree.text("src/app.ts").unwrap();
    assert!(app.contains("// proprietary import removed"));
    assert!(app.contains("globalThis.__compat.flags.isEnabled(\"beta\")"));
    assert!(app.contains("globalThis.__compat.storage.set(\"last\""));
    assert!(app.starts_with("import \"./__compat__/index.js\";\nimport { useState } from \"react\";\n"));
    assert_eq!(app.lines().count(), APP.lines().count() + 1);

    let html = tree.text("index.html").unwrap();
    assert!(!html.contains("proprietary-platform.io"));
    assert!(!html.contains("Proprietary Platform"));
    assert!(html.contains("    <div id=\"root\"></div>\n"));

    let vite = tree.text("vite.config.ts").unwrap();
    assert!(!vite.contains("proprietaryTagger"));
    assert!(vite.contains("import react from \"@vitejs/plugin-react\";"));

    assert_eq!(
        tree.text(".env"),
        Some("PROPRIETARY_API_KEY=\nVITE_API_URL=\nPORT=3000\n")
    );
    assert_eq!(tree.text("src/theme.css"), Some("body { margin: 0; }\n"));
    assert_eq!(
        tree.text("README.md"),
        Some("# Shop\n\nBuilt on the hosting platform, see https://example.com.\n")
    );

    // eval stays in place and is the only open finding
    let open: Vec<_> = report.findings.iter().filter(|f| !f.quarantined).collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].rule_id.as_deref(), Some("unsafe-eval-call"));
    assert_eq!(report.score, 90);
    assert_eq!(report.verdict, Verdict::RequiresReview);
    assert_eq!(report.tree_digest, tree.fingerprint());
}

#[test]
fn second_run_is_a_fixed_point() {
    let first = clean(&project(), &[]).unwrap();
    let second = clean(&first.final_tree, &[]).unwrap();
    assert_eq!(second.final_tree, first.final_tree);

    let seen: HashSet<_> = first.report.findings.iter().map(Finding::identity).collect();
    for finding in &second.report.findings {
        assert!(
            seen.contains(&finding.identity()),
            "new finding on second run: {finding:?}"
        );
    }
    assert_eq!(second.report.packages_removed, 0);
    assert_eq!(second.report.files_cleaned, 0);
}

#[test]
fn repeated_runs_are_identical() {
    let removal = vec!["src/main.tsx".to_string()];
    let a = clean(&project(), &removal).unwrap();
    let b = clean(&project(), &removal).unwrap();
    assert_eq!(a.report, b.report);
    assert_eq!(a.final_tree, b.final_tree);
    assert!(!a.final_tree.contains("src/main.tsx"));
}

#[test]
fn surviving_files_are_never_dropped() {
    let input = project();
    let output = clean(&input, &[]).unwrap();
    let deleted_by_rule: HashSet<&str> = output
        .report
        .findings
        .iter()
        .filter(|f| f.rule_id.as_deref() == Some("ghost-bootstrap-file"))
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(deleted_by_rule.len(), 1);
    for path in input.paths() {
        let filtered_out = path == ".proprietaryrc" || path.starts_with(".platform/");
        if filtered_out || deleted_by_rule.contains(path) {
            continue;
        }
        assert!(output.final_tree.contains(path), "{path} was dropped");
    }
    for path in output.final_tree.paths() {
        assert!(
            input.contains(path) || path.starts_with("src/__compat__/"),
            "unexpected path {path}"
        );
    }
}

#[test]
fn doc_and_shell_findings_stay_minor() {
    let tree = VirtualTree::from_texts([
        (
            "docs/deploy.md",
            "Hosted on Proprietary Platform.\n\nRun `proprietary-cli deploy --prod`\n![badge](https://badge.proprietary-platform.io/x.svg)\n",
        ),
        ("scripts/release.sh", "proprietary-cli publish --tag latest\n"),
    ])
    .unwrap();
    let output = clean(&tree, &[]).unwrap();
    assert!(!output.report.findings.is_empty());
    for finding in &output.report.findings {
        assert_eq!(finding.severity, Severity::Minor, "{finding:?}");
    }
    assert!(!by_rule(&output.report.findings, "shell-platform-cli").is_empty());
}

#[test]
fn non_converging_rule_is_bounded_and_reported() {
    let catalog = RuleCatalog::from_toml_str(
        r#"
version = "loop-test"

[[rules]]
id = "grow-marker"
category = "telemetry"
severity = "critical"
applies_to = ["source"]
pattern = 'beacon'
action = { kind = "rewrite", replacement = "beaconbeacon" }
remediation = "Never converges."
"#,
    )
    .unwrap();
    let cleaner = Cleaner::new(catalog, CleanConfig::default()).unwrap();
    let tree = VirtualTree::from_texts([
        ("package.json", "{}\n"),
        ("src/a.js", "send(beacon);\n"),
    ])
    .unwrap();

    let output = cleaner.clean(&tree, &[]).unwrap();
    assert_eq!(output.report.retry_passes, 1);
    assert_eq!(output.report.residual_findings, 1);
    assert_eq!(
        output.final_tree.text("src/a.js"),
        Some("send(beaconbeaconbeaconbeacon);\n")
    );
    let residual = output.report.findings.iter().find(|f| f.residual).unwrap();
    assert!(!residual.quarantined);
    assert_eq!(output.report.verdict, Verdict::RequiresReview);
    assert_eq!(output.report.catalog_version, "loop-test");
}

const FRAGMENTS: &[&str] = &[
    "const s = proprietary.auth.getSession();",
    "proprietary.flags.getVariant(\"x\");",
    "proprietary.storage.get(\"k\");",
    "proprietaryAnalytics.page();",
    "import \"@proprietary/widgets\";",
    "const m = require(\"proprietary-sdk\");",
    "eval(code);",
    "window.__PROPRIETARY_STATE__ = {};",
    "console.log(1);",
    "export const plain = true;",
];

fn arb_tree() -> impl Strategy<Value = VirtualTree> {
    (
        proptest::collection::vec(proptest::sample::select(FRAGMENTS), 1..8),
        proptest::collection::vec(proptest::sample::select(FRAGMENTS), 0..5),
        any::<bool>(),
    )
        .prop_map(|(a, b, sdk)| {
            let manifest = if sdk {
                "{\n  \"dependencies\": {\n    \"proprietary-sdk\": \"1.0.0\"\n  }\n}\n"
            } else {
                "{\n  \"name\": \"x\"\n}\n"
            };
            let mut files = vec![
                ("package.json".to_string(), manifest.to_string()),
                ("src/a.ts".to_string(), a.join("\n") + "\n"),
            ];
            if !b.is_empty() {
                files.push(("src/nested/b.js".to_string(), b.join("\n") + "\n"));
            }
            VirtualTree::from_texts(files).unwrap()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn cleaning_is_deterministic_and_idempotent(tree in arb_tree()) {
        let first = clean(&tree, &[]).unwrap();
        let again = clean(&tree, &[]).unwrap();
        prop_assert_eq!(&first.report, &again.report);

        let second = clean(&first.final_tree, &[]).unwrap();
        prop_assert_eq!(&second.final_tree, &first.final_tree);

        let seen: HashSet<_> = first.report.findings.iter().map(Finding::identity).collect();
        for finding in &second.report.findings {
            prop_assert!(seen.contains(&finding.identity()));
        }
    }

    #[test]
    fn open_critical_findings_block_sovereignty(tree in arb_tree()) {
        let output = clean(&tree, &[]).unwrap();
        if output.report.open_critical_count() > 0 {
            prop_assert_ne!(output.report.verdict, Verdict::Sovereign);
        }
        prop_assert!(output.report.score <= 100);
    }
}
