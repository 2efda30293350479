use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sovereign_engine::{
    packaging_gate, CleanConfig, Cleaner, GateDecision, NoProgress, ProgressSink,
};
use sovereign_protocol::{Category, FileKind, Finding, Report, Severity};
use sovereign_rules::RuleCatalog;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod export;
mod ingest;
mod progress;
mod report;

use ingest::TreeReader;
use progress::BarProgress;

/// Config file picked up from the project root when `--config` is absent
const CONFIG_FILE: &str = "sovereign.toml";

#[derive(Parser)]
#[command(name = "sovereign")]
#[command(
    about = "Remove proprietary platform coupling from a project and certify the result",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a project directory and report its sovereignty score
    Clean(CleanArgs),

    /// Detection-only pass: list what the catalog matches, change nothing
    Scan(ScanArgs),

    /// Run build-breaking and security checks on a directory
    Audit(AuditArgs),

    /// List the rule catalog
    Rules(RulesArgs),

    /// Print the JSON schema of the cleaning report
    Schema,
}

impl Commands {
    fn json_output(&self) -> bool {
        match self {
            Commands::Clean(args) => args.json,
            Commands::Scan(args) => args.json,
            Commands::Audit(args) => args.json,
            Commands::Rules(args) => args.json,
            Commands::Schema => true,
        }
    }
}

#[derive(Args)]
struct CatalogArgs {
    /// Config file (defaults to sovereign.toml in the project root, if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra rule catalog (TOML) appended to the builtin rules
    #[arg(long)]
    rules: Option<PathBuf>,
}

#[derive(Args)]
struct CleanArgs {
    /// Project directory (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Write the cleaned tree here when the packaging gate allows it
    #[arg(long)]
    out: Option<PathBuf>,

    /// Additional path to remove (repeatable)
    #[arg(long = "remove", value_name = "PATH")]
    remove: Vec<String>,

    /// File with one path to remove per line (`#` starts a comment)
    #[arg(long)]
    remove_list: Option<PathBuf>,

    /// Write the JSON report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write a markdown report to this file
    #[arg(long)]
    markdown: Option<PathBuf>,

    #[command(flatten)]
    catalog: CatalogArgs,

    /// Write --out even when the packaging gate refuses
    #[arg(long)]
    force: bool,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ScanArgs {
    /// Project directory (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    #[command(flatten)]
    catalog: CatalogArgs,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AuditArgs {
    /// Project directory (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Config file (defaults to sovereign.toml in the project root, if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RulesArgs {
    /// Extra rule catalog (TOML) appended to the builtin rules
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON consumers
    if cli.command.json_output() {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let show_progress = !cli.quiet && std::io::stderr().is_terminal();
    let result = match cli.command {
        Commands::Clean(args) => run_clean(args, show_progress),
        Commands::Scan(args) => run_scan(args),
        Commands::Audit(args) => run_audit(args),
        Commands::Rules(args) => run_rules(args),
        Commands::Schema => run_schema(),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run_clean(args: CleanArgs, show_progress: bool) -> Result<ExitCode> {
    let root = args.path.canonicalize().context("Invalid project path")?;
    let (config, config_path) = load_config(&root, args.catalog.config.as_deref(), args.catalog.rules.as_deref())?;
    let cleaner = Cleaner::from_config(config).context("Failed to set up the cleaner")?;
    let removal_list = removal_list(&args)?;

    let tree = TreeReader::new(&root)
        .skip_file(config_path.as_deref())
        .read()?;
    let sink: Box<dyn ProgressSink> = if show_progress {
        Box::new(BarProgress::new())
    } else {
        Box::new(NoProgress)
    };
    let output = cleaner
        .clean_with_progress(&tree, &removal_list, sink.as_ref())
        .context("Cleaning failed")?;

    let (audit, report_json) = rayon::join(
        || cleaner.audit(&output.final_tree),
        || serde_json::to_string_pretty(&output.report),
    );
    let report_json = report_json?;
    let gate = packaging_gate(&output.report, &audit);

    if let Some(path) = &args.report {
        write_file(path, &report_json)?;
    }
    if let Some(path) = &args.markdown {
        let md = report::render_clean_report(&root, &output.report, &audit, gate);
        write_file(path, &md)?;
    }

    let mut exported = false;
    if let Some(out) = &args.out {
        if gate.allows_packaging() || args.force {
            if !gate.allows_packaging() {
                log::warn!("Packaging gate refused; writing {} anyway (--force)", out.display());
            }
            export::write_tree(&output.final_tree, out)?;
            exported = true;
        } else {
            log::warn!("Packaging gate refused; nothing written to {}", out.display());
        }
    }

    if args.json {
        let value = serde_json::json!({
            "report": output.report,
            "audit": audit,
            "gate": gate,
            "exported": exported,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_summary(&output.report, gate);
        if !audit.passed {
            for issue in audit.issues.iter().filter(|issue| issue.severity == Severity::Critical) {
                println!(
                    "  audit: [{}] {} {}",
                    issue.check,
                    issue.path.as_deref().unwrap_or("-"),
                    issue.message
                );
            }
        }
    }

    Ok(exit_code(gate))
}

fn run_scan(args: ScanArgs) -> Result<ExitCode> {
    let root = args.path.canonicalize().context("Invalid project path")?;
    let (config, config_path) = load_config(&root, args.catalog.config.as_deref(), args.catalog.rules.as_deref())?;
    let cleaner = Cleaner::from_config(config).context("Failed to set up the cleaner")?;
    let tree = TreeReader::new(&root)
        .skip_file(config_path.as_deref())
        .read()?;

    let findings = cleaner.detect(&tree);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&findings)?);
    } else {
        for finding in &findings {
            print_finding(finding);
        }
        println!("{} finding(s) in {} files", findings.len(), tree.len());
    }
    Ok(ExitCode::SUCCESS)
}

fn run_audit(args: AuditArgs) -> Result<ExitCode> {
    let root = args.path.canonicalize().context("Invalid project path")?;
    let (config, config_path) = load_config(&root, args.config.as_deref(), None)?;
    let cleaner = Cleaner::from_config(config).context("Failed to set up the cleaner")?;
    let tree = TreeReader::new(&root)
        .skip_file(config_path.as_deref())
        .read()?;

    let audit = cleaner.audit(&tree);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&audit)?);
    } else {
        print!("{}", audit.markdown());
    }
    Ok(if audit.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

#[derive(Serialize)]
struct RuleRow<'a> {
    id: &'a str,
    category: Category,
    severity: Severity,
    applies_to: &'a [FileKind],
    action: &'static str,
    remediation: &'a str,
}

fn run_rules(args: RulesArgs) -> Result<ExitCode> {
    let mut catalog = RuleCatalog::builtin().context("Builtin rule catalog is invalid")?;
    if let Some(path) = &args.rules {
        catalog = catalog
            .extend_with_file(path)
            .with_context(|| format!("Failed to load rules from {}", path.display()))?;
    }

    if args.json {
        let rows: Vec<RuleRow> = catalog
            .rules()
            .iter()
            .map(|rule| RuleRow {
                id: &rule.id,
                category: rule.category,
                severity: rule.severity,
                applies_to: &rule.applies_to,
                action: rule.action.as_str(),
                remediation: &rule.remediation,
            })
            .collect();
        let value = serde_json::json!({ "version": catalog.version(), "rules": rows });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Rule catalog {} ({} rules)", catalog.version(), catalog.len());
        for rule in catalog.rules() {
            let kinds: Vec<&str> = rule.applies_to.iter().map(|kind| kind.as_str()).collect();
            println!(
                "{:<32} {:<9} {:<23} {:<12} {}",
                rule.id,
                rule.severity.as_str(),
                rule.category.as_str(),
                rule.action.as_str(),
                kinds.join(",")
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_schema() -> Result<ExitCode> {
    let schema = schemars::schema_for!(Report);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(ExitCode::SUCCESS)
}

/// Config for a run and the file it came from, if any
fn load_config(
    root: &Path,
    explicit: Option<&Path>,
    rules: Option<&Path>,
) -> Result<(CleanConfig, Option<PathBuf>)> {
    let default_path = root.join(CONFIG_FILE);
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None if default_path.is_file() => Some(default_path),
        None => None,
    };

    let mut config = match &path {
        Some(path) => {
            log::info!("Using config {}", path.display());
            CleanConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => CleanConfig::default(),
    };
    if let Some(rules) = rules {
        config.catalog.extra_rules_path = Some(rules.to_path_buf());
    }
    Ok((config, path))
}

fn removal_list(args: &CleanArgs) -> Result<Vec<String>> {
    let mut paths = args.remove.clone();
    if let Some(path) = &args.remove_list {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read removal list {}", path.display()))?;
        paths.extend(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }
    Ok(paths)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

fn exit_code(gate: GateDecision) -> ExitCode {
    if gate.allows_packaging() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn print_summary(report: &Report, gate: GateDecision) {
    println!(
        "Score {}/100 ({}), packaging gate: {}",
        report.score, report.verdict, gate
    );
    println!(
        "  files: {} scanned, {} removed, {} cleaned, {} verified clean",
        report.files_scanned, report.files_removed, report.files_cleaned, report.files_verified_clean
    );
    println!(
        "  polyfills: {}, packages removed: {}, retry passes: {}",
        report.polyfills_generated, report.packages_removed, report.retry_passes
    );
    println!(
        "  open issues: critical {}, major {}, minor {}",
        report.issue_counts.critical, report.issue_counts.major, report.issue_counts.minor
    );
    for finding in report.findings.iter().filter(|finding| !finding.quarantined) {
        print_finding(finding);
    }
}

fn print_finding(finding: &Finding) {
    let location = match finding.line {
        Some(line) => format!("{}:{line}", finding.path),
        None => finding.path.clone(),
    };
    println!(
        "  {:<8} {} [{}] {}",
        finding.severity.as_str(),
        location,
        finding.rule_id.as_deref().unwrap_or(finding.category.as_str()),
        finding.description
    );
}
