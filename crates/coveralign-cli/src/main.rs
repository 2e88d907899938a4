//! Coveralign CLI
//!
//! Thin adapter around the comparison core:
//! - `classify`: universe-lock a batch of extracted rows
//! - `map`: map universe rows against a canonical reference table
//! - `split`: resolve a canonical split for one coverage name
//! - `compare`: run the full comparison surface for a query
//!
//! All inputs are JSON files produced by the extraction/import
//! collaborators; all outputs are the stable V1 JSON records, suitable for
//! golden-snapshot regression tests. Human-readable status goes to stderr,
//! records go to stdout or `--out`.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use coveralign_compare::{
    default_forbidden_phrases, CompareOptions, ComparePipeline, CompareRequestV1, ExtractedRowV1,
    PolicyStore,
};
use coveralign_core::{
    classify_rows, default_meta_rules, map_rows, to_canonical_json, CoverageRow,
    ReferenceSnapshot,
};
use coveralign_evidence::{
    default_evidence_patterns, resolve_split, split_to_wire, PolicyEvidenceSpanV1,
};

#[derive(Parser)]
#[command(name = "coveralign")]
#[command(
    author,
    version,
    about = "Fact-based comparison of insurance coverage line items"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Universe-lock a batch of extracted rows.
    Classify(ClassifyArgs),
    /// Map universe rows against a canonical reference table.
    Map(MapArgs),
    /// Resolve the canonical split for one coverage name.
    Split(SplitArgs),
    /// Run a full comparison request.
    Compare(CompareArgs),
}

#[derive(Args)]
struct OutputArgs {
    /// Write the JSON record here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct ClassifyArgs {
    /// JSON array of extracted rows.
    #[arg(long)]
    rows: PathBuf,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct MapArgs {
    /// JSON array of extracted rows.
    #[arg(long)]
    rows: PathBuf,
    /// JSON array of reference table rows.
    #[arg(long)]
    reference: PathBuf,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct SplitArgs {
    /// Raw coverage name to resolve.
    #[arg(long)]
    name: String,
    /// JSON array of policy evidence spans.
    #[arg(long)]
    policy: Option<PathBuf>,
    /// Directory of policy-span JSON files (read in sorted order).
    #[arg(long)]
    policy_dir: Option<PathBuf>,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct CompareArgs {
    /// JSON array of extracted rows.
    #[arg(long)]
    rows: PathBuf,
    /// JSON array of reference table rows.
    #[arg(long)]
    reference: PathBuf,
    /// Coverage query to compare.
    #[arg(long)]
    query: String,
    #[arg(long)]
    insurer_a: String,
    #[arg(long)]
    insurer_b: Option<String>,
    /// Directory of per-insurer policy-span JSON files named `<scope>.json`.
    #[arg(long)]
    policy_dir: Option<PathBuf>,
    /// Attach the per-insurer policy evidence block to the response.
    #[arg(long)]
    include_policy_evidence: bool,
    #[command(flatten)]
    output: OutputArgs,
}

// ============================================================================
// Input shapes
// ============================================================================

/// One extracted row as the collaborators hand it over. The content hash is
/// computed here so the CLI and the extractor agree on row identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RowSpec {
    scope_id: String,
    raw_name: String,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    source_page: u32,
    #[serde(default)]
    premium: Option<i64>,
    #[serde(default)]
    payment_term_years: Option<u32>,
    #[serde(default)]
    maturity_years: Option<u32>,
}

impl RowSpec {
    fn coverage_row(&self) -> CoverageRow {
        CoverageRow::new(
            self.scope_id.clone(),
            self.raw_name.clone(),
            self.amount,
            self.currency.clone(),
            self.source_page,
        )
    }

    fn extracted_row(&self) -> ExtractedRowV1 {
        ExtractedRowV1 {
            row: self.coverage_row(),
            premium: self.premium,
            payment_term_years: self.payment_term_years,
            maturity_years: self.maturity_years,
        }
    }
}

fn load_rows(path: &Path) -> Result<Vec<RowSpec>> {
    let payload = fs::read_to_string(path)
        .with_context(|| format!("reading rows file {}", path.display()))?;
    serde_json::from_str(&payload).with_context(|| format!("parsing rows file {}", path.display()))
}

fn load_spans(path: &Path) -> Result<Vec<PolicyEvidenceSpanV1>> {
    let payload = fs::read_to_string(path)
        .with_context(|| format!("reading policy spans {}", path.display()))?;
    serde_json::from_str(&payload)
        .with_context(|| format!("parsing policy spans {}", path.display()))
}

/// Load every `.json` file under a directory, in sorted path order so runs
/// are reproducible regardless of filesystem enumeration order.
fn load_span_dir(dir: &Path) -> Result<Vec<(PathBuf, Vec<PolicyEvidenceSpanV1>)>> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut out = Vec::new();
    for path in files {
        let spans = load_spans(&path)?;
        out.push((path, spans));
    }
    Ok(out)
}

fn emit(output: &OutputArgs, json: String) -> Result<()> {
    match &output.out {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} wrote {}", "ok".green().bold(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ============================================================================
// Subcommands
// ============================================================================

fn run_classify(args: &ClassifyArgs) -> Result<()> {
    let rows: Vec<CoverageRow> = load_rows(&args.rows)?
        .iter()
        .map(RowSpec::coverage_row)
        .collect();
    let rules = default_meta_rules();
    let report = classify_rows(&rows, &rules, now_rfc3339());

    for (scope, summary) in &report.scopes {
        eprintln!(
            "{} {scope}: {} universe / {} meta / {} unclassified",
            "lock".cyan().bold(),
            summary.universe_coverage,
            summary.non_universe_meta,
            summary.unclassified,
        );
    }
    emit(&args.output, to_canonical_json(&report)?)
}

fn run_map(args: &MapArgs) -> Result<()> {
    let rows: Vec<CoverageRow> = load_rows(&args.rows)?
        .iter()
        .map(RowSpec::coverage_row)
        .collect();
    let payload = fs::read_to_string(&args.reference)
        .with_context(|| format!("reading reference table {}", args.reference.display()))?;
    let load = ReferenceSnapshot::from_json(&payload)?;
    if !load.skipped.is_empty() {
        eprintln!(
            "{} skipped {} malformed reference row(s)",
            "warn".yellow().bold(),
            load.skipped.len(),
        );
    }

    let report = map_rows(&load.snapshot, &rows, now_rfc3339());
    for (scope, summary) in &report.scopes {
        eprintln!(
            "{} {scope}: {} mapped / {} ambiguous / {} unmapped",
            "map".cyan().bold(),
            summary.mapped,
            summary.ambiguous,
            summary.unmapped,
        );
    }
    emit(&args.output, to_canonical_json(&report)?)
}

fn run_split(args: &SplitArgs) -> Result<()> {
    let spans = match (&args.policy, &args.policy_dir) {
        (Some(_), Some(_)) => bail!("pass either --policy or --policy-dir, not both"),
        (Some(path), None) => Some(load_spans(path)?),
        (None, Some(dir)) => {
            let all: Vec<PolicyEvidenceSpanV1> = load_span_dir(dir)?
                .into_iter()
                .flat_map(|(_, spans)| spans)
                .collect();
            Some(all)
        }
        (None, None) => None,
    };

    let patterns = default_evidence_patterns();
    let outcome = resolve_split(&args.name, spans.as_deref(), &patterns);
    let wire = split_to_wire(&args.name, &outcome);

    let status = if outcome.is_decided() {
        "decided".green().bold()
    } else {
        "undecided".yellow().bold()
    };
    eprintln!("{} `{}` ({} code(s))", status, args.name, wire.decided_codes.len());

    emit(&args.output, to_canonical_json(&wire)?)
}

fn run_compare(args: &CompareArgs) -> Result<()> {
    let rows: Vec<ExtractedRowV1> = load_rows(&args.rows)?
        .iter()
        .map(RowSpec::extracted_row)
        .collect();
    let payload = fs::read_to_string(&args.reference)
        .with_context(|| format!("reading reference table {}", args.reference.display()))?;
    let load = ReferenceSnapshot::from_json(&payload)?;

    // Per-insurer policy spans come from `<scope>.json` files.
    let mut policy = PolicyStore::default();
    if let Some(dir) = &args.policy_dir {
        for (path, spans) in load_span_dir(dir)? {
            let Some(scope) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            policy.insert(scope, spans);
        }
    }

    let meta_rules = default_meta_rules();
    let patterns = default_evidence_patterns();
    let forbidden = default_forbidden_phrases();
    let pipeline = ComparePipeline {
        reference: &load.snapshot,
        policy: &policy,
        meta_rules: &meta_rules,
        evidence_patterns: &patterns,
        forbidden_phrases: &forbidden,
        options: CompareOptions::default(),
    };

    let request = CompareRequestV1 {
        query: args.query.clone(),
        insurer_a: args.insurer_a.clone(),
        insurer_b: args.insurer_b.clone(),
        include_policy_evidence: args.include_policy_evidence,
    };
    let response = pipeline.handle(&request, &rows)?;

    for (insurer, state) in &response.comparison_result.state_summary {
        eprintln!("{} {insurer}: {:?}", "state".cyan().bold(), state);
    }
    eprintln!("{}", response.message);

    emit(&args.output, to_canonical_json(&response)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Classify(args) => run_classify(args),
        Command::Map(args) => run_map(args),
        Command::Split(args) => run_split(args),
        Command::Compare(args) => run_compare(args),
    }
}
