use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context};
use clap::{ArgAction, Args, Parser, Subcommand};
use console::{style, Term};
use docswap_core::{
    summary::{render_flag_table, render_selection_table, render_term_table},
    Config, Engine, Error, ScanReport, Selections,
};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use serde_yaml::Value as YamlValue;
use tracing::{debug, level_filters::LevelFilter};
use walkdir::WalkDir;

/// Vocabulary substitution and claim-term highlighting for .docx files.
#[derive(Debug, Parser)]
#[command(
    name = "docswap",
    about = "Swap predefined words and highlight claim-specific terms in .docx files."
)]
struct Cli {
    /// Path to config file (YAML). Defaults to docswap.yml if present.
    #[arg(long, global = true, default_value = "docswap.yml")]
    config: PathBuf,

    /// Increase log verbosity on stderr (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report matched vocabulary and claim-specific terms.
    Scan(ScanArgs),
    /// Rewrite a document with the chosen substitutions.
    Apply(ApplyArgs),
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// Emit JSON output for automation.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Exit with status 2 when a document has no matches.
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Also write the term tables to this file.
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Disable claim-specific term highlighting.
    #[arg(long, action = ArgAction::SetTrue)]
    no_flags: bool,

    /// .docx files or directories to scan.
    #[arg(value_name = "PATH", default_value = ".", num_args = 0..)]
    paths: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct ApplyArgs {
    /// Document to rewrite.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Where to write the rewritten document.
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Choose a replacement (repeatable). `KEY=#N` picks the Nth candidate.
    #[arg(long = "select", value_name = "KEY=CANDIDATE")]
    selects: Vec<String>,

    /// Prompt for a replacement per matched term.
    #[arg(short, long, action = ArgAction::SetTrue)]
    interactive: bool,

    /// Disable claim-specific term highlighting.
    #[arg(long, action = ArgAction::SetTrue)]
    no_flags: bool,
}

/// Where an apply session is. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Idle,
    Reviewing,
    Selecting,
    Ready,
    Downloaded,
}

impl Stage {
    fn advance(&mut self, next: Stage) {
        debug_assert!(next > *self, "stage {next:?} does not follow {self:?}");
        debug!(from = ?*self, to = ?next, "stage");
        *self = next;
    }
}

#[derive(Debug, Serialize)]
struct FileResult {
    path: String,
    no_matches: bool,
    #[serde(flatten)]
    report: Option<ScanReport>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut cfg = load_config(&cli.config)?;
    match cli.command {
        Command::Scan(args) => {
            if args.no_flags {
                cfg.flag_phrases_enabled = false;
            }
            run_scan(cfg, args)
        }
        Command::Apply(args) => {
            if args.no_flags {
                cfg.flag_phrases_enabled = false;
            }
            run_apply(cfg, args)
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn run_scan(cfg: Config, args: ScanArgs) -> anyhow::Result<()> {
    let ignore = build_ignore_set(&cfg.ignore_globs)?;
    let engine = Engine::new(cfg)?;

    let mut files = collect_files(&args.paths, ignore.as_ref())?;
    files.sort();
    if files.is_empty() {
        bail!("no .docx files found");
    }

    let mut results = Vec::with_capacity(files.len());
    let mut summary = String::new();
    let mut any_empty = false;

    for path in files {
        let bytes =
            fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let report = match engine.scan(&bytes) {
            Ok(report) => Some(report),
            Err(Error::NoMatchesFound) => None,
            Err(err) => return Err(err).with_context(|| format!("Failed to scan {}", path.display())),
        };
        any_empty |= report.is_none();

        if !args.json {
            print_scan_report(&path, &engine, report.as_ref());
        }
        if let Some(report) = &report {
            summary.push_str(&format!("{}\n", path.display()));
            summary.push_str(&render_term_table(engine.registry(), report));
            summary.push_str("\n\n");
        }
        results.push(FileResult {
            path: path.to_string_lossy().to_string(),
            no_matches: report.is_none(),
            report,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    if let Some(out) = &args.summary {
        fs::write(out, summary)
            .with_context(|| format!("Failed to write summary {}", out.display()))?;
    }

    if args.strict && any_empty {
        std::process::exit(2);
    }
    Ok(())
}

fn run_apply(cfg: Config, args: ApplyArgs) -> anyhow::Result<()> {
    let mut stage = Stage::Idle;
    let engine = Engine::new(cfg)?;
    let bytes = fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let report = engine
        .scan(&bytes)
        .with_context(|| format!("Failed to scan {}", args.input.display()))?;
    stage.advance(Stage::Reviewing);
    print_scan_report(&args.input, &engine, Some(&report));

    stage.advance(Stage::Selecting);
    let mut selections = Selections::defaults(engine.registry(), &report);
    for raw in &args.selects {
        apply_select(&engine, &mut selections, raw)?;
    }
    if args.interactive {
        prompt_selections(&engine, &report, &mut selections)?;
    }

    stage.advance(Stage::Ready);
    if !report.matched_terms.is_empty() {
        println!("{}", style("Selected replacements:").bold());
        println!("{}\n", render_selection_table(&report, &selections));
    }

    let outcome = engine
        .apply(&bytes, &selections)
        .with_context(|| format!("Failed to rewrite {}", args.input.display()))?;
    fs::write(&args.output, &outcome.bytes)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    stage.advance(Stage::Downloaded);

    println!(
        "{} {} ({} substitutions, {} claim terms highlighted)",
        style("wrote").green(),
        style(args.output.display()).bold(),
        outcome.stats.total_substitutions(),
        outcome.stats.flags_highlighted
    );
    if outcome.stats.overlaps_dropped > 0 {
        println!(
            "  {} overlapping matches left unchanged",
            style(outcome.stats.overlaps_dropped).yellow()
        );
    }
    Ok(())
}

/// Parses `KEY=CANDIDATE` or `KEY=#N`.
fn apply_select(engine: &Engine, selections: &mut Selections, raw: &str) -> anyhow::Result<()> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid --select `{raw}` (expected KEY=CANDIDATE)"))?;
    let (key, value) = (key.trim(), value.trim());
    match value.strip_prefix('#') {
        Some(index) => {
            let index: usize = index
                .parse()
                .with_context(|| format!("Invalid candidate index in --select `{raw}`"))?;
            selections.choose_index(engine.registry(), key, index)?;
        }
        None => selections.choose(engine.registry(), key, value)?,
    }
    Ok(())
}

fn prompt_selections(
    engine: &Engine,
    report: &ScanReport,
    selections: &mut Selections,
) -> anyhow::Result<()> {
    let term = Term::stdout();
    for key in &report.matched_terms {
        let candidates = engine.registry().candidates_for(key)?;
        let count = report.term_counts.get(key).copied().unwrap_or(0);
        term.write_line(&format!(
            "{} ({} occurrence{})",
            style(key).bold(),
            count,
            if count == 1 { "" } else { "s" }
        ))?;
        for (idx, candidate) in candidates.iter().enumerate() {
            let marker = if selections.get(key) == Some(candidate.as_str()) { "*" } else { " " };
            term.write_line(&format!("  {marker} {}. {candidate}", idx + 1))?;
        }
        loop {
            term.write_str("  choice [enter keeps *]: ")?;
            let line = term.read_line()?;
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            let chosen = match line.parse::<usize>() {
                Ok(index) => selections.choose_index(engine.registry(), key, index),
                Err(_) => selections.choose(engine.registry(), key, line),
            };
            match chosen {
                Ok(()) => break,
                Err(err) => term.write_line(&format!("  {}", style(err).red()))?,
            }
        }
    }
    term.write_line("")?;
    Ok(())
}

fn print_scan_report(path: &Path, engine: &Engine, report: Option<&ScanReport>) {
    println!("{}", style(path.to_string_lossy()).bold());
    let Some(report) = report else {
        println!("  {}\n", style("no predefined words or claim-specific terms").yellow());
        return;
    };
    if !report.matched_terms.is_empty() {
        println!("{}\n", render_term_table(engine.registry(), report));
    }
    if !report.matched_flags.is_empty() {
        println!("{}\n", render_flag_table(report));
    } else if engine.config().flag_phrases_enabled && !report.section_found {
        println!(
            "  {} section heading `{}` not found\n",
            style("note:").cyan(),
            engine.config().section_heading
        );
    }
}

fn build_ignore_set(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob `{pattern}`"))?);
    }
    Ok(Some(builder.build()?))
}

/// Every `.docx` under `paths`; a path may name a file or a directory.
/// Ignored directories are pruned rather than walked.
fn collect_files(paths: &[PathBuf], ignore: Option<&GlobSet>) -> anyhow::Result<Vec<PathBuf>> {
    let ignored = |path: &Path| ignore.is_some_and(|set| set.is_match(path));
    let mut files = Vec::new();
    for root in paths {
        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| !ignored(entry.path()));
        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if entry.file_type().is_file() && is_docx(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn is_docx(path: &Path) -> bool {
    let is_lock_file = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("~$"));
    !is_lock_file
        && path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"))
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        debug!(path = %path.display(), cwd = ?env::current_dir().ok(), "no config file, using defaults");
        return Ok(Config::default());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let value: YamlValue = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse YAML {}", path.display()))?;
    let cfg: Config = serde_yaml::from_value(value)
        .with_context(|| format!("Invalid config structure in {}", path.display()))?;
    Ok(cfg)
}
