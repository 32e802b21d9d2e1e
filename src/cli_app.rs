//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use ccm_harness::core::config::Config;
use ccm_harness::core::errors::HarnessError;
use ccm_harness::core::paths::resolve_project_relative;
use ccm_harness::harness::{Scenario, ScenarioContext, run_scenario};
use ccm_harness::logger::{EventLog, EventType, LogEntry, Severity};
use ccm_harness::recorder::ExecutionReport;
use ccm_harness::report::{default_report_path, read_json, render_summary, write_json};
use ccm_harness::signals::catalog::{Direction, ProjectConfig, SignalCatalog};
use ccm_harness::signals::store::SignalStore;
use ccm_harness::signals::value::SignalValue;
use ccm_harness::simulator::{ResponseSimulator, RuleLibrary, RuleSet};

/// Dry-run simulation and verification for CCM climate-control HIL scenarios.
#[derive(Debug, Parser)]
#[command(
    name = "ccmh",
    author,
    version,
    about = "CCM climate-control HIL test harness",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Execute a scenario file.
    Run(RunArgs),
    /// Predict one status signal for a commanded state.
    Simulate(SimulateArgs),
    /// Inspect and audit rule sets.
    Rules(RulesArgs),
    /// Validate a project configuration's signal catalog.
    Catalog(CatalogArgs),
    /// Work with saved execution reports.
    Report(ReportArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Scenario TOML file.
    scenario: PathBuf,
    /// Rule set (`builtin:<name>` or path), replacing the scenario's own.
    #[arg(long, value_name = "RULES")]
    rules: Option<String>,
    /// Project configuration JSON providing the signal catalog.
    #[arg(long, value_name = "PATH")]
    catalog: Option<PathBuf>,
    /// Report output path (default: `<report_dir>/<name>_<time>.json`).
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Run against the HIL rig instead of dry-run.
    #[arg(long)]
    live: bool,
    /// Exit non-zero when a dry-run check fails.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Clone, Args)]
struct SimulateArgs {
    /// Status signal to predict.
    signal: String,
    /// Rule set (`builtin:<name>` or path).
    #[arg(long, value_name = "RULES", default_value = "builtin:max_defrost")]
    rules: String,
    /// Commanded value, repeatable: `--set MaxDefrostRequest=1`.
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    sets: Vec<(String, SignalValue)>,
    /// Expected value, returned unchanged when no rule matches.
    #[arg(long, value_name = "VALUE")]
    expected: Option<SignalValue>,
}

#[derive(Debug, Clone, Args)]
struct RulesArgs {
    #[command(subcommand)]
    command: RulesCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum RulesCommand {
    /// Report override constants and mirrors that differ between rule sets.
    Audit {
        /// Rule sets to compare (`builtin:<name>` or paths).
        #[arg(required = true)]
        rules: Vec<String>,
    },
    /// Print a compiled rule table in evaluation order.
    Show {
        #[arg(long, value_name = "RULES", default_value = "builtin:max_defrost")]
        rules: String,
    },
}

#[derive(Debug, Clone, Args)]
struct CatalogArgs {
    #[command(subcommand)]
    command: CatalogCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum CatalogCommand {
    /// Load a project file and resolve signal names.
    Check {
        /// Project configuration JSON.
        project: PathBuf,
        /// Signal names that must resolve in either direction.
        signals: Vec<String>,
    },
}

#[derive(Debug, Clone, Args)]
struct ReportArgs {
    #[command(subcommand)]
    command: ReportCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum ReportCommand {
    /// Print the summary of a saved JSON report.
    Summarize {
        /// Report JSON file.
        report: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or input files.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure, including a missing HIL connection.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Scenario ran but verification failed.
    #[error("{0}")]
    CheckFailed(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::CheckFailed(_) => 4,
        }
    }
}

impl From<HarnessError> for CliError {
    fn from(err: HarnessError) -> Self {
        let text = err.to_string();
        match err {
            HarnessError::InvalidConfig { .. }
            | HarnessError::MissingConfig { .. }
            | HarnessError::ConfigParse { .. }
            | HarnessError::InvalidCatalog { .. }
            | HarnessError::InvalidRules { .. }
            | HarnessError::InvalidScenario { .. }
            | HarnessError::SignalNotFound(_) => Self::User(text),
            HarnessError::CheckMismatch { .. } => Self::CheckFailed(text),
            HarnessError::Serialization { .. } => Self::Internal(text),
            HarnessError::Connection { .. } | HarnessError::Io { .. } | HarnessError::Runtime { .. } => {
                Self::Runtime(text)
            }
        }
    }
}

/// Console log level implied by `-v`/`-q`.
pub const fn log_level(cli: &Cli) -> log::LevelFilter {
    if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Warn
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Run(args) => run_scenario_file(cli, args),
        Command::Simulate(args) => run_simulate(cli, args),
        Command::Rules(args) => match &args.command {
            RulesCommand::Audit { rules } => run_rules_audit(cli, rules),
            RulesCommand::Show { rules } => run_rules_show(cli, rules),
        },
        Command::Catalog(args) => match &args.command {
            CatalogCommand::Check { project, signals } => run_catalog_check(cli, project, signals),
        },
        Command::Report(args) => match &args.command {
            ReportCommand::Summarize { report } => run_report_summarize(cli, report),
        },
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn run_scenario_file(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let events = config.jsonl_config().map(EventLog::open);
    if let Some(events) = &events {
        let hash = config.stable_hash()?;
        events.log(
            &LogEntry::new(EventType::ConfigLoaded, Severity::Info).details(format!(
                "{} ({hash})",
                config.paths.config_file.display()
            )),
        );
    }

    let scenario = Scenario::load(&args.scenario)?;
    let rules = match &args.rules {
        Some(reference) => RuleSet::from_reference(reference, Path::new("."))?,
        None => scenario.rule_set()?,
    };

    let mut builder = ScenarioContext::builder(&scenario.name)
        .execution(&config.execution)
        .dry_run(config.execution.dry_run && !args.live)
        .description(&scenario.description)
        .rules(rules);
    if let Some(project) = &args.catalog {
        let project = ProjectConfig::load(project)?;
        builder = builder.catalog(project.catalog()?);
    }
    if let Some(events) = &events {
        builder = builder.event_log(events.clone());
    }

    // No HIL connection layer is linked into this binary, so a live build
    // fails here with a connection error.
    let mut ctx = builder.build().inspect_err(|e| {
        if let Some(events) = &events {
            events.log(&LogEntry::from_error(e).scenario(&scenario.name));
            events.flush();
        }
    })?;
    run_scenario(&scenario, &mut ctx)?;
    let outcome = ctx.finish();

    let report_path = args.report.clone().unwrap_or_else(|| {
        default_report_path(
            &resolve_project_relative(&config.paths.report_dir),
            &outcome.report,
        )
    });
    write_json(&outcome.report, &report_path)?;

    match output_mode(cli) {
        OutputMode::Human => {
            print_summary(&outcome.report);
            println!("  report: {}", report_path.display());
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "run",
                "scenario": outcome.report.test_name,
                "dry_run": outcome.report.dry_run,
                "failed": outcome.report.failed,
                "total_checks": outcome.report.total_checks,
                "failed_checks": outcome.report.failed_checks,
                "report": report_path.to_string_lossy(),
            });
            write_json_line(&payload)?;
        }
    }

    let failed_checks = outcome.report.failed_checks;
    let report = outcome.into_result()?;
    if args.strict && report.failed {
        return Err(CliError::CheckFailed(format!(
            "{failed_checks} check(s) failed in dry-run of '{}'",
            report.test_name
        )));
    }
    Ok(())
}

fn run_simulate(cli: &Cli, args: &SimulateArgs) -> Result<(), CliError> {
    let simulator = ResponseSimulator::new(RuleSet::from_reference(&args.rules, Path::new("."))?);
    let mut state = SignalStore::new();
    for (name, value) in &args.sets {
        state.set(name.clone(), value.clone());
    }
    let expected = args.expected.clone().unwrap_or(SignalValue::Int(0));
    let prediction = simulator.explain(&state, &args.signal, &expected);

    match output_mode(cli) {
        OutputMode::Human => {
            println!("{} = {}", args.signal, prediction.value);
            match prediction.rule {
                Some(rule) => println!("  rule: {rule}"),
                None => println!("  no rule matched; expected value returned"),
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "simulate",
                "rules": simulator.rules().name(),
                "signal": args.signal,
                "predicted": prediction.value,
                "rule": prediction.rule.map(ToString::to_string),
                "fallback": prediction.is_fallback(),
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_rules_audit(cli: &Cli, references: &[String]) -> Result<(), CliError> {
    let mut library = RuleLibrary::new();
    for reference in references {
        library.add(RuleSet::from_reference(reference, Path::new("."))?);
    }
    let divergences = library.divergences();

    match output_mode(cli) {
        OutputMode::Human => {
            if divergences.is_empty() {
                println!("No divergences across {} rule set(s).", library.sets().len());
            }
            for d in &divergences {
                let label = match &d.kind {
                    ccm_harness::simulator::DivergenceKind::OverrideConstant { profile } => {
                        format!("override '{profile}'")
                    }
                    ccm_harness::simulator::DivergenceKind::Mirror => "mirror".to_string(),
                };
                println!("{} {}: {label}", "DIVERGES".yellow(), d.signal);
                for v in &d.variants {
                    println!("  {:<24} {}", v.rule_set, v.value);
                }
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "rules audit",
                "rule_sets": library.sets().iter().map(RuleSet::name).collect::<Vec<_>>(),
                "divergences": serde_json::to_value(&divergences)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_rules_show(cli: &Cli, reference: &str) -> Result<(), CliError> {
    let set = RuleSet::from_reference(reference, Path::new("."))?;
    match output_mode(cli) {
        OutputMode::Human => {
            println!("{} ({} rules)", set.name().bold(), set.len());
            for rule in set.rules() {
                println!("  {rule}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "rules show",
                "name": set.name(),
                "rules": set.rules().iter().map(ToString::to_string).collect::<Vec<_>>(),
                "profiles": serde_json::to_value(set.profiles())?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_catalog_check(cli: &Cli, project: &Path, signals: &[String]) -> Result<(), CliError> {
    let config = ProjectConfig::load(project)?;
    let catalog = config.catalog()?;
    let ambiguous = catalog.ambiguous_names();

    let mut resolved = Vec::new();
    let mut missing = Vec::new();
    for name in signals {
        let hit = catalog
            .resolve(name, Direction::Status)
            .or_else(|_| catalog.resolve(name, Direction::Command));
        match hit {
            Ok(d) => resolved.push(d.clone()),
            Err(_) => missing.push(name.clone()),
        }
    }

    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "{}: {} signal(s), project {}",
                project.display(),
                catalog.len(),
                config.resolved_project_path().display()
            );
            for name in &ambiguous {
                println!("  {} {name} is defined on several buses; CAN wins", "AMBIGUOUS".yellow());
            }
            for d in &resolved {
                println!("  {} {} -> {} ({} {})", "OK".green(), d.name, d.path, d.bus, d.direction);
            }
            for name in &missing {
                println!("  {} {name}", "MISSING".red());
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "catalog check",
                "project": project.to_string_lossy(),
                "signals": catalog.len(),
                "ambiguous": ambiguous,
                "resolved": serde_json::to_value(&resolved)?,
                "missing": missing,
            });
            write_json_line(&payload)?;
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CliError::CheckFailed(format!(
            "{} signal(s) not found: {}",
            missing.len(),
            missing.join(", ")
        )))
    }
}

fn run_report_summarize(cli: &Cli, path: &Path) -> Result<(), CliError> {
    let report = read_json(path)?;
    match output_mode(cli) {
        OutputMode::Human => print_summary(&report),
        OutputMode::Json => {
            let payload = json!({
                "command": "report summarize",
                "scenario": report.test_name,
                "dry_run": report.dry_run,
                "failed": report.failed,
                "total_checks": report.total_checks,
                "passed_checks": report.passed_checks,
                "failed_checks": report.failed_checks,
                "duration_secs": report.duration_secs,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_summary(report: &ExecutionReport) {
    let text = render_summary(report);
    let mut lines = text.lines();
    if let Some(first) = lines.next() {
        let verdict = if report.failed {
            first.red().bold()
        } else {
            first.green().bold()
        };
        println!("{verdict}");
    }
    for line in lines {
        println!("{line}");
    }
}

fn parse_assignment(raw: &str) -> Result<(String, SignalValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty signal name in {raw:?}"));
    }
    let value = value.parse::<SignalValue>().map_err(|e| e.to_string())?;
    Ok((name.to_string(), value))
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("CCMH_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
