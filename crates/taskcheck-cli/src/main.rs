//! taskcheck - explain why a task was flagged by the attendance report.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use taskcheck_core::{extract, AnalysisOutcome, CheckMode, FormRegistry, FormsConfig};
use taskcheck_runtime::{AnalyzerSettings, PyrusClient, RuntimeConfig, TaskAnalyzer};

mod render;
mod snapshot;
mod telemetry;

use render::{scan_line, ReportView};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModeArg {
    /// Lessons before noon of the reference date
    Yesterday12,
    /// Lessons up to the end of the reference date
    EndOfDay,
}

impl From<ModeArg> for CheckMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Yesterday12 => CheckMode::Yesterday12,
            ModeArg::EndOfDay => CheckMode::EndOfDay,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "taskcheck", version, about)]
struct Args {
    /// Id of the task to analyze
    #[arg(required_unless_present = "scan", conflicts_with = "scan")]
    task_id: Option<u64>,

    /// Also print every raw field of the task
    #[arg(long)]
    debug: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Write a raw snapshot of the task into this directory
    #[arg(long, value_name = "DIR")]
    snapshot: Option<PathBuf>,

    /// Analyze the registers of these forms instead of a single task
    #[arg(long, value_name = "FORM_ID", num_args = 1..)]
    scan: Vec<u64>,

    /// Tasks per form when scanning
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// Forms configuration (YAML or JSON) replacing the built-in one
    #[arg(long, value_name = "PATH")]
    forms: Option<PathBuf>,

    /// Runtime configuration file (YAML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Cutoff for lesson checks
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    telemetry::init_tracing(args.verbose);
    telemetry::install_panic_hook();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let registry = load_registry(&args)?;

    let mut config =
        RuntimeConfig::load(args.config.as_deref()).context("loading runtime configuration")?;
    if let Some(mode) = args.mode {
        config = config.with_check_mode(mode.into());
    }

    let platform = PyrusClient::from_config(&config).context("configuring the Pyrus client")?;
    let analyzer = TaskAnalyzer::new(Arc::new(platform), Arc::new(registry), extract)
        .with_settings(AnalyzerSettings::from(&config));

    if !args.scan.is_empty() {
        return scan(&analyzer, &args).await;
    }

    let task_id = args.task_id.context("a task id is required")?;
    analyze_one(&analyzer, task_id, &args).await
}

fn load_registry(args: &Args) -> Result<FormRegistry> {
    match &args.forms {
        Some(path) => {
            let config = FormsConfig::from_file(path)
                .with_context(|| format!("loading forms from {}", path.display()))?;
            Ok(FormRegistry::from_config(config).with_default_engines())
        }
        None => FormRegistry::builtin().context("loading built-in forms"),
    }
}

async fn analyze_one(analyzer: &TaskAnalyzer, task_id: u64, args: &Args) -> Result<ExitCode> {
    let inspection = match analyzer.inspect(task_id).await {
        Ok(inspection) => inspection,
        Err(e) => {
            if args.json {
                let outcome = AnalysisOutcome::error(e.to_string());
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                eprintln!("error: {}", e);
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    if let Some(dir) = &args.snapshot {
        let path = snapshot::write_snapshot(dir, inspection.report.form_id, &inspection.task)?;
        info!(path = %path.display(), "Snapshot written");
    }

    if args.json {
        let outcome = AnalysisOutcome::from(inspection.report);
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!(
            "{}",
            ReportView::new(&inspection.report).with_all_fields(args.debug)
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn scan(analyzer: &TaskAnalyzer, args: &Args) -> Result<ExitCode> {
    let entries = analyzer
        .scan(&args.scan, args.limit)
        .await
        .context("scanning form registers")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            println!("{}", scan_line(entry));
        }
    }
    Ok(ExitCode::SUCCESS)
}
