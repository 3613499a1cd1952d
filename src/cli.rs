use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::experiment::ExperimentConfig;
use crate::observability::audit::AuditSink;
use crate::observability::metrics::get_metrics;
use crate::observability::{FanoutSink, ReportSink};
use crate::testing::replay::{run_scenario_with_sink, Scenario};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted navigation and print what the experiment reported
    Replay {
        /// Scenario JSON file
        #[arg(long)]
        scenario: PathBuf,
        /// Experiment config JSON file (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Also print the Prometheus text export of the recorded metrics
        #[arg(long)]
        prometheus: bool,
        /// Append every report record to this JSON-lines file
        #[arg(long, value_name = "FILE")]
        audit_log: Option<PathBuf>,
    },
    /// Print the effective experiment configuration
    ShowConfig {
        /// Experiment config JSON file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Commands {
    fn command_name(&self) -> &'static str {
        match self {
            Self::Replay { .. } => "replay",
            Self::ShowConfig { .. } => "show-config",
        }
    }
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("lookup-race {}", cli.command.command_name());

    match cli.command {
        Commands::Replay {
            scenario,
            config,
            prometheus,
            audit_log,
        } => replay(&scenario, config.as_deref(), prometheus, audit_log.as_deref()),
        Commands::ShowConfig { config } => show_config(config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<ExperimentConfig> {
    ExperimentConfig::load_or_default(path).with_context(|| match path {
        Some(path) => format!("loading config {}", path.display()),
        None => "building default config".to_string(),
    })
}

fn replay(
    scenario_path: &Path,
    config_path: Option<&Path>,
    prometheus: bool,
    audit_log: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let scenario = Scenario::load_from_file(scenario_path)
        .with_context(|| format!("loading scenario {}", scenario_path.display()))?;

    let audit = match audit_log {
        Some(path) => AuditSink::with_file(path)
            .with_context(|| format!("opening audit log {}", path.display()))?,
        None => AuditSink::new(),
    };
    let metrics = get_metrics();
    let sink: Arc<dyn ReportSink> = Arc::new(
        FanoutSink::new()
            .with(Arc::new(audit))
            .with(metrics.clone()),
    );

    let prefix = config.metric_prefix.clone();
    let outcome = run_scenario_with_sink(&scenario, config, Some(sink))?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if prometheus {
        print!("{}", metrics.export_prometheus(&prefix));
    }
    Ok(())
}

fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
