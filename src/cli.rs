use clap::{Parser, Subcommand};
use datamedic::config::EngineConfig;
use datamedic::dataset::Dataset;
use datamedic::error::{EngineError, Result, ResultExt as _};
use datamedic::pipeline::{FilePlanGenerator, PlanContract, RunMode};
use datamedic::profiler::Profiler;
use datamedic::purpose::{Purpose, TaskType, keys};
use datamedic::session::Session;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "datamedic",
    about = "Dataset health diagnostics and validated preprocessing plans"
)]
pub struct Cli {
    /// Path to a JSON engine configuration file
    #[arg(long, global = true, env = "DATAMEDIC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log to the console only, never to files
    #[arg(long, global = true)]
    pub no_log_files: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// What the caller wants the data used for.
#[derive(clap::Args)]
pub struct PurposeArgs {
    /// Target column
    #[arg(short, long)]
    target: Option<String>,

    /// Task type (classification, regression, time_series, clustering,
    /// anomaly_detection, general_cleaning)
    #[arg(long, default_value = "general_cleaning")]
    task: TaskType,

    /// Apply the task's customary constraints
    #[arg(long)]
    preset: bool,

    /// Sensitive columns for the bias analysis, comma separated
    #[arg(long, value_delimiter = ',')]
    sensitive: Vec<String>,

    /// Allow plans to modify the target column
    #[arg(long)]
    allow_target_mutation: bool,
}

impl PurposeArgs {
    fn purpose(&self) -> Purpose {
        let mut purpose = if self.preset {
            Purpose::preset(self.task, self.target.clone())
        } else {
            Purpose::new(self.task, self.target.clone())
        };
        if !self.sensitive.is_empty() {
            purpose = purpose.with_constraint(keys::SENSITIVE_COLUMNS, self.sensitive.clone());
        }
        if self.allow_target_mutation {
            purpose = purpose.with_constraint(keys::ALLOW_TARGET_MUTATION, true);
        }
        purpose
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Profile a CSV file
    Profile {
        /// Input CSV
        csv: PathBuf,

        /// Target column
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Run every analyzer and print the composite health report
    Health {
        /// Input CSV
        csv: PathBuf,

        #[command(flatten)]
        purpose: PurposeArgs,
    },
    /// Print the operation vocabulary offered to plan generators
    Contract,
    /// Check a plan file against a dataset without running it
    Validate {
        /// Input CSV
        csv: PathBuf,

        /// Plan JSON (`{"steps": [...], "reason": "..."}`)
        plan: PathBuf,

        #[command(flatten)]
        purpose: PurposeArgs,
    },
    /// Validate a plan file and execute it
    Execute {
        /// Input CSV
        csv: PathBuf,

        /// Plan JSON (`{"steps": [...], "reason": "..."}`)
        plan: PathBuf,

        /// Where to write the transformed CSV
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report effects without producing output
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        purpose: PurposeArgs,
    },
}

fn open_session(csv: &Path, purpose: Purpose, config: Arc<EngineConfig>) -> Result<Session> {
    let data = Dataset::from_csv_path(csv)?;
    Session::new(data, purpose, config)
}

fn to_value(value: &impl serde::Serialize) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialise output")
}

/// Run one command and return the JSON document to print.
pub fn run(cli: Cli) -> Result<Value> {
    let config = Arc::new(EngineConfig::load(cli.config.as_deref())?);

    match cli.command {
        Commands::Profile { csv, target } => {
            let data = Dataset::from_csv_path(&csv)?;
            let profile = Profiler::new(config.profiler.clone()).profile(&data, target.as_deref())?;
            to_value(&profile)
        }
        Commands::Health { csv, purpose } => {
            let mut session = open_session(&csv, purpose.purpose(), config)?;
            to_value(session.health_report()?)
        }
        Commands::Contract => Ok(PlanContract::standard().describe()),
        Commands::Validate { csv, plan, purpose } => {
            let mut session = open_session(&csv, purpose.purpose(), config)?;
            let plan = session.propose_plan(&FilePlanGenerator::new(plan), Vec::new(), None)?;
            let result = session.validate(&plan);
            if !result.valid {
                return Err(EngineError::Validation(result));
            }
            to_value(&result)
        }
        Commands::Execute {
            csv,
            plan,
            output,
            dry_run,
            purpose,
        } => {
            let mut session = open_session(&csv, purpose.purpose(), config)?;
            let plan = session.propose_plan(&FilePlanGenerator::new(plan), Vec::new(), None)?;
            let approved = session.approve(&plan)?;

            let mode = if dry_run {
                RunMode::DryRun
            } else {
                RunMode::Commit
            };
            let report = session.execute(&approved, mode).into_result()?;

            if let (Some(path), Some(dataset)) = (&output, &report.dataset) {
                dataset.write_csv(path)?;
                tracing::info!("Wrote {}", path.display());
            }

            Ok(json!({
                "warnings": to_value(&approved.warnings())?,
                "execution": to_value(&report)?,
                "summary": to_value(&report.log.summary())?,
                "output": output.map(|p| p.display().to_string()),
            }))
        }
    }
}
