//! Plan execution engine.
//!
//! Runs a [`ValidatedPlan`] against a dataset, one step at a time, in the
//! plan's order. Every step is dispatched through the [`OperationRegistry`];
//! the first failing step halts the run and is recorded in the
//! [`ExecutionLog`] together with everything that ran before it.
//!
//! The log carries no timestamps or durations, so executing the same plan on
//! the same data twice yields identical logs and byte-identical output.

use super::contract::OperationKind;
use super::registry::{OperationRegistry, Transformed};
use super::validation::ValidatedPlan;
use crate::config::ExecutionSettings;
use crate::dataset::Dataset;
use crate::error::{EngineError, Result};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Produce the transformed dataset
    Commit,
    /// Report effects on a working copy and discard it
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub step_index: usize,
    pub operation: OperationKind,
    pub status: StepStatus,
    pub message: String,
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_before: usize,
    pub columns_after: usize,
    pub row_delta: i64,
    pub column_delta: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSummary {
    pub succeeded: usize,
    pub warned: usize,
    pub failed: usize,
    pub row_delta: i64,
    pub column_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLog {
    mode: RunMode,
    /// Set when a dry run worked on a sample and scaled its row counts
    #[serde(skip_serializing_if = "Option::is_none")]
    sampled_rows: Option<usize>,
    entries: Vec<LogEntry>,
}

impl ExecutionLog {
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn sampled_rows(&self) -> Option<usize> {
        self.sampled_rows
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn summary(&self) -> LogSummary {
        let count = |status| self.entries.iter().filter(|e| e.status == status).count();
        LogSummary {
            succeeded: count(StepStatus::Success),
            warned: count(StepStatus::Warning),
            failed: count(StepStatus::Error),
            row_delta: self.entries.iter().map(|e| e.row_delta).sum(),
            column_delta: self.entries.iter().map(|e| e.column_delta).sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed { step_index: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub log: ExecutionLog,
    pub outcome: RunOutcome,
    /// Output of a completed commit run
    #[serde(skip)]
    pub dataset: Option<Dataset>,
    /// SHA-256 of the output CSV
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_digest: Option<String>,
}

impl ExecutionReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// A failed run becomes [`EngineError::Execution`] for the failing step.
    pub fn into_result(self) -> Result<Self> {
        match self.outcome {
            RunOutcome::Completed => Ok(self),
            RunOutcome::Failed { step_index } => {
                let entry = self.log.entries.get(step_index);
                Err(EngineError::Execution {
                    step_index,
                    operation: entry.map(|e| e.operation.to_string()).unwrap_or_default(),
                    message: entry.map(|e| e.message.clone()).unwrap_or_default(),
                })
            }
        }
    }
}

/// Scales sampled row counts back to the full dataset.
#[derive(Debug, Clone, Copy)]
struct RowScale {
    sample: usize,
    total: usize,
}

impl RowScale {
    fn estimate(self, rows: usize) -> usize {
        (rows as f64 * self.total as f64 / self.sample as f64).round() as usize
    }
}

fn delta(before: usize, after: usize) -> i64 {
    i64::try_from(after).unwrap_or(i64::MAX) - i64::try_from(before).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct Executor {
    registry: Arc<OperationRegistry>,
    settings: ExecutionSettings,
}

impl Executor {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self {
            registry,
            settings: ExecutionSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Execute `plan` on `data`. The input is never modified.
    pub fn run(&self, plan: &ValidatedPlan, data: &Dataset, mode: RunMode) -> ExecutionReport {
        let sampled_rows = match mode {
            RunMode::DryRun => self
                .settings
                .dry_run_sample_rows
                .filter(|n| *n > 0 && *n < data.height()),
            RunMode::Commit => None,
        };
        let scale = sampled_rows.map(|sample| RowScale {
            sample,
            total: data.height(),
        });
        let mut working = sampled_rows.map_or_else(|| data.clone(), |n| data.head(n));

        tracing::info!(
            steps = plan.len(),
            rows = data.height(),
            ?mode,
            sampled = ?sampled_rows,
            "Executing plan"
        );

        let mut entries = Vec::with_capacity(plan.len());
        let mut outcome = RunOutcome::Completed;

        for (step_index, step) in plan.steps().iter().enumerate() {
            let operation = step.kind();
            let (rows_before, columns_before) = (working.height(), working.width());

            let result = self
                .registry
                .get(operation)
                .ok_or_else(|| anyhow!("no transform registered for '{operation}'"))
                .and_then(|transform| transform(&working, step));

            let (status, mut message, after) = match result {
                Ok(Transformed { dataset, warnings }) => {
                    let after = (dataset.height(), dataset.width());
                    working = dataset;
                    if warnings.is_empty() {
                        (StepStatus::Success, "ok".to_owned(), after)
                    } else {
                        (StepStatus::Warning, warnings.join("; "), after)
                    }
                }
                Err(err) => (
                    StepStatus::Error,
                    format!("{err:#}"),
                    (rows_before, columns_before),
                ),
            };

            let (rows_before, rows_after) = match scale {
                Some(s) => {
                    message.push_str(&format!(
                        " (estimated from the first {} of {} rows)",
                        s.sample, s.total
                    ));
                    (s.estimate(rows_before), s.estimate(after.0))
                }
                None => (rows_before, after.0),
            };

            tracing::debug!(step_index, %operation, ?status, rows_after, "Step finished");

            entries.push(LogEntry {
                step_index,
                operation,
                status,
                message,
                rows_before,
                rows_after,
                columns_before,
                columns_after: after.1,
                row_delta: delta(rows_before, rows_after),
                column_delta: delta(columns_before, after.1),
            });

            if status == StepStatus::Error {
                tracing::warn!(step_index, %operation, "Execution halted");
                outcome = RunOutcome::Failed { step_index };
                break;
            }
        }

        let log = ExecutionLog {
            mode,
            sampled_rows,
            entries,
        };

        let (dataset, output_digest) = match (mode, outcome) {
            (RunMode::Commit, RunOutcome::Completed) => {
                let digest = match working.digest() {
                    Ok(digest) => Some(digest),
                    Err(err) => {
                        tracing::warn!("Could not digest output: {err}");
                        None
                    }
                };
                (Some(working), digest)
            }
            _ => (None, None),
        };

        tracing::info!(?outcome, summary = ?log.summary(), "Plan execution finished");

        ExecutionReport {
            log,
            outcome,
            dataset,
            output_digest,
        }
    }
}
