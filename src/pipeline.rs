//! Preprocessing plans: contract, validation and deterministic execution.
//!
//! Plans come from an untrusted generator. They cross into the engine in
//! three stages, and nothing skips a stage:
//!
//! 1. **Contract**: [`PlanContract::parse_plan`] reads raw generator text into
//!    a [`PipelinePlan`] or fails with a [`SchemaError`].
//! 2. **Validation**: [`Validator::approve`] checks every step against the
//!    dataset profile and the declared purpose. Only a fully valid plan becomes
//!    a [`ValidatedPlan`]; there is no partial approval.
//! 3. **Execution**: [`Executor::run`] applies the approved steps in order,
//!    dispatching each one through the fixed [`OperationRegistry`].
//!
//! # Operations
//!
//! The vocabulary is closed:
//! - **Rows**: `drop_duplicates`, `deduplicate`, `remove_outliers`,
//!   `drop_sparse_rows`, `sort_by`
//! - **Missing values**: `impute` (mean/median/mode/constant)
//! - **ML preprocessing**: `scale`, `encode`, `clip_outliers`
//! - **Columns**: `drop_columns`, `normalize_duration`
//!
//! # Example
//!
//! ```no_run
//! use datamedic::dataset::Dataset;
//! use datamedic::pipeline::{Executor, OperationRegistry, PlanContract, RunMode, Validator};
//! use datamedic::profiler::Profiler;
//! use datamedic::purpose::{Purpose, TaskType};
//! use std::sync::Arc;
//!
//! let data = Dataset::from_csv_path("calls.csv".as_ref())?;
//! let profile = Profiler::default().profile(&data, None)?;
//! let purpose = Purpose::new(TaskType::GeneralCleaning, None);
//!
//! let plan = PlanContract::standard().parse_plan(
//!     r#"{"steps": [{"op": "drop_duplicates"}], "reason": "dupes"}"#,
//! )?;
//! let Ok(approved) = Validator::default().approve(&plan, &profile, &purpose) else {
//!     return Ok(());
//! };
//!
//! let executor = Executor::new(Arc::new(OperationRegistry::standard()));
//! let report = executor.run(&approved, &data, RunMode::Commit).into_result()?;
//! println!("{:?}", report.log.summary());
//! # Ok::<(), datamedic::error::EngineError>(())
//! ```

pub mod contract;
pub mod executor;
pub mod generator;
pub mod ops;
pub mod plan;
pub mod registry;
pub mod validation;

pub use contract::{OperationKind, PlanContract, SchemaError};
pub use executor::{
    ExecutionLog, ExecutionReport, Executor, LogEntry, LogSummary, RunMode, RunOutcome, StepStatus,
};
pub use generator::{
    FilePlanGenerator, PlanGenerator, PlanRequest, StaticPlanGenerator, generate_plan,
};
pub use plan::{Operation, PipelinePlan, Step};
pub use registry::{OperationRegistry, Transform, Transformed};
pub use validation::{IssueCode, ValidatedPlan, ValidationIssue, ValidationResult, Validator};
