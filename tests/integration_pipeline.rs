//! Integration tests for plan parsing, validation and execution
//!
//! These tests drive a session over the fixture files with plans read from
//! disk, the same way the CLI does.

use datamedic::config::EngineConfig;
use datamedic::dataset::Dataset;
use datamedic::error::{EngineError, ErrorKind};
use datamedic::pipeline::{
    FilePlanGenerator, IssueCode, OperationKind, RunMode, RunOutcome, StepStatus,
};
use datamedic::purpose::{Purpose, TaskType};
use datamedic::session::Session;
use std::path::PathBuf;
use std::sync::Arc;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from("testdata").join(name)
}

fn messy_session() -> anyhow::Result<Session> {
    let data = Dataset::from_csv_path(&fixture("messy.csv"))?;
    let purpose = Purpose::new(TaskType::GeneralCleaning, None);
    Ok(Session::new(data, purpose, Arc::new(EngineConfig::default()))?)
}

fn plan_from(session: &mut Session, name: &str) -> anyhow::Result<datamedic::pipeline::PipelinePlan> {
    let generator = FilePlanGenerator::new(fixture(name));
    Ok(session.propose_plan(&generator, Vec::new(), None)?)
}

#[test]
fn test_cleanup_plan_end_to_end() -> anyhow::Result<()> {
    let mut session = messy_session()?;
    let plan = plan_from(&mut session, "plans/messy_cleanup.json")?;
    let approved = session.approve(&plan)?;
    assert_eq!(approved.len(), 6, "All six steps should be approved");

    let report = session.execute(&approved, RunMode::Commit).into_result()?;
    let ops: Vec<OperationKind> = report.log.entries().iter().map(|e| e.operation).collect();
    assert_eq!(
        ops,
        vec![
            OperationKind::DropDuplicates,
            OperationKind::NormalizeDuration,
            OperationKind::Impute,
            OperationKind::Impute,
            OperationKind::Encode,
            OperationKind::Scale,
        ],
        "Steps should run in plan order"
    );

    let summary = report.log.summary();
    assert_eq!((summary.succeeded, summary.warned, summary.failed), (5, 1, 0));
    assert_eq!(summary.row_delta, -1, "Only the repeated row should go");
    assert_eq!(summary.column_delta, 1, "plan becomes two indicator columns");

    let duration = report.log.entries().get(1).map(|e| (e.status, e.message.clone()));
    assert_eq!(
        duration,
        Some((
            StepStatus::Warning,
            "1 value(s) in 'call_length' could not be parsed as durations".to_owned()
        ))
    );

    let out = report
        .dataset
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("commit run returned no dataset"))?;
    assert_eq!(
        out.column_names(),
        vec!["id", "name", "age", "plan_basic", "plan_premium", "call_length", "spend"]
    );
    assert_eq!(out.height(), 11);

    // 34, -, 29, 41, 38, -, 52, 27, 45, 33, 36 -> median 36
    assert_eq!(out.numeric("age")?.get(1), Some(&Some(36.0)));
    assert_eq!(out.null_mask("age")?, vec![false; 11]);

    let minutes = out.numeric("call_length")?;
    assert_eq!(minutes.first(), Some(&Some(1.5)));
    assert_eq!(minutes.get(2), Some(&Some(60.0)));
    assert_eq!(minutes.get(6), Some(&None), "'soon' is not a duration");

    // Cara's missing plan takes the mode
    assert_eq!(out.numeric("plan_basic")?.get(2), Some(&Some(1.0)));

    let spend = datamedic::stats::finite(&out.numeric("spend")?);
    let lo = spend.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = spend.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert!(lo.abs() < 1e-12 && (hi - 1.0).abs() < 1e-12, "spend should span [0, 1]");
    Ok(())
}

#[test]
fn test_rejected_plan_never_runs() -> anyhow::Result<()> {
    let mut session = messy_session()?;
    let plan = plan_from(&mut session, "plans/rejected.json")?;

    let result = session.validate(&plan);
    assert!(!result.valid);
    for code in [
        IssueCode::UnknownColumn,
        IssueCode::DependencyOrderViolation,
        IssueCode::UnknownOperation,
        IssueCode::InvalidParameter,
    ] {
        assert!(result.has_code(code), "Expected a {code} issue in {result}");
    }

    let unknown = result
        .errors
        .iter()
        .find(|e| e.code == IssueCode::UnknownColumn)
        .and_then(|e| e.column.clone());
    assert_eq!(unknown.as_deref(), Some("nonexistent_col"));

    let Err(err) = session.approve(&plan) else {
        panic!("an invalid plan must not be approved");
    };
    assert!(matches!(err, EngineError::Validation(_)));
    let report = err.report();
    assert_eq!(report.kind, ErrorKind::ValidationError);
    assert_eq!(report.details.len(), result.errors.len());
    Ok(())
}

#[test]
fn test_plan_wrapped_in_prose_is_accepted() -> anyhow::Result<()> {
    let mut session = messy_session()?;
    let plan = plan_from(&mut session, "plans/wrapped.txt")?;
    assert_eq!(plan.reason, "Repeated customers first, then biggest spenders.");

    let approved = session.approve(&plan)?;
    let report = session.execute(&approved, RunMode::Commit).into_result()?;
    let out = report
        .dataset
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("commit run returned no dataset"))?;

    assert_eq!(out.height(), 11);
    let names = out.text("name")?;
    assert_eq!(names.first(), Some(&Some("Eve".to_owned())));
    assert_eq!(names.get(1), Some(&Some("Gus".to_owned())));
    Ok(())
}

#[test]
fn test_prose_without_json_is_a_schema_error() -> anyhow::Result<()> {
    let mut session = messy_session()?;
    let generator = datamedic::pipeline::StaticPlanGenerator::new("I would scale the spend column.");
    let err = session
        .propose_plan(&generator, Vec::new(), None)
        .unwrap_err();
    assert_eq!(err.report().kind, ErrorKind::SchemaError);
    Ok(())
}

#[test]
fn test_repeated_execution_is_byte_identical() -> anyhow::Result<()> {
    let mut session = messy_session()?;
    let plan = plan_from(&mut session, "plans/messy_cleanup.json")?;
    let approved = session.approve(&plan)?;

    let first = session.execute(&approved, RunMode::Commit);
    let second = session.execute(&approved, RunMode::Commit);
    assert_eq!(first.log, second.log);
    assert_eq!(first.output_digest, second.output_digest);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.csv");
    let out = first
        .dataset
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("commit run returned no dataset"))?;
    out.write_csv(&path)?;
    let reread = Dataset::from_csv_path(&path)?;
    assert_eq!(reread.column_names(), out.column_names());
    assert_eq!(Some(out.digest()?), first.output_digest);
    Ok(())
}

#[test]
fn test_dry_run_reports_commit_deltas() -> anyhow::Result<()> {
    let mut session = messy_session()?;
    let plan = plan_from(&mut session, "plans/messy_cleanup.json")?;
    let approved = session.approve(&plan)?;

    let commit = session.execute(&approved, RunMode::Commit);
    let dry = session.execute(&approved, RunMode::DryRun);
    assert_eq!(dry.outcome, RunOutcome::Completed);
    assert_eq!(dry.log.entries(), commit.log.entries());
    assert!(dry.dataset.is_none());
    assert_eq!(session.dataset().height(), 12, "Input must stay untouched");
    Ok(())
}
