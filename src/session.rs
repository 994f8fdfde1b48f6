//! One dataset, one caller: the unit of work the engine serves.
//!
//! A [`Session`] owns the dataset, its profile and the declared purpose, and
//! drives the fixed order Profiler → Analyzers/Scorer → (generator) →
//! Validator → Executor. Sessions share nothing mutable with each other, so
//! independent sessions can run on separate threads without coordination.

use crate::analyser::{AnalysisContext, AnalyzerRunner};
use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::error::{EngineError, Result};
use crate::pipeline::{
    ExecutionReport, Executor, OperationRegistry, PipelinePlan, PlanContract, PlanGenerator,
    PlanRequest, RunMode, ValidatedPlan, ValidationIssue, ValidationResult, Validator,
    generate_plan,
};
use crate::profiler::{DatasetProfile, Profiler};
use crate::purpose::Purpose;
use crate::scoring::{HealthReport, Scorer};
use std::sync::Arc;

/// Health report plus what it was computed for.
#[derive(Debug, Clone)]
struct CachedReport {
    fingerprint: String,
    target: Option<String>,
    report: HealthReport,
}

pub struct Session {
    dataset: Dataset,
    purpose: Purpose,
    config: Arc<EngineConfig>,
    profile: Arc<DatasetProfile>,
    runner: AnalyzerRunner,
    validator: Validator,
    executor: Executor,
    cached: Option<CachedReport>,
}

impl Session {
    /// Profile `dataset` for `purpose`.
    ///
    /// # Errors
    ///
    /// `EngineError::Data` when the dataset is empty.
    pub fn new(dataset: Dataset, purpose: Purpose, config: Arc<EngineConfig>) -> Result<Self> {
        let profile = Profiler::new(config.profiler.clone())
            .profile(&dataset, purpose.target.as_deref())?;
        let validator = Validator::new(PlanContract::standard(), config.validation.clone());
        let executor = Executor::new(Arc::new(OperationRegistry::standard()))
            .with_settings(config.execution.clone());

        tracing::info!(
            rows = profile.row_count,
            columns = profile.column_count,
            task = %purpose.task_type,
            target = ?purpose.target,
            "Session opened"
        );

        Ok(Self {
            dataset,
            purpose,
            config,
            profile: Arc::new(profile),
            runner: AnalyzerRunner::default(),
            validator,
            executor,
            cached: None,
        })
    }

    #[must_use]
    pub fn with_runner(mut self, runner: AnalyzerRunner) -> Self {
        self.runner = runner;
        self.cached = None;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<OperationRegistry>) -> Self {
        self.executor = Executor::new(registry).with_settings(self.config.execution.clone());
        self
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn profile(&self) -> &DatasetProfile {
        &self.profile
    }

    pub fn purpose(&self) -> &Purpose {
        &self.purpose
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Designate a different target (or none) and re-profile.
    pub fn set_target(&mut self, target: Option<String>) -> Result<()> {
        let profile = Profiler::new(self.config.profiler.clone())
            .profile(&self.dataset, target.as_deref())?;
        self.profile = Arc::new(profile);
        self.purpose.target = target;
        self.cached = None;
        Ok(())
    }

    /// The composite health report, computed once per (profile, target).
    pub fn health_report(&mut self) -> Result<&HealthReport> {
        self.refresh_report()?;
        self.cached_report()
    }

    fn refresh_report(&mut self) -> Result<()> {
        let fingerprint = self.profile.fingerprint()?;
        if self.cached.as_ref().is_some_and(|c| {
            c.fingerprint == fingerprint && c.target == self.purpose.target
        }) {
            tracing::debug!("Health report served from cache");
            return Ok(());
        }

        let ctx = AnalysisContext::new(
            Arc::clone(&self.profile),
            self.dataset.clone(),
            Arc::clone(&self.config),
        )
        .with_purpose(self.purpose.clone());
        let outcomes = self
            .runner
            .run(Arc::new(ctx), self.config.analysis.timeout());
        let report = Scorer::new(self.config.scoring.clone()).score(outcomes);

        self.cached = Some(CachedReport {
            fingerprint,
            target: self.purpose.target.clone(),
            report,
        });
        Ok(())
    }

    fn cached_report(&self) -> Result<&HealthReport> {
        self.cached
            .as_ref()
            .map(|c| &c.report)
            .ok_or_else(|| EngineError::Fatal("health report was not computed".to_owned()))
    }

    /// Generator payload, optionally carrying the previous rejection.
    pub fn plan_request<'a>(
        &'a mut self,
        feedback: Vec<ValidationIssue>,
        previous: Option<&'a PipelinePlan>,
    ) -> Result<PlanRequest<'a>> {
        self.refresh_report()?;
        let this: &'a Self = self;
        let report = this.cached_report()?;
        Ok(
            PlanRequest::new(&this.profile, &this.purpose, report, this.validator.contract())
                .with_feedback(feedback, previous),
        )
    }

    /// Ask `generator` for a plan and parse it against the contract.
    pub fn propose_plan(
        &mut self,
        generator: &dyn PlanGenerator,
        feedback: Vec<ValidationIssue>,
        previous: Option<&PipelinePlan>,
    ) -> Result<PipelinePlan> {
        let contract = self.validator.contract().clone();
        let request = self.plan_request(feedback, previous)?;
        generate_plan(generator, &request, &contract)
    }

    pub fn validate(&self, plan: &PipelinePlan) -> ValidationResult {
        self.validator.check(plan, &self.profile, &self.purpose)
    }

    /// # Errors
    ///
    /// `EngineError::Validation` carrying every issue when the plan is rejected.
    pub fn approve(&self, plan: &PipelinePlan) -> Result<ValidatedPlan> {
        self.validator
            .approve(plan, &self.profile, &self.purpose)
            .map_err(EngineError::Validation)
    }

    pub fn execute(&self, plan: &ValidatedPlan, mode: RunMode) -> ExecutionReport {
        self.executor.run(plan, &self.dataset, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::{Analyzer, AnalyzerKind, AnalyzerOutcome, SkipReason};
    use crate::error::ErrorKind;
    use crate::pipeline::{IssueCode, Operation, StaticPlanGenerator};
    use crate::purpose::TaskType;
    use polars::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAnalyzer {
        calls: Arc<AtomicUsize>,
    }

    impl Analyzer for CountingAnalyzer {
        fn kind(&self) -> AnalyzerKind {
            AnalyzerKind::Bias
        }

        fn analyze(&self, _ctx: &AnalysisContext) -> AnalyzerOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AnalyzerOutcome::skipped(AnalyzerKind::Bias, SkipReason::NoSensitiveColumns)
        }
    }

    fn sample() -> anyhow::Result<Dataset> {
        Ok(Dataset::from_series(vec![
            Series::new("age".into(), vec![Some(31.0), None, Some(45.0), Some(27.0)]),
            Series::new("label".into(), vec!["yes", "no", "yes", "no"]),
        ])?)
    }

    fn counting_session(calls: &Arc<AtomicUsize>) -> anyhow::Result<Session> {
        let runner = AnalyzerRunner::new(vec![Arc::new(CountingAnalyzer {
            calls: Arc::clone(calls),
        })]);
        let purpose = Purpose::new(TaskType::Classification, Some("label".to_owned()));
        Ok(Session::new(sample()?, purpose, Arc::new(EngineConfig::default()))?.with_runner(runner))
    }

    #[test]
    fn test_empty_dataset_is_rejected() -> anyhow::Result<()> {
        let empty = Dataset::from_series(vec![Series::new("a".into(), Vec::<f64>::new())])?;
        let purpose = Purpose::new(TaskType::GeneralCleaning, None);
        let Err(err) = Session::new(empty, purpose, Arc::new(EngineConfig::default())) else {
            panic!("empty dataset accepted");
        };
        assert_eq!(err.kind(), ErrorKind::DataError);
        Ok(())
    }

    #[test]
    fn test_health_report_is_cached_per_target() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut session = counting_session(&calls)?;

        session.health_report()?;
        session.health_report()?;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        session.set_target(None)?;
        assert!(session.profile().target.is_none());
        session.health_report()?;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn test_unknown_column_is_rejected_before_execution() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let session = counting_session(&calls)?;
        let plan = PipelinePlan::new("scale it").with_step(
            Operation::new("scale")
                .on(["nonexistent_col"])
                .with_param("method", "standard"),
        );

        let result = session.validate(&plan);
        assert!(!result.valid);
        assert!(result.has_code(IssueCode::UnknownColumn));

        let report = session.approve(&plan).unwrap_err().report();
        assert_eq!(report.kind, ErrorKind::ValidationError);
        assert_eq!(report.code.as_deref(), Some("UnknownColumn"));
        Ok(())
    }

    #[test]
    fn test_generator_round_trip_through_session() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut session = counting_session(&calls)?;
        let generator = StaticPlanGenerator::new(
            r#"Here you go: {"steps": [{"op": "impute", "columns": ["age"], "params": {"strategy": "median"}}], "reasoning": "age has a gap"}"#,
        );

        let plan = session.propose_plan(&generator, Vec::new(), None)?;
        let approved = session.approve(&plan)?;
        let report = session.execute(&approved, RunMode::Commit).into_result()?;

        let out = report.dataset.as_ref().map(|d| d.numeric("age")).transpose()?;
        assert_eq!(
            out,
            Some(vec![Some(31.0), Some(31.0), Some(45.0), Some(27.0)])
        );
        // the session's own copy is unchanged
        assert_eq!(session.dataset().null_mask("age")?.get(1), Some(&true));
        Ok(())
    }

    #[test]
    fn test_custom_registry_is_used_for_execution() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let session = counting_session(&calls)?
            .with_registry(Arc::new(OperationRegistry::empty()));
        let plan = PipelinePlan::new("fill").with_step(
            Operation::new("impute")
                .on(["age"])
                .with_param("strategy", "mean"),
        );

        let approved = session.approve(&plan)?;
        let report = session.execute(&approved, RunMode::Commit);
        assert!(!report.is_completed());
        assert!(report.dataset.is_none());
        Ok(())
    }
}
