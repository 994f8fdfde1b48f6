//! Plan validation: the only way from a proposed plan to an executable one.
//!
//! [`Validator::check`] simulates the plan step by step against the dataset
//! profile, tracking which columns exist, which were dropped, their types,
//! whether they still hold nulls and, where known, their distinct values. Every problem is collected; nothing
//! short-circuits except an unknown operation, whose own remaining checks
//! are meaningless. A single error rejects the whole plan.
//!
//! [`Validator::approve`] is the only constructor of [`ValidatedPlan`], which
//! is the only thing the executor accepts.

use super::contract::{OperationKind, PlanContract};
use super::plan::{EncodeMethod, FillValue, ImputeStrategy, Operation, PipelinePlan, Step};
use crate::config::ValidationSettings;
use crate::profiler::{DatasetProfile, SemanticType};
use crate::purpose::Purpose;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueCode {
    UnknownColumn,
    UnknownOperation,
    InvalidParameter,
    TargetMutationForbidden,
    DependencyOrderViolation,
    PurposeConstraintViolation,
    /// Non-blocking observations
    Advisory,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl ValidationIssue {
    fn plan(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            step_index: None,
            column: None,
            operation: None,
        }
    }

    fn step(code: IssueCode, index: usize, op: &Operation, message: impl Into<String>) -> Self {
        Self {
            step_index: Some(index),
            operation: Some(op.op.clone()),
            ..Self::plan(code, message)
        }
    }

    #[must_use]
    fn on_column(mut self, column: &str) -> Self {
        self.column = Some(column.to_owned());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.code)?;
        if let Some(index) = self.step_index {
            write!(f, "Step {}", index + 1)?;
            if let Some(op) = &self.operation {
                write!(f, " ({op})")?;
            }
            f.write_str(": ")?;
        }
        f.write_str(&self.message)
    }
}

/// All-or-nothing verdict on a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn has_code(&self, code: IssueCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(f, "valid ({} warning(s))", self.warnings.len())
        } else {
            let errors: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
            write!(f, "invalid: {}", errors.join("; "))
        }
    }
}

/// A plan that passed validation. Only [`Validator::approve`] makes one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedPlan {
    steps: Vec<Step>,
    reason: String,
    warnings: Vec<ValidationIssue>,
}

impl ValidatedPlan {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn warnings(&self) -> &[ValidationIssue] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    semantic: SemanticType,
    has_missing: bool,
    scaled: bool,
}

/// Simulated column state while walking the plan.
struct Schema {
    columns: BTreeMap<String, Tracked>,
    dropped: BTreeSet<String>,
    /// Known distinct values per column; a missing entry means unknown
    levels: BTreeMap<String, BTreeSet<String>>,
}

enum Resolved {
    Present(Tracked),
    Dropped,
    Unknown,
}

impl Schema {
    fn from_profile(profile: &DatasetProfile) -> Self {
        Self {
            columns: profile
                .columns
                .iter()
                .map(|c| {
                    (
                        c.name.clone(),
                        Tracked {
                            semantic: c.semantic_type,
                            has_missing: c.has_missing(),
                            scaled: false,
                        },
                    )
                })
                .collect(),
            dropped: BTreeSet::new(),
            levels: profile
                .columns
                .iter()
                .filter_map(|c| {
                    let levels = c.levels.as_ref()?;
                    Some((c.name.clone(), levels.iter().cloned().collect()))
                })
                .collect(),
        }
    }

    fn resolve(&self, name: &str) -> Resolved {
        if let Some(tracked) = self.columns.get(name) {
            return Resolved::Present(*tracked);
        }
        if self.dropped.contains(name) {
            return Resolved::Dropped;
        }
        Resolved::Unknown
    }

    fn insert(&mut self, name: String, tracked: Tracked, levels: BTreeSet<String>) {
        self.dropped.remove(&name);
        self.levels.insert(name.clone(), levels);
        self.columns.insert(name, tracked);
    }

    fn remove(&mut self, name: &str) {
        self.columns.remove(name);
        self.levels.remove(name);
        self.dropped.insert(name.to_owned());
    }

    fn update(&mut self, name: &str, f: impl FnOnce(&mut Tracked)) {
        if let Some(tracked) = self.columns.get_mut(name) {
            f(tracked);
        }
    }

    /// Values were rewritten in a way the profile cannot predict.
    fn forget_levels(&mut self, name: &str) {
        self.levels.remove(name);
    }

    fn impute(&mut self, name: &str, strategy: &ImputeStrategy) {
        let Some(tracked) = self.columns.get(name).copied() else {
            return;
        };
        if tracked.semantic == SemanticType::Numeric || strategy.needs_numeric() {
            self.forget_levels(name);
        } else if let ImputeStrategy::Constant(value) = strategy
            && tracked.has_missing
            && let Some(levels) = self.levels.get_mut(name)
        {
            levels.insert(value.label());
        }
        self.update(name, |t| t.has_missing = false);
    }

    /// One indicator column per known level, in place of `name`.
    fn one_hot(&mut self, name: &str) {
        let tracked = self.columns.get(name).copied();
        let levels = self.levels.get(name).cloned();
        self.remove(name);
        let (Some(tracked), Some(levels)) = (tracked, levels) else {
            return;
        };

        let always_set = levels.len() == 1 && !tracked.has_missing;
        let bits: BTreeSet<String> = if always_set {
            BTreeSet::from(["1".to_owned()])
        } else {
            BTreeSet::from(["0".to_owned(), "1".to_owned()])
        };
        for level in &levels {
            let indicator = Tracked {
                semantic: SemanticType::Numeric,
                has_missing: false,
                scaled: false,
            };
            self.insert(format!("{name}_{level}"), indicator, bits.clone());
        }
    }

    fn ordinal(&mut self, name: &str) {
        if let Some(levels) = self.levels.get_mut(name) {
            *levels = (0..levels.len()).map(|code| code.to_string()).collect();
        }
        self.update(name, |t| t.semantic = SemanticType::Numeric);
    }

    /// Record the effect of a well-formed step.
    fn apply(&mut self, step: &Step) {
        match step {
            Step::Impute { columns, strategy } => {
                for c in columns {
                    self.impute(c, strategy);
                }
            }
            Step::Scale { columns, .. } => {
                for c in columns {
                    self.forget_levels(c);
                    self.update(c, |t| t.scaled = true);
                }
            }
            Step::Encode { columns, method } => {
                for c in columns {
                    match method {
                        EncodeMethod::OneHot => self.one_hot(c),
                        EncodeMethod::Ordinal => self.ordinal(c),
                    }
                }
            }
            Step::NormalizeDuration { columns, .. } => {
                for c in columns {
                    self.forget_levels(c);
                    self.update(c, |t| t.semantic = SemanticType::Numeric);
                }
            }
            Step::ClipOutliers { columns, .. } => {
                for c in columns {
                    self.forget_levels(c);
                }
            }
            Step::DropColumns { columns } => {
                for c in columns {
                    self.remove(c);
                }
            }
            // row filters can only shrink a level set
            Step::DropDuplicates { .. }
            | Step::RemoveOutliers { .. }
            | Step::Deduplicate { .. }
            | Step::SortBy { .. }
            | Step::DropSparseRows { .. } => {}
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    contract: PlanContract,
    settings: ValidationSettings,
}

impl Validator {
    pub fn new(contract: PlanContract, settings: ValidationSettings) -> Self {
        Self { contract, settings }
    }

    pub fn contract(&self) -> &PlanContract {
        &self.contract
    }

    /// Judge `plan` against the dataset profile and the declared purpose.
    pub fn check(
        &self,
        plan: &PipelinePlan,
        profile: &DatasetProfile,
        purpose: &Purpose,
    ) -> ValidationResult {
        self.judge(plan, profile, purpose).0
    }

    /// Seal `plan` for execution, or return why it was rejected.
    pub fn approve(
        &self,
        plan: &PipelinePlan,
        profile: &DatasetProfile,
        purpose: &Purpose,
    ) -> Result<ValidatedPlan, ValidationResult> {
        let (result, steps) = self.judge(plan, profile, purpose);
        if !result.valid {
            return Err(result);
        }
        Ok(ValidatedPlan {
            steps,
            reason: plan.reason.clone(),
            warnings: result.warnings,
        })
    }

    fn judge(
        &self,
        plan: &PipelinePlan,
        profile: &DatasetProfile,
        purpose: &Purpose,
    ) -> (ValidationResult, Vec<Step>) {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut steps = Vec::with_capacity(plan.steps.len());

        if plan.steps.len() > self.settings.max_steps {
            errors.push(ValidationIssue::plan(
                IssueCode::InvalidParameter,
                format!(
                    "plan has {} steps, the limit is {}",
                    plan.steps.len(),
                    self.settings.max_steps
                ),
            ));
        }
        if plan.steps.is_empty() {
            warnings.push(ValidationIssue::plan(IssueCode::Advisory, "plan has no steps"));
        }
        if plan.reason.trim().is_empty() {
            warnings.push(ValidationIssue::plan(IssueCode::Advisory, "plan gives no reason"));
        }

        let target = purpose.target.as_deref().or(profile.target.as_deref());
        let mut schema = Schema::from_profile(profile);

        for (index, op) in plan.steps.iter().enumerate() {
            let before = errors.len();
            let checked = self.check_step(
                index,
                op,
                profile,
                purpose,
                target,
                &mut schema,
                &mut errors,
                &mut warnings,
            );
            // a well-formed step shapes the schema even when it broke a rule
            if let Some(step) = checked {
                schema.apply(&step);
                if errors.len() == before {
                    steps.push(step);
                }
            }
        }

        let valid = errors.is_empty();
        if valid {
            tracing::info!(steps = steps.len(), warnings = warnings.len(), "Plan validated");
        } else {
            tracing::warn!(errors = errors.len(), "Plan rejected");
            for issue in &errors {
                tracing::debug!("{issue}");
            }
        }

        (
            ValidationResult {
                valid,
                errors,
                warnings,
            },
            steps,
        )
    }

    #[expect(clippy::too_many_arguments)]
    fn check_step(
        &self,
        index: usize,
        op: &Operation,
        profile: &DatasetProfile,
        purpose: &Purpose,
        target: Option<&str>,
        schema: &mut Schema,
        errors: &mut Vec<ValidationIssue>,
        warnings: &mut Vec<ValidationIssue>,
    ) -> Option<Step> {
        let Some(spec) = self.contract.lookup(&op.op) else {
            errors.push(ValidationIssue::step(
                IssueCode::UnknownOperation,
                index,
                op,
                format!("'{}' is not in the operation vocabulary", op.op),
            ));
            return None;
        };
        let kind = spec.kind;

        if let Err(msg) = spec.columns.check(op.columns.len()) {
            errors.push(ValidationIssue::step(IssueCode::InvalidParameter, index, op, msg));
        }
        let mut listed = BTreeSet::new();
        let mut distinct = Vec::with_capacity(op.columns.len());
        for column in &op.columns {
            if listed.insert(column.as_str()) {
                distinct.push(column.as_str());
            } else {
                errors.push(
                    ValidationIssue::step(
                        IssueCode::InvalidParameter,
                        index,
                        op,
                        format!("column '{column}' is listed more than once"),
                    )
                    .on_column(column),
                );
            }
        }

        // resolve every reference before anything else mutates the schema
        let mut tracked: Vec<(&str, Tracked)> = Vec::new();
        for column in distinct {
            match schema.resolve(column) {
                Resolved::Present(t) => tracked.push((column, t)),
                Resolved::Dropped => errors.push(
                    ValidationIssue::step(
                        IssueCode::DependencyOrderViolation,
                        index,
                        op,
                        format!("column '{column}' was removed by an earlier step"),
                    )
                    .on_column(column),
                ),
                Resolved::Unknown => errors.push(
                    ValidationIssue::step(
                        IssueCode::UnknownColumn,
                        index,
                        op,
                        format!("column '{column}' does not exist"),
                    )
                    .on_column(column),
                ),
            }
        }

        let problems = spec.check_params(&op.params, self.settings.reject_unknown_params);
        let step = if problems.is_empty() {
            match Step::from_operation(kind, op) {
                Ok(step) => Some(step),
                Err(msg) => {
                    errors.push(ValidationIssue::step(IssueCode::InvalidParameter, index, op, msg));
                    None
                }
            }
        } else {
            for msg in problems {
                errors.push(ValidationIssue::step(IssueCode::InvalidParameter, index, op, msg));
            }
            None
        };

        if kind.rewrites_columns()
            && !purpose.allows_target_mutation()
            && let Some(target) = target
            && op.columns.iter().any(|c| c == target)
        {
            errors.push(
                ValidationIssue::step(
                    IssueCode::TargetMutationForbidden,
                    index,
                    op,
                    format!(
                        "'{target}' is the target column and the purpose does not allow changing it"
                    ),
                )
                .on_column(target),
            );
        }

        let forbidden_by = match kind {
            OperationKind::RemoveOutliers | OperationKind::ClipOutliers
                if purpose.preserves_outliers() =>
            {
                Some("preserve_outliers")
            }
            OperationKind::Scale if purpose.forbids_scaling() => Some("no_scaling"),
            OperationKind::Encode if purpose.forbids_encoding() => Some("no_encoding"),
            _ => None,
        };
        if let Some(constraint) = forbidden_by {
            errors.push(ValidationIssue::step(
                IssueCode::PurposeConstraintViolation,
                index,
                op,
                format!("the purpose sets '{constraint}'"),
            ));
        }

        let step = step?;
        self.check_semantics(index, op, &step, profile, purpose, &tracked, errors, warnings);
        Some(step)
    }

    #[expect(clippy::too_many_arguments)]
    fn check_semantics(
        &self,
        index: usize,
        op: &Operation,
        step: &Step,
        profile: &DatasetProfile,
        purpose: &Purpose,
        tracked: &[(&str, Tracked)],
        errors: &mut Vec<ValidationIssue>,
        warnings: &mut Vec<ValidationIssue>,
    ) {
        let needs_numeric = match step {
            Step::Impute { strategy, .. } => strategy.needs_numeric(),
            Step::Scale { .. } | Step::RemoveOutliers { .. } | Step::ClipOutliers { .. } => true,
            _ => false,
        };

        for (column, state) in tracked {
            let issue = |code, message: String| {
                ValidationIssue::step(code, index, op, message).on_column(column)
            };

            if needs_numeric && state.semantic != SemanticType::Numeric {
                errors.push(issue(
                    IssueCode::InvalidParameter,
                    format!("'{column}' is {:?}, a numeric column is required", state.semantic),
                ));
            }

            match step {
                Step::NormalizeDuration { .. } if state.semantic != SemanticType::Categorical => {
                    errors.push(issue(
                        IssueCode::InvalidParameter,
                        format!("'{column}' is {:?}, duration parsing needs text", state.semantic),
                    ));
                }
                Step::Impute {
                    strategy: ImputeStrategy::Constant(value),
                    ..
                } if state.semantic == SemanticType::Numeric
                    && !matches!(value, FillValue::Number(_)) =>
                {
                    errors.push(issue(
                        IssueCode::InvalidParameter,
                        format!("'{column}' is numeric, the fill value must be a number"),
                    ));
                }
                Step::Encode { .. } if purpose.requires_null_free_encoding() && state.has_missing => {
                    errors.push(issue(
                        IssueCode::DependencyOrderViolation,
                        format!("'{column}' has missing values; impute it before encoding"),
                    ));
                }
                Step::Impute { .. } if !state.has_missing => {
                    warnings.push(issue(
                        IssueCode::Advisory,
                        format!("'{column}' has no missing values to impute"),
                    ));
                }
                Step::Scale { .. } if state.scaled => {
                    warnings.push(issue(
                        IssueCode::Advisory,
                        format!("'{column}' is already scaled"),
                    ));
                }
                _ => {}
            }
        }

        if let Step::DropDuplicates { subset, .. } = step
            && subset.is_empty()
            && profile.duplicate_count == 0
        {
            warnings.push(ValidationIssue::step(
                IssueCode::Advisory,
                index,
                op,
                "the dataset has no duplicate rows",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::profiler::Profiler;
    use crate::purpose::{TaskType, keys};
    use polars::prelude::*;

    fn profile() -> anyhow::Result<DatasetProfile> {
        let data = Dataset::from_series(vec![
            Series::new("age".into(), vec![Some(31.0), None, Some(45.0), Some(22.0)]),
            Series::new("income".into(), vec![10.0, 20.0, 30.0, 40.0]),
            Series::new(
                "city".into(),
                vec![Some("Oslo"), Some("Rome"), None, Some("Oslo")],
            ),
            Series::new("call_length".into(), vec!["1:30", "2:00", "0:45", "3:10"]),
            Series::new("label".into(), vec!["yes", "no", "no", "yes"]),
        ])?;
        Ok(Profiler::default().profile(&data, Some("label"))?)
    }

    fn purpose() -> Purpose {
        Purpose::new(TaskType::Classification, Some("label".to_owned()))
    }

    fn codes(result: &ValidationResult) -> Vec<IssueCode> {
        result.errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn test_unknown_column_rejects_plan() -> anyhow::Result<()> {
        let plan = PipelinePlan::new("scale").with_step(
            Operation::new("scale")
                .on(["nonexistent_col"])
                .with_param("method", "standard"),
        );
        let result = Validator::default().check(&plan, &profile()?, &purpose());
        assert!(!result.valid);
        assert_eq!(codes(&result), vec![IssueCode::UnknownColumn]);
        assert_eq!(result.errors[0].column.as_deref(), Some("nonexistent_col"));
        assert_eq!(result.errors[0].step_index, Some(0));
        Ok(())
    }

    #[test]
    fn test_unknown_operation_and_bad_strategy() -> anyhow::Result<()> {
        let plan = PipelinePlan::new("x")
            .with_step(Operation::new("exec_python").on(["age"]))
            .with_step(
                Operation::new("impute")
                    .on(["age"])
                    .with_param("strategy", "average"),
            );
        let result = Validator::default().check(&plan, &profile()?, &purpose());
        assert_eq!(
            codes(&result),
            vec![IssueCode::UnknownOperation, IssueCode::InvalidParameter]
        );
        assert_eq!(result.errors[1].step_index, Some(1));
        Ok(())
    }

    #[test]
    fn test_target_mutation_forbidden_unless_allowed() -> anyhow::Result<()> {
        let profile = profile()?;
        let plan = PipelinePlan::new("encode label").with_step(
            Operation::new("encode")
                .on(["label"])
                .with_param("method", "ordinal"),
        );
        let result = Validator::default().check(&plan, &profile, &purpose());
        assert_eq!(codes(&result), vec![IssueCode::TargetMutationForbidden]);

        let permissive = purpose().with_constraint(keys::ALLOW_TARGET_MUTATION, true);
        assert!(Validator::default().check(&plan, &profile, &permissive).valid);

        // row filters may still name the target
        let sort = PipelinePlan::new("sort").with_step(Operation::new("sort_by").on(["label"]));
        assert!(Validator::default().check(&sort, &profile, &purpose()).valid);
        Ok(())
    }

    #[test]
    fn test_encode_before_impute_is_out_of_order() -> anyhow::Result<()> {
        let profile = profile()?;
        let encode = Operation::new("encode")
            .on(["city"])
            .with_param("method", "onehot");
        let impute = Operation::new("impute")
            .on(["city"])
            .with_param("strategy", "mode");

        let wrong = PipelinePlan::new("x")
            .with_step(encode.clone())
            .with_step(impute.clone());
        let result = Validator::default().check(&wrong, &profile, &purpose());
        // the impute then references the column the one-hot removed
        assert_eq!(
            codes(&result),
            vec![
                IssueCode::DependencyOrderViolation,
                IssueCode::DependencyOrderViolation
            ]
        );

        let right = PipelinePlan::new("x").with_step(impute).with_step(encode);
        let approved = Validator::default()
            .approve(&right, &profile, &purpose())
            .map_err(|r| anyhow::anyhow!("{r}"))?;
        assert_eq!(approved.len(), 2);
        Ok(())
    }

    #[test]
    fn test_reference_after_drop() -> anyhow::Result<()> {
        let plan = PipelinePlan::new("x")
            .with_step(Operation::new("drop_columns").on(["income"]))
            .with_step(
                Operation::new("scale")
                    .on(["income"])
                    .with_param("method", "minmax"),
            );
        let result = Validator::default().check(&plan, &profile()?, &purpose());
        assert_eq!(codes(&result), vec![IssueCode::DependencyOrderViolation]);
        assert_eq!(result.errors[0].step_index, Some(1));
        Ok(())
    }

    #[test]
    fn test_onehot_columns_are_addressable() -> anyhow::Result<()> {
        let plan = PipelinePlan::new("x")
            .with_step(
                Operation::new("impute")
                    .on(["city"])
                    .with_param("strategy", "constant")
                    .with_param("value", "unknown"),
            )
            .with_step(
                Operation::new("encode")
                    .on(["city"])
                    .with_param("method", "onehot"),
            )
            .with_step(Operation::new("drop_columns").on(["city_Rome"]));
        let result = Validator::default().check(&plan, &profile()?, &purpose());
        assert!(result.valid, "{result}");
        Ok(())
    }

    #[test]
    fn test_onehot_registers_only_observed_levels() -> anyhow::Result<()> {
        let encoded = |column: &str| {
            PipelinePlan::new("x")
                .with_step(
                    Operation::new("impute")
                        .on(["city"])
                        .with_param("strategy", "constant")
                        .with_param("value", "unknown"),
                )
                .with_step(
                    Operation::new("encode")
                        .on(["city"])
                        .with_param("method", "onehot"),
                )
                .with_step(
                    Operation::new("scale")
                        .on([column])
                        .with_param("method", "standard"),
                )
        };
        let profile = profile()?;

        for column in ["city_Oslo", "city_Rome", "city_unknown"] {
            let result = Validator::default().check(&encoded(column), &profile, &purpose());
            assert!(result.valid, "{column}: {result}");
        }

        let result = Validator::default().check(&encoded("city_Atlantis"), &profile, &purpose());
        assert_eq!(codes(&result), vec![IssueCode::UnknownColumn]);
        assert_eq!(result.errors[0].column.as_deref(), Some("city_Atlantis"));
        Ok(())
    }

    #[test]
    fn test_repeated_column_in_one_step() -> anyhow::Result<()> {
        let plan = PipelinePlan::new("x")
            .with_step(
                Operation::new("impute")
                    .on(["city"])
                    .with_param("strategy", "mode"),
            )
            .with_step(
                Operation::new("encode")
                    .on(["city", "city"])
                    .with_param("method", "onehot"),
            );
        let result = Validator::default().check(&plan, &profile()?, &purpose());
        assert_eq!(codes(&result), vec![IssueCode::InvalidParameter]);
        assert_eq!(result.errors[0].step_index, Some(1));
        assert!(result.errors[0].message.contains("more than once"));
        Ok(())
    }

    #[test]
    fn test_type_compatibility() -> anyhow::Result<()> {
        let plan = PipelinePlan::new("x")
            .with_step(
                Operation::new("scale")
                    .on(["city"])
                    .with_param("method", "standard"),
            )
            .with_step(Operation::new("normalize_duration").on(["income"]))
            .with_step(
                Operation::new("impute")
                    .on(["age"])
                    .with_param("strategy", "constant")
                    .with_param("value", "n/a"),
            );
        let result = Validator::default().check(&plan, &profile()?, &purpose());
        assert_eq!(codes(&result), vec![IssueCode::InvalidParameter; 3]);
        Ok(())
    }

    #[test]
    fn test_purpose_constraints() -> anyhow::Result<()> {
        let plan = PipelinePlan::new("x")
            .with_step(
                Operation::new("remove_outliers")
                    .on(["income"])
                    .with_param("method", "iqr"),
            )
            .with_step(
                Operation::new("scale")
                    .on(["income"])
                    .with_param("method", "standard"),
            );
        let purpose = Purpose::preset(TaskType::AnomalyDetection, None)
            .with_constraint(keys::NO_SCALING, true);
        let result = Validator::default().check(&plan, &profile()?, &purpose);
        assert_eq!(codes(&result), vec![IssueCode::PurposeConstraintViolation; 2]);
        Ok(())
    }

    #[test]
    fn test_limits_and_warnings() -> anyhow::Result<()> {
        let profile = profile()?;
        let validator = Validator::new(
            PlanContract::standard(),
            ValidationSettings {
                max_steps: 1,
                ..ValidationSettings::default()
            },
        );
        let plan = PipelinePlan::new("")
            .with_step(Operation::new("drop_duplicates"))
            .with_step(
                Operation::new("impute")
                    .on(["income"])
                    .with_param("strategy", "mean"),
            );
        let result = validator.check(&plan, &profile, &purpose());
        assert_eq!(codes(&result), vec![IssueCode::InvalidParameter]);
        assert_eq!(result.errors[0].step_index, None);
        // empty reason, no duplicates, nothing to impute
        assert_eq!(result.warnings.len(), 3);

        let result = Validator::default().check(&plan, &profile, &purpose());
        assert!(result.valid);
        Ok(())
    }

    #[test]
    fn test_unknown_params_rejected_by_default() -> anyhow::Result<()> {
        let plan = PipelinePlan::new("x").with_step(
            Operation::new("scale")
                .on(["income"])
                .with_param("method", "standard")
                .with_param("inplace", true),
        );
        let result = Validator::default().check(&plan, &profile()?, &purpose());
        assert_eq!(codes(&result), vec![IssueCode::InvalidParameter]);
        assert!(result.errors[0].message.contains("inplace"));
        Ok(())
    }
}
