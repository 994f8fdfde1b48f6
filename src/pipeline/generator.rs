//! The plan-generator seam.
//!
//! Plan generation is an external, untrusted capability. The engine only
//! builds the [`PlanRequest`] payload and reads back raw text; whatever
//! produced that text is behind the [`PlanGenerator`] trait.

use super::contract::PlanContract;
use super::plan::PipelinePlan;
use super::validation::ValidationIssue;
use crate::error::{Result, ResultExt as _};
use crate::profiler::DatasetProfile;
use crate::purpose::Purpose;
use crate::scoring::HealthReport;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

/// Everything a generator is given.
#[derive(Debug, Clone, Serialize)]
pub struct PlanRequest<'a> {
    pub profile: &'a DatasetProfile,
    pub purpose: &'a Purpose,
    pub health_report: &'a HealthReport,
    pub vocabulary: Value,
    /// Issues from the previous rejected attempt, if any
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub feedback: Vec<ValidationIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_plan: Option<&'a PipelinePlan>,
}

impl<'a> PlanRequest<'a> {
    pub fn new(
        profile: &'a DatasetProfile,
        purpose: &'a Purpose,
        health_report: &'a HealthReport,
        contract: &PlanContract,
    ) -> Self {
        Self {
            profile,
            purpose,
            health_report,
            vocabulary: contract.describe(),
            feedback: Vec::new(),
            previous_plan: None,
        }
    }

    /// Attach the rejection of `previous` so the generator can repair it.
    #[must_use]
    pub fn with_feedback(
        mut self,
        feedback: Vec<ValidationIssue>,
        previous: Option<&'a PipelinePlan>,
    ) -> Self {
        self.feedback = feedback;
        self.previous_plan = previous;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub trait PlanGenerator: Send + Sync {
    /// Raw, untrusted generator output.
    fn propose(&self, request: &PlanRequest<'_>) -> Result<String>;
}

/// Always answers with the same text.
#[derive(Debug, Clone)]
pub struct StaticPlanGenerator {
    text: String,
}

impl StaticPlanGenerator {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn from_plan(plan: &PipelinePlan) -> Result<Self> {
        Ok(Self::new(plan.to_json()?))
    }
}

impl PlanGenerator for StaticPlanGenerator {
    fn propose(&self, _request: &PlanRequest<'_>) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// Reads a plan someone (or something) wrote to disk.
#[derive(Debug, Clone)]
pub struct FilePlanGenerator {
    path: PathBuf,
}

impl FilePlanGenerator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PlanGenerator for FilePlanGenerator {
    fn propose(&self, _request: &PlanRequest<'_>) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read plan {}", self.path.display()))
    }
}

/// Ask `generator` for a plan and hold it to the contract's output shape.
pub fn generate_plan(
    generator: &dyn PlanGenerator,
    request: &PlanRequest<'_>,
    contract: &PlanContract,
) -> Result<PipelinePlan> {
    let text = generator.propose(request)?;
    let plan = contract.parse_plan(&text)?;
    tracing::info!(
        steps = plan.steps.len(),
        retry = request.previous_plan.is_some(),
        "Generator proposed a plan"
    );
    Ok(plan)
}
