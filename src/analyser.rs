//! Statistical health analyzers.
//!
//! Each analyzer is an independent, stateless implementation of [`Analyzer`]
//! that reads the shared [`AnalysisContext`] and returns an
//! [`AnalyzerOutcome`]. An unmet precondition (no target, too few rows, no
//! sensitive columns declared) is an ordinary outcome,
//! [`AnalyzerOutcome::NotApplicable`], never an error.
//!
//! ## Modules
//!
//! - [`missing`]: per-column and per-row missingness
//! - [`distribution`]: skew, kurtosis, IQR outliers, categorical dominance
//! - [`features`]: constant, near-constant, high-cardinality, redundant features
//! - [`imbalance`]: class balance, or target shape for regression
//! - [`leakage`]: correlation, single-feature, temporal and aggregate probes
//! - [`bias`]: statistical parity and proxy detection for sensitive columns
//! - [`baseline`]: train/test gap of a minimal linear model
//! - [`runner`]: concurrent fan-out with a deadline

pub mod baseline;
pub mod bias;
pub mod distribution;
pub mod features;
pub mod imbalance;
pub mod leakage;
pub mod missing;
pub mod runner;
pub(crate) mod target;

use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::profiler::DatasetProfile;
use crate::purpose::Purpose;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use runner::AnalyzerRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    Missing,
    Distribution,
    FeatureQuality,
    Imbalance,
    Leakage,
    Bias,
    Baseline,
}

impl AnalyzerKind {
    pub const ALL: &'static [Self] = &[
        Self::Missing,
        Self::Distribution,
        Self::FeatureQuality,
        Self::Imbalance,
        Self::Leakage,
        Self::Bias,
        Self::Baseline,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Distribution => "distribution",
            Self::FeatureQuality => "feature_quality",
            Self::Imbalance => "imbalance",
            Self::Leakage => "leakage",
            Self::Bias => "bias",
            Self::Baseline => "baseline",
        }
    }

    /// Tie-break order for risk ranking; lower comes first.
    pub const fn priority(self) -> u8 {
        match self {
            Self::Leakage => 0,
            Self::Bias => 1,
            Self::Baseline => 2,
            Self::Imbalance => 3,
            Self::Missing => 4,
            Self::Distribution => 5,
            Self::FeatureQuality => 6,
        }
    }

    pub const fn default_weight(self) -> f64 {
        match self {
            Self::Leakage => 30.0,
            Self::Baseline => 20.0,
            Self::Missing
            | Self::Distribution
            | Self::FeatureQuality
            | Self::Imbalance
            | Self::Bias => 10.0,
        }
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }
}

/// A single ranked concern raised by an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub analyzer: AnalyzerKind,
    pub severity: Severity,
    /// Estimated share of the dataset or model affected, in `[0, 1]`
    pub impact: f64,
    pub title: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl Risk {
    pub fn new(
        analyzer: AnalyzerKind,
        severity: Severity,
        impact: f64,
        title: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            analyzer,
            severity,
            impact: impact.clamp(0.0, 1.0),
            title: title.into(),
            detail: detail.into(),
            column: None,
        }
    }

    #[must_use]
    pub fn on_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn weight(&self) -> f64 {
        f64::from(self.severity.rank()) * self.impact
    }
}

/// Raw metrics, typed per analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingMetrics {
    Missing(missing::MissingMetrics),
    Distribution(distribution::DistributionMetrics),
    FeatureQuality(features::FeatureQualityMetrics),
    Imbalance(imbalance::ImbalanceMetrics),
    Leakage(leakage::LeakageMetrics),
    Bias(bias::BiasMetrics),
    Baseline(baseline::BaselineMetrics),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentFinding {
    pub analyzer: AnalyzerKind,
    pub severity: Severity,
    /// Normalised health score, 0 (worst) to 100 (best)
    pub score: f64,
    pub metrics: FindingMetrics,
    pub risks: Vec<Risk>,
}

impl ComponentFinding {
    pub fn new(analyzer: AnalyzerKind, severity: Severity, score: f64, metrics: FindingMetrics) -> Self {
        Self {
            analyzer,
            severity,
            score: crate::stats::round_to(score.clamp(0.0, 100.0), 2),
            metrics,
            risks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_risks(mut self, risks: Vec<Risk>) -> Self {
        self.risks = risks;
        self
    }
}

/// Why an analyzer produced no finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum SkipReason {
    NoTarget,
    TargetNotFound { target: String },
    UnsupportedProblemType,
    InsufficientRows { required: usize, actual: usize },
    NoSensitiveColumns,
    NoUsableFeatures,
    SingleClass,
    Timeout,
    InternalError { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTarget => f.write_str("no target column supplied"),
            Self::TargetNotFound { target } => write!(f, "target column '{target}' not found"),
            Self::UnsupportedProblemType => f.write_str("target type is not supported"),
            Self::InsufficientRows { required, actual } => {
                write!(f, "needs at least {required} rows, found {actual}")
            }
            Self::NoSensitiveColumns => f.write_str("no sensitive columns declared"),
            Self::NoUsableFeatures => f.write_str("no usable feature columns"),
            Self::SingleClass => f.write_str("target has a single class"),
            Self::Timeout => f.write_str("timeout"),
            Self::InternalError { message } => write!(f, "internal error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalyzerOutcome {
    Applicable(ComponentFinding),
    NotApplicable {
        analyzer: AnalyzerKind,
        reason: SkipReason,
    },
}

impl AnalyzerOutcome {
    pub fn skipped(analyzer: AnalyzerKind, reason: SkipReason) -> Self {
        Self::NotApplicable { analyzer, reason }
    }

    pub fn analyzer(&self) -> AnalyzerKind {
        match self {
            Self::Applicable(finding) => finding.analyzer,
            Self::NotApplicable { analyzer, .. } => *analyzer,
        }
    }

    pub fn applicable(&self) -> bool {
        matches!(self, Self::Applicable(_))
    }

    pub fn finding(&self) -> Option<&ComponentFinding> {
        match self {
            Self::Applicable(finding) => Some(finding),
            Self::NotApplicable { .. } => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Self::Applicable(_) => None,
            Self::NotApplicable { reason, .. } => Some(reason),
        }
    }
}

/// Everything an analyzer may read. Shared read-only across worker threads.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub profile: Arc<DatasetProfile>,
    pub data: Dataset,
    pub purpose: Option<Purpose>,
    pub config: Arc<EngineConfig>,
}

impl AnalysisContext {
    pub fn new(profile: Arc<DatasetProfile>, data: Dataset, config: Arc<EngineConfig>) -> Self {
        Self {
            profile,
            data,
            purpose: None,
            config,
        }
    }

    #[must_use]
    pub fn with_purpose(mut self, purpose: Purpose) -> Self {
        self.purpose = Some(purpose);
        self
    }

    pub fn target(&self) -> Option<&str> {
        self.profile.target.as_deref()
    }

    pub fn sensitive_columns(&self) -> Vec<String> {
        self.purpose
            .as_ref()
            .map(Purpose::sensitive_columns)
            .unwrap_or_default()
    }

    pub fn timestamp_column(&self) -> Option<&str> {
        self.purpose.as_ref().and_then(Purpose::timestamp_column)
    }
}

pub trait Analyzer: Send + Sync {
    fn kind(&self) -> AnalyzerKind;

    fn analyze(&self, ctx: &AnalysisContext) -> AnalyzerOutcome;
}

/// The seven built-in analyzers, in [`AnalyzerKind::ALL`] order.
pub fn standard_analyzers() -> Vec<Arc<dyn Analyzer>> {
    vec![
        Arc::new(missing::MissingAnalyzer),
        Arc::new(distribution::DistributionAnalyzer),
        Arc::new(features::FeatureQualityAnalyzer),
        Arc::new(imbalance::ImbalanceAnalyzer),
        Arc::new(leakage::LeakageAnalyzer),
        Arc::new(bias::BiasAnalyzer),
        Arc::new(baseline::BaselineAnalyzer),
    ]
}

/// Wrap a data-access failure as a non-applicable outcome.
pub(crate) fn internal(analyzer: AnalyzerKind, err: &anyhow::Error) -> AnalyzerOutcome {
    tracing::warn!(%analyzer, "Analyzer failed on data access: {err:#}");
    AnalyzerOutcome::skipped(
        analyzer,
        SkipReason::InternalError {
            message: format!("{err:#}"),
        },
    )
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::profiler::Profiler;

    /// Profile `data` with default settings and wrap it in a context.
    pub fn context(data: Dataset, target: Option<&str>) -> anyhow::Result<AnalysisContext> {
        let profile = Profiler::default().profile(&data, target)?;
        Ok(AnalysisContext::new(
            Arc::new(profile),
            data,
            Arc::new(EngineConfig::default()),
        ))
    }

    pub fn expect_finding(outcome: AnalyzerOutcome) -> ComponentFinding {
        match outcome {
            AnalyzerOutcome::Applicable(finding) => finding,
            AnalyzerOutcome::NotApplicable { reason, .. } => {
                panic!("expected an applicable finding, got skip: {reason}")
            }
        }
    }
}
