//! Engine configuration.
//!
//! Every threshold, weight, seed and timeout the engine uses lives here.
//! Sections default independently, so a config file only has to name the
//! values it wants to change:
//!
//! ```json
//! { "leakage": { "single_feature_critical": 0.9 }, "analysis": { "timeout_secs": 10 } }
//! ```

use crate::analyser::AnalyzerKind;
use crate::error::{EngineError, Result, ResultExt as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "datamedic";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub profiler: ProfilerSettings,
    pub analysis: AnalysisSettings,
    pub missing: MissingSettings,
    pub distribution: DistributionSettings,
    pub features: FeatureSettings,
    pub imbalance: ImbalanceSettings,
    pub leakage: LeakageSettings,
    pub bias: BiasSettings,
    pub baseline: BaselineSettings,
    pub scoring: ScoringSettings,
    pub validation: ValidationSettings,
    pub execution: ExecutionSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerSettings {
    /// Numeric targets with at most this many distinct values are classes
    pub class_cardinality_threshold: usize,
    /// Integer-coded targets stay classification up to this many classes
    pub integer_class_limit: usize,
    /// Share of non-null text values that must parse as numbers
    pub numeric_parse_ratio: f64,
    /// Share of non-null text values that must parse as dates
    pub datetime_parse_ratio: f64,
    /// Columns with more distinct values than this keep no level list
    pub max_tracked_levels: usize,
}

impl Default for ProfilerSettings {
    fn default() -> Self {
        Self {
            class_cardinality_threshold: 20,
            integer_class_limit: 50,
            numeric_parse_ratio: 0.95,
            datetime_parse_ratio: 0.9,
            max_tracked_levels: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Budget for the whole analyzer fan-out
    pub timeout_secs: u64,
    /// Seed for every train/test split
    pub seed: u64,
    pub train_ratio: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            seed: 42,
            train_ratio: 0.8,
        }
    }
}

impl AnalysisSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingSettings {
    pub low_below_pct: f64,
    pub high_above_pct: f64,
    /// Rows missing more than this share of cells count as extreme
    pub extreme_row_pct: f64,
}

impl Default for MissingSettings {
    fn default() -> Self {
        Self {
            low_below_pct: 5.0,
            high_above_pct: 20.0,
            extreme_row_pct: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionSettings {
    pub skew_moderate: f64,
    pub skew_high: f64,
    pub kurtosis_moderate: f64,
    pub kurtosis_extreme: f64,
    pub iqr_multiplier: f64,
    pub outlier_column_pct: f64,
    pub dominance_pct: f64,
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            skew_moderate: 0.5,
            skew_high: 1.0,
            kurtosis_moderate: 1.0,
            kurtosis_extreme: 3.0,
            iqr_multiplier: 1.5,
            outlier_column_pct: 5.0,
            dominance_pct: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    pub near_constant_share: f64,
    pub near_constant_unique_ratio: f64,
    pub high_cardinality_ratio: f64,
    pub high_cardinality_min_unique: usize,
    pub redundancy_threshold: f64,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            near_constant_share: 0.95,
            near_constant_unique_ratio: 0.01,
            high_cardinality_ratio: 0.5,
            high_cardinality_min_unique: 50,
            redundancy_threshold: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImbalanceSettings {
    pub balanced_below: f64,
    pub mild_below: f64,
    pub severe_above: f64,
    pub target_outlier_pct: f64,
}

impl Default for ImbalanceSettings {
    fn default() -> Self {
        Self {
            balanced_below: 1.5,
            mild_below: 3.0,
            severe_above: 10.0,
            target_outlier_pct: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakageSettings {
    pub min_rows: usize,
    pub single_feature_critical: f64,
    pub single_feature_high: f64,
    pub correlation_critical: f64,
    pub correlation_high: f64,
    pub aggregate_threshold: f64,
    pub aggregate_max_groups: usize,
    /// Categorical features with more distinct values than this share of rows
    /// are identifiers; group statistics over them are not correlations
    pub identifier_level_share: f64,
    pub temporal_order_share: f64,
    pub post_event_tokens: Vec<String>,
}

impl Default for LeakageSettings {
    fn default() -> Self {
        Self {
            min_rows: 30,
            single_feature_critical: 0.95,
            single_feature_high: 0.85,
            correlation_critical: 0.95,
            correlation_high: 0.85,
            aggregate_threshold: 0.98,
            aggregate_max_groups: 50,
            identifier_level_share: 0.5,
            temporal_order_share: 0.99,
            post_event_tokens: [
                "outcome", "result", "resolved", "closed", "after", "post", "final", "refund",
                "churned",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasSettings {
    pub parity_low: f64,
    pub parity_medium: f64,
    pub parity_high: f64,
    pub proxy_threshold: f64,
    pub min_group_size: usize,
}

impl Default for BiasSettings {
    fn default() -> Self {
        Self {
            parity_low: 0.05,
            parity_medium: 0.1,
            parity_high: 0.2,
            proxy_threshold: 0.8,
            min_group_size: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineSettings {
    pub min_rows: usize,
    pub negligible_gap: f64,
    pub mild_gap: f64,
    pub severe_gap: f64,
    pub ridge_penalty: f64,
    pub max_onehot_levels: usize,
    pub max_iterations: u64,
}

impl Default for BaselineSettings {
    fn default() -> Self {
        Self {
            min_rows: 30,
            negligible_gap: 0.01,
            mild_gap: 0.05,
            severe_gap: 0.15,
            ridge_penalty: 1.0,
            max_onehot_levels: 10,
            max_iterations: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub weights: BTreeMap<AnalyzerKind, f64>,
    /// Lower bounds for grades A, B, C, D; anything below is F
    pub grade_bands: [f64; 4],
    /// Lower bounds for excellent, good, warning; anything below is critical
    pub verdict_bands: [f64; 3],
    pub top_risks: usize,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            weights: AnalyzerKind::ALL
                .iter()
                .map(|kind| (*kind, kind.default_weight()))
                .collect(),
            grade_bands: [90.0, 80.0, 70.0, 60.0],
            verdict_bands: [85.0, 70.0, 50.0],
            top_risks: 3,
        }
    }
}

impl ScoringSettings {
    pub fn weight(&self, kind: AnalyzerKind) -> f64 {
        self.weights
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_weight())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub max_steps: usize,
    /// Reject parameters the operation schema does not declare
    pub reject_unknown_params: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_steps: 50,
            reject_unknown_params: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Dry runs use only the first N rows when set
    pub dry_run_sample_rows: Option<usize>,
}

impl EngineConfig {
    /// Default location: `<config dir>/datamedic/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, else from the default location if it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        let config = match resolved {
            Some(p) => {
                tracing::debug!("Loading config from {}", p.display());
                let content = std::fs::read_to_string(&p)
                    .with_context(|| format!("Failed to read config {}", p.display()))?;
                Self::from_json(&content)?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse config JSON")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject settings no analysis could run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(EngineError::Config(msg));

        if self.analysis.timeout_secs == 0 {
            return fail("analysis.timeout_secs must be positive".to_owned());
        }
        if !(self.analysis.train_ratio > 0.0 && self.analysis.train_ratio < 1.0) {
            return fail(format!(
                "analysis.train_ratio must be in (0, 1), got {}",
                self.analysis.train_ratio
            ));
        }
        if self.missing.low_below_pct > self.missing.high_above_pct {
            return fail("missing.low_below_pct exceeds missing.high_above_pct".to_owned());
        }
        if self.distribution.skew_moderate > self.distribution.skew_high {
            return fail("distribution.skew_moderate exceeds distribution.skew_high".to_owned());
        }
        if !(self.imbalance.balanced_below <= self.imbalance.mild_below
            && self.imbalance.mild_below <= self.imbalance.severe_above)
        {
            return fail("imbalance bands must be ascending".to_owned());
        }
        if self.leakage.single_feature_high > self.leakage.single_feature_critical {
            return fail("leakage.single_feature_high exceeds single_feature_critical".to_owned());
        }
        if !(self.bias.parity_low <= self.bias.parity_medium
            && self.bias.parity_medium <= self.bias.parity_high)
        {
            return fail("bias parity bands must be ascending".to_owned());
        }
        if !(self.baseline.negligible_gap <= self.baseline.mild_gap
            && self.baseline.mild_gap <= self.baseline.severe_gap)
        {
            return fail("baseline gap bands must be ascending".to_owned());
        }
        if self.scoring.grade_bands.windows(2).any(|w| w[0] < w[1]) {
            return fail("scoring.grade_bands must be descending".to_owned());
        }
        if self.scoring.verdict_bands.windows(2).any(|w| w[0] < w[1]) {
            return fail("scoring.verdict_bands must be descending".to_owned());
        }
        if self.scoring.weights.values().any(|w| *w < 0.0) {
            return fail("scoring weights must be non-negative".to_owned());
        }
        Ok(())
    }
}
