//! Train/test gap of a minimal linear model.
//!
//! Logistic regression for binary targets, multinomial logistic for
//! multiclass, and ridge for regression. Features are the numeric columns
//! (train-median imputed) plus one-hot encodings of low-cardinality
//! categoricals, all standardised with training-fold statistics.

use super::target::{self, TargetValues, TargetView};
use super::{
    AnalysisContext, Analyzer, AnalyzerKind, AnalyzerOutcome, ComponentFinding, FindingMetrics,
    Risk, Severity, SkipReason, internal,
};
use crate::config::BaselineSettings;
use crate::profiler::SemanticType;
use crate::stats;
use anyhow::anyhow;
use linfa::prelude::*;
use linfa_elasticnet::ElasticNet;
use linfa_logistic::{LogisticRegression, MultiLogisticRegression};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineModel {
    Logistic,
    MultinomialLogistic,
    Ridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelMetric {
    Accuracy,
    R2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverfitBand {
    None,
    Mild,
    Moderate,
    Severe,
}

impl OverfitBand {
    pub fn from_gap(gap: f64, settings: &BaselineSettings) -> Self {
        if gap <= settings.negligible_gap {
            Self::None
        } else if gap < settings.mild_gap {
            Self::Mild
        } else if gap <= settings.severe_gap {
            Self::Moderate
        } else {
            Self::Severe
        }
    }

    const fn severity(self) -> Severity {
        match self {
            Self::None => Severity::None,
            Self::Mild => Severity::Low,
            Self::Moderate => Severity::Medium,
            Self::Severe => Severity::High,
        }
    }

    const fn score(self) -> f64 {
        match self {
            Self::None => 100.0,
            Self::Mild => 80.0,
            Self::Moderate => 50.0,
            Self::Severe => 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    /// Absolute standardised coefficient; max over classes for multiclass
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetrics {
    pub model: BaselineModel,
    pub metric: ModelMetric,
    pub train_rows: usize,
    pub test_rows: usize,
    pub feature_count: usize,
    pub train_score: f64,
    pub test_score: f64,
    pub gap: f64,
    pub band: OverfitBand,
    /// Share of the target the model leaves unexplained on the test fold
    pub noise_floor: f64,
    pub top_features: Vec<FeatureImportance>,
}

pub struct BaselineAnalyzer;

/// Standardised design matrix built from training-fold statistics.
struct Design {
    names: Vec<String>,
    /// One entry per design column, indexed by dataset row
    columns: Vec<Vec<f64>>,
}

impl Design {
    fn build(
        ctx: &AnalysisContext,
        train: &[usize],
        settings: &BaselineSettings,
    ) -> anyhow::Result<Self> {
        let mut names = Vec::new();
        let mut raw: Vec<Vec<f64>> = Vec::new();

        for column in ctx.profile.features().filter(|c| c.unique_count > 1) {
            match column.semantic_type {
                SemanticType::Numeric => {
                    let values = ctx.data.numeric(&column.name)?;
                    let fitted: Vec<f64> = train.iter().filter_map(|&r| values[r]).collect();
                    let Some(median) = stats::quantile(&stats::sorted(&fitted), 0.5) else {
                        continue;
                    };
                    names.push(column.name.clone());
                    raw.push(values.iter().map(|v| v.unwrap_or(median)).collect());
                }
                SemanticType::Categorical
                    if column.unique_count <= settings.max_onehot_levels =>
                {
                    let text = ctx.data.text(&column.name)?;
                    let levels: BTreeSet<&str> =
                        train.iter().filter_map(|&r| text[r].as_deref()).collect();
                    for level in levels {
                        names.push(format!("{}={level}", column.name));
                        raw.push(
                            text.iter()
                                .map(|v| if v.as_deref() == Some(level) { 1.0 } else { 0.0 })
                                .collect(),
                        );
                    }
                }
                _ => {}
            }
        }

        let mut design = Self {
            names: Vec::with_capacity(names.len()),
            columns: Vec::with_capacity(raw.len()),
        };
        for (name, mut values) in names.into_iter().zip(raw) {
            let fitted: Vec<f64> = train.iter().map(|&r| values[r]).collect();
            let (Some(mean), Some(std)) = (stats::mean(&fitted), stats::std_dev(&fitted)) else {
                continue;
            };
            if std <= f64::EPSILON {
                continue;
            }
            for v in &mut values {
                *v = (*v - mean) / std;
            }
            design.names.push(name);
            design.columns.push(values);
        }
        Ok(design)
    }

    fn matrix(&self, rows: &[usize]) -> Array2<f64> {
        Array2::from_shape_fn((rows.len(), self.columns.len()), |(i, j)| {
            self.columns[j][rows[i]]
        })
    }
}

struct Fitted {
    model: BaselineModel,
    train_score: f64,
    test_score: f64,
    magnitudes: Vec<f64>,
}

fn codes(view: &TargetView, rows: &[usize]) -> Array1<usize> {
    rows.iter().map(|&r| view.code(r).unwrap_or(0)).collect()
}

fn values(view: &TargetView, rows: &[usize]) -> Array1<f64> {
    rows.iter().map(|&r| view.value(r).unwrap_or(0.0)).collect()
}

fn fit(
    design: &Design,
    view: &TargetView,
    train: &[usize],
    test: &[usize],
    settings: &BaselineSettings,
) -> anyhow::Result<Fitted> {
    let x_train = design.matrix(train);
    let x_test = design.matrix(test);

    match &view.values {
        TargetValues::Classes { labels, .. } if labels.len() == 2 => {
            let train_ds = Dataset::new(x_train, codes(view, train));
            let test_ds = Dataset::new(x_test, codes(view, test));
            let model = LogisticRegression::default()
                .max_iterations(settings.max_iterations)
                .fit(&train_ds)
                .map_err(|e| anyhow!("Logistic Regression training failed: {e}"))?;

            let train_score = model.predict(&train_ds).confusion_matrix(&train_ds)?.accuracy();
            let test_score = model.predict(&test_ds).confusion_matrix(&test_ds)?.accuracy();
            Ok(Fitted {
                model: BaselineModel::Logistic,
                train_score: f64::from(train_score),
                test_score: f64::from(test_score),
                magnitudes: model.params().iter().map(|c| c.abs()).collect(),
            })
        }
        TargetValues::Classes { .. } => {
            let train_ds = Dataset::new(x_train, codes(view, train));
            let test_ds = Dataset::new(x_test, codes(view, test));
            let model = MultiLogisticRegression::default()
                .max_iterations(settings.max_iterations)
                .fit(&train_ds)
                .map_err(|e| anyhow!("Multinomial Logistic Regression training failed: {e}"))?;

            let train_score = model.predict(&train_ds).confusion_matrix(&train_ds)?.accuracy();
            let test_score = model.predict(&test_ds).confusion_matrix(&test_ds)?.accuracy();
            let magnitudes = model
                .params()
                .rows()
                .into_iter()
                .map(|row| row.iter().fold(0.0_f64, |m, c| m.max(c.abs())))
                .collect();
            Ok(Fitted {
                model: BaselineModel::MultinomialLogistic,
                train_score: f64::from(train_score),
                test_score: f64::from(test_score),
                magnitudes,
            })
        }
        TargetValues::Continuous(_) => {
            let train_ds = Dataset::new(x_train, values(view, train));
            let test_ds = Dataset::new(x_test, values(view, test));
            // per-sample penalty, so `ridge_penalty` reads like a classic ridge alpha
            let penalty = settings.ridge_penalty / train.len().max(1) as f64;
            let model = ElasticNet::params()
                .penalty(penalty)
                .l1_ratio(0.0)
                .fit(&train_ds)
                .map_err(|e| anyhow!("Ridge Regression training failed: {e}"))?;

            let train_score = model.predict(&train_ds).r2(&train_ds)?;
            let test_score = model.predict(&test_ds).r2(&test_ds)?;
            Ok(Fitted {
                model: BaselineModel::Ridge,
                train_score,
                test_score,
                magnitudes: model.hyperplane().iter().map(|c| c.abs()).collect(),
            })
        }
    }
}

impl BaselineAnalyzer {
    fn run(&self, ctx: &AnalysisContext, view: &TargetView) -> anyhow::Result<AnalyzerOutcome> {
        let settings = &ctx.config.baseline;
        let rows = view.present_rows();
        if rows.len() < settings.min_rows {
            return Ok(AnalyzerOutcome::skipped(
                self.kind(),
                SkipReason::InsufficientRows {
                    required: settings.min_rows,
                    actual: rows.len(),
                },
            ));
        }
        if matches!(view.values, TargetValues::Classes { .. }) && view.class_count() < 2 {
            return Ok(AnalyzerOutcome::skipped(self.kind(), SkipReason::SingleClass));
        }

        let strata = view.strata(&rows);
        let (train, test) = target::split(
            &rows,
            strata.as_deref(),
            ctx.config.analysis.train_ratio,
            ctx.config.analysis.seed,
        );
        let design = Design::build(ctx, &train, settings)?;
        if design.columns.is_empty() {
            return Ok(AnalyzerOutcome::skipped(self.kind(), SkipReason::NoUsableFeatures));
        }

        let fitted = fit(&design, view, &train, &test, settings)?;
        let gap = fitted.train_score - fitted.test_score;
        let band = OverfitBand::from_gap(gap, settings);

        let mut top_features: Vec<FeatureImportance> = design
            .names
            .iter()
            .zip(&fitted.magnitudes)
            .map(|(feature, magnitude)| FeatureImportance {
                feature: feature.clone(),
                magnitude: stats::round_to(*magnitude, 4),
            })
            .collect();
        top_features.sort_by(|a, b| {
            b.magnitude
                .total_cmp(&a.magnitude)
                .then_with(|| a.feature.cmp(&b.feature))
        });
        top_features.truncate(10);

        let metric = match fitted.model {
            BaselineModel::Ridge => ModelMetric::R2,
            BaselineModel::Logistic | BaselineModel::MultinomialLogistic => ModelMetric::Accuracy,
        };

        let mut risks = Vec::new();
        if band > OverfitBand::None {
            risks.push(Risk::new(
                self.kind(),
                band.severity(),
                gap,
                format!("{band:?} overfitting in the baseline model"),
                format!(
                    "train {:.3} vs test {:.3} (gap {:.3})",
                    fitted.train_score, fitted.test_score, gap
                ),
            ));
        }

        tracing::debug!(
            model = ?fitted.model,
            train = fitted.train_score,
            test = fitted.test_score,
            "Baseline model fitted"
        );

        let metrics = BaselineMetrics {
            model: fitted.model,
            metric,
            train_rows: train.len(),
            test_rows: test.len(),
            feature_count: design.columns.len(),
            train_score: stats::round_to(fitted.train_score, 4),
            test_score: stats::round_to(fitted.test_score, 4),
            gap: stats::round_to(gap, 4),
            band,
            noise_floor: stats::round_to((1.0 - fitted.test_score).clamp(0.0, 1.0), 4),
            top_features,
        };
        Ok(AnalyzerOutcome::Applicable(
            ComponentFinding::new(
                self.kind(),
                band.severity(),
                band.score(),
                FindingMetrics::Baseline(metrics),
            )
            .with_risks(risks),
        ))
    }
}

impl Analyzer for BaselineAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Baseline
    }

    fn analyze(&self, ctx: &AnalysisContext) -> AnalyzerOutcome {
        let view = match target::resolve(ctx) {
            Ok(view) => view,
            Err(reason) => return AnalyzerOutcome::skipped(self.kind(), reason),
        };
        self.run(ctx, &view)
            .unwrap_or_else(|e| internal(self.kind(), &e))
    }
}
