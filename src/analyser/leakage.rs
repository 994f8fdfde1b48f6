//! Target leakage probes.
//!
//! Four independent detections, each per feature:
//!
//! - correlation with the target (Pearson, point-biserial, eta or Cramér's V)
//! - a single-feature model on a seeded split (test R² or oriented AUC)
//! - temporal ordering against a reference timestamp, plus post-event names
//! - group aggregates that reproduce the per-group target mean
//!
//! The worst detection per feature decides its risk.

use super::target::{self, TargetValues, TargetView};
use super::{
    AnalysisContext, Analyzer, AnalyzerKind, AnalyzerOutcome, ComponentFinding, FindingMetrics,
    Risk, Severity, SkipReason, internal,
};
use crate::config::LeakageSettings;
use crate::profiler::{ColumnProfile, SemanticType};
use crate::stats;
use anyhow::anyhow;
use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

const NULL_KEY: &str = "\u{0}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakageRisk {
    Low,
    High,
    Critical,
}

/// Ordered by preference when two probes agree on the risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    SingleFeature,
    Correlation,
    TargetAggregate,
    TemporalOrder,
    PostEventName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMeasure {
    Pearson,
    PointBiserial,
    Eta,
    CramersV,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleFeatureMetric {
    R2,
    Auc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureLeakage {
    pub feature: String,
    pub risk: LeakageRisk,
    /// Score of the deciding detection
    pub score: f64,
    pub method: Option<DetectionMethod>,
    pub correlation: Option<f64>,
    pub single_feature_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationEntry {
    pub feature: String,
    pub coefficient: f64,
    pub measure: AssociationMeasure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakageMetrics {
    pub rows_used: usize,
    pub single_feature_metric: SingleFeatureMetric,
    pub reference_timestamp: Option<String>,
    /// Riskiest first
    pub features: Vec<FeatureLeakage>,
    /// Top ten by absolute association
    pub correlation_ranking: Vec<CorrelationEntry>,
    pub critical_count: usize,
    pub high_count: usize,
}

impl LeakageMetrics {
    pub fn feature(&self, name: &str) -> Option<&FeatureLeakage> {
        self.features.iter().find(|f| f.feature == name)
    }
}

pub struct LeakageAnalyzer;

#[derive(Debug, Clone, Copy)]
struct Detection {
    risk: LeakageRisk,
    score: f64,
    method: DetectionMethod,
}

#[derive(Debug, Default)]
struct FeatureState {
    correlation: Option<f64>,
    single_feature_score: Option<f64>,
    detections: Vec<Detection>,
}

impl FeatureState {
    fn detect(&mut self, risk: Option<LeakageRisk>, score: f64, method: DetectionMethod) {
        if let Some(risk) = risk {
            self.detections.push(Detection {
                risk,
                score,
                method,
            });
        }
    }

    fn worst(&self) -> Option<Detection> {
        self.detections
            .iter()
            .copied()
            .max_by(|a, b| a.risk.cmp(&b.risk).then(b.method.cmp(&a.method)))
    }
}

enum FeatureValues {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

fn banded(value: f64, critical: f64, high: f64) -> Option<LeakageRisk> {
    if value >= critical {
        Some(LeakageRisk::Critical)
    } else if value >= high {
        Some(LeakageRisk::High)
    } else {
        None
    }
}

fn name_tokens(name: &str) -> impl Iterator<Item = String> + '_ {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Rows with a present target and the seeded split over them.
struct Probe<'a> {
    view: &'a TargetView,
    rows: Vec<usize>,
    train: Vec<usize>,
    test: Vec<usize>,
    identifier_level_share: f64,
}

impl Probe<'_> {
    fn is_multiclass(&self) -> bool {
        self.view.class_count() > 2
    }

    /// Nearly one level per row: every group statistic is trivially perfect.
    fn is_identifier(&self, x: &[Option<String>]) -> bool {
        let levels: HashSet<&str> = self
            .rows
            .iter()
            .filter_map(|&r| x.get(r)?.as_deref())
            .collect();
        levels.len() as f64 > self.identifier_level_share * self.rows.len() as f64
    }

    fn correlation(&self, feature: &FeatureValues) -> Option<(f64, AssociationMeasure)> {
        match (&self.view.values, feature) {
            (TargetValues::Continuous(_), FeatureValues::Numeric(x))
            | (TargetValues::Classes { .. }, FeatureValues::Numeric(x))
                if !self.is_multiclass() =>
            {
                let (a, b): (Vec<f64>, Vec<f64>) = self
                    .rows
                    .iter()
                    .filter_map(|&r| Some((x[r]?, self.view.value(r)?)))
                    .unzip();
                let measure = if matches!(self.view.values, TargetValues::Classes { .. }) {
                    AssociationMeasure::PointBiserial
                } else {
                    AssociationMeasure::Pearson
                };
                stats::pearson(&a, &b).map(|r| (r, measure))
            }
            (_, FeatureValues::Numeric(x)) => {
                let (codes, values): (Vec<usize>, Vec<f64>) = self
                    .rows
                    .iter()
                    .filter_map(|&r| Some((self.view.code(r)?, x[r]?)))
                    .unzip();
                stats::correlation_ratio(&codes, &values).map(|eta| (eta, AssociationMeasure::Eta))
            }
            (_, FeatureValues::Categorical(x)) if self.is_identifier(x) => None,
            (_, FeatureValues::Categorical(x)) if self.is_multiclass() => {
                let (levels, codes): (Vec<&str>, Vec<usize>) = self
                    .rows
                    .iter()
                    .filter_map(|&r| {
                        Some((x[r].as_deref().unwrap_or(NULL_KEY), self.view.code(r)?))
                    })
                    .unzip();
                stats::cramers_v(&levels, &codes).map(|v| (v, AssociationMeasure::CramersV))
            }
            (_, FeatureValues::Categorical(x)) => {
                let (levels, values): (Vec<&str>, Vec<f64>) = self
                    .rows
                    .iter()
                    .filter_map(|&r| {
                        Some((x[r].as_deref().unwrap_or(NULL_KEY), self.view.value(r)?))
                    })
                    .unzip();
                stats::correlation_ratio(&levels, &values).map(|eta| (eta, AssociationMeasure::Eta))
            }
        }
    }

    fn single_feature(&self, feature: &FeatureValues) -> Option<f64> {
        match (&self.view.values, feature) {
            (TargetValues::Continuous(_), FeatureValues::Numeric(x)) => {
                self.ols_r2(x).unwrap_or_else(|e| {
                    tracing::debug!("Single-feature fit skipped: {e:#}");
                    None
                })
            }
            (TargetValues::Continuous(_), FeatureValues::Categorical(x)) => {
                let encoded = self.encode(x, |r| self.view.value(r));
                let (actual, predicted): (Vec<f64>, Vec<f64>) = self
                    .test
                    .iter()
                    .filter_map(|&r| Some((self.view.value(r)?, encoded[r]?)))
                    .unzip();
                stats::r2(&actual, &predicted)
            }
            (TargetValues::Classes { .. }, FeatureValues::Numeric(x)) => {
                self.macro_auc(|class| self.class_auc(x, class))
            }
            (TargetValues::Classes { .. }, FeatureValues::Categorical(x)) => {
                self.macro_auc(|class| {
                    let rate = self.encode(x, |r| {
                        self.view.code(r).map(|c| if c == class { 1.0 } else { 0.0 })
                    });
                    self.class_auc(&rate, class)
                })
            }
        }
    }

    /// Test R² of a one-feature least-squares fit.
    fn ols_r2(&self, x: &[Option<f64>]) -> anyhow::Result<Option<f64>> {
        let fold = |rows: &[usize]| -> (Vec<f64>, Vec<f64>) {
            rows.iter()
                .filter_map(|&r| Some((x[r]?, self.view.value(r)?)))
                .unzip()
        };
        let (train_x, train_y) = fold(&self.train);
        let (test_x, test_y) = fold(&self.test);
        if train_x.len() < 3 || test_x.len() < 2 {
            return Ok(None);
        }
        if stats::std_dev(&train_x).is_none_or(|s| s <= f64::EPSILON) {
            return Ok(None);
        }

        let dataset = Dataset::new(
            Array2::from_shape_vec((train_x.len(), 1), train_x)?,
            Array1::from_vec(train_y),
        );
        let model = LinearRegression::default()
            .fit(&dataset)
            .map_err(|e| anyhow!("Single-feature regression failed: {e}"))?;
        let predicted = model.predict(&Array2::from_shape_vec((test_x.len(), 1), test_x)?);
        Ok(stats::r2(&test_y, &predicted.to_vec()))
    }

    /// Test AUC of `scores` for one class, oriented on the training fold.
    fn class_auc(&self, scores: &[Option<f64>], class: usize) -> Option<f64> {
        let fold = |rows: &[usize]| -> (Vec<f64>, Vec<bool>) {
            rows.iter()
                .filter_map(|&r| Some((scores[r]?, self.view.code(r)? == class)))
                .unzip()
        };
        let (train_scores, train_labels) = fold(&self.train);
        let (test_scores, test_labels) = fold(&self.test);
        let train_auc = stats::auc(&train_scores, &train_labels)?;
        let test_auc = stats::auc(&test_scores, &test_labels)?;
        Some(if train_auc < 0.5 { 1.0 - test_auc } else { test_auc })
    }

    /// Binary: AUC of the second class. Multiclass: macro one-vs-rest.
    fn macro_auc(&self, per_class: impl Fn(usize) -> Option<f64>) -> Option<f64> {
        let classes = self.view.class_count();
        let aucs: Vec<f64> = if classes == 2 {
            per_class(1).into_iter().collect()
        } else {
            (0..classes).filter_map(per_class).collect()
        };
        stats::mean(&aucs)
    }

    /// Per-level mean of `target` over the training fold, applied to every row.
    fn encode(
        &self,
        x: &[Option<String>],
        target: impl Fn(usize) -> Option<f64>,
    ) -> Vec<Option<f64>> {
        let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
        let mut all = Vec::with_capacity(self.train.len());
        for &r in &self.train {
            if let Some(t) = target(r) {
                let entry = sums
                    .entry(x[r].as_deref().unwrap_or(NULL_KEY))
                    .or_insert((0.0, 0));
                entry.0 += t;
                entry.1 += 1;
                all.push(t);
            }
        }
        let Some(global) = stats::mean(&all) else {
            return vec![None; x.len()];
        };
        x.iter()
            .map(|v| {
                let key = v.as_deref().unwrap_or(NULL_KEY);
                Some(sums.get(key).map_or(global, |(s, n)| s / *n as f64))
            })
            .collect()
    }
}

impl LeakageAnalyzer {
    fn reference_timestamp<'a>(&self, ctx: &'a AnalysisContext) -> Option<&'a str> {
        if let Some(declared) = ctx.timestamp_column()
            && ctx.profile.has_column(declared)
        {
            return Some(declared);
        }
        ctx.profile
            .features()
            .find(|c| c.semantic_type == SemanticType::Datetime)
            .map(|c| c.name.as_str())
    }

    fn temporal(
        &self,
        ctx: &AnalysisContext,
        probe: &Probe<'_>,
        reference: &str,
        states: &mut BTreeMap<String, FeatureState>,
    ) -> anyhow::Result<()> {
        let settings = &ctx.config.leakage;
        let base = ctx.data.timestamps(reference)?;

        for column in ctx.profile.features().filter(|c| c.name != reference) {
            if column.semantic_type == SemanticType::Datetime {
                let stamps = ctx.data.timestamps(&column.name)?;
                let pairs: Vec<(i64, i64)> = probe
                    .rows
                    .iter()
                    .filter_map(|&r| Some((stamps[r]?, base[r]?)))
                    .collect();
                if !pairs.is_empty() {
                    let later = pairs.iter().filter(|(f, b)| f > b).count();
                    let share = later as f64 / pairs.len() as f64;
                    if share >= settings.temporal_order_share {
                        states.entry(column.name.clone()).or_default().detect(
                            Some(LeakageRisk::High),
                            share,
                            DetectionMethod::TemporalOrder,
                        );
                    }
                }
            }

            let post_event = name_tokens(&column.name)
                .any(|t| settings.post_event_tokens.iter().any(|p| *p == t));
            if post_event {
                states.entry(column.name.clone()).or_default().detect(
                    Some(LeakageRisk::High),
                    1.0,
                    DetectionMethod::PostEventName,
                );
            }
        }
        Ok(())
    }

    fn aggregates(
        &self,
        ctx: &AnalysisContext,
        probe: &Probe<'_>,
        numeric: &[(&ColumnProfile, Vec<Option<f64>>)],
        states: &mut BTreeMap<String, FeatureState>,
    ) -> anyhow::Result<()> {
        let settings = &ctx.config.leakage;
        let groupers = ctx.profile.features().filter(|c| {
            c.semantic_type == SemanticType::Categorical
                && (2..=settings.aggregate_max_groups).contains(&c.unique_count)
        });

        for grouper in groupers {
            let groups = ctx.data.text(&grouper.name)?;
            for (column, values) in numeric {
                let mut per_group: BTreeMap<&str, (f64, f64, f64, usize)> = BTreeMap::new();
                let mut rows = Vec::new();
                for &r in &probe.rows {
                    let (Some(g), Some(v), Some(t)) =
                        (groups[r].as_deref(), values[r], probe.view.value(r))
                    else {
                        continue;
                    };
                    let entry = per_group.entry(g).or_insert((v, v, 0.0, 0));
                    entry.0 = entry.0.min(v);
                    entry.1 = entry.1.max(v);
                    entry.2 += t;
                    entry.3 += 1;
                    rows.push((g, v));
                }
                if per_group.len() < 2 {
                    continue;
                }
                let constant_within = per_group
                    .values()
                    .all(|(lo, hi, _, _)| hi - lo <= 1e-9 * hi.abs().max(1.0));
                if !constant_within {
                    continue;
                }
                let (feature, group_mean): (Vec<f64>, Vec<f64>) = rows
                    .iter()
                    .filter_map(|(g, v)| {
                        per_group.get(g).map(|(_, _, sum, n)| (*v, sum / *n as f64))
                    })
                    .unzip();
                if let Some(r) = stats::pearson(&feature, &group_mean)
                    && r.abs() >= settings.aggregate_threshold
                {
                    states.entry(column.name.clone()).or_default().detect(
                        Some(LeakageRisk::Critical),
                        r.abs(),
                        DetectionMethod::TargetAggregate,
                    );
                }
            }
        }
        Ok(())
    }

    fn run(&self, ctx: &AnalysisContext, view: &TargetView) -> anyhow::Result<AnalyzerOutcome> {
        let settings: &LeakageSettings = &ctx.config.leakage;
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
        let probe = Probe {
            view,
            rows,
            train,
            test,
            identifier_level_share: settings.identifier_level_share,
        };

        let mut states: BTreeMap<String, FeatureState> = BTreeMap::new();
        let mut ranking = Vec::new();
        let mut numeric = Vec::new();

        for column in ctx.profile.features().filter(|c| c.unique_count > 1) {
            let values = match column.semantic_type {
                SemanticType::Numeric => FeatureValues::Numeric(ctx.data.numeric(&column.name)?),
                SemanticType::Categorical => {
                    FeatureValues::Categorical(ctx.data.text(&column.name)?)
                }
                SemanticType::Datetime => continue,
            };
            let state = states.entry(column.name.clone()).or_default();

            if let Some((coefficient, measure)) = probe.correlation(&values) {
                let magnitude = coefficient.abs();
                state.correlation = Some(stats::round_to(coefficient, 4));
                state.detect(
                    banded(magnitude, settings.correlation_critical, settings.correlation_high),
                    magnitude,
                    DetectionMethod::Correlation,
                );
                ranking.push(CorrelationEntry {
                    feature: column.name.clone(),
                    coefficient: stats::round_to(coefficient, 4),
                    measure,
                });
            }

            if let Some(score) = probe.single_feature(&values) {
                state.single_feature_score = Some(stats::round_to(score, 4));
                state.detect(
                    banded(score, settings.single_feature_critical, settings.single_feature_high),
                    score,
                    DetectionMethod::SingleFeature,
                );
            }

            if let FeatureValues::Numeric(x) = values {
                numeric.push((column, x));
            }
        }

        let reference = self.reference_timestamp(ctx);
        if let Some(reference) = reference {
            self.temporal(ctx, &probe, reference, &mut states)?;
        }
        if !probe.is_multiclass() {
            self.aggregates(ctx, &probe, &numeric, &mut states)?;
        }

        ranking.sort_by(|a, b| {
            b.coefficient
                .abs()
                .total_cmp(&a.coefficient.abs())
                .then_with(|| a.feature.cmp(&b.feature))
        });
        ranking.truncate(10);

        let mut features: Vec<FeatureLeakage> = states
            .into_iter()
            .map(|(feature, state)| {
                let worst = state.worst();
                FeatureLeakage {
                    risk: worst.map_or(LeakageRisk::Low, |d| d.risk),
                    score: stats::round_to(
                        worst
                            .map(|d| d.score)
                            .or(state.single_feature_score)
                            .unwrap_or(0.0),
                        4,
                    ),
                    method: worst.map(|d| d.method),
                    correlation: state.correlation,
                    single_feature_score: state.single_feature_score,
                    feature,
                }
            })
            .collect();
        features.sort_by(|a, b| {
            b.risk
                .cmp(&a.risk)
                .then_with(|| b.score.total_cmp(&a.score))
                .then_with(|| a.feature.cmp(&b.feature))
        });

        let critical_count = features
            .iter()
            .filter(|f| f.risk == LeakageRisk::Critical)
            .count();
        let high_count = features
            .iter()
            .filter(|f| f.risk == LeakageRisk::High)
            .count();

        let (severity, score) = if critical_count > 0 {
            (Severity::Critical, 0.0)
        } else if high_count > 3 {
            (Severity::High, 30.0)
        } else if high_count > 1 {
            (Severity::Medium, 50.0)
        } else if high_count == 1 {
            (Severity::Low, 70.0)
        } else {
            (Severity::None, 100.0)
        };

        let risks = features
            .iter()
            .filter(|f| f.risk > LeakageRisk::Low)
            .map(|f| {
                let risk_severity = if f.risk == LeakageRisk::Critical {
                    Severity::Critical
                } else {
                    Severity::High
                };
                let how = match f.method {
                    Some(DetectionMethod::SingleFeature) => {
                        format!("predicts the target on its own (score {:.3})", f.score)
                    }
                    Some(DetectionMethod::Correlation) => {
                        format!("correlates {:.3} with the target", f.score)
                    }
                    Some(DetectionMethod::TargetAggregate) => {
                        "reproduces a per-group mean of the target".to_owned()
                    }
                    Some(DetectionMethod::TemporalOrder) => {
                        "is recorded after the reference timestamp".to_owned()
                    }
                    Some(DetectionMethod::PostEventName) | None => {
                        "is named like a post-event field".to_owned()
                    }
                };
                Risk::new(
                    self.kind(),
                    risk_severity,
                    f.score,
                    format!("Possible target leakage via '{}'", f.feature),
                    format!("'{}' {how}", f.feature),
                )
                .on_column(&f.feature)
            })
            .collect();

        tracing::debug!(
            target = %view.name,
            critical = critical_count,
            high = high_count,
            "Leakage probes complete"
        );

        let metrics = LeakageMetrics {
            rows_used: probe.rows.len(),
            single_feature_metric: if matches!(view.values, TargetValues::Continuous(_)) {
                SingleFeatureMetric::R2
            } else {
                SingleFeatureMetric::Auc
            },
            reference_timestamp: reference.map(str::to_owned),
            features,
            correlation_ranking: ranking,
            critical_count,
            high_count,
        };
        Ok(AnalyzerOutcome::Applicable(
            ComponentFinding::new(self.kind(), severity, score, FindingMetrics::Leakage(metrics))
                .with_risks(risks),
        ))
    }
}

impl Analyzer for LeakageAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Leakage
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
