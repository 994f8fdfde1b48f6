//! Feature quality: constant, near-constant, high-cardinality and redundant columns.

use super::{
    AnalysisContext, Analyzer, AnalyzerKind, AnalyzerOutcome, ComponentFinding, FindingMetrics,
    Risk, Severity, internal,
};
use crate::profiler::{ColumnProfile, SemanticType};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedundantPair {
    pub left: String,
    pub right: String,
    pub correlation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureQualityMetrics {
    pub feature_count: usize,
    pub constant: Vec<String>,
    pub near_constant: Vec<String>,
    pub high_cardinality: Vec<String>,
    /// Candidate drops; nothing is removed automatically
    pub redundant_pairs: Vec<RedundantPair>,
}

pub struct FeatureQualityAnalyzer;

fn dominant_share(column: &ColumnProfile, values: &[Option<String>]) -> f64 {
    if let Some(share) = column.top_share {
        return share;
    }
    let present: Vec<&str> = values.iter().flatten().map(String::as_str).collect();
    stats::value_counts(present.iter().copied())
        .first()
        .map_or(0.0, |(_, n)| *n as f64 / present.len() as f64)
}

impl Analyzer for FeatureQualityAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::FeatureQuality
    }

    fn analyze(&self, ctx: &AnalysisContext) -> AnalyzerOutcome {
        let settings = &ctx.config.features;
        let features: Vec<&ColumnProfile> = ctx.profile.features().collect();

        let mut constant = Vec::new();
        let mut near_constant = Vec::new();
        let mut high_cardinality = Vec::new();

        for column in &features {
            if column.unique_count <= 1 {
                constant.push(column.name.clone());
                continue;
            }
            let text = match ctx.data.text(&column.name) {
                Ok(t) => t,
                Err(e) => return internal(self.kind(), &e),
            };
            let share = dominant_share(column, &text);
            if share >= settings.near_constant_share
                || (column.unique_ratio < settings.near_constant_unique_ratio && share >= 0.9)
            {
                near_constant.push(column.name.clone());
                continue;
            }
            if column.semantic_type == SemanticType::Categorical
                && column.unique_ratio > settings.high_cardinality_ratio
                && column.unique_count > settings.high_cardinality_min_unique
            {
                high_cardinality.push(column.name.clone());
            }
        }

        let numeric: Vec<&ColumnProfile> = features
            .iter()
            .copied()
            .filter(|c| c.is_numeric() && c.unique_count > 1)
            .collect();
        let mut series = Vec::with_capacity(numeric.len());
        for column in &numeric {
            match ctx.data.numeric(&column.name) {
                Ok(v) => series.push(v),
                Err(e) => return internal(self.kind(), &e),
            }
        }

        let mut redundant_pairs = Vec::new();
        for i in 0..numeric.len() {
            for j in (i + 1)..numeric.len() {
                let (x, y) = stats::paired(&series[i], &series[j]);
                if let Some(r) = stats::pearson(&x, &y)
                    && r.abs() > settings.redundancy_threshold
                {
                    redundant_pairs.push(RedundantPair {
                        left: numeric[i].name.clone(),
                        right: numeric[j].name.clone(),
                        correlation: stats::round_to(r, 4),
                    });
                }
            }
        }

        let mut issue_columns: BTreeSet<&str> = BTreeSet::new();
        issue_columns.extend(constant.iter().map(String::as_str));
        issue_columns.extend(near_constant.iter().map(String::as_str));
        issue_columns.extend(high_cardinality.iter().map(String::as_str));
        issue_columns.extend(redundant_pairs.iter().map(|p| p.right.as_str()));

        let feature_count = features.len();
        let score = if feature_count == 0 {
            100.0
        } else {
            100.0 * (1.0 - issue_columns.len() as f64 / feature_count as f64)
        };

        let severity = if !constant.is_empty() || !redundant_pairs.is_empty() {
            Severity::Medium
        } else if !near_constant.is_empty() || !high_cardinality.is_empty() {
            Severity::Low
        } else {
            Severity::None
        };

        let impact = 1.0 / feature_count.max(1) as f64;
        let mut risks = Vec::new();
        for name in &constant {
            risks.push(
                Risk::new(
                    self.kind(),
                    Severity::Medium,
                    impact,
                    format!("Constant feature '{name}'"),
                    "carries no information",
                )
                .on_column(name),
            );
        }
        for name in &near_constant {
            risks.push(
                Risk::new(
                    self.kind(),
                    Severity::Low,
                    impact,
                    format!("Near-constant feature '{name}'"),
                    "almost every row holds the same value",
                )
                .on_column(name),
            );
        }
        for name in &high_cardinality {
            risks.push(
                Risk::new(
                    self.kind(),
                    Severity::Low,
                    impact,
                    format!("High-cardinality feature '{name}'"),
                    "looks like an identifier; one-hot encoding would explode",
                )
                .on_column(name),
            );
        }
        for pair in &redundant_pairs {
            risks.push(
                Risk::new(
                    self.kind(),
                    Severity::Medium,
                    impact,
                    format!("Redundant pair '{}' / '{}'", pair.left, pair.right),
                    format!("|r| = {:.3}; consider dropping '{}'", pair.correlation.abs(), pair.right),
                )
                .on_column(&pair.right),
            );
        }

        AnalyzerOutcome::Applicable(
            ComponentFinding::new(
                self.kind(),
                severity,
                score,
                FindingMetrics::FeatureQuality(FeatureQualityMetrics {
                    feature_count,
                    constant,
                    near_constant,
                    high_cardinality,
                    redundant_pairs,
                }),
            )
            .with_risks(risks),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::testing::{context, expect_finding};
    use crate::dataset::Dataset;
    use polars::prelude::*;

    fn metrics(finding: &ComponentFinding) -> &FeatureQualityMetrics {
        match &finding.metrics {
            FindingMetrics::FeatureQuality(m) => m,
            other => panic!("unexpected metrics {other:?}"),
        }
    }

    #[test]
    fn test_constant_and_collinear_pair() -> anyhow::Result<()> {
        let x: Vec<f64> = (0..40).map(f64::from).collect();
        let doubled: Vec<f64> = x.iter().map(|v| v * 2.0 + 1.0).collect();
        let noise: Vec<f64> = (0..40).map(|i| f64::from((i * 7) % 11)).collect();
        let data = Dataset::from_series(vec![
            Series::new("x".into(), x),
            Series::new("x2".into(), doubled),
            Series::new("noise".into(), noise),
            Series::new("flat".into(), vec!["same"; 40]),
        ])?;
        let finding = expect_finding(FeatureQualityAnalyzer.analyze(&context(data, None)?));
        let m = metrics(&finding);

        assert_eq!(m.constant, vec!["flat"]);
        assert_eq!(m.redundant_pairs.len(), 1);
        assert_eq!(m.redundant_pairs[0].left, "x");
        assert_eq!(m.redundant_pairs[0].right, "x2");
        assert!((m.redundant_pairs[0].correlation - 1.0).abs() < 1e-9);
        // flat and x2 out of four features
        assert!((finding.score - 50.0).abs() < 1e-9);
        assert_eq!(finding.severity, Severity::Medium);
        Ok(())
    }

    #[test]
    fn test_identifier_is_high_cardinality() -> anyhow::Result<()> {
        let ids: Vec<String> = (0..120).map(|i| format!("user-{i:04}")).collect();
        let data = Dataset::from_series(vec![Series::new("user".into(), ids)])?;
        let finding = expect_finding(FeatureQualityAnalyzer.analyze(&context(data, None)?));
        assert_eq!(metrics(&finding).high_cardinality, vec!["user"]);
        Ok(())
    }

    #[test]
    fn test_near_constant_by_dominant_share() -> anyhow::Result<()> {
        let mut flags = vec![0_i64; 99];
        flags.push(1);
        let data = Dataset::from_series(vec![Series::new("flag".into(), flags)])?;
        let finding = expect_finding(FeatureQualityAnalyzer.analyze(&context(data, None)?));
        assert_eq!(metrics(&finding).near_constant, vec!["flag"]);
        Ok(())
    }
}
