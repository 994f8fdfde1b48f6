//! Shape of numeric columns and dominance of categorical ones.

use super::{
    AnalysisContext, Analyzer, AnalyzerKind, AnalyzerOutcome, ComponentFinding, FindingMetrics,
    Risk, Severity, internal,
};
use crate::config::DistributionSettings;
use crate::profiler::{SemanticType, pct};
use crate::stats;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeFlag {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericShape {
    pub column: String,
    pub skew: Option<f64>,
    pub skew_flag: ShapeFlag,
    pub kurtosis: Option<f64>,
    pub kurtosis_flag: ShapeFlag,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub outlier_count: usize,
    pub outlier_pct: f64,
    pub outlier_feature: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalShape {
    pub column: String,
    pub top_categories: Vec<(String, usize)>,
    pub dominant_share: f64,
    pub dominant: bool,
    /// Shannon entropy over the maximum for this many levels
    pub normalized_entropy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionMetrics {
    pub numeric: Vec<NumericShape>,
    pub categorical: Vec<CategoricalShape>,
}

pub struct DistributionAnalyzer;

fn skew_flag(skew: Option<f64>, s: &DistributionSettings) -> ShapeFlag {
    match skew.map(f64::abs) {
        Some(v) if v > s.skew_high => ShapeFlag::High,
        Some(v) if v >= s.skew_moderate => ShapeFlag::Moderate,
        _ => ShapeFlag::Low,
    }
}

fn kurtosis_flag(kurtosis: Option<f64>, s: &DistributionSettings) -> ShapeFlag {
    match kurtosis.map(f64::abs) {
        Some(v) if v > s.kurtosis_extreme => ShapeFlag::High,
        Some(v) if v >= s.kurtosis_moderate => ShapeFlag::Moderate,
        _ => ShapeFlag::Low,
    }
}

/// Shape of one numeric column, or `None` with fewer than three values.
pub fn numeric_shape(
    column: &str,
    values: &[f64],
    settings: &DistributionSettings,
) -> Option<NumericShape> {
    if values.len() < 3 {
        return None;
    }
    let sorted = stats::sorted(values);
    let (lower_bound, upper_bound) = stats::iqr_bounds(&sorted, settings.iqr_multiplier)?;
    let outlier_count = values
        .iter()
        .filter(|v| **v < lower_bound || **v > upper_bound)
        .count();
    let outlier_pct = pct(outlier_count, values.len());
    let skew = stats::skewness(values);
    let kurtosis = stats::excess_kurtosis(values);

    Some(NumericShape {
        column: column.to_owned(),
        skew,
        skew_flag: skew_flag(skew, settings),
        kurtosis,
        kurtosis_flag: kurtosis_flag(kurtosis, settings),
        lower_bound,
        upper_bound,
        outlier_count,
        outlier_pct,
        outlier_feature: outlier_pct > settings.outlier_column_pct,
    })
}

impl Analyzer for DistributionAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Distribution
    }

    fn analyze(&self, ctx: &AnalysisContext) -> AnalyzerOutcome {
        let settings = &ctx.config.distribution;
        let mut numeric = Vec::new();
        let mut categorical = Vec::new();

        for column in ctx.profile.features() {
            match column.semantic_type {
                SemanticType::Numeric => {
                    let values = match ctx.data.numeric(&column.name) {
                        Ok(v) => stats::finite(&v),
                        Err(e) => return internal(self.kind(), &e),
                    };
                    numeric.extend(numeric_shape(&column.name, &values, settings));
                }
                SemanticType::Categorical => {
                    let text = match ctx.data.text(&column.name) {
                        Ok(t) => t,
                        Err(e) => return internal(self.kind(), &e),
                    };
                    let counts = stats::value_counts(text.iter().flatten().map(String::as_str));
                    let total: usize = counts.iter().map(|(_, n)| n).sum();
                    if total == 0 {
                        continue;
                    }
                    let dominant_share = counts.first().map_or(0.0, |(_, n)| pct(*n, total));
                    let raw: Vec<usize> = counts.iter().map(|(_, n)| *n).collect();
                    categorical.push(CategoricalShape {
                        column: column.name.clone(),
                        normalized_entropy: stats::normalized_entropy(&raw),
                        top_categories: counts.into_iter().take(5).collect(),
                        dominant_share,
                        dominant: dominant_share > settings.dominance_pct,
                    });
                }
                SemanticType::Datetime => {}
            }
        }

        let mut risks = Vec::new();
        for shape in &numeric {
            if shape.outlier_feature {
                risks.push(
                    Risk::new(
                        self.kind(),
                        Severity::Medium,
                        shape.outlier_pct / 100.0,
                        format!("Outliers in '{}'", shape.column),
                        format!(
                            "{} value(s) ({:.1}%) fall outside [{:.3}, {:.3}]",
                            shape.outlier_count,
                            shape.outlier_pct,
                            shape.lower_bound,
                            shape.upper_bound
                        ),
                    )
                    .on_column(&shape.column),
                );
            }
            if shape.skew_flag == ShapeFlag::High {
                risks.push(
                    Risk::new(
                        self.kind(),
                        Severity::Low,
                        0.5,
                        format!("Heavily skewed '{}'", shape.column),
                        format!("skewness {:.2}", shape.skew.unwrap_or_default()),
                    )
                    .on_column(&shape.column),
                );
            }
        }
        for shape in categorical.iter().filter(|c| c.dominant) {
            risks.push(
                Risk::new(
                    self.kind(),
                    Severity::Low,
                    shape.dominant_share / 100.0,
                    format!("Dominant category in '{}'", shape.column),
                    format!("one level holds {:.1}% of rows", shape.dominant_share),
                )
                .on_column(&shape.column),
            );
        }

        let share = |count: usize, total: usize| {
            if total == 0 { 0.0 } else { count as f64 / total as f64 }
        };
        let high_skew = numeric.iter().filter(|s| s.skew_flag == ShapeFlag::High).count();
        let outlier_features = numeric.iter().filter(|s| s.outlier_feature).count();
        let dominant = categorical.iter().filter(|c| c.dominant).count();

        let score = 100.0
            - 40.0 * share(high_skew, numeric.len())
            - 40.0 * share(outlier_features, numeric.len())
            - 20.0 * share(dominant, categorical.len());

        let severity = if outlier_features > 0 {
            Severity::Medium
        } else if high_skew > 0 || dominant > 0 {
            Severity::Low
        } else {
            Severity::None
        };

        AnalyzerOutcome::Applicable(
            ComponentFinding::new(
                self.kind(),
                severity,
                score,
                FindingMetrics::Distribution(DistributionMetrics {
                    numeric,
                    categorical,
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

    fn metrics(finding: &ComponentFinding) -> &DistributionMetrics {
        match &finding.metrics {
            FindingMetrics::Distribution(m) => m,
            other => panic!("unexpected metrics {other:?}"),
        }
    }

    #[test]
    fn test_single_extreme_value_is_outlier_feature() -> anyhow::Result<()> {
        let mut values: Vec<f64> = (0..15).map(|i| 10.0 + f64::from(i % 5)).collect();
        values.push(1_000.0);
        let data = Dataset::from_series(vec![Series::new("amount".into(), values)])?;
        let finding = expect_finding(DistributionAnalyzer.analyze(&context(data, None)?));
        let shape = &metrics(&finding).numeric[0];

        assert_eq!(shape.outlier_count, 1);
        assert!(shape.outlier_feature);
        assert_eq!(shape.skew_flag, ShapeFlag::High);
        assert_eq!(finding.severity, Severity::Medium);
        assert!(finding.score < 100.0);
        Ok(())
    }

    #[test]
    fn test_skew_bands() {
        let s = DistributionSettings::default();
        assert_eq!(skew_flag(Some(0.2), &s), ShapeFlag::Low);
        assert_eq!(skew_flag(Some(-0.7), &s), ShapeFlag::Moderate);
        assert_eq!(skew_flag(Some(1.4), &s), ShapeFlag::High);
        assert_eq!(skew_flag(None, &s), ShapeFlag::Low);
    }

    #[test]
    fn test_categorical_dominance() -> anyhow::Result<()> {
        let mut labels = vec!["web"; 19];
        labels.push("store");
        let data = Dataset::from_series(vec![Series::new("channel".into(), labels)])?;
        let finding = expect_finding(DistributionAnalyzer.analyze(&context(data, None)?));
        let shape = &metrics(&finding).categorical[0];

        assert!(shape.dominant);
        assert!((shape.dominant_share - 95.0).abs() < 1e-9);
        assert_eq!(shape.top_categories[0], ("web".to_owned(), 19));
        assert!(shape.normalized_entropy < 0.5);
        Ok(())
    }

    #[test]
    fn test_target_is_not_a_feature() -> anyhow::Result<()> {
        let data = Dataset::from_series(vec![
            Series::new("x".into(), vec![1.0, 2.0, 3.0, 4.0]),
            Series::new("y".into(), vec![1.0, 1.0, 1.0, 90.0]),
        ])?;
        let finding = expect_finding(DistributionAnalyzer.analyze(&context(data, Some("y"))?));
        let columns: Vec<&str> = metrics(&finding)
            .numeric
            .iter()
            .map(|s| s.column.as_str())
            .collect();
        assert_eq!(columns, vec!["x"]);
        Ok(())
    }
}
