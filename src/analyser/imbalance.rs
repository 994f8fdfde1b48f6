//! Class balance for classification targets, target shape for regression.

use super::distribution::{NumericShape, ShapeFlag, numeric_shape};
use super::target::{self, TargetValues};
use super::{
    AnalysisContext, Analyzer, AnalyzerKind, AnalyzerOutcome, ComponentFinding, FindingMetrics,
    Risk, Severity, SkipReason,
};
use crate::config::ImbalanceSettings;
use crate::stats;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceBand {
    Balanced,
    Mild,
    Moderate,
    Severe,
}

impl BalanceBand {
    pub fn from_ratio(ratio: f64, settings: &ImbalanceSettings) -> Self {
        if ratio < settings.balanced_below {
            Self::Balanced
        } else if ratio < settings.mild_below {
            Self::Mild
        } else if ratio <= settings.severe_above {
            Self::Moderate
        } else {
            Self::Severe
        }
    }

    const fn severity(self) -> Severity {
        match self {
            Self::Balanced => Severity::None,
            Self::Mild => Severity::Low,
            Self::Moderate => Severity::Medium,
            Self::Severe => Severity::High,
        }
    }

    const fn score(self) -> f64 {
        match self {
            Self::Balanced => 100.0,
            Self::Mild => 90.0,
            Self::Moderate => 70.0,
            Self::Severe => 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImbalanceMetrics {
    Classes {
        /// Largest class first, ties by label
        counts: Vec<ClassCount>,
        majority: String,
        minority: String,
        ratio: f64,
        band: BalanceBand,
    },
    TargetShape {
        shape: NumericShape,
    },
}

pub struct ImbalanceAnalyzer;

impl ImbalanceAnalyzer {
    fn classes(
        &self,
        labels: &[String],
        codes: &[Option<usize>],
        settings: &ImbalanceSettings,
    ) -> AnalyzerOutcome {
        let mut tally = vec![0_usize; labels.len()];
        for code in codes.iter().flatten() {
            tally[*code] += 1;
        }
        let mut counts: Vec<ClassCount> = labels
            .iter()
            .zip(tally)
            .filter(|(_, n)| *n > 0)
            .map(|(label, count)| ClassCount {
                label: label.clone(),
                count,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

        let (Some(majority), Some(minority)) = (counts.first(), counts.last()) else {
            return AnalyzerOutcome::skipped(self.kind(), SkipReason::SingleClass);
        };
        if counts.len() < 2 {
            return AnalyzerOutcome::skipped(self.kind(), SkipReason::SingleClass);
        }

        let ratio = majority.count as f64 / minority.count as f64;
        let band = BalanceBand::from_ratio(ratio, settings);
        let total: usize = counts.iter().map(|c| c.count).sum();

        let mut risks = Vec::new();
        if band != BalanceBand::Balanced {
            risks.push(Risk::new(
                self.kind(),
                band.severity(),
                1.0 - minority.count as f64 / total as f64,
                format!("{band:?} class imbalance"),
                format!(
                    "'{}' outnumbers '{}' {:.2}:1",
                    majority.label, minority.label, ratio
                ),
            ));
        }

        let metrics = ImbalanceMetrics::Classes {
            majority: majority.label.clone(),
            minority: minority.label.clone(),
            ratio: stats::round_to(ratio, 4),
            band,
            counts,
        };
        AnalyzerOutcome::Applicable(
            ComponentFinding::new(
                self.kind(),
                band.severity(),
                band.score(),
                FindingMetrics::Imbalance(metrics),
            )
            .with_risks(risks),
        )
    }

    fn target_shape(
        &self,
        ctx: &AnalysisContext,
        name: &str,
        values: &[Option<f64>],
    ) -> AnalyzerOutcome {
        let settings = &ctx.config.imbalance;
        let present = stats::finite(values);
        let Some(shape) = numeric_shape(name, &present, &ctx.config.distribution) else {
            return AnalyzerOutcome::skipped(
                self.kind(),
                SkipReason::InsufficientRows {
                    required: 3,
                    actual: present.len(),
                },
            );
        };

        let mut severity = match shape.skew_flag {
            ShapeFlag::Low => Severity::None,
            ShapeFlag::Moderate => Severity::Low,
            ShapeFlag::High => Severity::Medium,
        };
        if shape.outlier_pct > settings.target_outlier_pct {
            severity = severity.max(Severity::Medium);
        }
        let score = match severity {
            Severity::None => 100.0,
            Severity::Low => 85.0,
            _ => 60.0,
        };

        let mut risks = Vec::new();
        if severity > Severity::None {
            risks.push(
                Risk::new(
                    self.kind(),
                    severity,
                    0.5,
                    format!("Skewed target '{name}'"),
                    format!(
                        "skewness {:.2}, {:.1}% outliers",
                        shape.skew.unwrap_or_default(),
                        shape.outlier_pct
                    ),
                )
                .on_column(name),
            );
        }

        AnalyzerOutcome::Applicable(
            ComponentFinding::new(
                self.kind(),
                severity,
                score,
                FindingMetrics::Imbalance(ImbalanceMetrics::TargetShape { shape }),
            )
            .with_risks(risks),
        )
    }
}

impl Analyzer for ImbalanceAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Imbalance
    }

    fn analyze(&self, ctx: &AnalysisContext) -> AnalyzerOutcome {
        let view = match target::resolve(ctx) {
            Ok(view) => view,
            Err(reason) => return AnalyzerOutcome::skipped(self.kind(), reason),
        };
        match &view.values {
            TargetValues::Classes { labels, codes } => {
                self.classes(labels, codes, &ctx.config.imbalance)
            }
            TargetValues::Continuous(values) => self.target_shape(ctx, &view.name, values),
        }
    }
}
