//! Composite health scoring.
//!
//! The [`Scorer`] is the join point of the analyzer fan-out. Applicable
//! findings contribute `weight × score`; non-applicable ones drop out of both
//! numerator and denominator, so a dataset without a target is judged only on
//! the analyzers that could run.

use crate::analyser::{AnalyzerKind, AnalyzerOutcome, Risk, Severity, SkipReason};
use crate::config::ScoringSettings;
use crate::stats;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Excellent,
    Good,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_score: f64,
    pub grade: Grade,
    pub verdict: Verdict,
    pub top_risks: Vec<Risk>,
    pub component_scores: BTreeMap<AnalyzerKind, f64>,
    pub skipped: BTreeMap<AnalyzerKind, SkipReason>,
    pub findings: Vec<AnalyzerOutcome>,
}

impl HealthReport {
    pub fn applicable_count(&self) -> usize {
        self.component_scores.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scorer {
    settings: ScoringSettings,
}

impl Scorer {
    pub fn new(settings: ScoringSettings) -> Self {
        Self { settings }
    }

    pub fn score(&self, findings: Vec<AnalyzerOutcome>) -> HealthReport {
        let mut component_scores = BTreeMap::new();
        let mut skipped = BTreeMap::new();
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        let mut risks: Vec<Risk> = Vec::new();

        for outcome in &findings {
            match outcome {
                AnalyzerOutcome::Applicable(finding) => {
                    let weight = self.settings.weight(finding.analyzer);
                    weighted += weight * finding.score;
                    total_weight += weight;
                    component_scores.insert(finding.analyzer, finding.score);
                    risks.extend(
                        finding
                            .risks
                            .iter()
                            .filter(|r| r.severity >= Severity::Low)
                            .cloned(),
                    );
                }
                AnalyzerOutcome::NotApplicable { analyzer, reason } => {
                    skipped.insert(*analyzer, reason.clone());
                }
            }
        }

        let overall_score = if total_weight > 0.0 {
            stats::round_to(weighted / total_weight, 1)
        } else {
            0.0
        };

        let (grade, verdict) = if component_scores.is_empty() {
            (Grade::F, Verdict::Critical)
        } else {
            (self.grade(overall_score), self.verdict(overall_score))
        };

        risks.sort_by(rank_risks);
        risks.truncate(self.settings.top_risks);

        tracing::info!(
            overall_score,
            %grade,
            ?verdict,
            applicable = component_scores.len(),
            skipped = skipped.len(),
            "Health report scored"
        );

        HealthReport {
            overall_score,
            grade,
            verdict,
            top_risks: risks,
            component_scores,
            skipped,
            findings,
        }
    }

    fn grade(&self, score: f64) -> Grade {
        let [a, b, c, d] = self.settings.grade_bands;
        if score >= a {
            Grade::A
        } else if score >= b {
            Grade::B
        } else if score >= c {
            Grade::C
        } else if score >= d {
            Grade::D
        } else {
            Grade::F
        }
    }

    fn verdict(&self, score: f64) -> Verdict {
        let [excellent, good, warning] = self.settings.verdict_bands;
        if score >= excellent {
            Verdict::Excellent
        } else if score >= good {
            Verdict::Good
        } else if score >= warning {
            Verdict::Warning
        } else {
            Verdict::Critical
        }
    }
}

fn rank_risks(a: &Risk, b: &Risk) -> Ordering {
    b.weight()
        .partial_cmp(&a.weight())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.analyzer.priority().cmp(&b.analyzer.priority()))
        .then_with(|| a.title.cmp(&b.title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::features::FeatureQualityMetrics;
    use crate::analyser::{ComponentFinding, FindingMetrics};

    fn finding(kind: AnalyzerKind, score: f64, risks: Vec<Risk>) -> AnalyzerOutcome {
        let metrics = FindingMetrics::FeatureQuality(FeatureQualityMetrics {
            feature_count: 0,
            constant: Vec::new(),
            near_constant: Vec::new(),
            high_cardinality: Vec::new(),
            redundant_pairs: Vec::new(),
        });
        AnalyzerOutcome::Applicable(
            ComponentFinding::new(kind, Severity::None, score, metrics).with_risks(risks),
        )
    }

    #[test]
    fn test_skipped_components_leave_the_denominator() {
        let report = Scorer::default().score(vec![
            finding(AnalyzerKind::Missing, 80.0, Vec::new()),
            finding(AnalyzerKind::Distribution, 60.0, Vec::new()),
            AnalyzerOutcome::skipped(AnalyzerKind::Leakage, SkipReason::NoTarget),
            AnalyzerOutcome::skipped(AnalyzerKind::Baseline, SkipReason::NoTarget),
        ]);

        // equal default weights for the two applicable components
        assert!((report.overall_score - 70.0).abs() < 1e-9);
        assert_eq!(report.grade, Grade::C);
        assert_eq!(report.verdict, Verdict::Good);
        assert_eq!(report.component_scores.len(), 2);
        assert_eq!(report.skipped.get(&AnalyzerKind::Leakage), Some(&SkipReason::NoTarget));
        assert_eq!(report.findings.len(), 4);
    }

    #[test]
    fn test_weights_favour_leakage() {
        let report = Scorer::default().score(vec![
            finding(AnalyzerKind::Missing, 100.0, Vec::new()),
            finding(AnalyzerKind::Leakage, 0.0, Vec::new()),
        ]);
        // (10 * 100 + 30 * 0) / 40
        assert!((report.overall_score - 25.0).abs() < 1e-9);
        assert_eq!(report.verdict, Verdict::Critical);
        assert_eq!(report.grade, Grade::F);
    }

    #[test]
    fn test_nothing_applicable_is_critical() {
        let report = Scorer::default().score(vec![AnalyzerOutcome::skipped(
            AnalyzerKind::Bias,
            SkipReason::NoSensitiveColumns,
        )]);
        assert!(report.overall_score.abs() < f64::EPSILON);
        assert_eq!(report.verdict, Verdict::Critical);
        assert_eq!(report.applicable_count(), 0);
    }

    #[test]
    fn test_top_risks_ranked_with_priority_tiebreak() {
        let medium = |kind| Risk::new(kind, Severity::Medium, 0.5, format!("{kind} risk"), "");
        let report = Scorer::default().score(vec![
            finding(
                AnalyzerKind::Missing,
                90.0,
                vec![
                    medium(AnalyzerKind::Missing),
                    Risk::new(AnalyzerKind::Missing, Severity::None, 1.0, "ignored", ""),
                ],
            ),
            finding(
                AnalyzerKind::Distribution,
                90.0,
                vec![Risk::new(AnalyzerKind::Distribution, Severity::High, 0.9, "skew", "")],
            ),
            finding(AnalyzerKind::Bias, 90.0, vec![medium(AnalyzerKind::Bias)]),
            finding(
                AnalyzerKind::FeatureQuality,
                90.0,
                vec![Risk::new(AnalyzerKind::FeatureQuality, Severity::Low, 0.2, "c", "")],
            ),
        ]);

        let titles: Vec<&str> = report.top_risks.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["skew", "bias risk", "missing risk"]);
    }
}
