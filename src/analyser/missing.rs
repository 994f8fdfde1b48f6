//! Missing-value analysis.

use super::{
    AnalysisContext, Analyzer, AnalyzerKind, AnalyzerOutcome, ComponentFinding, FindingMetrics,
    Risk, Severity, internal,
};
use crate::config::MissingSettings;
use crate::profiler::pct;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMissing {
    pub column: String,
    pub missing_count: usize,
    pub missing_pct: f64,
    pub severity: Severity,
    pub is_target: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingMetrics {
    /// Columns with at least one missing value
    pub columns: Vec<ColumnMissing>,
    pub total_missing_cells: usize,
    pub rows_with_any_missing_pct: f64,
    pub max_missing_per_row: usize,
    /// Rows missing more than the configured share of their cells
    pub extreme_rows: usize,
    pub target_missing: usize,
}

pub struct MissingAnalyzer;

/// Bucket a column's missing percentage.
pub fn column_severity(missing_pct: f64, settings: &MissingSettings) -> Severity {
    if missing_pct <= 0.0 {
        Severity::None
    } else if missing_pct < settings.low_below_pct {
        Severity::Low
    } else if missing_pct <= settings.high_above_pct {
        Severity::Medium
    } else {
        Severity::High
    }
}

impl Analyzer for MissingAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Missing
    }

    fn analyze(&self, ctx: &AnalysisContext) -> AnalyzerOutcome {
        let settings = &ctx.config.missing;
        let profile = &ctx.profile;
        let rows = profile.row_count;
        let target = ctx.target();

        let mut per_row = vec![0_usize; rows];
        for column in &profile.columns {
            if !column.has_missing() {
                continue;
            }
            let mask = match ctx.data.null_mask(&column.name) {
                Ok(mask) => mask,
                Err(e) => return internal(self.kind(), &e),
            };
            for (count, missing) in per_row.iter_mut().zip(mask) {
                *count += usize::from(missing);
            }
        }

        let columns: Vec<ColumnMissing> = profile
            .columns
            .iter()
            .filter(|c| c.has_missing())
            .map(|c| {
                let is_target = Some(c.name.as_str()) == target;
                let severity = if is_target {
                    Severity::Critical
                } else {
                    column_severity(c.missing_pct, settings)
                };
                ColumnMissing {
                    column: c.name.clone(),
                    missing_count: c.missing_count,
                    missing_pct: c.missing_pct,
                    severity,
                    is_target,
                }
            })
            .collect();

        let width = profile.column_count.max(1) as f64;
        let extreme_rows = per_row
            .iter()
            .filter(|n| **n as f64 / width * 100.0 > settings.extreme_row_pct)
            .count();
        let rows_with_any = per_row.iter().filter(|n| **n > 0).count();
        let target_missing = columns
            .iter()
            .find(|c| c.is_target)
            .map_or(0, |c| c.missing_count);

        let severity = columns
            .iter()
            .map(|c| c.severity)
            .max()
            .unwrap_or(Severity::None);

        let score = if target_missing > 0 {
            0.0
        } else {
            let share = |s: Severity| {
                columns.iter().filter(|c| c.severity == s).count() as f64 / width
            };
            100.0
                - share(Severity::High) * 60.0
                - share(Severity::Medium) * 25.0
                - share(Severity::Low) * 5.0
                - extreme_rows as f64 / rows.max(1) as f64 * 10.0
        };

        let mut risks: Vec<Risk> = columns
            .iter()
            .filter(|c| c.severity > Severity::None)
            .map(|c| {
                if c.is_target {
                    Risk::new(
                        self.kind(),
                        Severity::Critical,
                        1.0,
                        format!("Target '{}' has missing labels", c.column),
                        format!(
                            "{} row(s) have no label; a model cannot train on them",
                            c.missing_count
                        ),
                    )
                } else {
                    Risk::new(
                        self.kind(),
                        c.severity,
                        c.missing_pct / 100.0,
                        format!("Missing values in '{}'", c.column),
                        format!("{:.1}% of values are missing", c.missing_pct),
                    )
                }
                .on_column(&c.column)
            })
            .collect();

        if extreme_rows > 0 {
            risks.push(Risk::new(
                self.kind(),
                Severity::Medium,
                extreme_rows as f64 / rows.max(1) as f64,
                "Sparse rows",
                format!(
                    "{extreme_rows} row(s) are missing more than {:.0}% of their cells",
                    settings.extreme_row_pct
                ),
            ));
        }

        let metrics = MissingMetrics {
            total_missing_cells: per_row.iter().sum(),
            rows_with_any_missing_pct: pct(rows_with_any, rows),
            max_missing_per_row: per_row.iter().copied().max().unwrap_or(0),
            extreme_rows,
            target_missing,
            columns,
        };

        AnalyzerOutcome::Applicable(
            ComponentFinding::new(
                self.kind(),
                severity,
                score,
                FindingMetrics::Missing(metrics),
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

    fn with_gaps(n: usize, missing: usize) -> Vec<Option<f64>> {
        (0..n)
            .map(|i| if i < missing { None } else { Some(i as f64) })
            .collect()
    }

    fn metrics(finding: &ComponentFinding) -> &MissingMetrics {
        match &finding.metrics {
            FindingMetrics::Missing(m) => m,
            other => panic!("unexpected metrics {other:?}"),
        }
    }

    #[test]
    fn test_severity_monotonic_in_missing_share() -> anyhow::Result<()> {
        let data = Dataset::from_series(vec![
            Series::new("a".into(), with_gaps(100, 3)),
            Series::new("b".into(), with_gaps(100, 35)),
            Series::new("c".into(), with_gaps(100, 0)),
        ])?;
        let finding = expect_finding(MissingAnalyzer.analyze(&context(data, None)?));
        let m = metrics(&finding);

        let sev = |name: &str| m.columns.iter().find(|c| c.column == name).map(|c| c.severity);
        assert_eq!(sev("a"), Some(Severity::Low));
        assert_eq!(sev("b"), Some(Severity::High));
        assert_eq!(sev("c"), None);
        assert_eq!(finding.severity, Severity::High);
        assert!(finding.score > 0.0 && finding.score < 100.0);
        Ok(())
    }

    #[test]
    fn test_missing_target_is_always_critical() -> anyhow::Result<()> {
        let data = Dataset::from_series(vec![
            Series::new("x".into(), with_gaps(200, 0)),
            Series::new("y".into(), with_gaps(200, 1)),
        ])?;
        let finding = expect_finding(MissingAnalyzer.analyze(&context(data, Some("y"))?));
        let m = metrics(&finding);

        assert_eq!(m.target_missing, 1);
        assert_eq!(m.columns[0].severity, Severity::Critical);
        assert_eq!(finding.severity, Severity::Critical);
        assert!(finding.score.abs() < f64::EPSILON);
        assert_eq!(finding.risks[0].severity, Severity::Critical);
        Ok(())
    }

    #[test]
    fn test_row_level_metrics() -> anyhow::Result<()> {
        let data = Dataset::from_series(vec![
            Series::new("a".into(), vec![None, Some(1.0), Some(2.0), Some(3.0)]),
            Series::new("b".into(), vec![None, None, Some(2.0), Some(3.0)]),
            Series::new("c".into(), vec![None, Some(1.0), Some(2.0), Some(3.0)]),
        ])?;
        let finding = expect_finding(MissingAnalyzer.analyze(&context(data, None)?));
        let m = metrics(&finding);

        assert_eq!(m.max_missing_per_row, 3);
        assert_eq!(m.extreme_rows, 1);
        assert_eq!(m.total_missing_cells, 4);
        assert!((m.rows_with_any_missing_pct - 50.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_complete_data_scores_full_marks() -> anyhow::Result<()> {
        let data = Dataset::from_series(vec![Series::new("a".into(), with_gaps(10, 0))])?;
        let finding = expect_finding(MissingAnalyzer.analyze(&context(data, None)?));
        assert_eq!(finding.severity, Severity::None);
        assert!((finding.score - 100.0).abs() < f64::EPSILON);
        assert!(finding.risks.is_empty());
        Ok(())
    }
}
