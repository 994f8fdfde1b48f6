//! Group fairness over caller-declared sensitive columns.

use super::target::{self, TargetValues, TargetView};
use super::{
    AnalysisContext, Analyzer, AnalyzerKind, AnalyzerOutcome, ComponentFinding, FindingMetrics,
    Risk, Severity, SkipReason,
};
use crate::config::BiasSettings;
use crate::profiler::ColumnProfile;
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParityKind {
    /// Gap in positive rate between groups
    PositiveRate,
    /// Largest per-class gap in rate between groups
    ClassRate,
    /// Gap in group means over the target's std
    StandardizedMean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupOutcome {
    pub group: String,
    pub rows: usize,
    /// Positive rate, or mean target for regression
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityReport {
    pub column: String,
    pub kind: ParityKind,
    pub difference: f64,
    pub groups: Vec<GroupOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyFeature {
    pub feature: String,
    pub sensitive: String,
    pub association: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasMetrics {
    pub sensitive_columns: Vec<String>,
    /// Declared but absent from the data
    pub missing_columns: Vec<String>,
    pub parity: Vec<ParityReport>,
    pub max_parity_difference: f64,
    pub proxies: Vec<ProxyFeature>,
}

pub struct BiasAnalyzer;

fn parity_severity(difference: f64, settings: &BiasSettings) -> Severity {
    if difference > settings.parity_high {
        Severity::High
    } else if difference > settings.parity_medium {
        Severity::Medium
    } else if difference > settings.parity_low {
        Severity::Low
    } else {
        Severity::None
    }
}

fn spread(values: impl Iterator<Item = f64>) -> f64 {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if lo.is_finite() && hi.is_finite() { hi - lo } else { 0.0 }
}

fn parity(
    column: &str,
    groups: &[Option<String>],
    view: &TargetView,
    settings: &BiasSettings,
) -> Option<ParityReport> {
    let mut members: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for row in view.present_rows() {
        if let Some(g) = groups[row].as_deref() {
            members.entry(g).or_default().push(row);
        }
    }
    members.retain(|_, rows| rows.len() >= settings.min_group_size);
    if members.len() < 2 {
        return None;
    }

    let rate = |rows: &[usize], class: usize| {
        rows.iter().filter(|r| view.code(**r) == Some(class)).count() as f64 / rows.len() as f64
    };

    let (kind, difference, groups) = match &view.values {
        TargetValues::Classes { labels, .. } if labels.len() == 2 => {
            let groups: Vec<GroupOutcome> = members
                .iter()
                .map(|(g, rows)| GroupOutcome {
                    group: (*g).to_owned(),
                    rows: rows.len(),
                    value: rate(rows, 1),
                })
                .collect();
            let difference = spread(groups.iter().map(|g| g.value));
            (ParityKind::PositiveRate, difference, groups)
        }
        TargetValues::Classes { labels, .. } => {
            let difference = (0..labels.len())
                .map(|class| spread(members.values().map(|rows| rate(rows, class))))
                .fold(0.0, f64::max);
            let groups = members
                .iter()
                .map(|(g, rows)| GroupOutcome {
                    group: (*g).to_owned(),
                    rows: rows.len(),
                    value: rate(rows, 0),
                })
                .collect();
            (ParityKind::ClassRate, difference, groups)
        }
        TargetValues::Continuous(values) => {
            let all = stats::finite(values);
            let std = stats::std_dev(&all)?;
            if std <= f64::EPSILON {
                return None;
            }
            let groups: Vec<GroupOutcome> = members
                .iter()
                .filter_map(|(g, rows)| {
                    let vals: Vec<f64> = rows.iter().filter_map(|r| view.value(*r)).collect();
                    Some(GroupOutcome {
                        group: (*g).to_owned(),
                        rows: rows.len(),
                        value: stats::mean(&vals)?,
                    })
                })
                .collect();
            let difference = spread(groups.iter().map(|g| g.value)) / std;
            (ParityKind::StandardizedMean, difference, groups)
        }
    };

    Some(ParityReport {
        column: column.to_owned(),
        kind,
        difference: stats::round_to(difference, 4),
        groups,
    })
}

/// Association between a feature and a sensitive column, in `[0, 1]`.
fn association(
    ctx: &AnalysisContext,
    feature: &ColumnProfile,
    sensitive: &ColumnProfile,
) -> anyhow::Result<Option<f64>> {
    let value = match (feature.is_numeric(), sensitive.is_numeric()) {
        (true, true) => {
            let (x, y) = stats::paired(
                &ctx.data.numeric(&feature.name)?,
                &ctx.data.numeric(&sensitive.name)?,
            );
            stats::pearson(&x, &y).map(f64::abs)
        }
        (true, false) | (false, true) => {
            let (num, cat) = if feature.is_numeric() {
                (feature, sensitive)
            } else {
                (sensitive, feature)
            };
            let values = ctx.data.numeric(&num.name)?;
            let levels = ctx.data.text(&cat.name)?;
            let (groups, xs): (Vec<String>, Vec<f64>) = levels
                .into_iter()
                .zip(values)
                .filter_map(|(g, v)| Some((g?, v?)))
                .unzip();
            stats::correlation_ratio(&groups, &xs)
        }
        (false, false) => {
            let (a, b): (Vec<String>, Vec<String>) = ctx
                .data
                .text(&feature.name)?
                .into_iter()
                .zip(ctx.data.text(&sensitive.name)?)
                .filter_map(|(a, b)| Some((a?, b?)))
                .unzip();
            stats::cramers_v(&a, &b)
        }
    };
    Ok(value)
}

impl Analyzer for BiasAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Bias
    }

    fn analyze(&self, ctx: &AnalysisContext) -> AnalyzerOutcome {
        let settings = &ctx.config.bias;
        let declared = ctx.sensitive_columns();
        let (present, missing_columns): (Vec<String>, Vec<String>) = declared
            .into_iter()
            .partition(|c| ctx.profile.has_column(c));
        if present.is_empty() {
            return AnalyzerOutcome::skipped(self.kind(), SkipReason::NoSensitiveColumns);
        }

        // Without a usable target only proxies are evaluated.
        let view = target::resolve(ctx).ok();

        let mut reports = Vec::new();
        if let Some(view) = &view {
            for column in &present {
                let groups = match ctx.data.text(column) {
                    Ok(g) => g,
                    Err(e) => return super::internal(self.kind(), &e),
                };
                reports.extend(parity(column, &groups, view, settings));
            }
        }

        let mut proxies = Vec::new();
        let target = ctx.target();
        for sensitive in present.iter().filter_map(|c| ctx.profile.column(c)) {
            for feature in ctx.profile.columns.iter().filter(|c| {
                Some(c.name.as_str()) != target && !present.contains(&c.name) && c.unique_count > 1
            }) {
                match association(ctx, feature, sensitive) {
                    Ok(Some(a)) if a >= settings.proxy_threshold => proxies.push(ProxyFeature {
                        feature: feature.name.clone(),
                        sensitive: sensitive.name.clone(),
                        association: stats::round_to(a, 4),
                    }),
                    Ok(_) => {}
                    Err(e) => return super::internal(self.kind(), &e),
                }
            }
        }

        let max_parity = reports.iter().map(|r| r.difference).fold(0.0, f64::max);
        let mut severity = parity_severity(max_parity, settings);
        if !proxies.is_empty() {
            severity = severity.max(Severity::Medium);
        }
        let score = 100.0 - 250.0 * max_parity - 10.0 * proxies.len() as f64;

        let mut risks: Vec<Risk> = reports
            .iter()
            .filter_map(|r| {
                let sev = parity_severity(r.difference, settings);
                (sev > Severity::None).then(|| {
                    Risk::new(
                        self.kind(),
                        sev,
                        r.difference,
                        format!("Outcome disparity across '{}'", r.column),
                        format!("parity difference {:.3}", r.difference),
                    )
                    .on_column(&r.column)
                })
            })
            .collect();
        risks.extend(proxies.iter().map(|p| {
            Risk::new(
                self.kind(),
                Severity::Medium,
                p.association,
                format!("'{}' may proxy '{}'", p.feature, p.sensitive),
                format!("association {:.3}", p.association),
            )
            .on_column(&p.feature)
        }));

        AnalyzerOutcome::Applicable(
            ComponentFinding::new(
                self.kind(),
                severity,
                score,
                FindingMetrics::Bias(BiasMetrics {
                    sensitive_columns: present,
                    missing_columns,
                    parity: reports,
                    max_parity_difference: stats::round_to(max_parity, 4),
                    proxies,
                }),
            )
            .with_risks(risks),
        )
    }
}
