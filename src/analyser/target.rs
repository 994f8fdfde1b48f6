//! Target extraction and seeded splitting shared by the supervised analyzers.

use super::{AnalysisContext, SkipReason};
use crate::profiler::ProblemType;
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use rand::seq::SliceRandom as _;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub(crate) enum TargetValues {
    /// Sorted distinct labels and a per-row index into them
    Classes {
        labels: Vec<String>,
        codes: Vec<Option<usize>>,
    },
    Continuous(Vec<Option<f64>>),
}

#[derive(Debug, Clone)]
pub(crate) struct TargetView {
    pub name: String,
    pub values: TargetValues,
}

impl TargetView {
    /// Rows where the target is present.
    pub fn present_rows(&self) -> Vec<usize> {
        match &self.values {
            TargetValues::Classes { codes, .. } => codes
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.map(|_| i))
                .collect(),
            TargetValues::Continuous(values) => values
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.map(|_| i))
                .collect(),
        }
    }

    pub fn class_count(&self) -> usize {
        match &self.values {
            TargetValues::Classes { labels, .. } => labels.len(),
            TargetValues::Continuous(_) => 0,
        }
    }

    pub fn code(&self, row: usize) -> Option<usize> {
        match &self.values {
            TargetValues::Classes { codes, .. } => codes.get(row).copied().flatten(),
            TargetValues::Continuous(_) => None,
        }
    }

    /// Numeric value of the target at `row`; class codes for classification.
    pub fn value(&self, row: usize) -> Option<f64> {
        match &self.values {
            TargetValues::Classes { codes, .. } => {
                codes.get(row).copied().flatten().map(|c| c as f64)
            }
            TargetValues::Continuous(values) => values.get(row).copied().flatten(),
        }
    }

    /// Strata for splitting: class code per row, or `None` for regression.
    pub fn strata(&self, rows: &[usize]) -> Option<Vec<usize>> {
        match &self.values {
            TargetValues::Classes { .. } => {
                Some(rows.iter().map(|r| self.code(*r).unwrap_or(0)).collect())
            }
            TargetValues::Continuous(_) => None,
        }
    }
}

/// Resolve the context's target into typed values, or say why we cannot.
pub(crate) fn resolve(ctx: &AnalysisContext) -> Result<TargetView, SkipReason> {
    let name = ctx.target().ok_or(SkipReason::NoTarget)?.to_owned();
    if !ctx.profile.has_column(&name) {
        return Err(SkipReason::TargetNotFound { target: name });
    }

    let internal = |e: anyhow::Error| SkipReason::InternalError {
        message: format!("{e:#}"),
    };

    let values = match ctx.profile.problem_type {
        ProblemType::Classification => {
            let text = ctx.data.text(&name).map_err(internal)?;
            let mut index: BTreeMap<String, usize> = text
                .iter()
                .flatten()
                .map(|v| (v.clone(), 0))
                .collect();
            for (pos, code) in index.values_mut().enumerate() {
                *code = pos;
            }
            let codes = text
                .iter()
                .map(|v| v.as_ref().and_then(|v| index.get(v).copied()))
                .collect();
            TargetValues::Classes {
                labels: index.into_keys().collect(),
                codes,
            }
        }
        ProblemType::Regression => {
            TargetValues::Continuous(ctx.data.numeric(&name).map_err(internal)?)
        }
        ProblemType::Unknown => return Err(SkipReason::UnsupportedProblemType),
    };

    Ok(TargetView { name, values })
}

/// Deterministic train/test split of `rows`.
///
/// With `strata`, each stratum is shuffled and split separately so both
/// folds see every class.
pub(crate) fn split(
    rows: &[usize],
    strata: Option<&[usize]>,
    train_ratio: f64,
    seed: u64,
) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    match strata {
        Some(labels) => {
            for (row, label) in rows.iter().zip(labels) {
                groups.entry(*label).or_default().push(*row);
            }
        }
        None => {
            groups.insert(0, rows.to_vec());
        }
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for mut members in groups.into_values() {
        members.shuffle(&mut rng);
        let mut cut = (members.len() as f64 * train_ratio).round() as usize;
        // keep at least one row on each side when the group allows it
        if members.len() >= 2 {
            cut = cut.clamp(1, members.len() - 1);
        }
        let held_out = members.split_off(cut.min(members.len()));
        train.extend(members);
        test.extend(held_out);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_is_deterministic_and_disjoint() {
        let rows: Vec<usize> = (0..100).collect();
        let (train_a, test_a) = split(&rows, None, 0.8, 42);
        let (train_b, test_b) = split(&rows, None, 0.8, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(train_a.len(), 80);
        assert_eq!(test_a.len(), 20);
        assert!(train_a.iter().all(|r| !test_a.contains(r)));
    }

    #[test]
    fn test_stratified_split_keeps_every_class_in_test() {
        let rows: Vec<usize> = (0..50).collect();
        let strata: Vec<usize> = rows.iter().map(|r| usize::from(*r >= 45)).collect();
        let (_, test) = split(&rows, Some(&strata), 0.8, 7);
        assert!(test.iter().any(|r| *r >= 45));
        assert!(test.iter().any(|r| *r < 45));
    }
}
