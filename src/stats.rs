//! Numeric kernels shared by the profiler and the analyzers.
//!
//! All functions take plain slices with nulls already removed (or paired, in
//! the case of two-variable statistics) and return `None` when the statistic
//! is undefined, e.g. zero variance or too few observations.

use polars::prelude::*;
use std::collections::BTreeMap;

pub fn finite(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().flatten().copied().collect()
}

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

fn chunked(values: &[f64]) -> Float64Chunked {
    Float64Chunked::from_slice("values".into(), values)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    chunked(values).mean()
}

/// Sample standard deviation (ddof = 1).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    chunked(values).std(1)
}

/// Quantile with linear interpolation between order statistics.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    chunked(values)
        .quantile(q.clamp(0.0, 1.0), QuantileMethod::Linear)
        .ok()
        .flatten()
}

fn central_moments(values: &[f64]) -> Option<(f64, f64, f64)> {
    let m = mean(values)?;
    let n = values.len() as f64;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in values {
        let d = v - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    Some((m2 / n, m3 / n, m4 / n))
}

/// Biased Fisher-Pearson skewness.
pub fn skewness(values: &[f64]) -> Option<f64> {
    if values.len() < 3 {
        return None;
    }
    let (m2, m3, _) = central_moments(values)?;
    if m2 <= f64::EPSILON {
        return None;
    }
    Some(m3 / m2.powf(1.5))
}

/// Biased excess kurtosis (normal distribution = 0).
pub fn excess_kurtosis(values: &[f64]) -> Option<f64> {
    if values.len() < 4 {
        return None;
    }
    let (m2, _, m4) = central_moments(values)?;
    if m2 <= f64::EPSILON {
        return None;
    }
    Some(m4 / (m2 * m2) - 3.0)
}

/// `[Q1 - k*IQR, Q3 + k*IQR]`.
pub fn iqr_bounds(values: &[f64], k: f64) -> Option<(f64, f64)> {
    let q1 = quantile(values, 0.25)?;
    let q3 = quantile(values, 0.75)?;
    let iqr = q3 - q1;
    Some((q1 - k * iqr, q3 + k * iqr))
}

/// Keep positions where both sides are present.
pub fn paired(x: &[Option<f64>], y: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .unzip()
}

pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 3 {
        return None;
    }
    if [x, y]
        .iter()
        .any(|v| std_dev(v).is_none_or(|sd| sd <= f64::EPSILON))
    {
        return None;
    }
    let r = cov::pearson_corr(&chunked(x), &chunked(y))?;
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Coefficient of determination of `predicted` against `actual`.
pub fn r2(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.len() != predicted.len() || actual.len() < 2 {
        return None;
    }
    let m = mean(actual)?;
    let ss_tot: f64 = actual.iter().map(|a| (a - m).powi(2)).sum();
    if ss_tot <= f64::EPSILON {
        return None;
    }
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    Some(1.0 - ss_res / ss_tot)
}

/// Rank AUC (Mann-Whitney U) of `scores` for the positive labels; ties count half.
pub fn auc(scores: &[f64], positive: &[bool]) -> Option<f64> {
    if scores.len() != positive.len() {
        return None;
    }
    let n_pos = positive.iter().filter(|p| **p).count();
    let n_neg = positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut ranked: Vec<(f64, bool)> = scores
        .iter()
        .copied()
        .zip(positive.iter().copied())
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rank_sum_pos = 0.0;
    let mut start = 0;
    for block in ranked.chunk_by(|a, b| a.0.total_cmp(&b.0).is_eq()) {
        // ranks are 1-based; a tied block shares the average rank
        let avg_rank = start as f64 + (block.len() + 1) as f64 / 2.0;
        let positives = block.iter().filter(|(_, p)| *p).count();
        rank_sum_pos += avg_rank * positives as f64;
        start += block.len();
    }

    let u = rank_sum_pos - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

/// Correlation ratio (eta) between a grouping and a numeric variable.
pub fn correlation_ratio<K: Ord>(groups: &[K], values: &[f64]) -> Option<f64> {
    if groups.len() != values.len() || values.len() < 3 {
        return None;
    }
    let overall = mean(values)?;
    let mut sums: BTreeMap<&K, (f64, usize)> = BTreeMap::new();
    for (g, v) in groups.iter().zip(values) {
        let entry = sums.entry(g).or_insert((0.0, 0));
        entry.0 += v;
        entry.1 += 1;
    }
    let ss_between: f64 = sums
        .values()
        .map(|(sum, n)| *n as f64 * (sum / *n as f64 - overall).powi(2))
        .sum();
    let ss_total: f64 = values.iter().map(|v| (v - overall).powi(2)).sum();
    if ss_total <= f64::EPSILON {
        return None;
    }
    Some((ss_between / ss_total).sqrt())
}

/// Cramér's V between two categorical variables.
pub fn cramers_v<A: Ord, B: Ord>(a: &[A], b: &[B]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let n = a.len() as f64;
    let mut joint: BTreeMap<(&A, &B), f64> = BTreeMap::new();
    let mut row: BTreeMap<&A, f64> = BTreeMap::new();
    let mut col: BTreeMap<&B, f64> = BTreeMap::new();
    for (x, y) in a.iter().zip(b) {
        *joint.entry((x, y)).or_insert(0.0) += 1.0;
        *row.entry(x).or_insert(0.0) += 1.0;
        *col.entry(y).or_insert(0.0) += 1.0;
    }
    let k = row.len().min(col.len());
    if k < 2 {
        return None;
    }

    let mut chi2 = 0.0;
    for (x, rx) in &row {
        for (y, cy) in &col {
            let expected = rx * cy / n;
            let observed = joint.get(&(*x, *y)).copied().unwrap_or(0.0);
            chi2 += (observed - expected).powi(2) / expected;
        }
    }
    Some((chi2 / (n * (k - 1) as f64)).sqrt().min(1.0))
}

/// Counts per value, most frequent first, ties by value.
pub fn value_counts<'a, I>(values: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    let mut out: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(k, c)| (k.to_owned(), c))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Shannon entropy of `counts` divided by its maximum, in `[0, 1]`.
pub fn normalized_entropy(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if counts.len() < 2 || total == 0 {
        return 0.0;
    }
    let h: f64 = counts
        .iter()
        .filter(|c| **c > 0)
        .map(|c| {
            let p = *c as f64 / total as f64;
            -p * p.ln()
        })
        .sum();
    h / (counts.len() as f64).ln()
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}
