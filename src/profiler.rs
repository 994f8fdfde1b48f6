//! Structural fingerprint of a dataset.
//!
//! The profiler runs once per (dataset, target) pair and produces an
//! immutable [`DatasetProfile`] that every analyzer, the validator, and the
//! plan generator read. It provides:
//!
//! - Semantic typing (numeric / categorical / datetime) from dtype and content
//! - Missing and unique counts per column
//! - Numeric summaries (quartiles, skew, kurtosis)
//! - Whole-row duplicate counts
//! - Problem-type inference for the target

use crate::config::ProfilerSettings;
use crate::dataset::{Dataset, parse_number, parse_timestamp};
use crate::error::{EngineError, Result};
use crate::stats;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Numeric,
    Categorical,
    Datetime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Classification,
    Regression,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub mean: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub skew: Option<f64>,
    pub kurtosis: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub semantic_type: SemanticType,
    pub missing_count: usize,
    pub missing_pct: f64,
    pub unique_count: usize,
    pub unique_ratio: f64,
    /// Every present numeric value is a whole number
    pub integer_valued: bool,
    pub top_value: Option<String>,
    pub top_share: Option<f64>,
    pub numeric: Option<NumericSummary>,
    /// Distinct values in encoding order; absent past `max_tracked_levels`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<String>>,
}

impl ColumnProfile {
    pub fn is_numeric(&self) -> bool {
        self.semantic_type == SemanticType::Numeric
    }

    pub fn has_missing(&self) -> bool {
        self.missing_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnProfile>,
    pub duplicate_count: usize,
    pub duplicate_pct: f64,
    pub target: Option<String>,
    pub problem_type: ProblemType,
}

impl DatasetProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// The target's profile, when a target is set and present.
    pub fn target_column(&self) -> Option<&ColumnProfile> {
        self.target.as_deref().and_then(|t| self.column(t))
    }

    /// Columns other than the target.
    pub fn features(&self) -> impl Iterator<Item = &ColumnProfile> {
        let target = self.target.as_deref();
        self.columns
            .iter()
            .filter(move |c| Some(c.name.as_str()) != target)
    }

    pub fn numeric_features(&self) -> impl Iterator<Item = &ColumnProfile> {
        self.features().filter(|c| c.is_numeric())
    }

    /// SHA-256 over the canonical JSON form.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let hash = Sha256::digest(&bytes);
        Ok(format!("{hash:x}"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Profiler {
    settings: ProfilerSettings,
}

impl Profiler {
    pub fn new(settings: ProfilerSettings) -> Self {
        Self { settings }
    }

    /// Profile `data`, optionally designating `target`.
    ///
    /// # Errors
    ///
    /// `EngineError::Data` when the dataset has no rows or no columns.
    pub fn profile(&self, data: &Dataset, target: Option<&str>) -> Result<DatasetProfile> {
        let row_count = data.height();
        let column_count = data.width();
        if column_count == 0 {
            return Err(EngineError::Data("dataset has no columns".to_owned()));
        }
        if row_count == 0 {
            return Err(EngineError::Data("dataset has no rows".to_owned()));
        }

        let columns = data
            .column_names()
            .iter()
            .map(|name| self.profile_column(data, name))
            .collect::<Result<Vec<_>>>()?;

        let duplicate_count = data.duplicate_count()?;
        let target = target.map(str::to_owned);
        let problem_type = target
            .as_deref()
            .and_then(|t| columns.iter().find(|c| c.name == t))
            .map_or(ProblemType::Unknown, |c| self.infer_problem_type(c));

        tracing::debug!(
            rows = row_count,
            columns = column_count,
            duplicates = duplicate_count,
            ?problem_type,
            "Profiled dataset"
        );

        Ok(DatasetProfile {
            row_count,
            column_count,
            columns,
            duplicate_count,
            duplicate_pct: pct(duplicate_count, row_count),
            target,
            problem_type,
        })
    }

    fn profile_column(&self, data: &Dataset, name: &str) -> Result<ColumnProfile> {
        let rows = data.height();
        let missing_count = data.null_mask(name)?.iter().filter(|m| **m).count();
        let semantic_type = self.classify(data, name)?;

        let levels = data.levels(name)?;
        let (unique_count, integer_valued, numeric) = if semantic_type == SemanticType::Numeric {
            let values = stats::finite(&data.numeric(name)?);
            let unique: HashSet<u64> = values.iter().map(|v| (v + 0.0).to_bits()).collect();
            let integer = !values.is_empty() && values.iter().all(|v| v.fract() == 0.0);
            (unique.len(), integer, summarize(&values))
        } else {
            (levels.len(), false, None)
        };

        let (top_value, top_share) = if semantic_type == SemanticType::Numeric {
            (None, None)
        } else {
            let text = data.text(name)?;
            let present: Vec<&str> = text.iter().flatten().map(String::as_str).collect();
            match stats::value_counts(present.iter().copied()).into_iter().next() {
                Some((value, count)) => (Some(value), Some(count as f64 / present.len() as f64)),
                None => (None, None),
            }
        };

        Ok(ColumnProfile {
            name: name.to_owned(),
            semantic_type,
            missing_count,
            missing_pct: pct(missing_count, rows),
            unique_count,
            unique_ratio: unique_count as f64 / rows as f64,
            integer_valued,
            top_value,
            top_share,
            numeric,
            levels: (levels.len() <= self.settings.max_tracked_levels).then_some(levels),
        })
    }

    fn classify(&self, data: &Dataset, name: &str) -> Result<SemanticType> {
        let dtype = data.dtype(name)?;
        if dtype.is_temporal() {
            return Ok(SemanticType::Datetime);
        }
        if dtype.is_primitive_numeric() || dtype.is_bool() {
            return Ok(SemanticType::Numeric);
        }

        let text = data.text(name)?;
        let present: Vec<&str> = text.iter().flatten().map(String::as_str).collect();
        if present.is_empty() {
            return Ok(SemanticType::Categorical);
        }

        let total = present.len() as f64;
        let numeric = present.iter().filter(|v| parse_number(v).is_some()).count() as f64;
        if numeric / total >= self.settings.numeric_parse_ratio {
            return Ok(SemanticType::Numeric);
        }

        let dates = present
            .iter()
            .filter(|v| parse_timestamp(v).is_some())
            .count() as f64;
        if dates / total >= self.settings.datetime_parse_ratio {
            return Ok(SemanticType::Datetime);
        }

        Ok(SemanticType::Categorical)
    }

    fn infer_problem_type(&self, target: &ColumnProfile) -> ProblemType {
        match target.semantic_type {
            SemanticType::Datetime => ProblemType::Unknown,
            SemanticType::Categorical => ProblemType::Classification,
            SemanticType::Numeric => {
                let n = target.unique_count;
                if n <= self.settings.class_cardinality_threshold
                    || (target.integer_valued && n <= self.settings.integer_class_limit)
                {
                    ProblemType::Classification
                } else {
                    ProblemType::Regression
                }
            }
        }
    }
}

fn summarize(values: &[f64]) -> Option<NumericSummary> {
    let sorted = stats::sorted(values);
    Some(NumericSummary {
        mean: stats::mean(values)?,
        std: stats::std_dev(values),
        min: *sorted.first()?,
        q1: stats::quantile(&sorted, 0.25)?,
        median: stats::quantile(&sorted, 0.5)?,
        q3: stats::quantile(&sorted, 0.75)?,
        max: *sorted.last()?,
        skew: stats::skewness(values),
        kurtosis: stats::excess_kurtosis(values),
    })
}

pub(crate) fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
