//! Plan data structures.
//!
//! A [`PipelinePlan`] is what a generator proposes: untrusted, stringly typed
//! [`Operation`]s. A [`Step`] is the typed form the executor runs; only the
//! validator builds them.

use super::contract::OperationKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One proposed operation, exactly as the generator wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub op: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

impl Operation {
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            columns: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn on<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_owned(), value.into());
        self
    }
}

/// An ordered, generator-proposed plan. Replaced wholesale, never edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelinePlan {
    pub steps: Vec<Operation>,
    #[serde(default)]
    pub reason: String,
}

impl PipelinePlan {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn with_step(mut self, step: Operation) -> Self {
        self.steps.push(step);
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keep {
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    Iqr,
    Zscore,
}

impl OutlierMethod {
    pub const fn default_threshold(self) -> f64 {
        match self {
            Self::Iqr => 1.5,
            Self::Zscore => 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl FillValue {
    /// The value as it reads once written into a text column.
    pub fn label(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    Mean,
    Median,
    Mode,
    Constant(FillValue),
}

impl ImputeStrategy {
    pub const fn needs_numeric(&self) -> bool {
        matches!(self, Self::Mean | Self::Median)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMethod {
    Standard,
    #[serde(rename = "minmax")]
    MinMax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeMethod {
    #[serde(rename = "onehot")]
    OneHot,
    Ordinal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    Seconds,
    Minutes,
    Hours,
}

impl DurationUnit {
    pub const fn seconds(self) -> f64 {
        match self {
            Self::Seconds => 1.0,
            Self::Minutes => 60.0,
            Self::Hours => 3600.0,
        }
    }
}

/// A typed, parameter-checked operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    DropDuplicates {
        subset: Vec<String>,
        keep: Keep,
    },
    RemoveOutliers {
        column: String,
        method: OutlierMethod,
        threshold: f64,
    },
    Impute {
        columns: Vec<String>,
        strategy: ImputeStrategy,
    },
    Scale {
        columns: Vec<String>,
        method: ScaleMethod,
    },
    Encode {
        columns: Vec<String>,
        method: EncodeMethod,
    },
    Deduplicate {
        subset: Vec<String>,
        keep: Keep,
        case_sensitive: bool,
    },
    NormalizeDuration {
        columns: Vec<String>,
        unit: DurationUnit,
    },
    DropColumns {
        columns: Vec<String>,
    },
    SortBy {
        column: String,
        ascending: bool,
    },
    DropSparseRows {
        threshold: f64,
    },
    ClipOutliers {
        columns: Vec<String>,
        lower_quantile: f64,
        upper_quantile: f64,
    },
}

impl Step {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::DropDuplicates { .. } => OperationKind::DropDuplicates,
            Self::RemoveOutliers { .. } => OperationKind::RemoveOutliers,
            Self::Impute { .. } => OperationKind::Impute,
            Self::Scale { .. } => OperationKind::Scale,
            Self::Encode { .. } => OperationKind::Encode,
            Self::Deduplicate { .. } => OperationKind::Deduplicate,
            Self::NormalizeDuration { .. } => OperationKind::NormalizeDuration,
            Self::DropColumns { .. } => OperationKind::DropColumns,
            Self::SortBy { .. } => OperationKind::SortBy,
            Self::DropSparseRows { .. } => OperationKind::DropSparseRows,
            Self::ClipOutliers { .. } => OperationKind::ClipOutliers,
        }
    }

    /// Every column the step reads or writes.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::RemoveOutliers { column, .. } | Self::SortBy { column, .. } => {
                vec![column.as_str()]
            }
            Self::DropDuplicates { subset, .. } | Self::Deduplicate { subset, .. } => {
                subset.iter().map(String::as_str).collect()
            }
            Self::Impute { columns, .. }
            | Self::Scale { columns, .. }
            | Self::Encode { columns, .. }
            | Self::NormalizeDuration { columns, .. }
            | Self::DropColumns { columns }
            | Self::ClipOutliers { columns, .. } => columns.iter().map(String::as_str).collect(),
            Self::DropSparseRows { .. } => Vec::new(),
        }
    }

    /// Build the typed step from an operation whose parameters already
    /// passed the schema check. Remaining cross-parameter rules are
    /// enforced here.
    pub fn from_operation(kind: OperationKind, op: &Operation) -> Result<Self, String> {
        let params = &op.params;
        let text = |name: &str| params.get(name).and_then(Value::as_str);
        let number = |name: &str| params.get(name).and_then(Value::as_f64);
        let flag = |name: &str| params.get(name).and_then(Value::as_bool);
        let first_column = || {
            op.columns
                .first()
                .cloned()
                .ok_or_else(|| "a column is required".to_owned())
        };
        let keep = || match text("keep") {
            Some("last") => Keep::Last,
            _ => Keep::First,
        };

        let step = match kind {
            OperationKind::DropDuplicates => Self::DropDuplicates {
                subset: op.columns.clone(),
                keep: keep(),
            },
            OperationKind::RemoveOutliers => {
                let method = match text("method") {
                    Some("iqr") => OutlierMethod::Iqr,
                    Some("zscore") => OutlierMethod::Zscore,
                    other => return Err(format!("unsupported outlier method {other:?}")),
                };
                Self::RemoveOutliers {
                    column: first_column()?,
                    threshold: number("threshold").unwrap_or(method.default_threshold()),
                    method,
                }
            }
            OperationKind::Impute => {
                let strategy = match text("strategy") {
                    Some("mean") => ImputeStrategy::Mean,
                    Some("median") => ImputeStrategy::Median,
                    Some("mode") => ImputeStrategy::Mode,
                    Some("constant") => {
                        let value = params
                            .get("value")
                            .ok_or_else(|| "strategy 'constant' requires 'value'".to_owned())?;
                        ImputeStrategy::Constant(fill_value(value)?)
                    }
                    other => return Err(format!("unsupported impute strategy {other:?}")),
                };
                Self::Impute {
                    columns: op.columns.clone(),
                    strategy,
                }
            }
            OperationKind::Scale => Self::Scale {
                columns: op.columns.clone(),
                method: match text("method") {
                    Some("standard") => ScaleMethod::Standard,
                    Some("minmax") => ScaleMethod::MinMax,
                    other => return Err(format!("unsupported scale method {other:?}")),
                },
            },
            OperationKind::Encode => Self::Encode {
                columns: op.columns.clone(),
                method: match text("method") {
                    Some("onehot") => EncodeMethod::OneHot,
                    Some("ordinal") => EncodeMethod::Ordinal,
                    other => return Err(format!("unsupported encode method {other:?}")),
                },
            },
            OperationKind::Deduplicate => Self::Deduplicate {
                subset: op.columns.clone(),
                keep: keep(),
                case_sensitive: flag("case_sensitive").unwrap_or(false),
            },
            OperationKind::NormalizeDuration => Self::NormalizeDuration {
                columns: op.columns.clone(),
                unit: match text("unit") {
                    None | Some("seconds") => DurationUnit::Seconds,
                    Some("minutes") => DurationUnit::Minutes,
                    Some("hours") => DurationUnit::Hours,
                    Some(other) => return Err(format!("unsupported duration unit '{other}'")),
                },
            },
            OperationKind::DropColumns => Self::DropColumns {
                columns: op.columns.clone(),
            },
            OperationKind::SortBy => Self::SortBy {
                column: first_column()?,
                ascending: flag("ascending").unwrap_or(true),
            },
            OperationKind::DropSparseRows => {
                let threshold = number("threshold").unwrap_or(0.5);
                if threshold <= 0.0 {
                    return Err("threshold must be greater than 0".to_owned());
                }
                Self::DropSparseRows { threshold }
            }
            OperationKind::ClipOutliers => {
                let lower_quantile = number("lower_quantile").unwrap_or(0.01);
                let upper_quantile = number("upper_quantile").unwrap_or(0.99);
                if lower_quantile >= upper_quantile {
                    return Err(format!(
                        "lower_quantile {lower_quantile} must be below upper_quantile {upper_quantile}"
                    ));
                }
                Self::ClipOutliers {
                    columns: op.columns.clone(),
                    lower_quantile,
                    upper_quantile,
                }
            }
        };
        Ok(step)
    }
}

fn fill_value(value: &Value) -> Result<FillValue, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(FillValue::Number)
            .ok_or_else(|| format!("fill value {n} is not representable")),
        Value::Bool(b) => Ok(FillValue::Bool(*b)),
        Value::String(s) => Ok(FillValue::Text(s.clone())),
        other => Err(format!("fill value must be a scalar, got {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_fill_in() -> anyhow::Result<()> {
        let step = Step::from_operation(
            OperationKind::RemoveOutliers,
            &Operation::new("remove_outliers")
                .on(["price"])
                .with_param("method", "zscore"),
        )
        .map_err(anyhow::Error::msg)?;
        assert_eq!(
            step,
            Step::RemoveOutliers {
                column: "price".to_owned(),
                method: OutlierMethod::Zscore,
                threshold: 3.0,
            }
        );
        Ok(())
    }

    #[test]
    fn test_constant_impute_needs_value() {
        let op = Operation::new("impute")
            .on(["city"])
            .with_param("strategy", "constant");
        let err = Step::from_operation(OperationKind::Impute, &op).unwrap_err();
        assert!(err.contains("requires 'value'"));

        let op = op.with_param("value", "unknown");
        assert_eq!(
            Step::from_operation(OperationKind::Impute, &op),
            Ok(Step::Impute {
                columns: vec!["city".to_owned()],
                strategy: ImputeStrategy::Constant(FillValue::Text("unknown".to_owned())),
            })
        );
    }

    #[test]
    fn test_clip_quantiles_must_be_ordered() {
        let op = Operation::new("clip_outliers")
            .on(["x"])
            .with_param("lower_quantile", 0.9)
            .with_param("upper_quantile", 0.1);
        assert!(Step::from_operation(OperationKind::ClipOutliers, &op).is_err());
    }

    #[test]
    fn test_step_serialises_with_op_tag() -> anyhow::Result<()> {
        let step = Step::Scale {
            columns: vec!["x".to_owned()],
            method: ScaleMethod::MinMax,
        };
        let value = serde_json::to_value(&step)?;
        assert_eq!(value, json!({"op": "scale", "columns": ["x"], "method": "minmax"}));
        assert_eq!(step.columns(), vec!["x"]);
        assert_eq!(step.kind(), OperationKind::Scale);
        Ok(())
    }
}
