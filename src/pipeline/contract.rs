//! The closed operation vocabulary a plan generator may use.
//!
//! [`PlanContract`] owns one [`OperationSchema`] per [`OperationKind`]: the
//! column arity and the parameter schema of the operation. It also turns the
//! generator's raw text into an untrusted [`PipelinePlan`]. Anything that is
//! not a JSON object of the form `{steps: [{op, ..}], reason}` is a
//! [`SchemaError`] and never reaches the validator.

use super::plan::{Operation, PipelinePlan};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    DropDuplicates,
    RemoveOutliers,
    Impute,
    Scale,
    Encode,
    Deduplicate,
    NormalizeDuration,
    DropColumns,
    SortBy,
    DropSparseRows,
    ClipOutliers,
}

impl OperationKind {
    pub const ALL: &'static [Self] = &[
        Self::DropDuplicates,
        Self::RemoveOutliers,
        Self::Impute,
        Self::Scale,
        Self::Encode,
        Self::Deduplicate,
        Self::NormalizeDuration,
        Self::DropColumns,
        Self::SortBy,
        Self::DropSparseRows,
        Self::ClipOutliers,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DropDuplicates => "drop_duplicates",
            Self::RemoveOutliers => "remove_outliers",
            Self::Impute => "impute",
            Self::Scale => "scale",
            Self::Encode => "encode",
            Self::Deduplicate => "deduplicate",
            Self::NormalizeDuration => "normalize_duration",
            Self::DropColumns => "drop_columns",
            Self::SortBy => "sort_by",
            Self::DropSparseRows => "drop_sparse_rows",
            Self::ClipOutliers => "clip_outliers",
        }
    }

    /// Operations that rewrite the values of the columns they name (or, for
    /// `remove_outliers`, filter rows by them). The others only reorder or
    /// filter whole rows.
    pub const fn rewrites_columns(self) -> bool {
        match self {
            Self::RemoveOutliers
            | Self::Impute
            | Self::Scale
            | Self::Encode
            | Self::NormalizeDuration
            | Self::DropColumns
            | Self::ClipOutliers => true,
            Self::DropDuplicates | Self::Deduplicate | Self::SortBy | Self::DropSparseRows => false,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown operation '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnArity {
    /// The operation takes no columns
    None,
    /// Zero or more; empty means "all columns"
    Optional,
    ExactlyOne,
    AtLeastOne,
}

impl ColumnArity {
    pub fn check(self, count: usize) -> Result<(), String> {
        match (self, count) {
            (Self::None, 0) | (Self::Optional, _) | (Self::ExactlyOne, 1) => Ok(()),
            (Self::AtLeastOne, n) if n > 0 => Ok(()),
            (Self::None, n) => Err(format!("takes no columns, got {n}")),
            (Self::ExactlyOne, n) => Err(format!("takes exactly one column, got {n}")),
            (Self::AtLeastOne, _) => Err("requires at least one column".to_owned()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Choice(&'static [&'static str]),
    PositiveNumber,
    /// Number in `[0, 1]`
    Fraction,
    Bool,
    /// Any string, number or boolean
    Scalar,
}

impl ParamKind {
    pub fn check(self, value: &Value) -> Result<(), String> {
        match self {
            Self::Choice(allowed) => match value.as_str() {
                Some(s) if allowed.contains(&s) => Ok(()),
                _ => Err(format!("must be one of {}, got {value}", allowed.join("|"))),
            },
            Self::PositiveNumber => match value.as_f64() {
                Some(n) if n > 0.0 && n.is_finite() => Ok(()),
                _ => Err(format!("must be a positive number, got {value}")),
            },
            Self::Fraction => match value.as_f64() {
                Some(n) if (0.0..=1.0).contains(&n) => Ok(()),
                _ => Err(format!("must be a number in [0, 1], got {value}")),
            },
            Self::Bool => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(format!("must be true or false, got {value}"))
                }
            }
            Self::Scalar => {
                if value.is_string() || value.is_number() || value.is_boolean() {
                    Ok(())
                } else {
                    Err(format!("must be a string, number or boolean, got {value}"))
                }
            }
        }
    }

    fn describe(self) -> Value {
        match self {
            Self::Choice(allowed) => json!({ "type": "choice", "allowed": allowed }),
            Self::PositiveNumber => json!({ "type": "number", "min_exclusive": 0 }),
            Self::Fraction => json!({ "type": "number", "min": 0, "max": 1 }),
            Self::Bool => json!({ "type": "bool" }),
            Self::Scalar => json!({ "type": "scalar" }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

const fn required(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: false,
    }
}

const KEEP: ParamKind = ParamKind::Choice(&["first", "last"]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSchema {
    pub kind: OperationKind,
    pub columns: ColumnArity,
    pub params: &'static [ParamSpec],
    pub summary: &'static str,
}

impl OperationSchema {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Presence, type and allowed-value problems, one message per problem.
    pub fn check_params(
        &self,
        params: &BTreeMap<String, Value>,
        reject_unknown: bool,
    ) -> Vec<String> {
        let mut problems = Vec::new();
        for spec in self.params {
            match params.get(spec.name) {
                None if spec.required => {
                    problems.push(format!("missing required parameter '{}'", spec.name));
                }
                None => {}
                Some(value) => {
                    if let Err(msg) = spec.kind.check(value) {
                        problems.push(format!("parameter '{}' {msg}", spec.name));
                    }
                }
            }
        }
        if reject_unknown {
            for key in params.keys() {
                if self.param(key).is_none() {
                    problems.push(format!("unknown parameter '{key}'"));
                }
            }
        }
        problems
    }

    fn describe(&self) -> Value {
        let params: Map<String, Value> = self
            .params
            .iter()
            .map(|p| {
                let mut entry = p.kind.describe();
                entry["required"] = Value::Bool(p.required);
                (p.name.to_owned(), entry)
            })
            .collect();
        json!({
            "op": self.kind.as_str(),
            "summary": self.summary,
            "columns": self.columns,
            "params": params,
        })
    }
}

const SCHEMAS: &[OperationSchema] = &[
    OperationSchema {
        kind: OperationKind::DropDuplicates,
        columns: ColumnArity::Optional,
        params: &[optional("keep", KEEP)],
        summary: "Drop exact duplicate rows over a column subset (all columns when empty)",
    },
    OperationSchema {
        kind: OperationKind::RemoveOutliers,
        columns: ColumnArity::ExactlyOne,
        params: &[
            required("method", ParamKind::Choice(&["iqr", "zscore"])),
            optional("threshold", ParamKind::PositiveNumber),
        ],
        summary: "Drop rows whose value lies outside the IQR fence or z-score limit",
    },
    OperationSchema {
        kind: OperationKind::Impute,
        columns: ColumnArity::AtLeastOne,
        params: &[
            required(
                "strategy",
                ParamKind::Choice(&["mean", "median", "mode", "constant"]),
            ),
            optional("value", ParamKind::Scalar),
        ],
        summary: "Fill missing values; 'value' is required when strategy is constant",
    },
    OperationSchema {
        kind: OperationKind::Scale,
        columns: ColumnArity::AtLeastOne,
        params: &[required("method", ParamKind::Choice(&["standard", "minmax"]))],
        summary: "Standardise or min-max scale numeric columns",
    },
    OperationSchema {
        kind: OperationKind::Encode,
        columns: ColumnArity::AtLeastOne,
        params: &[required("method", ParamKind::Choice(&["onehot", "ordinal"]))],
        summary: "One-hot or ordinal encode columns; one-hot replaces the original",
    },
    OperationSchema {
        kind: OperationKind::Deduplicate,
        columns: ColumnArity::Optional,
        params: &[
            optional("keep", KEEP),
            optional("case_sensitive", ParamKind::Bool),
        ],
        summary: "Drop near-duplicate rows comparing trimmed (and by default lowercased) text",
    },
    OperationSchema {
        kind: OperationKind::NormalizeDuration,
        columns: ColumnArity::AtLeastOne,
        params: &[optional(
            "unit",
            ParamKind::Choice(&["seconds", "minutes", "hours"]),
        )],
        summary: "Parse duration text (HH:MM:SS, ISO 8601, '1h 30m') into numbers",
    },
    OperationSchema {
        kind: OperationKind::DropColumns,
        columns: ColumnArity::AtLeastOne,
        params: &[],
        summary: "Remove columns",
    },
    OperationSchema {
        kind: OperationKind::SortBy,
        columns: ColumnArity::ExactlyOne,
        params: &[optional("ascending", ParamKind::Bool)],
        summary: "Stable sort of rows by one column, nulls last",
    },
    OperationSchema {
        kind: OperationKind::DropSparseRows,
        columns: ColumnArity::None,
        params: &[optional("threshold", ParamKind::Fraction)],
        summary: "Drop rows whose share of missing cells is at least the threshold",
    },
    OperationSchema {
        kind: OperationKind::ClipOutliers,
        columns: ColumnArity::AtLeastOne,
        params: &[
            optional("lower_quantile", ParamKind::Fraction),
            optional("upper_quantile", ParamKind::Fraction),
        ],
        summary: "Clamp numeric values to the given column quantiles",
    },
];

/// Generator output that is not a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaError {
    pub message: String,
    /// Leading part of the offending text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl SchemaError {
    fn new(message: impl Into<String>, text: &str) -> Self {
        let excerpt: String = text.chars().take(EXCERPT_CHARS).collect();
        Self {
            message: message.into(),
            excerpt: (!excerpt.trim().is_empty()).then_some(excerpt),
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SchemaError {}

#[derive(Debug, Clone)]
pub struct PlanContract {
    schemas: BTreeMap<OperationKind, OperationSchema>,
}

impl Default for PlanContract {
    fn default() -> Self {
        Self::standard()
    }
}

impl PlanContract {
    pub fn standard() -> Self {
        Self {
            schemas: SCHEMAS.iter().map(|s| (s.kind, *s)).collect(),
        }
    }

    pub fn schema(&self, kind: OperationKind) -> Option<&OperationSchema> {
        self.schemas.get(&kind)
    }

    /// Resolve an operation name against the vocabulary.
    pub fn lookup(&self, op: &str) -> Option<&OperationSchema> {
        op.parse::<OperationKind>()
            .ok()
            .and_then(|kind| self.schema(kind))
    }

    /// The vocabulary as JSON, for the generator payload.
    pub fn describe(&self) -> Value {
        json!({
            "output_format": {
                "steps": "list of {op, columns, params}",
                "reason": "string",
            },
            "operations": self.schemas.values().map(OperationSchema::describe).collect::<Vec<_>>(),
        })
    }

    /// Read generator text as an untrusted plan.
    ///
    /// Strict JSON is tried first, then the span between the first `{` and
    /// the last `}` for output wrapped in prose or code fences.
    pub fn parse_plan(&self, text: &str) -> Result<PipelinePlan, SchemaError> {
        let root = parse_json_object(text)
            .ok_or_else(|| SchemaError::new("generator output is not a JSON object", text))?;

        let Some(steps) = root.get("steps") else {
            return Err(SchemaError::new("plan has no 'steps' field", text));
        };
        let Some(steps) = steps.as_array() else {
            return Err(SchemaError::new("'steps' must be a list", text));
        };

        let operations = steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                parse_operation(step)
                    .map_err(|msg| SchemaError::new(format!("step {}: {msg}", index + 1), text))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let reason = root
            .get("reason")
            .or_else(|| root.get("reasoning"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        Ok(PipelinePlan {
            steps: operations,
            reason,
        })
    }
}

fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let strict = serde_json::from_str::<Value>(text.trim()).ok();
    let value = strict.or_else(|| {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        (start < end)
            .then(|| serde_json::from_str::<Value>(&text[start..=end]).ok())
            .flatten()
    })?;
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn parse_operation(step: &Value) -> Result<Operation, String> {
    let Some(fields) = step.as_object() else {
        return Err("each step must be an object".to_owned());
    };
    let Some(op) = fields.get("op").and_then(Value::as_str) else {
        return Err("step has no string 'op' field".to_owned());
    };

    let mut columns = Vec::new();
    let mut params = BTreeMap::new();

    for (key, value) in fields {
        match key.as_str() {
            "op" => {}
            "column" | "columns" => collect_columns(value, &mut columns)?,
            "params" => {
                let Some(inner) = value.as_object() else {
                    return Err("'params' must be an object".to_owned());
                };
                for (name, param) in inner {
                    match name.as_str() {
                        "column" | "columns" => collect_columns(param, &mut columns)?,
                        _ => {
                            params.insert(name.clone(), param.clone());
                        }
                    }
                }
            }
            // flattened parameters are accepted alongside `params`
            _ => {
                params.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(Operation {
        op: op.to_owned(),
        columns,
        params,
    })
}

fn collect_columns(value: &Value, into: &mut Vec<String>) -> Result<(), String> {
    match value {
        Value::String(name) => into.push(name.clone()),
        Value::Array(items) => {
            for item in items {
                let Some(name) = item.as_str() else {
                    return Err(format!("column names must be strings, got {item}"));
                };
                into.push(name.to_owned());
            }
        }
        Value::Null => {}
        other => return Err(format!("columns must be a string or a list, got {other}")),
    }
    Ok(())
}
