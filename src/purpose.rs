//! Declared modeling intent for a session.
//!
//! A [`Purpose`] names the task, the target column, and an open map of
//! constraints. The engine reads the constraint keys listed in [`keys`];
//! any other key is passed through to the plan generator untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Constraint keys the engine understands.
pub mod keys {
    pub const ALLOW_TARGET_MUTATION: &str = "allow_target_mutation";
    pub const REQUIRE_NULL_FREE_ENCODING: &str = "require_null_free_encoding";
    pub const PRESERVE_OUTLIERS: &str = "preserve_outliers";
    pub const NO_SCALING: &str = "no_scaling";
    pub const NO_ENCODING: &str = "no_encoding";
    pub const SENSITIVE_COLUMNS: &str = "sensitive_columns";
    pub const TIMESTAMP_COLUMN: &str = "timestamp_column";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Classification,
    Regression,
    TimeSeries,
    Clustering,
    AnomalyDetection,
    GeneralCleaning,
}

impl TaskType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Regression => "regression",
            Self::TimeSeries => "time_series",
            Self::Clustering => "clustering",
            Self::AnomalyDetection => "anomaly_detection",
            Self::GeneralCleaning => "general_cleaning",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "classification" => Ok(Self::Classification),
            "regression" => Ok(Self::Regression),
            "time_series" => Ok(Self::TimeSeries),
            "clustering" => Ok(Self::Clustering),
            "anomaly_detection" => Ok(Self::AnomalyDetection),
            "general_cleaning" => Ok(Self::GeneralCleaning),
            other => Err(format!("unknown task type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purpose {
    pub task_type: TaskType,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub constraints: BTreeMap<String, Value>,
}

impl Purpose {
    pub fn new(task_type: TaskType, target: Option<String>) -> Self {
        Self {
            task_type,
            target,
            constraints: BTreeMap::new(),
        }
    }

    /// Purpose with the task's customary constraints filled in.
    pub fn preset(task_type: TaskType, target: Option<String>) -> Self {
        let purpose = Self::new(task_type, target);
        match task_type {
            TaskType::AnomalyDetection => purpose.with_constraint(keys::PRESERVE_OUTLIERS, true),
            TaskType::GeneralCleaning => purpose
                .with_constraint(keys::NO_SCALING, true)
                .with_constraint(keys::NO_ENCODING, true),
            TaskType::Classification
            | TaskType::Regression
            | TaskType::TimeSeries
            | TaskType::Clustering => purpose,
        }
    }

    #[must_use]
    pub fn with_constraint(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.constraints.insert(key.to_owned(), value.into());
        self
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.constraints.get(key).and_then(Value::as_bool)
    }

    pub fn allows_target_mutation(&self) -> bool {
        self.flag(keys::ALLOW_TARGET_MUTATION).unwrap_or(false)
    }

    pub fn requires_null_free_encoding(&self) -> bool {
        self.flag(keys::REQUIRE_NULL_FREE_ENCODING).unwrap_or(true)
    }

    pub fn preserves_outliers(&self) -> bool {
        self.flag(keys::PRESERVE_OUTLIERS).unwrap_or(false)
    }

    pub fn forbids_scaling(&self) -> bool {
        self.flag(keys::NO_SCALING).unwrap_or(false)
    }

    pub fn forbids_encoding(&self) -> bool {
        self.flag(keys::NO_ENCODING).unwrap_or(false)
    }

    /// Accepts a list of names or a single comma-separated string.
    pub fn sensitive_columns(&self) -> Vec<String> {
        match self.constraints.get(keys::SENSITIVE_COLUMNS) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn timestamp_column(&self) -> Option<&str> {
        self.constraints
            .get(keys::TIMESTAMP_COLUMN)
            .and_then(Value::as_str)
    }
}
