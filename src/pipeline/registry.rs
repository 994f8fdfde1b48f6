//! The fixed operation table.
//!
//! Built once at startup and shared read-only. The executor resolves every
//! step through this table and never evaluates anything else.

use super::contract::OperationKind;
use super::ops;
use super::plan::Step;
use crate::dataset::Dataset;
use std::collections::BTreeMap;

/// Output of one transform: the new dataset plus anything worth logging.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub dataset: Dataset,
    pub warnings: Vec<String>,
}

impl Transformed {
    pub fn clean(dataset: Dataset) -> Self {
        Self {
            dataset,
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// A pure, parameterised transform.
pub type Transform = fn(&Dataset, &Step) -> anyhow::Result<Transformed>;

#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    table: BTreeMap<OperationKind, Transform>,
}

impl OperationRegistry {
    /// An empty table; mostly useful in tests.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(OperationKind::DropDuplicates, ops::drop_duplicates);
        registry.register(OperationKind::RemoveOutliers, ops::remove_outliers);
        registry.register(OperationKind::Impute, ops::impute);
        registry.register(OperationKind::Scale, ops::scale);
        registry.register(OperationKind::Encode, ops::encode);
        registry.register(OperationKind::Deduplicate, ops::deduplicate);
        registry.register(OperationKind::NormalizeDuration, ops::normalize_duration);
        registry.register(OperationKind::DropColumns, ops::drop_columns);
        registry.register(OperationKind::SortBy, ops::sort_by);
        registry.register(OperationKind::DropSparseRows, ops::drop_sparse_rows);
        registry.register(OperationKind::ClipOutliers, ops::clip_outliers);
        registry
    }

    pub fn register(&mut self, kind: OperationKind, transform: Transform) {
        self.table.insert(kind, transform);
    }

    pub fn get(&self, kind: OperationKind) -> Option<Transform> {
        self.table.get(&kind).copied()
    }

    pub fn kinds(&self) -> impl Iterator<Item = OperationKind> + '_ {
        self.table.keys().copied()
    }
}
