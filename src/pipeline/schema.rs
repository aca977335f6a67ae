//! Feature schema captured when the transformers are fit.

use crate::error::TransformError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Ordered, unique feature list with its categorical subset.
///
/// The serving pipeline projects every request onto `features` in exactly
/// this order, so the list is never reordered after capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    features: Vec<String>,
    categorical: BTreeSet<String>,
}

impl FeatureSchema {
    /// Capture the schema from the columns the transformers are fit on.
    ///
    /// Categorical names that are not among the fitted columns are ignored.
    pub fn capture<S: AsRef<str>>(
        fitted_columns: &[String],
        categorical: &[S],
    ) -> Result<Self, TransformError> {
        let mut seen = HashSet::with_capacity(fitted_columns.len());
        for name in fitted_columns {
            if !seen.insert(name.as_str()) {
                return Err(TransformError::DuplicateFeature(name.clone()));
            }
        }

        let categorical = categorical
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| seen.contains(c))
            .map(str::to_string)
            .collect();

        Ok(Self {
            features: fitted_columns.to_vec(),
            categorical,
        })
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.iter().any(|f| f == name)
    }

    pub fn is_categorical(&self, name: &str) -> bool {
        self.categorical.contains(name)
    }

    pub fn categorical(&self) -> impl Iterator<Item = &String> {
        self.features.iter().filter(|f| self.categorical.contains(*f))
    }

    pub fn numeric(&self) -> impl Iterator<Item = &String> {
        self.features.iter().filter(|f| !self.categorical.contains(*f))
    }

    /// Number of `columns` that are schema features.
    pub fn overlap(&self, columns: &[String]) -> usize {
        columns.iter().filter(|c| self.contains(c)).count()
    }
}
