//! Fitted transformer state, persisted inside the model bundle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of a pipeline stage. Serialized as snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Reindex,
    CategoricalNullFill,
    NumericImpute,
    LabelEncode,
    OneHotEncode,
    Scale,
    FinalReindex,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Reindex => "reindex",
            StageKind::CategoricalNullFill => "categorical_null_fill",
            StageKind::NumericImpute => "numeric_impute",
            StageKind::LabelEncode => "label_encode",
            StageKind::OneHotEncode => "one_hot_encode",
            StageKind::Scale => "scale",
            StageKind::FinalReindex => "final_reindex",
        }
    }
}

/// Affine scaling parameters for one column: `(x - mean) / scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub mean: f64,
    pub scale: f64,
}

/// Fitted state of one stateful stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageState {
    /// Median per numeric column.
    NumericImpute { values: BTreeMap<String, f64> },
    /// Sorted classes per categorical column; the ordinal is the index.
    LabelEncode { classes: BTreeMap<String, Vec<String>> },
    /// Sorted categories per categorical column, one indicator each.
    OneHotEncode { categories: BTreeMap<String, Vec<String>> },
    Scale { params: BTreeMap<String, Affine> },
    /// Column layout handed to the model.
    FinalReindex { columns: Vec<String> },
}

impl StageState {
    pub fn kind(&self) -> StageKind {
        match self {
            StageState::NumericImpute { .. } => StageKind::NumericImpute,
            StageState::LabelEncode { .. } => StageKind::LabelEncode,
            StageState::OneHotEncode { .. } => StageKind::OneHotEncode,
            StageState::Scale { .. } => StageKind::Scale,
            StageState::FinalReindex { .. } => StageKind::FinalReindex,
        }
    }
}

/// All fitted state produced by one training run, in stage order.
///
/// Never mutated after fit; serving requests share it read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransformerSet {
    stage_order: Vec<StageKind>,
    states: Vec<StageState>,
}

impl FittedTransformerSet {
    pub(crate) fn new(stage_order: Vec<StageKind>, states: Vec<StageState>) -> Self {
        Self { stage_order, states }
    }

    /// Stages to run, in order, including stateless ones.
    pub fn stage_order(&self) -> &[StageKind] {
        &self.stage_order
    }

    pub fn state(&self, kind: StageKind) -> Option<&StageState> {
        self.states.iter().find(|s| s.kind() == kind)
    }

    pub fn states(&self) -> &[StageState] {
        &self.states
    }

    /// Column layout the model was trained on, if the final reindex was fit.
    pub fn output_columns(&self) -> Option<&[String]> {
        match self.state(StageKind::FinalReindex) {
            Some(StageState::FinalReindex { columns }) => Some(columns),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization_is_tagged() {
        let mut values = BTreeMap::new();
        values.insert("dist1".to_string(), 12.0);
        let set = FittedTransformerSet::new(
            vec![StageKind::Reindex, StageKind::NumericImpute],
            vec![StageState::NumericImpute { values }],
        );

        let json = serde_json::to_string(&set).unwrap();
        assert!(json.contains(r#""stage":"numeric_impute""#));
        assert!(json.contains(r#""reindex""#));

        let back: FittedTransformerSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
        assert!(back.state(StageKind::NumericImpute).is_some());
        assert!(back.state(StageKind::Scale).is_none());
    }
}
