//! Transform stages. Each stage learns its state in `fit` and replays it in
//! `apply`; stateless stages only implement `apply`.

use super::schema::FeatureSchema;
use super::state::{Affine, StageKind, StageState};
use crate::error::TransformError;
use crate::types::{FeatureValue, Frame};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Sentinel written into missing categorical cells before encoding.
pub const MISSING_CATEGORY: &str = "missing";

/// Counters for the silent-recovery policies hit while transforming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    /// Schema columns absent from the input, synthesized as 0
    pub synthesized_columns: usize,
    /// Input columns unknown to the schema
    pub dropped_columns: usize,
    /// Unseen categories mapped to the first known category
    pub unknown_category_fallbacks: usize,
}

/// A fit/apply capability pair.
pub trait TransformStage: Send + Sync {
    fn kind(&self) -> StageKind;

    fn is_stateful(&self) -> bool {
        false
    }

    /// Learn state from a training frame. Stateless stages return `None`.
    fn fit(&self, _frame: &Frame, _schema: &FeatureSchema) -> Result<Option<StageState>, TransformError> {
        Ok(None)
    }

    fn apply(
        &self,
        frame: Frame,
        schema: &FeatureSchema,
        state: Option<&StageState>,
        report: &mut TransformReport,
    ) -> Result<Frame, TransformError>;
}

/// Build the stage implementing `kind`.
pub fn stage_for(kind: StageKind) -> Box<dyn TransformStage> {
    match kind {
        StageKind::Reindex => Box::new(Reindex),
        StageKind::CategoricalNullFill => Box::new(CategoricalNullFill),
        StageKind::NumericImpute => Box::new(NumericImpute),
        StageKind::LabelEncode => Box::new(LabelEncode),
        StageKind::OneHotEncode => Box::new(OneHotEncode),
        StageKind::Scale => Box::new(Scale),
        StageKind::FinalReindex => Box::new(FinalReindex),
    }
}

fn missing_state(kind: StageKind) -> TransformError {
    TransformError::TransformerMissing { stage: kind.as_str() }
}

/// Sorted distinct category keys of a column.
fn categories_of(frame: &Frame, idx: usize) -> Vec<String> {
    frame
        .column(idx)
        .map(FeatureValue::category_key)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Resolve a category to its index in `known`, falling back to index 0.
fn encode_category(column: &str, key: &str, known: &[String], report: &mut TransformReport) -> usize {
    match known.binary_search_by(|k| k.as_str().cmp(key)) {
        Ok(i) => i,
        Err(_) => {
            report.unknown_category_fallbacks += 1;
            warn!(
                column = %column,
                value = %key,
                fallback = %known.first().map(String::as_str).unwrap_or(""),
                "Unknown category, substituting first known category"
            );
            0
        }
    }
}

/// Projects the input onto the schema order.
pub struct Reindex;

impl TransformStage for Reindex {
    fn kind(&self) -> StageKind {
        StageKind::Reindex
    }

    fn apply(
        &self,
        frame: Frame,
        schema: &FeatureSchema,
        _state: Option<&StageState>,
        report: &mut TransformReport,
    ) -> Result<Frame, TransformError> {
        if schema.overlap(frame.columns()) == 0 {
            return Err(TransformError::SchemaMismatch {
                expected: schema.len(),
                received: frame.columns().len(),
            });
        }

        let synthesized = schema
            .features()
            .iter()
            .filter(|f| frame.column_index(f).is_none())
            .count();
        let dropped = frame.columns().iter().filter(|c| !schema.contains(c)).count();
        report.synthesized_columns += synthesized;
        report.dropped_columns += dropped;
        if synthesized > 0 || dropped > 0 {
            debug!(synthesized, dropped, "Reindexed input onto feature schema");
        }

        Ok(frame.reindex(schema.features()))
    }
}

/// Replaces missing categorical cells with the `"missing"` sentinel.
pub struct CategoricalNullFill;

impl TransformStage for CategoricalNullFill {
    fn kind(&self) -> StageKind {
        StageKind::CategoricalNullFill
    }

    fn apply(
        &self,
        mut frame: Frame,
        schema: &FeatureSchema,
        _state: Option<&StageState>,
        _report: &mut TransformReport,
    ) -> Result<Frame, TransformError> {
        let targets: Vec<usize> = schema
            .categorical()
            .filter_map(|c| frame.column_index(c))
            .collect();

        for row in 0..frame.n_rows() {
            for &col in &targets {
                let cell = frame.cell_mut(row, col);
                if cell.is_missing() {
                    *cell = FeatureValue::Text(MISSING_CATEGORY.to_string());
                }
            }
        }
        Ok(frame)
    }
}

/// Median imputation of numeric columns.
pub struct NumericImpute;

impl TransformStage for NumericImpute {
    fn kind(&self) -> StageKind {
        StageKind::NumericImpute
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn fit(&self, frame: &Frame, schema: &FeatureSchema) -> Result<Option<StageState>, TransformError> {
        let mut values = BTreeMap::new();
        for name in schema.numeric() {
            let Some(idx) = frame.column_index(name) else {
                continue;
            };
            let mut observed: Vec<f64> = frame.column(idx).filter_map(FeatureValue::as_number).collect();
            values.insert(name.clone(), median(&mut observed).unwrap_or(0.0));
        }
        Ok(Some(StageState::NumericImpute { values }))
    }

    fn apply(
        &self,
        mut frame: Frame,
        _schema: &FeatureSchema,
        state: Option<&StageState>,
        _report: &mut TransformReport,
    ) -> Result<Frame, TransformError> {
        let Some(StageState::NumericImpute { values }) = state else {
            return Err(missing_state(self.kind()));
        };

        for (name, &fill) in values {
            let Some(col) = frame.column_index(name) else {
                continue;
            };
            for row in 0..frame.n_rows() {
                let cell = frame.cell_mut(row, col);
                *cell = FeatureValue::Number(cell.as_number().unwrap_or(fill));
            }
        }
        Ok(frame)
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Ordinal label encoding of categorical columns.
pub struct LabelEncode;

impl TransformStage for LabelEncode {
    fn kind(&self) -> StageKind {
        StageKind::LabelEncode
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn fit(&self, frame: &Frame, schema: &FeatureSchema) -> Result<Option<StageState>, TransformError> {
        let classes = schema
            .categorical()
            .filter_map(|name| frame.column_index(name).map(|idx| (name.clone(), categories_of(frame, idx))))
            .collect();
        Ok(Some(StageState::LabelEncode { classes }))
    }

    fn apply(
        &self,
        mut frame: Frame,
        _schema: &FeatureSchema,
        state: Option<&StageState>,
        report: &mut TransformReport,
    ) -> Result<Frame, TransformError> {
        let Some(StageState::LabelEncode { classes }) = state else {
            return Err(missing_state(self.kind()));
        };

        for (name, known) in classes {
            let Some(col) = frame.column_index(name) else {
                continue;
            };
            for row in 0..frame.n_rows() {
                let cell = frame.cell_mut(row, col);
                let code = encode_category(name, &cell.category_key(), known, report);
                *cell = FeatureValue::Number(code as f64);
            }
        }
        Ok(frame)
    }
}

/// One indicator column per fitted category, named `column=category`.
pub struct OneHotEncode;

impl TransformStage for OneHotEncode {
    fn kind(&self) -> StageKind {
        StageKind::OneHotEncode
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn fit(&self, frame: &Frame, schema: &FeatureSchema) -> Result<Option<StageState>, TransformError> {
        let categories = schema
            .categorical()
            .filter_map(|name| frame.column_index(name).map(|idx| (name.clone(), categories_of(frame, idx))))
            .collect();
        Ok(Some(StageState::OneHotEncode { categories }))
    }

    fn apply(
        &self,
        frame: Frame,
        _schema: &FeatureSchema,
        state: Option<&StageState>,
        report: &mut TransformReport,
    ) -> Result<Frame, TransformError> {
        let Some(StageState::OneHotEncode { categories }) = state else {
            return Err(missing_state(self.kind()));
        };

        let mut columns = Vec::new();
        for name in frame.columns() {
            match categories.get(name) {
                Some(known) => columns.extend(known.iter().map(|k| format!("{name}={k}"))),
                None => columns.push(name.clone()),
            }
        }

        let mut rows = Vec::with_capacity(frame.n_rows());
        for row in frame.rows() {
            let mut out = Vec::with_capacity(columns.len());
            for (name, cell) in frame.columns().iter().zip(row) {
                match categories.get(name) {
                    Some(known) => {
                        let hot = encode_category(name, &cell.category_key(), known, report);
                        out.extend((0..known.len()).map(|i| FeatureValue::Number(if i == hot { 1.0 } else { 0.0 })));
                    }
                    None => out.push(cell.clone()),
                }
            }
            rows.push(out);
        }

        Frame::new(columns, rows)
    }
}

/// Standard scaling of numeric columns with population statistics.
pub struct Scale;

impl TransformStage for Scale {
    fn kind(&self) -> StageKind {
        StageKind::Scale
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn fit(&self, frame: &Frame, schema: &FeatureSchema) -> Result<Option<StageState>, TransformError> {
        let mut params = BTreeMap::new();
        for name in schema.numeric() {
            let Some(idx) = frame.column_index(name) else {
                continue;
            };
            let mut values = Vec::with_capacity(frame.n_rows());
            for cell in frame.column(idx) {
                values.push(cell.as_number().ok_or_else(|| TransformError::NonNumeric {
                    column: name.clone(),
                })?);
            }
            params.insert(name.clone(), affine_of(&values));
        }
        Ok(Some(StageState::Scale { params }))
    }

    fn apply(
        &self,
        mut frame: Frame,
        _schema: &FeatureSchema,
        state: Option<&StageState>,
        _report: &mut TransformReport,
    ) -> Result<Frame, TransformError> {
        let Some(StageState::Scale { params }) = state else {
            return Err(missing_state(self.kind()));
        };

        for (name, affine) in params {
            let Some(col) = frame.column_index(name) else {
                continue;
            };
            for row in 0..frame.n_rows() {
                let cell = frame.cell_mut(row, col);
                let x = cell.as_number().ok_or_else(|| TransformError::NonNumeric {
                    column: name.clone(),
                })?;
                *cell = FeatureValue::Number((x - affine.mean) / affine.scale);
            }
        }
        Ok(frame)
    }
}

/// Zero or non-finite spread scales by 1 so constant columns center to 0.
fn affine_of(values: &[f64]) -> Affine {
    if values.is_empty() {
        return Affine { mean: 0.0, scale: 1.0 };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    let scale = if std > 0.0 && std.is_finite() { std } else { 1.0 };
    Affine { mean, scale }
}

/// Re-projects onto the column layout recorded at fit time.
pub struct FinalReindex;

impl TransformStage for FinalReindex {
    fn kind(&self) -> StageKind {
        StageKind::FinalReindex
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn fit(&self, frame: &Frame, _schema: &FeatureSchema) -> Result<Option<StageState>, TransformError> {
        Ok(Some(StageState::FinalReindex {
            columns: frame.columns().to_vec(),
        }))
    }

    fn apply(
        &self,
        frame: Frame,
        _schema: &FeatureSchema,
        state: Option<&StageState>,
        _report: &mut TransformReport,
    ) -> Result<Frame, TransformError> {
        let Some(StageState::FinalReindex { columns }) = state else {
            return Err(missing_state(self.kind()));
        };
        Ok(frame.reindex(columns))
    }
}
