//! Feature transformation pipeline shared by training and serving.
//!
//! Fitting and applying run the same ordered stage list through one code
//! path; the only difference is where each stateful stage gets its state.
//! In fit mode the stage learns it from the frame it is handed; in apply mode
//! it is read from the persisted [`FittedTransformerSet`].

pub mod schema;
pub mod stages;
pub mod state;

pub use schema::FeatureSchema;
pub use stages::{TransformReport, TransformStage, MISSING_CATEGORY};
pub use state::{FittedTransformerSet, StageKind, StageState};

use crate::error::TransformError;
use crate::types::{FeatureMatrix, Frame};
use serde::Deserialize;
use tracing::debug;

/// Categorical encoding strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Label,
    OneHot,
}

/// Optional stages of the standard pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineOptions {
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default = "enabled")]
    pub impute: bool,
    #[serde(default = "enabled")]
    pub scale: bool,
}

fn enabled() -> bool {
    true
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::Label,
            impute: true,
            scale: true,
        }
    }
}

enum Mode<'a> {
    Fit(&'a mut Vec<StageState>),
    Apply(&'a FittedTransformerSet),
}

/// Output of a transform run.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub matrix: FeatureMatrix,
    pub report: TransformReport,
}

/// Ordered list of transform stages.
pub struct Pipeline {
    stages: Vec<Box<dyn TransformStage>>,
}

impl Pipeline {
    /// Reindex → null fill → impute → encode → scale → final reindex, with
    /// disabled stages left out of the list.
    pub fn standard(options: &PipelineOptions) -> Self {
        let mut order = vec![StageKind::Reindex, StageKind::CategoricalNullFill];
        if options.impute {
            order.push(StageKind::NumericImpute);
        }
        order.push(match options.encoding {
            Encoding::Label => StageKind::LabelEncode,
            Encoding::OneHot => StageKind::OneHotEncode,
        });
        if options.scale {
            order.push(StageKind::Scale);
        }
        order.push(StageKind::FinalReindex);
        Self::from_order(&order)
    }

    pub fn from_order(order: &[StageKind]) -> Self {
        Self {
            stages: order.iter().map(|&k| stages::stage_for(k)).collect(),
        }
    }

    /// Rebuild the pipeline a transformer set was fit with.
    pub fn for_set(set: &FittedTransformerSet) -> Self {
        Self::from_order(set.stage_order())
    }

    pub fn stage_order(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    /// Fit every stage on `frame` and return the fitted set together with
    /// the transformed training matrix.
    pub fn fit_transform(
        &self,
        frame: Frame,
        schema: &FeatureSchema,
    ) -> Result<(FittedTransformerSet, Transformed), TransformError> {
        if frame.n_rows() == 0 {
            return Err(TransformError::EmptyInput);
        }

        let mut states = Vec::new();
        let (out, report) = self.run(frame, schema, Mode::Fit(&mut states))?;
        let set = FittedTransformerSet::new(self.stage_order(), states);
        let matrix = out.into_matrix()?;

        debug!(
            rows = matrix.n_rows(),
            columns = matrix.n_cols(),
            stages = set.stage_order().len(),
            "Transformers fitted"
        );

        Ok((set, Transformed { matrix, report }))
    }

    /// Apply previously fitted state. Never refits.
    pub fn transform(
        &self,
        frame: Frame,
        schema: &FeatureSchema,
        set: &FittedTransformerSet,
    ) -> Result<Transformed, TransformError> {
        let (out, report) = self.run(frame, schema, Mode::Apply(set))?;
        Ok(Transformed {
            matrix: out.into_matrix()?,
            report,
        })
    }

    fn run(
        &self,
        mut frame: Frame,
        schema: &FeatureSchema,
        mut mode: Mode<'_>,
    ) -> Result<(Frame, TransformReport), TransformError> {
        let mut report = TransformReport::default();

        for stage in &self.stages {
            frame = match &mut mode {
                Mode::Fit(states) => {
                    let state = stage.fit(&frame, schema)?;
                    let next = stage.apply(frame, schema, state.as_ref(), &mut report)?;
                    states.extend(state);
                    next
                }
                Mode::Apply(set) => {
                    let state = if stage.is_stateful() {
                        Some(set.state(stage.kind()).ok_or(TransformError::TransformerMissing {
                            stage: stage.kind().as_str(),
                        })?)
                    } else {
                        None
                    };
                    stage.apply(frame, schema, state, &mut report)?
                }
            };
        }

        Ok((frame, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeatureValue, Record};

    fn record(pairs: &[(&str, FeatureValue)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn training_frame() -> Frame {
        Frame::from_records(&[
            record(&[("amt", 100.0.into()), ("card4", "visa".into()), ("dist1", 10.0.into())]),
            record(&[("amt", 300.0.into()), ("card4", "mastercard".into()), ("dist1", FeatureValue::Missing)]),
            record(&[("amt", 200.0.into()), ("card4", FeatureValue::Missing), ("dist1", 30.0.into())]),
        ])
    }

    fn schema_for(frame: &Frame) -> FeatureSchema {
        FeatureSchema::capture(frame.columns(), &["card4"]).unwrap()
    }

    #[test]
    fn test_fit_then_apply_matches_fit_output() {
        let frame = training_frame();
        let schema = schema_for(&frame);
        let pipeline = Pipeline::standard(&PipelineOptions::default());

        let (set, fitted) = pipeline.fit_transform(frame.clone(), &schema).unwrap();
        let applied = pipeline.transform(frame, &schema, &set).unwrap();

        assert_eq!(fitted.matrix, applied.matrix);
        assert_eq!(applied.matrix.columns, vec!["amt", "card4", "dist1"]);
    }

    #[test]
    fn test_missing_category_becomes_known_class() {
        let frame = training_frame();
        let schema = schema_for(&frame);
        let (set, _) = Pipeline::standard(&PipelineOptions::default())
            .fit_transform(frame, &schema)
            .unwrap();

        let Some(StageState::LabelEncode { classes }) = set.state(StageKind::LabelEncode) else {
            panic!("label encoder not fitted");
        };
        assert_eq!(classes["card4"], vec!["mastercard", "missing", "visa"]);
    }

    #[test]
    fn test_apply_on_incomplete_record() {
        let frame = training_frame();
        let schema = schema_for(&frame);
        let options = PipelineOptions {
            scale: false,
            ..PipelineOptions::default()
        };
        let pipeline = Pipeline::standard(&options);
        let (set, _) = pipeline.fit_transform(frame, &schema).unwrap();

        // dist1 absent: synthesized as 0, not imputed. card4 unseen: first class.
        let request = Frame::from_records(&[record(&[
            ("amt", 50.0.into()),
            ("card4", "discover".into()),
            ("unknown_col", 1.0.into()),
        ])]);
        let out = pipeline.transform(request, &schema, &set).unwrap();

        assert_eq!(out.matrix.rows[0], vec![50.0, 0.0, 0.0]);
        assert_eq!(out.report.synthesized_columns, 1);
        assert_eq!(out.report.dropped_columns, 1);
        assert_eq!(out.report.unknown_category_fallbacks, 1);
    }

    #[test]
    fn test_missing_stage_state_is_fatal() {
        let frame = training_frame();
        let schema = schema_for(&frame);
        let (set, _) = Pipeline::standard(&PipelineOptions {
            scale: false,
            ..PipelineOptions::default()
        })
        .fit_transform(frame.clone(), &schema)
        .unwrap();

        let err = Pipeline::standard(&PipelineOptions::default())
            .transform(frame, &schema, &set)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_disabled_stages_are_omitted() {
        let options = PipelineOptions {
            encoding: Encoding::OneHot,
            impute: false,
            scale: false,
        };
        assert_eq!(
            Pipeline::standard(&options).stage_order(),
            vec![
                StageKind::Reindex,
                StageKind::CategoricalNullFill,
                StageKind::OneHotEncode,
                StageKind::FinalReindex
            ]
        );
    }

    #[test]
    fn test_empty_frame_cannot_be_fit() {
        let frame = Frame::new(vec!["amt".into()], vec![]).unwrap();
        let schema = FeatureSchema::capture(frame.columns(), &[] as &[&str]).unwrap();
        let err = Pipeline::standard(&PipelineOptions::default())
            .fit_transform(frame, &schema)
            .unwrap_err();
        assert!(matches!(err, TransformError::EmptyInput));
    }
}
