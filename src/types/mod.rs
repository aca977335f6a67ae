//! Type definitions for the fraud decision pipeline

pub mod decision;
pub mod record;

pub use decision::{Decision, Prediction, Rejection, RiskTier, ScoredRecord, ServicePackage};
pub use record::{FeatureMatrix, FeatureValue, Frame, Record};
