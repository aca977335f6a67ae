//! Classifier adapters, the serving loader and the scoring engine

pub mod adapter;
pub mod gbdt;
pub mod inference;
pub mod loader;

pub use adapter::{load_model, save_model, Classifier, ModelAdapter, ModelArtifact};
pub use gbdt::{BoostedStumps, BoosterParams, StumpBooster};
pub use inference::{ScoreOutcome, ScoringEngine};
pub use loader::{ModelLoader, ServingBundle};
