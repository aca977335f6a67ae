//! Fraud Decision Pipeline Library
//!
//! Fraud probability scoring with a single feature pipeline shared by
//! training and serving, threshold calibration, and risk segmentation into
//! service packages with cost estimates.

pub mod bundle;
pub mod calibration;
pub mod config;
pub mod consumer;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod report;
pub mod request;
pub mod segmentation;
pub mod service;
pub mod training;
pub mod types;

pub use bundle::{ArtifactStore, BundleRegistry, LocalStore, ModelBundle};
pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use models::{ModelLoader, ScoringEngine};
pub use producer::DecisionProducer;
pub use service::ScoringService;
pub use types::{Decision, Prediction, Record, RiskTier, ServicePackage};
