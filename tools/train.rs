//! Training tool
//!
//! Reads merged transaction + identity records as JSON lines, runs a training
//! pass and writes the model bundle and model artifact to the configured
//! locations.
//!
//! Usage: train <records.jsonl> [config.toml]

use anyhow::{bail, Context, Result};
use fraud_decision_pipeline::{
    config::AppConfig,
    models::StumpBooster,
    report::CostReport,
    training::Trainer,
    types::Record,
    BundleRegistry, LocalStore,
};
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing::{info, warn};

fn read_records(path: &str) -> Result<Vec<Record>> {
    let file = File::open(path).with_context(|| format!("Failed to open {path}"))?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record =
            serde_json::from_str(&line).with_context(|| format!("{path}:{}: invalid record", i + 1))?;
        records.push(record);
    }
    Ok(records)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("fraud_decision_pipeline=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(data_path) = args.get(1) else {
        bail!("usage: {} <records.jsonl> [config.toml]", args[0]);
    };
    let config = match args.get(2) {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "No usable config/config.toml, using defaults");
            AppConfig::default()
        }),
    };

    let records = read_records(data_path)?;
    info!(path = %data_path, records = records.len(), "Training records loaded");

    let amount_column = config.segmentation.amount_column.clone();
    let amounts: Vec<Option<f64>> = records
        .iter()
        .map(|r| r.get(&amount_column).and_then(|v| v.as_number()))
        .collect();

    let registry = BundleRegistry::new(LocalStore::new());
    let adapter = StumpBooster::new(config.training.booster.clone());
    let outcome = Trainer::new(config.training.clone()).run(
        records,
        &adapter,
        &registry,
        &config.artifacts.bundle_uri,
        &config.artifacts.model_uri,
    )?;

    // Business view of the validation set under the configured segmentation.
    let segmentation = config.segmentation.engine()?;
    let scored = outcome
        .validation_rows
        .iter()
        .zip(&outcome.validation_probabilities)
        .filter_map(|(&row, &p)| amounts[row].map(|amount| segmentation.score(amount, p)))
        .collect::<Result<Vec<_>, _>>()?;
    CostReport::build(&scored, &segmentation).log();

    info!(
        version = %outcome.bundle.version,
        threshold = outcome.bundle.threshold(),
        bundle = %config.artifacts.bundle_uri,
        model = %config.artifacts.model_uri,
        "Artifacts written"
    );
    Ok(())
}
