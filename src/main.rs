//! Fraud Decision Pipeline - Scoring Service
//!
//! Consumes inference requests from NATS, scores them against the active
//! model bundle, and publishes decisions. A message on the reload subject
//! swaps in the bundle currently stored at the configured location.

use anyhow::{Context, Result};
use fraud_decision_pipeline::{
    config::{AppConfig, LoggingConfig},
    consumer::RequestConsumer,
    metrics::{MetricsReporter, ServingMetrics},
    models::{BoostedStumps, ModelLoader, ScoringEngine},
    producer::DecisionProducer,
    service::ScoringService,
    LocalStore,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("fraud_decision_pipeline={}", logging.level)))
        .context("Invalid log level")?;

    if logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config/config.toml".to_string());
    let config = AppConfig::load_from_path(&config_path)?;
    init_logging(&config.logging)?;

    info!(config = %config_path, "Starting Fraud Decision Pipeline");

    let segmentation = config.segmentation.engine()?;
    info!(
        low = segmentation.cutoffs.low,
        medium = segmentation.cutoffs.medium,
        high = segmentation.cutoffs.high,
        cost_mode = ?segmentation.cost_mode,
        "Segmentation configured"
    );

    let loader = Arc::new(ModelLoader::new(LocalStore::new()));
    let serving = loader
        .load::<BoostedStumps>(&config.artifacts.bundle_uri, &config.artifacts.model_uri)
        .context("Failed to load serving bundle")?;

    let metrics = Arc::new(ServingMetrics::new());
    let engine = ScoringEngine::new(serving, segmentation, config.segmentation.amount_column.clone());
    let service = Arc::new(ScoringService::new(
        engine,
        config.request_parser(),
        metrics.clone(),
    ));

    let client = async_nats::connect(&config.nats.url).await?;
    info!(url = %config.nats.url, "Connected to NATS");

    let consumer = RequestConsumer::new(client.clone(), &config.nats.request_subject, &config.nats.reload_subject);
    let producer = Arc::new(DecisionProducer::new(
        client.clone(),
        &config.nats.decision_subject,
        &config.nats.rejection_subject,
    ));

    // Reload listener
    let mut reloads = consumer.subscribe_reloads().await?;
    {
        let service = service.clone();
        let loader = loader.clone();
        let artifacts = config.artifacts.clone();
        tokio::spawn(async move {
            while reloads.next().await.is_some() {
                info!(bundle = %artifacts.bundle_uri, "Reload requested");
                // Failures are logged inside; the active bundle stays in place.
                let _ = service.reload(&loader, &artifacts.bundle_uri, &artifacts.model_uri);
            }
        });
    }

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let workers = config.pipeline.workers.max(1);
    let semaphore = Arc::new(Semaphore::new(workers));
    info!(
        workers,
        subject = %consumer.request_subject(),
        decisions = %producer.decision_subject(),
        "Starting request processing loop"
    );

    let mut requests = consumer.subscribe_requests().await?;
    while let Some(message) = requests.next().await {
        let permit = semaphore.clone().acquire_owned().await?;
        let service = service.clone();
        let producer = producer.clone();

        tokio::spawn(async move {
            let reply = service.handle(&message.payload);
            match message.reply {
                Some(subject) => {
                    if let Err(e) = producer.reply(subject, &reply).await {
                        error!(error = %e, "Failed to send reply");
                    }
                }
                None => producer.publish_all(&reply).await,
            }
            drop(permit);
        });
    }

    info!("Request stream closed, shutting down");
    metrics.log_summary();

    Ok(())
}
