//! Deposit Predictor - Main Entry Point
//!
//! `train` fits and persists a pipeline, `serve` answers prediction requests
//! over NATS, `predict` scores a JSON batch from disk.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deposit_predictor::{
    artifacts::ArtifactStore,
    config::{AppConfig, LoggingConfig},
    consumer::RequestConsumer,
    metrics::{MetricsReporter, ServingMetrics},
    models::loader::load_serving_context,
    producer::ReplyPublisher,
    train::Trainer,
    types::PredictionRequest,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "deposit-predictor")]
#[command(about = "Term-deposit subscription training and prediction service", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a pipeline and persist its artifacts
    Train {
        /// Path to the configuration file
        #[arg(short, long, default_value = "configs/train.yaml")]
        config: PathBuf,

        /// Publish the new run as the serving model
        #[arg(long)]
        promote: bool,
    },

    /// Serve predictions over NATS request/reply
    Serve {
        /// Path to the configuration file
        #[arg(short, long, default_value = "configs/train.yaml")]
        config: PathBuf,
    },

    /// Score a JSON batch file with the serving artifacts
    Predict {
        /// Path to the configuration file
        #[arg(short, long, default_value = "configs/train.yaml")]
        config: PathBuf,

        /// Request body, or a bare array of customer records
        #[arg(short, long)]
        input: PathBuf,

        /// Decision threshold (overrides the request and the configured default)
        #[arg(short, long)]
        threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Train { config, promote } => {
            let config = load_config(&config)?;
            train(config, promote)
        }
        Commands::Serve { config } => {
            let config = load_config(&config)?;
            serve(config).await
        }
        Commands::Predict {
            config,
            input,
            threshold,
        } => {
            let config = load_config(&config)?;
            predict(&config, &input, threshold)
        }
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let config = AppConfig::load_from_path(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    init_logging(&config.logging)?;
    info!(path = %path.display(), "Configuration loaded successfully");
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("deposit_predictor={}", logging.level).parse()?);

    match logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

fn train(config: AppConfig, promote: bool) -> Result<()> {
    let store = ArtifactStore::new(config.artifacts.model_dir(), config.artifacts.metrics_dir());

    info!(
        data = %config.data.file_path.display(),
        model = %config.model.model_type,
        test_size = config.split.test_size,
        random_state = config.split.random_state,
        "Starting training run"
    );

    let set = Trainer::new(config).run().context("Training failed")?;
    let paths = store.persist(&set).context("Failed to persist artifacts")?;

    info!(
        run_id = %set.run_id,
        model = %paths.model.display(),
        label_encoder = %paths.label_encoder.display(),
        metrics = %paths.metrics.display(),
        "Training run complete"
    );
    info!(
        "Held-out metrics: accuracy={:.4} roc_auc={:.4} f1={:.4} pr_auc={:.4}",
        set.metrics.accuracy, set.metrics.roc_auc, set.metrics.f1, set.metrics.pr_auc
    );

    if promote {
        store
            .promote(&set.run_id)
            .context("Failed to promote the new run")?;
    }

    Ok(())
}

fn predict(config: &AppConfig, input: &Path, threshold: Option<f64>) -> Result<()> {
    let context = load_serving_context(config).context("Failed to load serving artifacts")?;

    let bytes = std::fs::read(input)
        .with_context(|| format!("Failed to read request from {}", input.display()))?;
    let raw: Value = serde_json::from_slice(&bytes).context("Request is not valid JSON")?;
    let raw = match raw {
        Value::Array(records) => json!({ "customers": records }),
        other => other,
    };

    let request = PredictionRequest::validate(&raw)?;
    let response = context.predict(&request.customers, threshold.or(request.threshold))?;

    info!(
        records = response.len(),
        positives = response.positives(),
        "Batch scored"
    );
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("Starting Deposit Prediction Service");

    // Startup is all-or-nothing: no requests are accepted without a valid pair
    let context = Arc::new(
        load_serving_context(&config).context("Failed to load serving artifacts")?,
    );
    info!(
        run_id = %context.pipeline().run_id(),
        model = %context.pipeline().model_type(),
        default_threshold = context.default_threshold(),
        "Serving context loaded"
    );

    let metrics = Arc::new(ServingMetrics::new());

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(
        client.clone(),
        &config.nats.predict_subject,
        &config.nats.health_subject,
    );
    let publisher = ReplyPublisher::new(client.clone());

    let num_workers = config.serving.workers;
    info!(
        "Starting request loop with {} parallel workers on {}",
        num_workers,
        consumer.predict_subject()
    );

    // Semaphore to limit concurrent scoring
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let processed_count = Arc::new(AtomicU64::new(0));

    let reporter = MetricsReporter::new(metrics.clone(), config.serving.report_interval_secs);
    tokio::spawn(reporter.start());

    let mut health = consumer.subscribe_health().await?;
    {
        let context = context.clone();
        let publisher = publisher.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            while let Some(message) = health.next().await {
                metrics.record_health_check();
                if let Err(e) = publisher.reply(&message, &context.health()).await {
                    error!(error = %e, "Failed to answer health probe");
                }
            }
        });
    }

    let mut requests = consumer.subscribe_predictions().await?;

    loop {
        let message = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            next = requests.next() => match next {
                Some(message) => message,
                None => break,
            },
        };

        // Acquire permit (limits concurrent tasks)
        let permit = semaphore.clone().acquire_owned().await?;

        let context = context.clone();
        let publisher = publisher.clone();
        let metrics = metrics.clone();
        let processed_count = processed_count.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();
            let request_id = Uuid::new_v4();

            let sent = match context.handle(&message.payload) {
                Ok(response) => {
                    let latency = start_time.elapsed();
                    metrics.record_batch(latency, &response.probabilities, response.positives());
                    debug!(
                        request_id = %request_id,
                        records = response.len(),
                        positives = response.positives(),
                        latency_us = latency.as_micros() as u64,
                        "Prediction batch answered"
                    );
                    publisher.reply(&message, &response).await
                }
                Err(reply) => {
                    metrics.record_rejection(&reply.error.kind);
                    warn!(
                        request_id = %request_id,
                        kind = %reply.error.kind,
                        field = ?reply.error.field,
                        message = %reply.error.message,
                        "Request rejected"
                    );
                    publisher.reply(&message, &reply).await
                }
            };

            if let Err(e) = sent {
                error!(request_id = %request_id, error = %e, "Failed to publish reply");
            }

            let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                let latency = metrics.get_latency_stats();
                info!(
                    processed = count,
                    throughput = format!("{:.1} rec/s", metrics.get_throughput()),
                    avg_latency_us = latency.mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    // Wait for in-flight requests before reporting
    let _drained = semaphore.acquire_many(num_workers as u32).await?;
    publisher.flush().await?;

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}
