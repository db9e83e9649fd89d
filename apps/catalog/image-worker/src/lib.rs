//! Image Worker Service
//!
//! Consumes product image work items from the broker, records the
//! compressed reference on the product and drops its cached read.
//!
//! ## Architecture
//!
//! ```text
//! image_processing ──▶ Consumer × WORKER_CONCURRENCY
//!   │                     ↓
//!   │               ImageProcessor ──▶ PostgreSQL (compressed_product_images)
//!   │                     ↓                 ↓
//!   │                ack / retry       Redis (invalidate product:{id})
//!   ↓
//! image_processing_retry (TTL) ──▶ back to image_processing
//! image_processing_dlx            ◀── exhausted or malformed items
//! ```

use axum::{Json, Router, extract::State, routing::get};
use core_config::{
    AppInfo, Environment, FromEnv, amqp::AmqpConfig, app_info, database::DatabaseConfig,
    redis::RedisConfig,
};
use domain_products::{
    CacheInvalidator, ImageProcessor, PgProductRepository, ProductArtifactStore,
    RedisProductCache, postgres,
};
use eyre::{Result, WrapErr};
use image_pipeline::{
    AmqpDeliverySource, AmqpPublisher, Consumer, ConsumerSummary, PipelineConfig, amqp, metrics,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

const DEFAULT_HEALTH_PORT: u16 = 8082;

/// Liveness and Prometheus endpoints
pub fn admin_router(app_info: AppInfo) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(|| async { metrics::render_metrics() }))
        .with_state(app_info)
}

async fn health(State(app): State<AppInfo>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "name": app.name,
        "version": app.version,
    }))
}

async fn start_health_server(app_info: AppInfo, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(port = %port, "Health server listening");

    axum::serve(listener, admin_router(app_info))
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the image worker
///
/// 1. Sets up structured logging and the Prometheus recorder
/// 2. Connects to PostgreSQL, Redis and the broker
/// 3. Declares the queue topology
/// 4. Runs `WORKER_CONCURRENCY` consumers until SIGINT/SIGTERM, letting
///    in-flight deliveries finish
///
/// # Errors
///
/// Returns an error if configuration is invalid, a backend is unreachable
/// or a consumer loses its broker subscription.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    metrics::init_metrics().wrap_err("Failed to initialize metrics")?;

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting image worker service");

    let health_port = core_config::env_parse_or("HEALTH_PORT", DEFAULT_HEALTH_PORT)?;
    let pipeline = PipelineConfig::from_env().wrap_err("Failed to load pipeline configuration")?;
    let database = DatabaseConfig::from_env().wrap_err("Failed to load PostgreSQL configuration")?;
    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let amqp_config = AmqpConfig::from_env()?;

    info!("Connecting to PostgreSQL...");
    let db = postgres::connect(&database.url)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    info!("Connected to PostgreSQL successfully");

    info!("Connecting to Redis...");
    let redis_client =
        redis::Client::open(redis_config.url.as_str()).wrap_err("Invalid Redis URL")?;
    let redis = redis::aio::ConnectionManager::new(redis_client)
        .await
        .wrap_err("Failed to connect to Redis")?;
    info!("Connected to Redis successfully");

    let connection = amqp::connect(&amqp_config.url, app_info.name)
        .await
        .wrap_err("Failed to connect to AMQP broker")?;
    amqp::declare(&connection, &pipeline)
        .await
        .wrap_err("Failed to declare queue topology")?;

    info!(
        queue = %pipeline.topology.main_queue,
        retry_queue = %pipeline.topology.retry_queue,
        dead_letter_queue = %pipeline.topology.dead_letter_queue,
        retry_delay_ms = pipeline.retry_delay.as_millis() as u64,
        max_attempts = pipeline.max_attempts,
        prefetch = pipeline.prefetch,
        concurrency = pipeline.concurrency,
        "Worker configuration loaded"
    );

    let store = ProductArtifactStore::new(
        Arc::new(PgProductRepository::new(db.clone())),
        CacheInvalidator::new(Arc::new(RedisProductCache::new(redis))),
    );
    let processor = Arc::new(ImageProcessor::new(Arc::new(store)));
    let publisher = Arc::new(
        AmqpPublisher::new(&connection, &pipeline)
            .await
            .wrap_err("Failed to open publishing channel")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    tokio::spawn(async move {
        if let Err(e) = start_health_server(app_info, health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    let mut consumers = JoinSet::new();
    for index in 0..pipeline.concurrency {
        let tag = pipeline.consumer_tag_for(index);
        let source = AmqpDeliverySource::subscribe(&connection, &pipeline, &tag)
            .await
            .wrap_err_with(|| format!("Failed to subscribe consumer {}", tag))?;
        let consumer = Consumer::new(source, processor.clone(), publisher.clone(), &pipeline);
        consumers.spawn(consumer.run(shutdown_rx.clone()));
    }

    let mut total = ConsumerSummary::default();
    let mut failure = None;
    while let Some(joined) = consumers.join_next().await {
        match joined {
            Ok(Ok(summary)) => {
                total.acked += summary.acked;
                total.retried += summary.retried;
                total.dead_lettered += summary.dead_lettered;
            }
            Ok(Err(e)) => {
                error!(error = %e, "Consumer stopped with an error");
                failure.get_or_insert_with(|| eyre::eyre!("Consumer failed: {}", e));
            }
            Err(e) => {
                error!(error = %e, "Consumer task panicked");
                failure.get_or_insert_with(|| eyre::eyre!("Consumer task failed: {}", e));
            }
        }
    }

    info!(
        acked = total.acked,
        retried = total.retried,
        dead_lettered = total.dead_lettered,
        "All consumers stopped"
    );

    if let Err(e) = connection.close(200, "shutdown").await {
        error!(error = %e, "Failed to close AMQP connection");
    }
    if let Err(e) = db.close().await {
        error!(error = %e, "Failed to close PostgreSQL pool");
    }

    match failure {
        Some(e) => Err(e),
        None => {
            info!("Image worker service stopped");
            Ok(())
        }
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating shutdown..."),
    }
}
