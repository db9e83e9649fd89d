//! Catalog API - users, products and image enqueueing over REST

use axum::Router;
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_products::{
    PgProductRepository, PgUserRepository, ProductService, RedisProductCache, UserService,
    handlers, postgres,
};
use eyre::WrapErr;
use image_pipeline::{AmqpPublisher, amqp};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod config;
mod health;

use config::Config;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    info!(name = %config.app.name, version = %config.app.version, "Starting catalog API");

    info!("Connecting to PostgreSQL...");
    let db = postgres::connect(&config.database.url)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    info!("Connected to PostgreSQL successfully");

    info!("Connecting to Redis...");
    let redis_client =
        redis::Client::open(config.redis.url.as_str()).wrap_err("Invalid Redis URL")?;
    let redis = redis::aio::ConnectionManager::new(redis_client)
        .await
        .wrap_err("Failed to connect to Redis")?;
    info!("Connected to Redis successfully");

    let amqp_connection = amqp::connect(&config.amqp.url, config.app.name)
        .await
        .wrap_err("Failed to connect to AMQP broker")?;
    let publisher = AmqpPublisher::new(&amqp_connection, &config.pipeline)
        .await
        .wrap_err("Failed to open publishing channel")?;

    let products = ProductService::new(
        PgProductRepository::new(db.clone()),
        RedisProductCache::new(redis),
        Arc::new(publisher),
        config.pipeline.topology.main_queue.clone(),
    );
    let users = UserService::new(PgUserRepository::new(db.clone()));

    let app = Router::new()
        .nest("/products", handlers::router(products))
        .nest("/users", handlers::users_router(users))
        .merge(health::router(config.app.clone()))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.server.address())
        .await
        .wrap_err_with(|| format!("Failed to bind {}", config.server.address()))?;
    info!("Server starting on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Server error")?;

    info!("Shutting down: closing connections");
    if let Err(e) = amqp_connection.close(200, "shutdown").await {
        error!(error = %e, "Failed to close AMQP connection");
    }
    if let Err(e) = db.close().await {
        error!(error = %e, "Failed to close PostgreSQL pool");
    }

    info!("Catalog API shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
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
