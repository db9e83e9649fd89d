//! Configuration for the catalog API

use core_config::{
    AppInfo, FromEnv, amqp::AmqpConfig, app_info, database::DatabaseConfig, redis::RedisConfig,
    server::ServerConfig,
};
use image_pipeline::PipelineConfig;

pub use core_config::Environment;

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub amqp: AmqpConfig,
    pub server: ServerConfig,
    pub environment: Environment,
    /// Queue names shared with the image worker
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        Ok(Self {
            app: app_info!(),
            database: DatabaseConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            amqp: AmqpConfig::from_env()?,
            server: ServerConfig::from_env()?,
            environment: Environment::from_env(),
            pipeline: PipelineConfig::from_env()?,
        })
    }
}
