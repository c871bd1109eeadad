use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::sampling::{
    ConfigError, SamplingConfig, DEFAULT_COMPRESSED_RETENTION_MINUTES, DEFAULT_COMPRESSION_RATIO,
    DEFAULT_RAW_RETENTION_MINUTES,
};
use crate::service::{ServiceConfig, DEFAULT_RANGE_MINUTES};

/// Real-time traffic downsampling service.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Config {
    /// Address the HTTP API listens on
    #[arg(long, env = "TRAFFIC_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Minutes of full-resolution samples to keep
    #[arg(long, env = "TRAFFIC_RAW_RETENTION_MINUTES", default_value_t = DEFAULT_RAW_RETENTION_MINUTES)]
    pub raw_retention_minutes: u32,

    /// Minutes of averaged samples to keep (>= raw retention)
    #[arg(long, env = "TRAFFIC_COMPRESSED_RETENTION_MINUTES", default_value_t = DEFAULT_COMPRESSED_RETENTION_MINUTES)]
    pub compressed_retention_minutes: u32,

    /// Raw samples folded into each averaged sample
    #[arg(long, env = "TRAFFIC_COMPRESSION_RATIO", default_value_t = DEFAULT_COMPRESSION_RATIO)]
    pub compression_ratio: u32,

    /// Query range consumers see until they pick one
    #[arg(long, env = "TRAFFIC_DEFAULT_RANGE_MINUTES", default_value_t = DEFAULT_RANGE_MINUTES)]
    pub default_range_minutes: u32,

    /// Minimum spacing between append-driven snapshots
    #[arg(long, env = "TRAFFIC_SNAPSHOT_INTERVAL_MS", default_value_t = 250)]
    pub snapshot_interval_ms: u64,

    /// Spacing of synthetic samples
    #[arg(long, env = "TRAFFIC_FEED_INTERVAL_MS", default_value_t = 1_000)]
    pub feed_interval_ms: u64,

    /// Seed for the synthetic feed
    #[arg(long, env = "TRAFFIC_FEED_SEED", default_value_t = 1_000)]
    pub feed_seed: u64,

    /// Don't run the synthetic feed; rely on POST /api/traffic/append
    #[arg(long, env = "TRAFFIC_NO_FEED")]
    pub no_feed: bool,
}

impl Config {
    pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        let config = ServiceConfig {
            sampling: SamplingConfig {
                raw_retention_minutes: self.raw_retention_minutes,
                compressed_retention_minutes: self.compressed_retention_minutes,
                compression_ratio: self.compression_ratio,
            },
            default_range_minutes: self.default_range_minutes,
            snapshot_interval: Duration::from_millis(self.snapshot_interval_ms),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn feed_interval(&self) -> Duration {
        Duration::from_millis(self.feed_interval_ms)
    }
}
