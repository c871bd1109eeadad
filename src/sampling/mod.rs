pub mod buffer;
pub mod percentiles;
pub mod sampler;
pub mod stream;

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use percentiles::{PercentileSet, WindowSummary};
pub use sampler::{Sampler, SamplerStats};

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

pub const MS_PER_MINUTE: i64 = 60_000;

// ─── Data model ──────────────────────────────────────────────────

/// A single upload/download rate sample at original resolution.
/// This is the "write" side — the producer creates these and pushes them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Upload rate (bytes/s)
    pub up: f64,
    /// Download rate (bytes/s)
    pub down: f64,
    /// Milliseconds since epoch
    pub timestamp: Timestamp,
    /// `HH:MM:SS` rendering of `timestamp`, for chart axes
    pub label: String,
}

impl DataPoint {
    pub fn new(up: f64, down: f64, timestamp: Timestamp) -> Self {
        Self {
            up,
            down,
            timestamp,
            label: format_label(timestamp),
        }
    }
}

/// The arithmetic mean of `sample_count` consecutive raw points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompressedPoint {
    pub up: f64,
    pub down: f64,
    pub timestamp: Timestamp,
    pub sample_count: u32,
}

impl CompressedPoint {
    /// Averages `points`. Returns `None` for an empty run.
    pub fn mean_of(points: &[DataPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (up, down, ts) = points.iter().fold((0.0, 0.0, 0i128), |acc, p| {
            (acc.0 + p.up, acc.1 + p.down, acc.2 + i128::from(p.timestamp))
        });
        Some(Self {
            up: up / n,
            down: down / n,
            timestamp: (ts as f64 / n).round() as Timestamp,
            sample_count: points.len() as u32,
        })
    }

    pub fn to_data_point(&self) -> DataPoint {
        DataPoint::new(self.up, self.down, self.timestamp)
    }
}

/// Fixed, locale-independent `HH:MM:SS` (UTC).
pub fn format_label(timestamp: Timestamp) -> String {
    match DateTime::<Utc>::from_timestamp_millis(timestamp) {
        Some(dt) => dt.format("%H:%M:%S").to_string(),
        None => String::from("--:--:--"),
    }
}

// ─── Configuration ───────────────────────────────────────────────

pub const DEFAULT_RAW_RETENTION_MINUTES: u32 = 10;
pub const DEFAULT_COMPRESSED_RETENTION_MINUTES: u32 = 60;
pub const DEFAULT_COMPRESSION_RATIO: u32 = 5;

/// Retention horizons and downsampling factor for one `Sampler`.
/// Immutable for the lifetime of the sampler built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_raw_retention")]
    pub raw_retention_minutes: u32,
    #[serde(default = "default_compressed_retention")]
    pub compressed_retention_minutes: u32,
    #[serde(default = "default_compression_ratio")]
    pub compression_ratio: u32,
}

fn default_raw_retention() -> u32 {
    DEFAULT_RAW_RETENTION_MINUTES
}
fn default_compressed_retention() -> u32 {
    DEFAULT_COMPRESSED_RETENTION_MINUTES
}
fn default_compression_ratio() -> u32 {
    DEFAULT_COMPRESSION_RATIO
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            raw_retention_minutes: DEFAULT_RAW_RETENTION_MINUTES,
            compressed_retention_minutes: DEFAULT_COMPRESSED_RETENTION_MINUTES,
            compression_ratio: DEFAULT_COMPRESSION_RATIO,
        }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.raw_retention_minutes == 0 {
            return Err(ConfigError::ZeroRawRetention);
        }
        if self.compression_ratio == 0 {
            return Err(ConfigError::ZeroCompressionRatio);
        }
        if self.compressed_retention_minutes < self.raw_retention_minutes {
            return Err(ConfigError::CompressedShorterThanRaw {
                raw: self.raw_retention_minutes,
                compressed: self.compressed_retention_minutes,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("raw retention must be at least one minute")]
    ZeroRawRetention,

    #[error("compression ratio must be at least 1")]
    ZeroCompressionRatio,

    #[error("compressed retention ({compressed} min) is shorter than raw retention ({raw} min)")]
    CompressedShorterThanRaw { raw: u32, compressed: u32 },

    #[error("default range must be at least one minute")]
    ZeroDefaultRange,
}

// ─── Time source ─────────────────────────────────────────────────

/// Where the sampler reads "now" from.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        Utc::now().timestamp_millis()
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
