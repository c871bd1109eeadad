use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::sampling::{SamplingConfig, Timestamp};
use crate::service::{ServiceConfig, DEFAULT_RANGE_MINUTES, DEFAULT_SNAPSHOT_INTERVAL};
use crate::AppState;

use super::AppError;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AppendRequest {
    /// Upload rate (bytes/s)
    pub up: f64,
    /// Download rate (bytes/s)
    pub down: f64,
    /// Milliseconds since epoch; server time when omitted
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RangeRequest {
    pub minutes: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitRequest {
    #[serde(flatten)]
    pub sampling: SamplingConfig,

    #[serde(default = "default_range")]
    pub default_range_minutes: u32,

    #[serde(default = "default_interval_ms")]
    pub snapshot_interval_ms: u64,
}

fn default_range() -> u32 {
    DEFAULT_RANGE_MINUTES
}
fn default_interval_ms() -> u64 {
    DEFAULT_SNAPSHOT_INTERVAL.as_millis() as u64
}

impl From<InitRequest> for ServiceConfig {
    fn from(req: InitRequest) -> Self {
        Self {
            sampling: req.sampling,
            default_range_minutes: req.default_range_minutes,
            snapshot_interval: Duration::from_millis(req.snapshot_interval_ms),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct SubscriberCount {
    pub count: i64,
}

const ACK: Json<Ack> = Json(Ack { ok: true });

// ─── POST /api/traffic/append ────────────────────────────────────

pub async fn append(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AppendRequest>,
) -> Result<Json<Ack>, AppError> {
    state.sampler.append(req.up, req.down, req.timestamp).await?;
    Ok(ACK)
}

// ─── POST /api/traffic/range ─────────────────────────────────────

pub async fn set_range(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RangeRequest>,
) -> Result<Json<Ack>, AppError> {
    state.sampler.set_range(req.minutes).await?;
    Ok(ACK)
}

// ─── POST /api/traffic/clear ─────────────────────────────────────

pub async fn clear(State(state): State<Arc<AppState>>) -> Result<Json<Ack>, AppError> {
    state.sampler.clear().await?;
    Ok(ACK)
}

// ─── POST /api/traffic/init ──────────────────────────────────────

pub async fn init(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InitRequest>,
) -> Result<Json<Ack>, AppError> {
    let config = ServiceConfig::from(req);
    info!(?config, "re-initializing sampler");
    state.sampler.init(config).await?;
    Ok(ACK)
}

// ─── GET /api/subscribers ────────────────────────────────────────

pub async fn subscribers(State(state): State<Arc<AppState>>) -> Json<SubscriberCount> {
    Json(SubscriberCount {
        count: state.subscribers.get_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_request_fills_defaults() {
        let req: InitRequest = serde_json::from_str(r#"{"raw_retention_minutes": 2}"#).unwrap();
        let config = ServiceConfig::from(req);
        assert_eq!(config.sampling.raw_retention_minutes, 2);
        assert_eq!(config.sampling.compressed_retention_minutes, 60);
        assert_eq!(config.sampling.compression_ratio, 5);
        assert_eq!(config.default_range_minutes, DEFAULT_RANGE_MINUTES);
        assert_eq!(config.snapshot_interval, DEFAULT_SNAPSHOT_INTERVAL);
    }

    #[test]
    fn append_timestamp_is_optional() {
        let req: AppendRequest = serde_json::from_str(r#"{"up": 1.5, "down": 3}"#).unwrap();
        assert_eq!(req.timestamp, None);
        assert_eq!(req.down, 3.0);
    }
}
