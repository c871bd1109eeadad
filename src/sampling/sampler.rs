use std::sync::Arc;

use serde::Serialize;

use super::buffer::WindowBuffer;
use super::{
    Clock, CompressedPoint, ConfigError, DataPoint, SamplingConfig, SystemClock, Timestamp,
    MS_PER_MINUTE,
};

// ─── Public types ────────────────────────────────────────────────

/// Dual-resolution traffic store.
///
/// Recent samples are kept as-is for `raw_retention_minutes`; every
/// `compression_ratio` samples are also folded into one averaged point that
/// lives for `compressed_retention_minutes`. Range queries stitch the two
/// resolutions together at the raw horizon.
pub struct Sampler {
    config: SamplingConfig,
    clock: Arc<dyn Clock>,

    raw: WindowBuffer<DataPoint>,
    // Raw points waiting to be averaged into the next compressed point
    pending: Vec<DataPoint>,
    compressed: WindowBuffer<CompressedPoint>,
}

/// Buffer occupancy, net of lazily evicted slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SamplerStats {
    pub raw_buffer_size: usize,
    pub compressed_buffer_size: usize,
    pub compression_queue_size: usize,
    pub total_memory_points: usize,
}

// ─── Sampler impl ────────────────────────────────────────────────

impl Sampler {
    pub fn new(config: SamplingConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SamplingConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            raw: WindowBuffer::new(),
            pending: Vec::with_capacity(config.compression_ratio as usize),
            compressed: WindowBuffer::new(),
        })
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Ingest one raw sample. Callers must feed non-decreasing timestamps.
    pub fn add_data_point(&mut self, point: DataPoint) {
        let now = self.clock.now_ms();

        // ── Raw tier ────────────────────────────────────────────
        self.raw.push(point.clone());
        self.raw.evict_through(self.raw_horizon(now));

        // ── Compression ─────────────────────────────────────────
        self.pending.push(point);
        if self.pending.len() >= self.config.compression_ratio as usize {
            if let Some(mean) = CompressedPoint::mean_of(&self.pending) {
                self.compressed.push(mean);
            }
            self.pending.clear();
        }

        // ── Compressed tier ─────────────────────────────────────
        self.compressed
            .evict_through(now - minutes_to_ms(self.config.compressed_retention_minutes));
    }

    /// Points from the last `minutes`, oldest first.
    ///
    /// Windows within raw retention are served from raw points only. Longer
    /// windows return compressed points up to the raw horizon followed by raw
    /// points after it.
    pub fn get_data_for_time_range(&self, minutes: u32) -> Vec<DataPoint> {
        let now = self.clock.now_ms();
        let cutoff = now - minutes_to_ms(minutes);

        if minutes <= self.config.raw_retention_minutes {
            return self.raw.range(cutoff, None).to_vec();
        }

        let raw_horizon = self.raw_horizon(now);
        let older = self.compressed.range(cutoff, Some(raw_horizon));
        let recent = self.raw.range(raw_horizon, None);

        let mut out = Vec::with_capacity(older.len() + recent.len());
        out.extend(older.iter().map(CompressedPoint::to_data_point));
        out.extend_from_slice(recent);
        out.sort_by_key(|p| p.timestamp);
        out
    }

    /// The longest window this sampler can answer.
    pub fn get_available_data(&self) -> Vec<DataPoint> {
        self.get_data_for_time_range(self.config.compressed_retention_minutes)
    }

    pub fn get_stats(&self) -> SamplerStats {
        let raw_buffer_size = self.raw.len();
        let compressed_buffer_size = self.compressed.len();
        let compression_queue_size = self.pending.len();
        SamplerStats {
            raw_buffer_size,
            compressed_buffer_size,
            compression_queue_size,
            total_memory_points: raw_buffer_size + compressed_buffer_size + compression_queue_size,
        }
    }

    /// Drop every stored point. Configuration is kept.
    pub fn clear(&mut self) {
        self.raw.clear();
        self.pending.clear();
        self.compressed.clear();
    }

    fn raw_horizon(&self, now: Timestamp) -> Timestamp {
        now - minutes_to_ms(self.config.raw_retention_minutes)
    }
}

fn minutes_to_ms(minutes: u32) -> i64 {
    i64::from(minutes) * MS_PER_MINUTE
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("config", &self.config)
            .field("stats", &self.get_stats())
            .finish()
    }
}
