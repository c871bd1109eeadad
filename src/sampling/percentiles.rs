use hdrhistogram::Histogram;
use serde::Serialize;

use super::DataPoint;

/// HdrHistogram range: 1 B/s → 1 TB/s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 1_000_000_000_000;
const HIST_SIGFIG: u8 = 3;

/// A complete percentile breakdown for one traffic direction.
/// Serialized straight into every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSet {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub p999: u64,
    pub count: u64,
}

impl PercentileSet {
    /// Extract a full percentile set from an HdrHistogram.
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_percentile(50.0),
            p95: hist.value_at_percentile(95.0),
            p99: hist.value_at_percentile(99.0),
            p999: hist.value_at_percentile(99.9),
            count: hist.len(),
        }
    }

    /// All-zero placeholder used before any samples are recorded.
    pub fn empty() -> Self {
        Self {
            min: 0,
            max: 0,
            mean: 0.0,
            p50: 0,
            p95: 0,
            p99: 0,
            p999: 0,
            count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

/// Upload and download distribution over the points of one query window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSummary {
    pub up: PercentileSet,
    pub down: PercentileSet,
}

impl WindowSummary {
    pub fn from_points(points: &[DataPoint]) -> Self {
        let (Some(mut up), Some(mut down)) = (new_histogram(), new_histogram()) else {
            return Self::empty();
        };
        for p in points {
            let _ = up.record(clamp_rate(p.up));
            let _ = down.record(clamp_rate(p.down));
        }
        Self {
            up: PercentileSet::from_histogram(&up),
            down: PercentileSet::from_histogram(&down),
        }
    }

    pub fn empty() -> Self {
        Self {
            up: PercentileSet::empty(),
            down: PercentileSet::empty(),
        }
    }
}

fn new_histogram() -> Option<Histogram<u64>> {
    Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG).ok()
}

/// Whole bytes/s, clamped into the histogram's trackable range.
/// NaN and negative rates land on the floor.
fn clamp_rate(rate: f64) -> u64 {
    if rate.is_nan() {
        return HIST_LOW;
    }
    (rate.round() as u64).clamp(HIST_LOW, HIST_HIGH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_zeroed() {
        let summary = WindowSummary::from_points(&[]);
        assert!(!summary.up.has_data());
        assert_eq!(summary, WindowSummary::empty());
    }

    #[test]
    fn summarizes_each_direction() {
        let points: Vec<_> = (1..=100)
            .map(|i| DataPoint::new(f64::from(i), 1_000.0, i64::from(i) * 1_000))
            .collect();
        let summary = WindowSummary::from_points(&points);

        assert_eq!(summary.up.count, 100);
        assert_eq!(summary.up.min, 1);
        assert_eq!(summary.up.max, 100);
        assert_eq!(summary.up.p50, 50);
        assert_eq!(summary.down.p99, 1_000);
        assert_eq!(summary.down.min, 1_000);
    }

    #[test]
    fn rates_are_clamped() {
        assert_eq!(clamp_rate(-5.0), 1);
        assert_eq!(clamp_rate(f64::NAN), 1);
        assert_eq!(clamp_rate(0.4), 1);
        assert_eq!(clamp_rate(2.6), 3);
        assert_eq!(clamp_rate(1e15), HIST_HIGH);
    }
}
