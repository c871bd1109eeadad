use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::time::Duration;
use tracing::{debug, info};

use crate::refcount::RefCounter;
use crate::service::{SamplingHandle, ServiceError};

// ─── Configuration ───────────────────────────────────────────────

/// Upper bound for synthetic rates (bytes/s, ~100 Mbit/s)
const MAX_RATE: f64 = 12_500_000.0;

/// Largest per-tick change as a fraction of `MAX_RATE`
const MAX_STEP: f64 = 0.05;

// ─── Public entry point ──────────────────────────────────────────

/// Stand-in for the upstream traffic source.
///
/// Appends one random-walk sample per `interval` while at least one consumer
/// is attached to `counter`, and idles otherwise. Returns when the sampling
/// service goes away.
pub async fn run(counter: RefCounter, handle: SamplingHandle, interval: Duration, seed: u64) {
    let mut gate = counter.watch_activity();

    let mut walk = RateWalk::new(seed);

    loop {
        // ── Wait for the first consumer ─────────────────────────
        if gate.wait_for(|active| *active).await.is_err() {
            return;
        }
        info!("consumer attached, producing samples");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // ── Produce until the last consumer leaves ──────────────
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let (up, down) = walk.step();
                    if let Err(ServiceError::Closed) = handle.append(up, down, None).await {
                        debug!("sampling service gone, feed exiting");
                        return;
                    }
                }
                changed = gate.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !*gate.borrow_and_update() {
                        break;
                    }
                }
            }
        }
        info!("no consumers left, feed paused");
    }
}

// ─── Random walk ─────────────────────────────────────────────────

/// Bounded random walk for upload and download rates.
struct RateWalk {
    rng: StdRng,
    up: f64,
    down: f64,
}

impl RateWalk {
    fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let up = rng.gen_range(0.0..MAX_RATE * 0.1);
        let down = rng.gen_range(0.0..MAX_RATE * 0.5);
        Self { rng, up, down }
    }

    fn step(&mut self) -> (f64, f64) {
        let step = MAX_RATE * MAX_STEP;
        self.up = (self.up + self.rng.gen_range(-step..=step)).clamp(0.0, MAX_RATE);
        self.down = (self.down + self.rng.gen_range(-step..=step)).clamp(0.0, MAX_RATE);
        (self.up, self.down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{SamplingService, ServiceConfig};

    #[test]
    fn walk_stays_in_bounds() {
        let mut walk = RateWalk::new(7);
        for _ in 0..10_000 {
            let (up, down) = walk.step();
            assert!((0.0..=MAX_RATE).contains(&up));
            assert!((0.0..=MAX_RATE).contains(&down));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn produces_only_while_attached() {
        let handle = SamplingService::spawn(ServiceConfig::default()).unwrap();
        let counter = RefCounter::new();
        tokio::spawn(run(
            counter.clone(),
            handle.clone(),
            Duration::from_secs(1),
            42,
        ));

        // Nobody attached: nothing is produced.
        tokio::time::sleep(Duration::from_secs(5)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.sampler_stats.raw_buffer_size, 0);

        let consumer = counter.attach();
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.sampler_stats.raw_buffer_size, 4);

        consumer.dispose();
        tokio::time::sleep(Duration::from_secs(10)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.sampler_stats.raw_buffer_size, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn consumer_attached_before_start_is_seen() {
        let handle = SamplingService::spawn(ServiceConfig::default()).unwrap();
        let counter = RefCounter::new();
        let _consumer = counter.attach();

        tokio::spawn(run(
            counter.clone(),
            handle.clone(),
            Duration::from_secs(1),
            42,
        ));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.sampler_stats.raw_buffer_size, 3);
    }
}
