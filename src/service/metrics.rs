//! Per-broker and per-topic runtime figures.
//!
//! The admin protocol does not expose throughput or disk usage, so the
//! default provider simulates bounded values.

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::model::{BrokerMetrics, TopicMetrics};

pub trait MetricsProvider: std::fmt::Debug + Send + Sync {
    fn broker_metrics(&self, broker_id: i32) -> BrokerMetrics;

    fn topic_metrics(&self, topic: &str) -> TopicMetrics;

    /// Cluster-wide produce rate.
    fn messages_per_second(&self) -> f64;
}

/// Pseudo-random figures within plausible ranges.
#[derive(Debug)]
pub struct SimulatedMetrics {
    rng: Mutex<StdRng>,
}

impl SimulatedMetrics {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible figures for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for SimulatedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn one_decimal(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

impl MetricsProvider for SimulatedMetrics {
    fn broker_metrics(&self, _broker_id: i32) -> BrokerMetrics {
        let mut rng = self.rng.lock();
        BrokerMetrics {
            disk_usage: one_decimal(rng.gen_range(0.0..100.0)),
            network_in: one_decimal(rng.gen_range(0.0..1000.0)),
            network_out: one_decimal(rng.gen_range(0.0..1000.0)),
            requests_per_second: one_decimal(rng.gen_range(0.0..500.0)),
        }
    }

    fn topic_metrics(&self, _topic: &str) -> TopicMetrics {
        let mut rng = self.rng.lock();
        TopicMetrics {
            message_count: rng.gen_range(0..1_000_000),
            size_bytes: rng.gen_range(0..1_000_000_000),
            consumer_lag: rng.gen_range(0..1000),
        }
    }

    fn messages_per_second(&self) -> f64 {
        one_decimal(self.rng.lock().gen_range(0.0..1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_bounded() {
        let metrics = SimulatedMetrics::with_seed(7);
        for id in 0..100 {
            let b = metrics.broker_metrics(id);
            assert!((0.0..=100.0).contains(&b.disk_usage));
            assert!((0.0..=1000.0).contains(&b.network_in));
            assert!((0.0..=1000.0).contains(&b.network_out));
            assert!((0.0..=500.0).contains(&b.requests_per_second));

            let t = metrics.topic_metrics("t");
            assert!(t.consumer_lag < 1000);
        }
    }

    #[test]
    fn seeded_is_reproducible() {
        let a = SimulatedMetrics::with_seed(1);
        let b = SimulatedMetrics::with_seed(1);
        assert_eq!(a.broker_metrics(1), b.broker_metrics(1));
        assert_eq!(a.messages_per_second(), b.messages_per_second());
    }
}
