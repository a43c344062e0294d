//! Bounds how many topics are inspected when estimating cluster-wide counts.

/// Sampling knobs for partition and broker estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingStrategy {
    /// Up to this many topics, partition counts are exact.
    pub threshold: usize,

    /// Topics inspected to extrapolate the partition count beyond `threshold`.
    pub sample_size: usize,

    /// Topics inspected to estimate per-broker topic and partition counts.
    pub broker_sample_size: usize,
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self {
            threshold: 50,
            sample_size: 50,
            broker_sample_size: 20,
        }
    }
}

/// Partitions assumed per topic when the sample cannot be fetched.
pub const FALLBACK_PARTITIONS_PER_TOPIC: u64 = 3;

impl SamplingStrategy {
    /// Topics to fetch for the partition estimate: all of them up to the
    /// threshold, otherwise the first `sample_size`.
    pub fn partition_sample<'a>(&self, topics: &'a [String]) -> &'a [String] {
        if topics.len() <= self.threshold {
            topics
        } else {
            &topics[..self.sample_size.clamp(1, topics.len())]
        }
    }

    /// Topics to fetch for the per-broker estimate.
    pub fn broker_sample<'a>(&self, topics: &'a [String]) -> &'a [String] {
        &topics[..self.broker_sample_size.min(topics.len())]
    }

    /// Scales a count taken over `sampled` topics to `total` topics.
    ///
    /// Exact when the sample covers every topic.
    pub fn extrapolate(count: u64, sampled: usize, total: usize) -> u64 {
        if sampled == 0 {
            return 0;
        }
        if sampled >= total {
            return count;
        }

        (count as f64 * total as f64 / sampled as f64).round() as u64
    }

    /// Partition estimate when sampling failed.
    pub fn fallback_partitions(total: usize) -> u64 {
        total as u64 * FALLBACK_PARTITIONS_PER_TOPIC
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("topic-{i}")).collect()
    }

    #[test]
    fn small_clusters_are_exact() {
        let strategy = SamplingStrategy::default();
        let topics = names(50);
        assert_eq!(strategy.partition_sample(&topics).len(), 50);
    }

    #[test]
    fn large_clusters_are_sampled() {
        let strategy = SamplingStrategy::default();
        let topics = names(51);
        let sample = strategy.partition_sample(&topics);
        assert_eq!(sample.len(), 50);
        assert_eq!(sample[0], "topic-0");

        assert_eq!(strategy.broker_sample(&topics).len(), 20);
        assert_eq!(strategy.broker_sample(&names(3)).len(), 3);
    }

    #[test]
    fn extrapolation_rounds() {
        // 10 topics with 25 partitions -> 2.5 on average
        assert_eq!(SamplingStrategy::extrapolate(25, 10, 101), 253);
        assert_eq!(SamplingStrategy::extrapolate(0, 0, 10), 0);
        assert_eq!(SamplingStrategy::fallback_partitions(7), 21);
    }

    proptest! {
        #[test]
        fn exact_within_sample(count in 0u64..100_000, total in 1usize..500) {
            prop_assert_eq!(SamplingStrategy::extrapolate(count, total, total), count);
        }

        #[test]
        fn monotonic_in_count(a in 0u64..100_000, b in 0u64..100_000, sampled in 1usize..100, extra in 0usize..1000) {
            let total = sampled + extra;
            let (lo, hi) = (a.min(b), a.max(b));
            prop_assert!(
                SamplingStrategy::extrapolate(lo, sampled, total)
                    <= SamplingStrategy::extrapolate(hi, sampled, total)
            );
        }

        #[test]
        fn sample_never_exceeds_topics(threshold in 0usize..100, sample_size in 0usize..100, n in 0usize..200) {
            let strategy = SamplingStrategy { threshold, sample_size, broker_sample_size: sample_size };
            let topics = names(n);
            prop_assert!(strategy.partition_sample(&topics).len() <= n);
            prop_assert!(strategy.broker_sample(&topics).len() <= n);
        }
    }
}
