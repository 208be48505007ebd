//! Per-metric publication policy.
//!
//! OCR output is noisy. A reading is republished only when it changes.
//! Volume is a monotonic counter, so a reading that runs away from the last
//! accepted value is almost always a misread digit; such readings are
//! dropped unless they are `0` (the counter was reset).

use std::collections::HashMap;

use crate::metric::Metric;

/// Largest volume increase accepted between two consecutive readings.
pub const VOLUME_JUMP_THRESHOLD: i64 = 50;

/// Outcome of evaluating a candidate reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First reading seen for this metric.
    Bootstrap,
    /// Reading accepted.
    Accepted,
    /// Same as the last accepted reading.
    Unchanged,
    /// Volume increased by more than [`VOLUME_JUMP_THRESHOLD`].
    Jump { delta: i64 },
}

impl Decision {
    /// Whether the reading should be published.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Bootstrap | Decision::Accepted)
    }
}

/// Remembers the last accepted reading of each metric.
#[derive(Debug, Default)]
pub struct MetricFilter {
    last_accepted: HashMap<Metric, i64>,
}

impl MetricFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value accepted for `metric`, if any.
    pub fn last_accepted(&self, metric: Metric) -> Option<i64> {
        self.last_accepted.get(&metric).copied()
    }

    /// Evaluate `candidate` and record it when accepted.
    ///
    /// State advances on acceptance even if the caller later fails to
    /// publish the value.
    pub fn evaluate(&mut self, metric: Metric, candidate: i64) -> Decision {
        let decision = match self.last_accepted.get(&metric) {
            None => Decision::Bootstrap,
            Some(&last) if candidate == last => Decision::Unchanged,
            Some(&last) => match metric {
                Metric::Throughput => Decision::Accepted,
                Metric::Volume => {
                    let delta = candidate.saturating_sub(last);
                    if candidate == 0 || delta < VOLUME_JUMP_THRESHOLD {
                        Decision::Accepted
                    } else {
                        Decision::Jump { delta }
                    }
                }
            },
        };

        if decision.is_accepted() {
            self.last_accepted.insert(metric, candidate);
        }

        decision
    }

    /// Shorthand for `evaluate(..).is_accepted()`.
    pub fn should_publish(&mut self, metric: Metric, candidate: i64) -> bool {
        self.evaluate(metric, candidate).is_accepted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primed(metric: Metric, value: i64) -> MetricFilter {
        let mut filter = MetricFilter::new();
        assert_eq!(filter.evaluate(metric, value), Decision::Bootstrap);
        filter
    }

    #[test]
    fn test_first_reading_always_published() {
        for metric in Metric::ALL {
            for value in [0, -3, 1_000_000] {
                let mut filter = MetricFilter::new();
                assert!(filter.should_publish(metric, value));
                assert_eq!(filter.last_accepted(metric), Some(value));
            }
        }
    }

    #[test]
    fn test_throughput_change_detection() {
        let mut filter = primed(Metric::Throughput, 12);
        assert_eq!(filter.evaluate(Metric::Throughput, 12), Decision::Unchanged);
        assert!(filter.should_publish(Metric::Throughput, 13));
        assert!(filter.should_publish(Metric::Throughput, 0));
        assert_eq!(filter.last_accepted(Metric::Throughput), Some(0));
    }

    #[test]
    fn test_volume_jump_threshold() {
        let mut filter = primed(Metric::Volume, 100);
        assert_eq!(
            filter.evaluate(Metric::Volume, 151),
            Decision::Jump { delta: 51 }
        );
        assert_eq!(filter.last_accepted(Metric::Volume), Some(100));

        // Exactly the threshold is still a jump.
        assert!(!filter.should_publish(Metric::Volume, 150));
        assert!(filter.should_publish(Metric::Volume, 149));
        assert_eq!(filter.last_accepted(Metric::Volume), Some(149));
    }

    #[test]
    fn test_volume_equal_rejected_decrease_accepted() {
        let mut filter = primed(Metric::Volume, 100);
        assert_eq!(filter.evaluate(Metric::Volume, 100), Decision::Unchanged);
        assert!(filter.should_publish(Metric::Volume, 90));
        assert_eq!(filter.last_accepted(Metric::Volume), Some(90));
    }

    #[test]
    fn test_volume_reset_always_accepted() {
        let mut filter = primed(Metric::Volume, 5_000);
        assert!(filter.should_publish(Metric::Volume, 0));
        assert_eq!(filter.last_accepted(Metric::Volume), Some(0));
        assert_eq!(filter.evaluate(Metric::Volume, 0), Decision::Unchanged);
    }

    #[test]
    fn test_metrics_are_independent() {
        let mut filter = primed(Metric::Throughput, 7);
        assert_eq!(filter.evaluate(Metric::Volume, 7), Decision::Bootstrap);
        assert_eq!(filter.evaluate(Metric::Throughput, 7), Decision::Unchanged);
    }

    #[test]
    fn test_extreme_values_do_not_overflow() {
        let mut filter = primed(Metric::Volume, i64::MIN);
        assert_eq!(
            filter.evaluate(Metric::Volume, i64::MAX),
            Decision::Jump { delta: i64::MAX }
        );
    }
}
