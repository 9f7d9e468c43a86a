use chrono::Duration;

/// Estimates distance covered for a completed ride. The service has no
/// real tracking data, so implementations work from driving time alone.
pub trait DistanceEstimator: Send + Sync {
    fn estimate_miles(&self, driving_time: Duration) -> f64;
}

/// Fixed-speed heuristic: half a mile per driving minute.
#[derive(Clone, Copy, Debug)]
pub struct FixedSpeedEstimator {
    pub miles_per_minute: f64,
}

impl Default for FixedSpeedEstimator {
    fn default() -> Self {
        Self { miles_per_minute: 0.5 }
    }
}

impl DistanceEstimator for FixedSpeedEstimator {
    fn estimate_miles(&self, driving_time: Duration) -> f64 {
        let minutes = driving_time.num_seconds().max(0) as f64 / 60.0;
        minutes * self.miles_per_minute
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{DistanceEstimator, FixedSpeedEstimator};

    #[test]
    fn default_estimator_uses_half_mile_per_minute() {
        let estimator = FixedSpeedEstimator::default();
        assert_eq!(estimator.estimate_miles(Duration::minutes(30)), 15.0);
    }

    #[test]
    fn negative_durations_estimate_zero() {
        let estimator = FixedSpeedEstimator::default();
        assert_eq!(estimator.estimate_miles(Duration::minutes(-10)), 0.0);
    }
}
