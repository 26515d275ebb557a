use serde::{Deserialize, Serialize};

use super::fix::{BasePoint, Fix};

/// Monotone counters accumulated by the detector across a run.
///
/// Never reset except by [`crate::detector::DriftDetector::reset`]. `[derive
/// Default]` gives the all-zero starting state used before the first fix is
/// seen.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub input_count: u64,
    pub accepted_count: u64,
    pub rejected_count: u64,
    pub rebuild_count: u64,
}

impl ProcessingStats {
    pub fn filtering_rate(&self) -> f64 {
        self.rejected_count as f64 / self.input_count.max(1) as f64
    }
}

/// A point-in-time view of the detector, suitable for logging or shipping
/// out over the wire as part of a [`crate::detector::ProcessingResult`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub window_length: usize,
    pub accepted_count: u64,
    pub has_base_point: bool,
    pub base_radius: f64,
    pub consecutive_drift_count: usize,
    pub base_age_ms: i64,
    pub base_expired: bool,
    pub base_point: Option<BasePoint>,
    pub rejected_count: u64,
    pub rebuild_count: u64,
    pub rebuild_positions: Vec<Fix>,
    pub processing_time_ms: u64,
    pub filtering_rate: f64,
}
