//! The streaming drift detector and base-point manager.
//!
//! This is the core of the crate: a per-fix accept/reject classifier built
//! around a moving reference position (the "base point") with a bounded
//! lifetime and a radius tied to local spread. See `DESIGN.md` for the
//! Open Question decisions baked into this implementation (which radius
//! variant, which clock the expiry check uses, which estimator each
//! base-point recompute uses).

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::geodesy;
use crate::types::{AnomalyMarker, BasePoint, Fix, MarkerKind, ProcessingStats, StatisticsSnapshot};

/// Tunable knobs for the detector. Defaults match the reference values in
/// the module overview; unspecified fields retain these when constructed
/// with `..Default::default()`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// `W` — fixes collected before a base point is first computed; also
    /// the rolling window size.
    pub window_size: usize,
    /// `V` — age (ms) after which the base point is invalidated.
    pub validity_period_ms: i64,
    /// `M` — consecutive rejections that trigger an unconditional rebuild.
    pub max_drift_sequence: usize,
    /// `K` — a fix is a drift candidate if `distance(fix, base) > K * radius`.
    pub drift_multiplier: f64,
    /// `Θ` — triangle angle below which three recent rejections are
    /// treated as collinear (straight-line motion, not drift).
    pub linear_angle_threshold_deg: f64,
    /// Minimum radius produced by the median-clamped rebuild variant.
    pub floor_radius_m: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            validity_period_ms: 15_000,
            max_drift_sequence: 10,
            drift_multiplier: 2.0,
            linear_angle_threshold_deg: 30.0,
            floor_radius_m: 50.0,
        }
    }
}

/// The detector's externally observable mode. Branched on directly rather
/// than inferred from `base.is_none()`, per the design notes in the module
/// overview.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorState {
    Warmup,
    Tracking,
}

/// The per-fix verdict returned by [`DriftDetector::process_fix`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixDecision {
    Accepted,
    Rejected,
}

/// The full outcome of a single [`DriftDetector::process_fix`] call.
///
/// `reclassified` carries any previously-rejected fixes that this call
/// retroactively promoted to accepted. Only linear-motion recovery (step 4b)
/// does this — the decision for `fix` alone would not otherwise capture
/// that a whole run of earlier rejections just got undone. A forced rebuild
/// (step 4c) never populates this: it seeds the window from the drift
/// buffer for the rebuild's geometry, but the buffer's prior rejections stay
/// rejected — only the triggering `fix` itself is newly accepted.
#[derive(Clone, Debug)]
pub struct FixOutcome {
    pub decision: FixDecision,
    pub reclassified: Vec<Fix>,
}

/// Result of running a whole trajectory through a detector in one call,
/// matching the wire `ProcessingResult` shape in `§6`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub original_points: Vec<Fix>,
    pub processed_points: Vec<Fix>,
    pub filtered_points: Vec<Fix>,
    pub statistics: StatisticsSnapshot,
    pub markers: Vec<AnomalyMarker>,
}

/// A candidate sitting in the drift buffer, tagged with whether it has
/// already been tallied as a permanent rejection. Only the most recently
/// appended candidate (mid-evaluation) can be untagged; every earlier entry
/// was, by construction, tallied on a previous call (see `DESIGN.md`).
#[derive(Clone, Copy, Debug)]
struct BufferedCandidate {
    fix: Fix,
    tallied_rejected: bool,
}

/// The streaming drift detector. Owns its window, drift buffer, base point,
/// and counters exclusively; public snapshots are by-value copies.
///
/// `O(W)` time and `O(W + M)` memory per [`process_fix`](Self::process_fix)
/// call — strictly single-threaded and causal, with no suspension points.
/// A host that wants to handle several trajectories concurrently
/// instantiates one `DriftDetector` per trajectory (see the `batch` CLI
/// subcommand for an example using `rayon`).
pub struct DriftDetector {
    config: DetectorConfig,
    state: DetectorState,
    window: VecDeque<Fix>,
    drift_buffer: VecDeque<BufferedCandidate>,
    base: Option<BasePoint>,
    stats: ProcessingStats,
    markers: Vec<AnomalyMarker>,
    last_fix_t: Option<i64>,
    last_processing_time_ms: u64,
}

impl DriftDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::Warmup,
            window: VecDeque::with_capacity(config.window_size),
            drift_buffer: VecDeque::with_capacity(config.max_drift_sequence),
            base: None,
            stats: ProcessingStats::default(),
            markers: Vec::new(),
            last_fix_t: None,
            last_processing_time_ms: 0,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DetectorConfig) {
        self.config = config;
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Reset to a fresh `Warmup` detector, clearing window, drift buffer,
    /// base point, counters, and markers. Config is preserved.
    pub fn reset(&mut self) {
        self.state = DetectorState::Warmup;
        self.window.clear();
        self.drift_buffer.clear();
        self.base = None;
        self.stats = ProcessingStats::default();
        self.markers.clear();
        self.last_fix_t = None;
        self.last_processing_time_ms = 0;
    }

    /// Classify one fix in timestamp order. See the module overview's
    /// `process_fix` contract for the full five-step decision procedure.
    pub fn process_fix(&mut self, fix: Fix) -> FixOutcome {
        self.stats.input_count += 1;
        self.last_fix_t = Some(fix.t);

        match self.state {
            DetectorState::Warmup => self.process_warmup(fix),
            DetectorState::Tracking => self.process_tracking(fix),
        }
    }

    /// Loop `process_fix` over a whole trajectory, assembling the
    /// accepted/rejected partition for just this call (including any
    /// retroactive reclassification that happens along the way).
    ///
    /// `fixes == []` returns an empty result without touching detector
    /// state — not an error (see `§7`, `EmptyTrajectory`).
    pub fn process_trajectory(&mut self, fixes: &[Fix]) -> ProcessingResult {
        let start = Instant::now();
        let mut processed = Vec::with_capacity(fixes.len());
        let mut filtered: Vec<Fix> = Vec::new();

        for &f in fixes {
            let outcome = self.process_fix(f);
            if !outcome.reclassified.is_empty() {
                // `f` itself is always already present in `reclassified` when
                // it is non-empty (the current fix is buffered before the
                // recovery/rebuild check runs), so it must not also be
                // pushed below — that would double-count it in `processed`.
                filtered.retain(|x| !outcome.reclassified.contains(x));
                processed.extend(outcome.reclassified.iter().copied());
                continue;
            }
            match outcome.decision {
                FixDecision::Accepted => processed.push(f),
                FixDecision::Rejected => filtered.push(f),
            }
        }

        self.last_processing_time_ms = start.elapsed().as_millis() as u64;

        ProcessingResult {
            original_points: fixes.to_vec(),
            processed_points: processed,
            filtered_points: filtered,
            statistics: self.snapshot(),
            markers: self.markers.clone(),
        }
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let now_t = self.last_fix_t.unwrap_or(0);
        let base_age_ms = self.base.map(|b| b.age_ms(now_t)).unwrap_or(0);
        let base_expired = self
            .base
            .map(|_| base_age_ms > self.config.validity_period_ms)
            .unwrap_or(false);

        StatisticsSnapshot {
            window_length: self.window.len(),
            accepted_count: self.stats.accepted_count,
            has_base_point: self.base.is_some(),
            base_radius: self.base.map(|b| b.radius).unwrap_or(0.0),
            consecutive_drift_count: self.drift_buffer.len(),
            base_age_ms,
            base_expired,
            base_point: self.base,
            rejected_count: self.stats.rejected_count,
            rebuild_count: self.stats.rebuild_count,
            rebuild_positions: self
                .markers
                .iter()
                .filter(|m| m.kind == MarkerKind::Rebuild)
                .map(|m| m.position)
                .collect(),
            processing_time_ms: self.last_processing_time_ms,
            filtering_rate: self.stats.filtering_rate(),
        }
    }

    // ── Step 1: warmup ───────────────────────────────────────────────

    fn process_warmup(&mut self, fix: Fix) -> FixOutcome {
        self.push_window(fix);
        self.stats.accepted_count += 1;

        if self.window.len() == self.config.window_size {
            self.build_initial_base_point(fix.t);
            self.state = DetectorState::Tracking;
        }

        FixOutcome {
            decision: FixDecision::Accepted,
            reclassified: Vec::new(),
        }
    }

    // ── Steps 2-5: tracking ──────────────────────────────────────────

    fn process_tracking(&mut self, fix: Fix) -> FixOutcome {
        let base = self.base.expect("tracking state implies a base point");

        // Step 2: expiry check, against the fix's own clock (see
        // `DESIGN.md`, Open Question 1) rather than wall-clock `now()`, so
        // replay is deterministic.
        if fix.t - base.created_at_t > self.config.validity_period_ms {
            self.window.clear();
            self.push_window(fix);
            self.base = None;
            self.drift_buffer.clear();
            self.stats.accepted_count += 1;
            self.state = DetectorState::Warmup;
            return FixOutcome {
                decision: FixDecision::Accepted,
                reclassified: Vec::new(),
            };
        }

        // Step 3: drift test.
        let d = geodesy::distance(fix, base.point());
        let is_drift = base.radius > 0.0 && d > self.config.drift_multiplier * base.radius;

        if is_drift {
            return self.process_drift_candidate(fix, base);
        }

        // Step 5: non-drift path.
        self.drift_buffer.clear();
        self.push_window(fix);
        self.stats.accepted_count += 1;
        self.refresh_base_point(fix.t);

        FixOutcome {
            decision: FixDecision::Accepted,
            reclassified: Vec::new(),
        }
    }

    fn process_drift_candidate(&mut self, fix: Fix, base: BasePoint) -> FixOutcome {
        self.drift_buffer.push_back(BufferedCandidate {
            fix,
            tallied_rejected: false,
        });
        if self.drift_buffer.len() > self.config.max_drift_sequence {
            self.drift_buffer.pop_front();
        }

        // Step 4b: linear-motion recovery.
        if self.drift_buffer.len() >= 3 {
            let last_three: Vec<Fix> = self
                .drift_buffer
                .iter()
                .rev()
                .take(3)
                .map(|c| c.fix)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            let angle = geodesy::min_triangle_angle(last_three[0], last_three[1], last_three[2]);
            let max_dist = last_three
                .iter()
                .map(|p| geodesy::distance(*p, base.point()))
                .fold(0.0_f64, f64::max);
            let sanity_cap = 5.0 * self.config.drift_multiplier * base.radius;

            if angle < self.config.linear_angle_threshold_deg && max_dist <= sanity_cap {
                let reclassified = self.drain_drift_buffer_as_accepted();
                for f in &reclassified {
                    self.push_window(*f);
                }
                self.rebuild_base_point_from_window(fix.t, fix, "linear-motion recovery");
                return FixOutcome {
                    decision: FixDecision::Accepted,
                    reclassified,
                };
            }
        }

        // Step 4c: forced rebuild. Unlike step 4b, the spec does not
        // retroactively reclassify the buffer's prior rejections here — it
        // only seeds the window from the buffer (for the rebuild's geometry)
        // and adds the triggering fix `f` to accepted. The earlier, already
        // -tallied rejections in the buffer stay rejected.
        if self.drift_buffer.len() >= self.config.max_drift_sequence {
            self.seed_window_from_drift_buffer();
            self.stats.accepted_count += 1;
            self.rebuild_base_point_from_window(fix.t, fix, "forced rebuild");
            return FixOutcome {
                decision: FixDecision::Accepted,
                reclassified: Vec::new(),
            };
        }

        // Step 4d: permanent rejection (until/unless a later fix
        // retroactively reclassifies it).
        self.stats.rejected_count += 1;
        if let Some(back) = self.drift_buffer.back_mut() {
            back.tallied_rejected = true;
        }

        FixOutcome {
            decision: FixDecision::Rejected,
            reclassified: Vec::new(),
        }
    }

    /// Linear-motion recovery only (step 4b): drain the whole drift buffer,
    /// undoing the rejection tally for every entry that had already been
    /// counted, and accumulating the accepted count for all of them
    /// (including the just-appended, never-tallied current candidate).
    ///
    /// The forced-rebuild path (step 4c) must NOT use this — it does not
    /// retroactively reclassify prior rejections, only the triggering fix;
    /// see [`Self::seed_window_from_drift_buffer`].
    fn drain_drift_buffer_as_accepted(&mut self) -> Vec<Fix> {
        let drained: Vec<BufferedCandidate> = self.drift_buffer.drain(..).collect();
        let mut fixes = Vec::with_capacity(drained.len());
        for c in drained {
            if c.tallied_rejected {
                self.stats.rejected_count -= 1;
            }
            self.stats.accepted_count += 1;
            fixes.push(c.fix);
        }
        fixes
    }

    /// Forced rebuild only (step 4c): seed the window from the drift
    /// buffer's fixes — for the rebuild's base-point geometry only — without
    /// touching `accepted_count`/`rejected_count` for any of them. The
    /// triggering fix's own acceptance is tallied separately by the caller.
    fn seed_window_from_drift_buffer(&mut self) {
        let drained: Vec<BufferedCandidate> = self.drift_buffer.drain(..).collect();
        self.window.clear();
        for c in &drained {
            self.push_window(c.fix);
        }
    }

    // ── Base-point construction ──────────────────────────────────────

    fn build_initial_base_point(&mut self, trigger_t: i64) {
        let pts: Vec<Fix> = self.window.iter().copied().collect();
        let point = geodesy::median_point(&pts).expect("window is non-empty by construction");
        self.base = Some(self.make_base_point(point, &pts, trigger_t));
    }

    fn refresh_base_point(&mut self, trigger_t: i64) {
        let pts: Vec<Fix> = self.window.iter().copied().collect();
        let point = geodesy::median_point(&pts).expect("window is non-empty by construction");
        self.base = Some(self.make_base_point(point, &pts, trigger_t));
    }

    fn rebuild_base_point_from_window(&mut self, trigger_t: i64, trigger_position: Fix, reason: &str) {
        let pts: Vec<Fix> = self.window.iter().copied().collect();
        let point = geodesy::centroid(&pts).expect("window is non-empty by construction");
        self.base = Some(self.make_base_point(point, &pts, trigger_t));
        self.stats.rebuild_count += 1;
        self.markers
            .push(AnomalyMarker::new(MarkerKind::Rebuild, trigger_position, reason));
    }

    fn make_base_point(&self, point: Fix, window: &[Fix], trigger_t: i64) -> BasePoint {
        let radius = Self::median_clamped_radius(window, point, self.config.floor_radius_m);
        BasePoint {
            lat: point.lat,
            lng: point.lng,
            radius,
            created_at_t: trigger_t,
            source_count: window.len(),
        }
    }

    /// Median distance from `center` to each point in `window`, clamped to
    /// `floor`. This crate's chosen radius variant — see `DESIGN.md`.
    fn median_clamped_radius(window: &[Fix], center: Fix, floor: f64) -> f64 {
        let mut dists: Vec<f64> = window.iter().map(|p| geodesy::distance(*p, center)).collect();
        dists.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let n = dists.len();
        let median = if n % 2 == 1 {
            dists[n / 2]
        } else {
            (dists[n / 2 - 1] + dists[n / 2]) / 2.0
        };
        median.max(floor)
    }

    fn push_window(&mut self, fix: Fix) {
        self.window.push_back(fix);
        if self.window.len() > self.config.window_size {
            self.window.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq_fix(i: i64, t0: i64) -> Fix {
        Fix::new(39.9042 + i as f64 * 1e-5, 116.4074 + i as f64 * 1e-5, t0 + i * 1000)
    }

    // S1 — warmup only.
    #[test]
    fn s1_warmup_only() {
        let mut d = DriftDetector::new(DetectorConfig::default());
        for i in 0..10 {
            let outcome = d.process_fix(seq_fix(i, 0));
            assert_eq!(outcome.decision, FixDecision::Accepted);
        }
        let snap = d.snapshot();
        assert!(snap.has_base_point);
        assert_eq!(snap.rebuild_count, 0);
        assert_eq!(snap.rejected_count, 0);
    }

    // S2 — single outlier.
    #[test]
    fn s2_single_outlier_is_rejected() {
        let mut d = DriftDetector::new(DetectorConfig::default());
        for i in 0..10 {
            d.process_fix(seq_fix(i, 0));
        }
        d.process_fix(seq_fix(10, 0));
        let outlier = Fix::new(39.95, 116.45, 21_000);
        let outcome = d.process_fix(outlier);
        assert_eq!(outcome.decision, FixDecision::Rejected);
        assert_eq!(d.snapshot().rejected_count, 1);
        assert_eq!(d.snapshot().rebuild_count, 0);
    }

    // S3 — static cluster forces a rebuild on the Mth rejection.
    #[test]
    fn s3_static_cluster_forces_rebuild() {
        let config = DetectorConfig {
            validity_period_ms: i64::MAX / 2,
            ..Default::default()
        };
        let mut d = DriftDetector::new(config);
        for i in 0..10 {
            d.process_fix(seq_fix(i, 0));
        }

        let mut last = FixDecision::Accepted;
        for i in 0..10 {
            let f = Fix::new(40.0, 117.0, 11_000 + i * 1000);
            last = d.process_fix(f).decision;
        }
        assert_eq!(last, FixDecision::Accepted);
        assert_eq!(d.snapshot().rebuild_count, 1);
        // Unlike linear-motion recovery, a forced rebuild does not
        // retroactively reclassify the buffer's prior rejections — only the
        // 10th (triggering) fix moves to accepted, per §4.2 step 4c and S3.
        assert_eq!(d.snapshot().rejected_count, 9);

        let follow_up = Fix::new(40.0001, 117.0001, 21_000);
        let outcome = d.process_fix(follow_up);
        assert_eq!(outcome.decision, FixDecision::Accepted);
    }

    // S4 — three collinear, far-out fixes trigger linear-motion recovery.
    #[test]
    fn s4_linear_motion_recovery() {
        let config = DetectorConfig {
            validity_period_ms: i64::MAX / 2,
            ..Default::default()
        };
        let mut d = DriftDetector::new(config);
        for i in 0..10 {
            d.process_fix(seq_fix(i, 0));
        }
        let radius = d.snapshot().base_radius;
        assert!(radius > 0.0);

        // Three fixes heading due east, each progressively further along a
        // straight line, each within the 5*K*radius sanity cap.
        let base_lat = 39.9042;
        let base_lng = 116.4074;
        let step_deg = (4.0 * radius / geodesy::EARTH_RADIUS_M).to_degrees();

        let f1 = Fix::new(base_lat, base_lng + step_deg, 11_000);
        let f2 = Fix::new(base_lat, base_lng + 2.0 * step_deg, 12_000);
        let f3 = Fix::new(base_lat, base_lng + 3.0 * step_deg, 13_000);

        let o1 = d.process_fix(f1);
        assert_eq!(o1.decision, FixDecision::Rejected);
        let o2 = d.process_fix(f2);
        assert_eq!(o2.decision, FixDecision::Rejected);
        let o3 = d.process_fix(f3);
        assert_eq!(o3.decision, FixDecision::Accepted);
        assert_eq!(o3.reclassified.len(), 3);
        assert_eq!(d.snapshot().rebuild_count, 1);
        assert_eq!(d.snapshot().rejected_count, 0);
    }

    // S5 — expiry restart.
    #[test]
    fn s5_expiry_restart() {
        let config = DetectorConfig {
            validity_period_ms: 100,
            ..Default::default()
        };
        let mut d = DriftDetector::new(config);
        for i in 0..10 {
            d.process_fix(seq_fix(i, 0));
        }
        assert_eq!(d.state(), DetectorState::Tracking);

        let late = Fix::new(50.0, 50.0, 11_000 + 101);
        let outcome = d.process_fix(late);
        assert_eq!(outcome.decision, FixDecision::Accepted);
        assert_eq!(d.state(), DetectorState::Warmup);
        assert!(!d.snapshot().has_base_point);
    }

    #[test]
    fn window_never_exceeds_w() {
        let mut d = DriftDetector::new(DetectorConfig::default());
        for i in 0..50 {
            d.process_fix(seq_fix(i, 0));
            assert!(d.snapshot().window_length <= d.config().window_size);
        }
    }

    #[test]
    fn drift_buffer_never_exceeds_m() {
        let config = DetectorConfig {
            validity_period_ms: i64::MAX / 2,
            ..Default::default()
        };
        let mut d = DriftDetector::new(config);
        for i in 0..10 {
            d.process_fix(seq_fix(i, 0));
        }
        for i in 0..30 {
            // Scattered, non-collinear noise around a distant cluster:
            // never satisfies the linear-recovery angle test.
            let lat = 45.0 + (i as f64 * 37.0 % 5.0) * 0.01;
            let lng = 45.0 + (i as f64 * 53.0 % 5.0) * 0.01;
            d.process_fix(Fix::new(lat, lng, 11_000 + i * 1000));
            assert!(d.snapshot().consecutive_drift_count <= d.config().max_drift_sequence);
        }
    }

    #[test]
    fn reset_then_replay_is_idempotent() {
        let fixes: Vec<Fix> = (0..30).map(|i| seq_fix(i, 0)).collect();
        let mut d = DriftDetector::new(DetectorConfig::default());
        let first = d.process_trajectory(&fixes);
        d.reset();
        let second = d.process_trajectory(&fixes);
        assert_eq!(first.processed_points, second.processed_points);
        assert_eq!(first.filtered_points, second.filtered_points);
    }

    #[test]
    fn empty_trajectory_is_not_an_error() {
        let mut d = DriftDetector::new(DetectorConfig::default());
        let result = d.process_trajectory(&[]);
        assert!(result.original_points.is_empty());
        assert!(result.processed_points.is_empty());
        assert_eq!(result.statistics.accepted_count, 0);
    }

    #[test]
    fn partition_covers_and_does_not_overlap_input() {
        let fixes: Vec<Fix> = (0..40).map(|i| seq_fix(i, 0)).collect();
        let mut d = DriftDetector::new(DetectorConfig::default());
        let result = d.process_trajectory(&fixes);
        assert_eq!(
            result.processed_points.len() + result.filtered_points.len(),
            fixes.len()
        );
    }

    // Regression: a rebuild (forced or linear-motion) reclassifies the
    // triggering fix along with the rest of the drift buffer — it must not
    // also be counted a second time in `processed_points`.
    #[test]
    fn process_trajectory_does_not_double_count_a_rebuild_trigger() {
        let config = DetectorConfig {
            validity_period_ms: i64::MAX / 2,
            ..Default::default()
        };
        let mut d = DriftDetector::new(config);
        let mut fixes: Vec<Fix> = (0..10).map(|i| seq_fix(i, 0)).collect();
        for i in 0..10 {
            fixes.push(Fix::new(40.0, 117.0, 11_000 + i * 1000));
        }
        let result = d.process_trajectory(&fixes);
        assert_eq!(
            result.processed_points.len() + result.filtered_points.len(),
            fixes.len()
        );
        let mut seen = std::collections::HashSet::new();
        for p in &result.processed_points {
            assert!(seen.insert((p.lat.to_bits(), p.lng.to_bits(), p.t)), "duplicate point in processed_points: {:?}", p);
        }
    }
}
