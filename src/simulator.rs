//! Anomaly simulator — corrupts a clean trajectory with fabricated drift,
//! signal loss, and under-sampling, so the detector's effectiveness can be
//! measured against ground truth.
//!
//! Seeded via `rand::rngs::StdRng::seed_from_u64`, which is the fix for the
//! one behavioral defect called out in the module overview: the reference
//! generator reseeded from wall-clock time on every call, making two runs
//! over the same baseline produce different corruption and defeating
//! reproducible tests. Everything here is deterministic given `seed`.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::geodesy;
use crate::types::{AnomalyMarker, Fix, MarkerKind};

/// A piecewise probability band for drift-distance sampling. Bands should
/// sum to `1.0`; `draw_distance` falls back to the last band if rounding
/// leaves the draw just short.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DriftBand {
    pub ratio: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub static_drift_count: usize,
    pub moving_drift_count: usize,
    pub tunnel_count: usize,
    pub speed_scenario_count: usize,
    pub drift_distance_range: (f64, f64),
    pub drift_distribution: Vec<DriftBand>,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            static_drift_count: 1,
            moving_drift_count: 1,
            tunnel_count: 1,
            speed_scenario_count: 1,
            drift_distance_range: (20.0, 200.0),
            drift_distribution: vec![
                DriftBand { ratio: 0.5, min: 20.0, max: 60.0 },
                DriftBand { ratio: 0.3, min: 60.0, max: 120.0 },
                DriftBand { ratio: 0.2, min: 120.0, max: 200.0 },
            ],
            seed: 0,
        }
    }
}

/// Points fabricated per static-drift cluster. Not exposed in
/// [`SimulatorConfig`] — the enumerated options cover cluster *count*, not
/// cluster *size* (see `DESIGN.md`).
const STATIC_DRIFT_CLUSTER_SIZE: usize = 5;
const MOVING_DRIFT_SPAN: std::ops::RangeInclusive<usize> = 5..=15;
const TUNNEL_SPAN: std::ops::RangeInclusive<usize> = 5..=20;
const SPEED_RUN_LEN: usize = 6;
const SPEED_DROP_OFFSETS: [usize; 3] = [1, 3, 4];
const SPEED_BEARING_TOLERANCE_DEG: f64 = 10.0;

#[derive(Clone, Copy, Debug)]
enum JobKind {
    Static,
    Moving,
    Tunnel,
    Speed,
}

#[derive(Clone, Copy, Debug)]
struct AnomalyJob {
    kind: JobKind,
    start: usize,
    end: usize,
}

/// The corrupted trajectory plus ground-truth markers for every anomaly
/// the simulator injected.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationResult {
    pub trajectory: Vec<Fix>,
    pub markers: Vec<AnomalyMarker>,
}

pub struct AnomalySimulator {
    config: SimulatorConfig,
    rng: StdRng,
}

impl AnomalySimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Corrupt `baseline` per the configured anomaly counts. Jobs whose
    /// sampled range collapses to empty during overlap resolution, or whose
    /// required shape (a straight run, for speed scenarios) cannot be found,
    /// are silently skipped — logged at `warn` by the caller via the
    /// returned marker count being lower than requested.
    pub fn generate(&mut self, baseline: &[Fix]) -> SimulationResult {
        if baseline.is_empty() {
            return SimulationResult { trajectory: Vec::new(), markers: Vec::new() };
        }

        let mut jobs = Vec::new();
        for _ in 0..self.config.static_drift_count {
            let (start, end) = self.sample_range(baseline.len(), 1);
            jobs.push(AnomalyJob { kind: JobKind::Static, start, end });
        }
        for _ in 0..self.config.moving_drift_count {
            let span = self.rng.gen_range(MOVING_DRIFT_SPAN).min(baseline.len());
            let (start, end) = self.sample_range(baseline.len(), span);
            jobs.push(AnomalyJob { kind: JobKind::Moving, start, end });
        }
        for _ in 0..self.config.tunnel_count {
            let span = self.rng.gen_range(TUNNEL_SPAN).min(baseline.len());
            let (start, end) = self.sample_range(baseline.len(), span);
            jobs.push(AnomalyJob { kind: JobKind::Tunnel, start, end });
        }
        let straight_runs = find_straight_runs(baseline, SPEED_RUN_LEN);
        for _ in 0..self.config.speed_scenario_count {
            if straight_runs.is_empty() {
                log::warn!("no straight segment available for a speed scenario, skipping");
                continue;
            }
            let idx = self.rng.gen_range(0..straight_runs.len());
            let (start, end) = straight_runs[idx];
            jobs.push(AnomalyJob { kind: JobKind::Speed, start, end });
        }

        let jobs = Self::resolve_overlaps(jobs);

        let mut kept: Vec<Fix> = baseline.to_vec();
        let mut deleted: HashSet<usize> = HashSet::new();
        let mut extra: Vec<Fix> = Vec::new();
        let mut markers = Vec::new();

        for job in jobs {
            match job.kind {
                JobKind::Static => self.apply_static(baseline, job, &mut extra, &mut markers),
                JobKind::Moving => self.apply_moving(job, &mut kept, &mut markers),
                JobKind::Tunnel => Self::apply_tunnel(&kept, job, &mut deleted, &mut markers),
                JobKind::Speed => self.apply_speed(job, &mut kept, &mut deleted, &mut markers),
            }
        }

        let mut trajectory: Vec<Fix> = kept
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !deleted.contains(i))
            .map(|(_, f)| f)
            .collect();
        trajectory.extend(extra);
        trajectory.sort_by(|a, b| {
            a.t.cmp(&b.t)
                .then(a.lat.partial_cmp(&b.lat).unwrap())
                .then(a.lng.partial_cmp(&b.lng).unwrap())
        });
        trajectory.dedup_by(|a, b| a.t == b.t && a.lat == b.lat && a.lng == b.lng);

        SimulationResult { trajectory, markers }
    }

    fn sample_range(&mut self, baseline_len: usize, span: usize) -> (usize, usize) {
        if baseline_len <= span {
            return (0, baseline_len);
        }
        let start = self.rng.gen_range(0..=(baseline_len - span));
        (start, start + span)
    }

    /// Sort by start, push a later job's start past an earlier job's end on
    /// overlap, and drop any job that collapses to an empty range.
    fn resolve_overlaps(mut jobs: Vec<AnomalyJob>) -> Vec<AnomalyJob> {
        jobs.sort_by_key(|j| j.start);
        let mut cursor = 0usize;
        let mut resolved = Vec::with_capacity(jobs.len());
        for mut job in jobs {
            if job.start < cursor {
                job.start = cursor;
            }
            if job.start >= job.end {
                continue;
            }
            cursor = job.end.max(cursor);
            resolved.push(job);
        }
        resolved
    }

    fn draw_distance(&mut self) -> f64 {
        let (lo, hi) = self.config.drift_distance_range;
        if self.config.drift_distribution.is_empty() {
            return self.rng.gen_range(lo..=hi);
        }
        let r: f64 = self.rng.gen_range(0.0..1.0);
        let mut acc = 0.0;
        for band in &self.config.drift_distribution {
            acc += band.ratio;
            if r <= acc {
                return self.rng.gen_range(band.min..=band.max).clamp(lo, hi);
            }
        }
        let last = self.config.drift_distribution.last().unwrap();
        self.rng.gen_range(last.min..=last.max).clamp(lo, hi)
    }

    fn apply_static(
        &mut self,
        baseline: &[Fix],
        job: AnomalyJob,
        extra: &mut Vec<Fix>,
        markers: &mut Vec<AnomalyMarker>,
    ) {
        let base = baseline[job.start];
        for k in 0..STATIC_DRIFT_CLUSTER_SIZE {
            let d = self.draw_distance();
            let theta = self.rng.gen_range(0.0..360.0);
            let t = base.t + (k as i64 + 1) * 500;
            extra.push(calculate_drift_point(Fix::new(base.lat, base.lng, t), d, theta));
        }
        markers.push(AnomalyMarker::new(MarkerKind::StaticDrift, base, "static drift cluster"));
    }

    fn apply_moving(&mut self, job: AnomalyJob, kept: &mut [Fix], markers: &mut Vec<AnomalyMarker>) {
        let marker_origin = kept[job.start];
        let span = (job.end - job.start).max(1);
        for i in job.start..job.end {
            let progress = (i - job.start) as f64 / (span.saturating_sub(1).max(1) as f64);
            let magnitude = self.draw_distance() * (std::f64::consts::PI * progress).sin();
            let direction = (progress * 360.0) % 360.0;
            kept[i] = calculate_drift_point(kept[i], magnitude, direction);
        }
        markers.push(AnomalyMarker::new(MarkerKind::MovingDrift, marker_origin, "moving drift segment"));
    }

    fn apply_tunnel(kept: &[Fix], job: AnomalyJob, deleted: &mut HashSet<usize>, markers: &mut Vec<AnomalyMarker>) {
        let marker_origin = kept[job.start];
        for i in job.start..job.end {
            deleted.insert(i);
        }
        markers.push(AnomalyMarker::new(MarkerKind::Tunnel, marker_origin, "tunnel signal loss"));
    }

    fn apply_speed(
        &mut self,
        job: AnomalyJob,
        kept: &mut [Fix],
        deleted: &mut HashSet<usize>,
        markers: &mut Vec<AnomalyMarker>,
    ) {
        let marker_origin = kept[job.start];
        for &offset in &SPEED_DROP_OFFSETS {
            deleted.insert(job.start + offset);
        }
        // Optional lateral drift overlay on the surviving points, a small
        // periodic wobble so the under-sampled run isn't perfectly straight.
        let keep_offsets: Vec<usize> = (0..(job.end - job.start))
            .filter(|o| !SPEED_DROP_OFFSETS.contains(o))
            .collect();
        for (n, offset) in keep_offsets.iter().enumerate() {
            let i = job.start + offset;
            let amplitude = self.draw_distance() * 0.3;
            let phase = (n as f64 * std::f64::consts::PI / 2.0).sin();
            if phase.abs() < 1e-9 {
                continue;
            }
            let bearing = if i + 1 < kept.len() {
                geodesy::bearing(kept[i], kept[i + 1])
            } else {
                0.0
            };
            let lateral = (bearing + 90.0) % 360.0;
            kept[i] = calculate_drift_point(kept[i], amplitude * phase, lateral);
        }
        markers.push(AnomalyMarker::new(MarkerKind::Speed, marker_origin, "under-sampled high-speed run"));
    }
}

/// `(d, θ)` polar offset from `base`, via the local-tangent approximation.
/// Accurate for the small distances (tens to low hundreds of meters) this
/// crate uses it for; not a substitute for `geodesy::distance`'s haversine
/// over long ranges.
fn calculate_drift_point(base: Fix, d: f64, theta_deg: f64) -> Fix {
    let theta = theta_deg.to_radians();
    let d_lat = (d * theta.cos() / geodesy::EARTH_RADIUS_M).to_degrees();
    let d_lng = (d * theta.sin() / (geodesy::EARTH_RADIUS_M * base.lat.to_radians().cos())).to_degrees();
    Fix::new(base.lat + d_lat, base.lng + d_lng, base.t)
}

/// Runs of at least `run_len` consecutive fixes whose consecutive bearings
/// agree within [`SPEED_BEARING_TOLERANCE_DEG`]. Non-overlapping by
/// construction: the scan jumps past a found run before resuming.
fn find_straight_runs(baseline: &[Fix], run_len: usize) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    if baseline.len() < run_len {
        return runs;
    }
    let mut i = 0;
    while i + run_len <= baseline.len() {
        let mut straight = true;
        let mut prev_bearing = None;
        for w in 0..run_len - 1 {
            let b = geodesy::bearing(baseline[i + w], baseline[i + w + 1]);
            if let Some(pb) = prev_bearing {
                if geodesy::angle_diff(b, pb) > SPEED_BEARING_TOLERANCE_DEG {
                    straight = false;
                    break;
                }
            }
            prev_bearing = Some(b);
        }
        if straight {
            runs.push((i, i + run_len));
            i += run_len;
        } else {
            i += 1;
        }
    }
    runs
}
