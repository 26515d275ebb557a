//! End-to-end scenarios and cross-module invariant checks.
//!
//! Per-component unit tests live beside the code they exercise
//! (`src/detector.rs`, `src/simulator.rs`, `src/geodesy.rs`,
//! `src/adapters.rs`); this file covers the simulator-feeds-detector
//! scenario (S6) and the quantified invariants that only make sense across
//! a whole trajectory.

use gps_drift_filter::{DetectorConfig, DriftDetector, Fix, FixDecision, SimulatorConfig};

fn straight_baseline(n: usize, step_deg: f64) -> Vec<Fix> {
    (0..n)
        .map(|i| Fix::new(39.9 + i as f64 * step_deg, 116.4, i as i64 * 1000))
        .collect()
}

// S6 — tunnel injected by the simulator: contiguous deletion, one marker,
// output strictly shorter than the baseline.
#[test]
fn s6_tunnel_in_simulator() {
    let baseline = straight_baseline(100, 1e-4);
    let config = SimulatorConfig {
        static_drift_count: 0,
        moving_drift_count: 0,
        tunnel_count: 1,
        speed_scenario_count: 0,
        seed: 42,
        ..Default::default()
    };
    let mut simulator = gps_drift_filter::AnomalySimulator::new(config);
    let result = simulator.generate(&baseline);

    assert!(result.trajectory.len() < baseline.len());
    let tunnel_markers: Vec<_> = result
        .markers
        .iter()
        .filter(|m| m.kind == gps_drift_filter::MarkerKind::Tunnel)
        .collect();
    assert_eq!(tunnel_markers.len(), 1);

    // The deleted fixes are contiguous in baseline order: the surviving
    // trajectory has at most one "gap" larger than the baseline step when
    // walked in original order.
    let kept_times: std::collections::HashSet<i64> = result.trajectory.iter().map(|f| f.t).collect();
    let missing: Vec<usize> = (0..baseline.len())
        .filter(|i| !kept_times.contains(&baseline[*i].t))
        .collect();
    assert!(!missing.is_empty());
    let contiguous = missing.windows(2).all(|w| w[1] == w[0] + 1);
    assert!(contiguous, "deleted baseline indices were not contiguous: {:?}", missing);
}

// Simulator round-trip (testable property 9): a clean baseline with every
// anomaly count at zero comes back unchanged up to ordering/dedup.
#[test]
fn simulator_round_trip_with_no_anomalies() {
    let baseline = straight_baseline(50, 1e-4);
    let config = SimulatorConfig {
        static_drift_count: 0,
        moving_drift_count: 0,
        tunnel_count: 0,
        speed_scenario_count: 0,
        ..Default::default()
    };
    let mut simulator = gps_drift_filter::AnomalySimulator::new(config);
    let result = simulator.generate(&baseline);
    assert_eq!(result.trajectory, baseline);
    assert!(result.markers.is_empty());
}

// Feed a simulated, anomaly-injected trajectory through the detector end to
// end: every fix is classified, the partition covers the input, and the
// bounded-state invariants hold throughout.
#[test]
fn detector_processes_a_simulated_trajectory_without_violating_bounds() {
    let baseline = straight_baseline(200, 1e-4);
    let sim_config = SimulatorConfig {
        static_drift_count: 2,
        moving_drift_count: 2,
        tunnel_count: 1,
        speed_scenario_count: 1,
        seed: 123,
        ..Default::default()
    };
    let mut simulator = gps_drift_filter::AnomalySimulator::new(sim_config);
    let corrupted = simulator.generate(&baseline).trajectory;

    let mut detector = DriftDetector::new(DetectorConfig::default());
    for fix in &corrupted {
        detector.process_fix(*fix);
        let snap = detector.snapshot();
        assert!(snap.window_length <= detector.config().window_size);
        assert!(snap.consecutive_drift_count <= detector.config().max_drift_sequence);
    }

    let result = detector.process_trajectory(&[]);
    assert_eq!(result.original_points.len(), 0);

    let snap = detector.snapshot();
    assert!(snap.rebuild_count <= snap.rejected_count + snap.accepted_count);
}

// Testable property 1 & 2: partition covers the input exactly, and running
// the same prefix twice (fresh detectors) gives the same decisions —
// causality, since nothing but the prefix and the config can have
// influenced the result.
#[test]
fn causality_same_prefix_same_decisions() {
    let baseline = straight_baseline(80, 2e-4);
    let mut outlier_run = baseline.clone();
    outlier_run.push(Fix::new(50.0, 50.0, baseline.last().unwrap().t + 1000));

    let mut d1 = DriftDetector::new(DetectorConfig::default());
    let mut d2 = DriftDetector::new(DetectorConfig::default());

    let r1 = d1.process_trajectory(&baseline);
    let r2 = d2.process_trajectory(&outlier_run[..baseline.len()]);
    assert_eq!(r1.processed_points, r2.processed_points);
    assert_eq!(r1.filtered_points, r2.filtered_points);
}

// Testable property 6: the first W fixes are always accepted, regardless of
// configuration.
#[test]
fn warmup_accepts_first_w_fixes_for_any_window_size() {
    for w in [1usize, 5, 10, 20] {
        let config = DetectorConfig { window_size: w, ..Default::default() };
        let mut detector = DriftDetector::new(config);
        let fixes = straight_baseline(w, 1e-5);
        for fix in fixes {
            let outcome = detector.process_fix(fix);
            assert_eq!(outcome.decision, FixDecision::Accepted);
        }
        assert!(detector.snapshot().has_base_point);
    }
}

// Testable property 7: immediately after a forced rebuild, the base point
// exists and its age (measured against the triggering fix's own clock) is
// zero.
#[test]
fn post_rebuild_base_age_is_zero() {
    let config = DetectorConfig { validity_period_ms: i64::MAX / 2, ..Default::default() };
    let mut detector = DriftDetector::new(config);
    for fix in straight_baseline(10, 1e-5) {
        detector.process_fix(fix);
    }
    let t0 = 10_000;
    let mut last_t = t0;
    for i in 0..10 {
        last_t = t0 + i * 1000;
        detector.process_fix(Fix::new(41.0, 118.0, last_t));
    }
    let snap = detector.snapshot();
    assert!(snap.rebuild_count >= 1);
    assert!(snap.has_base_point);
    assert_eq!(snap.base_age_ms, 0);
}
