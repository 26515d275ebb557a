//! WGS-84 → GCJ-02 display transform.
//!
//! Reference only (see `§6` of the module overview): this is a fixed,
//! closed-form perturbation used by Chinese map renderers. Nothing in the
//! detector, the simulator, or the adapters calls into this module — it
//! exists purely so a downstream renderer has a correct transform to call
//! if it chooses to plot this crate's output on such a base map.

use crate::types::Fix;

const A: f64 = 6_378_245.0;
const EE: f64 = 0.006_693_421_622_965_943_23;

fn out_of_china(lat: f64, lng: f64) -> bool {
    !(72.004..=137.8347).contains(&lng) || !(0.8293..=55.8271).contains(&lat)
}

fn transform_lat(x: f64, y: f64) -> f64 {
    let mut ret = -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y
        + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * std::f64::consts::PI).sin()
        + 20.0 * (2.0 * x * std::f64::consts::PI).sin())
        * 2.0
        / 3.0;
    ret += (20.0 * (y * std::f64::consts::PI).sin() + 40.0 * (y / 3.0 * std::f64::consts::PI).sin())
        * 2.0
        / 3.0;
    ret += (160.0 * (y / 12.0 * std::f64::consts::PI).sin()
        + 320.0 * (y * std::f64::consts::PI / 30.0).sin())
        * 2.0
        / 3.0;
    ret
}

fn transform_lng(x: f64, y: f64) -> f64 {
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * std::f64::consts::PI).sin()
        + 20.0 * (2.0 * x * std::f64::consts::PI).sin())
        * 2.0
        / 3.0;
    ret += (20.0 * (x * std::f64::consts::PI).sin() + 40.0 * (x / 3.0 * std::f64::consts::PI).sin())
        * 2.0
        / 3.0;
    ret += (150.0 * (x / 12.0 * std::f64::consts::PI).sin()
        + 300.0 * (x / 30.0 * std::f64::consts::PI).sin())
        * 2.0
        / 3.0;
    ret
}

/// Perturb a WGS-84 fix into GCJ-02, bypassed outside mainland China's
/// bounding box. Returns the input unchanged when `out_of_china`.
pub fn wgs84_to_gcj02(fix: Fix) -> Fix {
    if out_of_china(fix.lat, fix.lng) {
        return fix;
    }

    let d_lat = transform_lat(fix.lng - 105.0, fix.lat - 35.0);
    let d_lng = transform_lng(fix.lng - 105.0, fix.lat - 35.0);

    let rad_lat = fix.lat.to_radians();
    let magic = (rad_lat).sin();
    let magic = 1.0 - EE * magic * magic;
    let sqrt_magic = magic.sqrt();

    let d_lat = (d_lat * 180.0) / ((A * (1.0 - EE)) / (magic * sqrt_magic) * std::f64::consts::PI);
    let d_lng = (d_lng * 180.0) / (A / sqrt_magic * rad_lat.cos() * std::f64::consts::PI);

    Fix::new(fix.lat + d_lat, fix.lng + d_lng, fix.t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_china_is_unchanged() {
        let f = Fix::new(51.5074, -0.1278, 0); // London
        assert_eq!(wgs84_to_gcj02(f), f);
    }

    #[test]
    fn inside_china_is_perturbed() {
        let f = Fix::new(39.9042, 116.4074, 0); // Beijing
        let g = wgs84_to_gcj02(f);
        assert_ne!(g, f);
        // The perturbation is small — a few hundred meters at most.
        assert!((g.lat - f.lat).abs() < 0.01);
        assert!((g.lng - f.lng).abs() < 0.01);
    }
}
