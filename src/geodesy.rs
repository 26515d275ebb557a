//! Geodesic & geometry kernel — pure functions, no state.
//!
//! Everything here is allocation-free and re-entrant; the detector and the
//! simulator both lean on it but neither owns it.

use crate::error::DriftFilterError;
use crate::types::Fix;

/// Mean Earth radius in meters, matching the value used throughout the
/// surrounding codebase's own haversine implementations.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two fixes, in meters.
pub fn distance(a: Fix, b: Fix) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (d_lat / 2.0).sin();
    let sin_lng = (d_lng / 2.0).sin();
    let h = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Arithmetic mean of lat/lng, acceptable because the window this is called
/// over spans far less than a kilometer.
pub fn centroid(points: &[Fix]) -> Result<Fix, DriftFilterError> {
    if points.is_empty() {
        return Err(DriftFilterError::EmptyDomain);
    }
    let n = points.len() as f64;
    let (sum_lat, sum_lng, last_t) = points
        .iter()
        .fold((0.0, 0.0, i64::MIN), |(sl, sg, _), p| (sl + p.lat, sg + p.lng, p.t));
    Ok(Fix::new(sum_lat / n, sum_lng / n, last_t))
}

/// Coordinate-wise median: lat and lng are sorted independently and the
/// middle element(s) taken. The result is not required to be one of the
/// input points — this is exactly what makes it a robust estimator of
/// "recent position" for the base point.
pub fn median_point(points: &[Fix]) -> Result<Fix, DriftFilterError> {
    if points.is_empty() {
        return Err(DriftFilterError::EmptyDomain);
    }
    let mut lats: Vec<f64> = points.iter().map(|p| p.lat).collect();
    let mut lngs: Vec<f64> = points.iter().map(|p| p.lng).collect();
    lats.sort_by(|a, b| a.partial_cmp(b).unwrap());
    lngs.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let median = |v: &[f64]| -> f64 {
        let n = v.len();
        if n % 2 == 1 {
            v[n / 2]
        } else {
            (v[n / 2 - 1] + v[n / 2]) / 2.0
        }
    };

    let last_t = points.last().map(|p| p.t).unwrap_or(0);
    Ok(Fix::new(median(&lats), median(&lngs), last_t))
}

/// Smallest interior angle (in degrees) of the triangle formed by three
/// points, via the law of cosines over the three side lengths. Returns `0`
/// if any side has zero length (degenerate triangle).
pub fn min_triangle_angle(p: Fix, q: Fix, r: Fix) -> f64 {
    let pq = distance(p, q);
    let qr = distance(q, r);
    let rp = distance(r, p);

    if pq == 0.0 || qr == 0.0 || rp == 0.0 {
        return 0.0;
    }

    let angle_at = |opposite: f64, a: f64, b: f64| -> f64 {
        let cos_theta = (a * a + b * b - opposite * opposite) / (2.0 * a * b);
        cos_theta.clamp(-1.0, 1.0).acos().to_degrees()
    };

    let angle_p = angle_at(qr, pq, rp);
    let angle_q = angle_at(rp, pq, qr);
    let angle_r = angle_at(pq, qr, rp);

    angle_p.min(angle_q).min(angle_r)
}

/// Forward azimuth from `a` to `b`, in degrees `[0, 360)`, measured
/// clockwise from true north. Used only by the simulator.
pub fn bearing(a: Fix, b: Fix) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let y = d_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lng.cos();
    let theta = y.atan2(x).to_degrees();
    (theta + 360.0) % 360.0
}

/// Circular difference between two bearings, in `[0, 180]` degrees.
pub fn angle_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}
