use serde::{Deserialize, Serialize};

use crate::error::DriftFilterError;

/// One GPS position report: an immutable geodetic coordinate and timestamp.
///
/// `lat`/`lng` are WGS-84 degrees; `t` is milliseconds since the Unix epoch.
/// Fixes are produced by an adapter or the simulator and never mutated
/// afterwards — every transformation in this crate produces a new `Fix`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub lat: f64,
    pub lng: f64,
    pub t: i64,
}

impl Fix {
    pub fn new(lat: f64, lng: f64, t: i64) -> Self {
        Self { lat, lng, t }
    }

    /// `true` if `lat`/`lng` fall within the valid WGS-84 range.
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }

    /// As [`Fix::new`], but rejects out-of-range coordinates instead of
    /// constructing them — the input adapters' `RangeViolation` policy
    /// (log and skip) made concrete as a `Result`.
    pub fn validated(lat: f64, lng: f64, t: i64) -> Result<Self, DriftFilterError> {
        let fix = Self::new(lat, lng, t);
        if fix.in_range() {
            Ok(fix)
        } else {
            Err(DriftFilterError::RangeViolation { lat, lng })
        }
    }
}

/// A [`Fix`] plus the optional fields carried by some input formats.
///
/// Accepted at the input boundary and immediately reduced to a plain `Fix`
/// before the detector ever sees it — `speed`/`course` are not used by the
/// classifier (see the Non-goals in the module overview).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtendedFix {
    pub lat: f64,
    pub lng: f64,
    pub t: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
}

impl ExtendedFix {
    pub fn to_fix(self) -> Fix {
        Fix::new(self.lat, self.lng, self.t)
    }
}

impl From<Fix> for ExtendedFix {
    fn from(f: Fix) -> Self {
        ExtendedFix {
            lat: f.lat,
            lng: f.lng,
            t: f.t,
            speed: None,
            altitude: None,
            course: None,
        }
    }
}

/// The detector's rolling reference position.
///
/// At most one exists per detector at any time. Built from the sliding
/// window either by [`crate::geodesy::median_point`] (initial build) or
/// [`crate::geodesy::centroid`] (rebuilds), with the radius derived from the
/// median-clamped variant (see `DESIGN.md`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasePoint {
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
    /// Timestamp of the fix that caused this base point to be (re)built —
    /// deliberately the fix's own clock, not wall-clock `now()`, so replay
    /// is deterministic (see `DESIGN.md`, Open Question 1).
    pub created_at_t: i64,
    pub source_count: usize,
}

impl BasePoint {
    pub fn point(&self) -> Fix {
        Fix::new(self.lat, self.lng, self.created_at_t)
    }

    pub fn age_ms(&self, now_t: i64) -> i64 {
        (now_t - self.created_at_t).max(0)
    }
}
