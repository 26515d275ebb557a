//! Error taxonomy for the filter pipeline.
//!
//! Parsing errors are local: the adapters log and skip the offending record
//! rather than failing the whole call (see [`crate::adapters`]). The only
//! variants that actually propagate out of a call are the ones that signal
//! programmer misuse of the geometry kernel.

use thiserror::Error;

/// Errors that can occur while loading, parsing, or filtering a trajectory.
#[derive(Error, Debug)]
pub enum DriftFilterError {
    /// A line or JSON object could not be interpreted as a fix.
    #[error("malformed input record: {0}")]
    InputFormat(String),

    /// A parsed coordinate fell outside the valid WGS-84 range.
    #[error("coordinate out of range: lat={lat}, lng={lng}")]
    RangeViolation { lat: f64, lng: f64 },

    /// `centroid`/`median_point` was called with an empty point set.
    ///
    /// Reachable only via programmer misuse; never produced by feeding the
    /// detector a well-formed fix stream.
    #[error("geometry operation requires at least one point")]
    EmptyDomain,

    /// Wraps the underlying I/O or deserialization error for file-based
    /// adapters (CSV, JSON).
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse CSV input: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, DriftFilterError>;
