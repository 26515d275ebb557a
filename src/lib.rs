//! Streaming GPS trajectory drift filter.
//!
//! A [`detector::DriftDetector`] classifies each incoming [`types::Fix`] as
//! accepted or rejected against a self-maintained reference position (the
//! "base point"), recovering from genuine route changes while rejecting
//! multipath/urban-canyon noise. [`simulator::AnomalySimulator`] fabricates
//! drift/tunnel/under-sampling scenarios for testing against a clean
//! baseline, and [`adapters`] turns loosely-structured text/CSV/JSON into
//! the canonical [`types::Fix`] the detector consumes.
//!
//! [`geodesy`] is the pure geometry kernel both of the above are built on;
//! [`gcj02`] is a reference-only coordinate transform that nothing else in
//! this crate calls.

pub mod adapters;
pub mod detector;
pub mod error;
pub mod gcj02;
pub mod geodesy;
pub mod simulator;
pub mod types;

pub use detector::{DetectorConfig, DriftDetector, FixDecision, FixOutcome, ProcessingResult};
pub use error::{DriftFilterError, Result};
pub use simulator::{AnomalySimulator, SimulationResult, SimulatorConfig};
pub use types::{AnomalyMarker, BasePoint, ExtendedFix, Fix, MarkerKind, ProcessingStats, StatisticsSnapshot};
