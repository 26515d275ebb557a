mod fix;
mod marker;
mod stats;

pub use fix::{BasePoint, ExtendedFix, Fix};
pub use marker::{AnomalyMarker, MarkerKind};
pub use stats::{ProcessingStats, StatisticsSnapshot};
