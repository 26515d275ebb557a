use serde::{Deserialize, Serialize, Serializer};

use super::fix::Fix;

/// The kind of event an [`AnomalyMarker`] annotates.
///
/// `static-drift`, `moving-drift`, and `tunnel` are produced by the
/// simulator as ground truth; `speed` is produced by the simulator's
/// speed-scenario injector; `rebuild` is produced by the detector itself
/// whenever it replaces its base point.
///
/// `Deserialize` keeps the two drift flavors distinct (`"static-drift"` /
/// `"moving-drift"`) for internal/debug round-tripping, but `Serialize` is
/// hand-written below to collapse them to the single on-wire `"drift"` kind
/// named in SPEC_FULL §6 — the two derives are intentionally asymmetric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerKind {
    StaticDrift,
    MovingDrift,
    Tunnel,
    Speed,
    Rebuild,
}

impl MarkerKind {
    /// The wire representation used by `§6`'s marker kinds
    /// (`"tunnel" | "drift" | "speed" | "rebuild"`), collapsing the two
    /// simulator drift flavors into the single on-wire `"drift"` kind.
    pub fn wire_str(&self) -> &'static str {
        match self {
            MarkerKind::StaticDrift | MarkerKind::MovingDrift => "drift",
            MarkerKind::Tunnel => "tunnel",
            MarkerKind::Speed => "speed",
            MarkerKind::Rebuild => "rebuild",
        }
    }
}

impl Serialize for MarkerKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.wire_str())
    }
}

/// An append-only annotation emitted by the simulator (ground truth) or the
/// detector (rebuilds), carrying enough context for a downstream renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnomalyMarker {
    pub kind: MarkerKind,
    pub position: Fix,
    pub description: String,
    pub t: i64,
}

impl AnomalyMarker {
    pub fn new(kind: MarkerKind, position: Fix, description: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            description: description.into(),
            t: position.t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_kind_collapses_to_documented_wire_strings() {
        assert_eq!(serde_json::to_string(&MarkerKind::StaticDrift).unwrap(), "\"drift\"");
        assert_eq!(serde_json::to_string(&MarkerKind::MovingDrift).unwrap(), "\"drift\"");
        assert_eq!(serde_json::to_string(&MarkerKind::Tunnel).unwrap(), "\"tunnel\"");
        assert_eq!(serde_json::to_string(&MarkerKind::Speed).unwrap(), "\"speed\"");
        assert_eq!(serde_json::to_string(&MarkerKind::Rebuild).unwrap(), "\"rebuild\"");
    }

    #[test]
    fn anomaly_marker_serializes_kind_as_wire_string() {
        let fix = Fix::new(1.0, 2.0, 100);
        let marker = AnomalyMarker::new(MarkerKind::MovingDrift, fix, "drifting");
        let value = serde_json::to_value(&marker).unwrap();
        assert_eq!(value["kind"], "drift");
    }
}
