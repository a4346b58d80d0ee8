//! Normalized hazard observations emitted by the feed adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GeoCell, HazardKind};

/// Identifier of an external data source instance (e.g. `"imd-doppler-3"`).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    /// Creates a source id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single normalized reading from an external hazard feed.
///
/// Immutable once created; a newer observation for the same cell supersedes
/// it, it is never mutated. `sequence` is assigned by the feed adapter and
/// increases monotonically per source, which is the only ordering guarantee
/// the pipeline relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardObservation {
    /// Which source produced the raw record.
    pub source: SourceId,
    /// Per-source monotone ingestion sequence number.
    pub sequence: u64,
    /// The hazard type this reading describes.
    pub kind: HazardKind,
    /// The cell the reading applies to.
    pub cell: GeoCell,
    /// Source-normalized raw magnitude (unit depends on the hazard kind;
    /// calibration into score space happens in the scorer).
    pub magnitude: f64,
    /// When the phenomenon was observed, per the source.
    pub observed_at: DateTime<Utc>,
    /// Source confidence in [0, 1].
    pub confidence: f64,
}
