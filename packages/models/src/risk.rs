//! Active risk events: decaying severity assessments per (cell, hazard).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{GeoCell, HazardKind, Severity};

/// Identifier of a risk event. Stable for the lifetime of the event; a
/// cleared hazard that re-raises gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskEventId(pub Uuid);

impl RiskEventId {
    /// Generates a new random event id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RiskEventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An active, decaying severity assessment for one hazard kind in one cell.
///
/// Invariant: at most one active `RiskEvent` exists per (cell, kind); the
/// scorer owns creation, update, and expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskEvent {
    /// Unique id, stable while the event is active.
    pub id: RiskEventId,
    /// The cell this event covers.
    pub cell: GeoCell,
    /// The hazard kind being assessed.
    pub kind: HazardKind,
    /// Severity band derived from `score` via configured thresholds.
    pub severity: Severity,
    /// Continuous risk score (decays over time).
    pub score: f64,
    /// When the event was first raised.
    pub first_seen: DateTime<Utc>,
    /// When the score was last updated.
    pub last_updated: DateTime<Utc>,
    /// When the event expires absent further observations.
    pub expires_at: DateTime<Utc>,
}
