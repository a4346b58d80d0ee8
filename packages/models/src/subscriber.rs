//! Read-only subscriber projection supplied by the notification subsystem.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{HazardKind, Location};

/// Identifier of a subscriber, owned by the identity subsystem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub String);

impl SubscriberId {
    /// Creates a subscriber id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The engine's projection of a subscriber: id, location, and alerting
/// preferences. Refreshed wholesale from the external subsystem on a
/// bounded interval; never edited locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    /// External subscriber id.
    pub id: SubscriberId,
    /// Registered location.
    pub location: Location,
    /// Hazard kinds the subscriber wants alerts for. Empty means all.
    pub filters: BTreeSet<HazardKind>,
    /// Maximum distance (km) from the subscriber at which a hazard is
    /// still relevant to them.
    pub max_distance_km: f64,
}

impl Subscriber {
    /// Whether this subscriber's filter set matches `kind`.
    #[must_use]
    pub fn wants(&self, kind: HazardKind) -> bool {
        self.filters.is_empty() || self.filters.contains(&kind)
    }
}
