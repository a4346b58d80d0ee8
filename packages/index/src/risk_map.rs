//! Versioned map of active risk events, keyed by (cell, hazard kind).
//!
//! The scorer publishes into this map; the dispatcher, route advisor, and
//! query API read from it. Reads take per-shard read locks and return
//! cloned snapshots, so they never observe a half-written event and never
//! block writers of unrelated cells.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use hazard_watch_models::{GeoCell, HazardKind, Location, RiskEvent, Severity};

const SHARD_COUNT: usize = 32;

/// A consistent view of active risk events plus the map version it was
/// taken at. Version increases on every publish/clear, giving readers a
/// bounded-staleness marker.
#[derive(Debug, Clone)]
pub struct RiskSnapshot {
    /// Map version at snapshot time.
    pub version: u64,
    /// The active events.
    pub events: Vec<RiskEvent>,
}

/// Lock-striped map of active risk events.
///
/// Invariant: at most one active event per (cell, kind) — `publish`
/// replaces, `clear` removes.
pub struct RiskCellMap {
    shards: Vec<RwLock<HashMap<(GeoCell, HazardKind), RiskEvent>>>,
    version: AtomicU64,
}

impl Default for RiskCellMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskCellMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            version: AtomicU64::new(0),
        }
    }

    fn shard_idx(cell: GeoCell) -> usize {
        let mut hasher = DefaultHasher::new();
        cell.as_u64().hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)]
        let idx = (hasher.finish() as usize) % SHARD_COUNT;
        idx
    }

    /// Publishes (inserts or replaces) an active event.
    ///
    /// # Panics
    ///
    /// Panics if the shard lock is poisoned.
    pub fn publish(&self, event: RiskEvent) {
        let idx = Self::shard_idx(event.cell);
        let mut shard = self.shards[idx].write().expect("risk map shard poisoned");
        shard.insert((event.cell, event.kind), event);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Removes the active event for (cell, kind), returning it if present.
    ///
    /// # Panics
    ///
    /// Panics if the shard lock is poisoned.
    pub fn clear(&self, cell: GeoCell, kind: HazardKind) -> Option<RiskEvent> {
        let idx = Self::shard_idx(cell);
        let mut shard = self.shards[idx].write().expect("risk map shard poisoned");
        let removed = shard.remove(&(cell, kind));
        if removed.is_some() {
            self.version.fetch_add(1, Ordering::Release);
        }
        removed
    }

    /// The active event for (cell, kind), if any.
    ///
    /// # Panics
    ///
    /// Panics if the shard lock is poisoned.
    #[must_use]
    pub fn get(&self, cell: GeoCell, kind: HazardKind) -> Option<RiskEvent> {
        let idx = Self::shard_idx(cell);
        let shard = self.shards[idx].read().expect("risk map shard poisoned");
        shard.get(&(cell, kind)).cloned()
    }

    /// The highest severity among active events in `cell`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the shard lock is poisoned.
    #[must_use]
    pub fn max_severity(&self, cell: GeoCell) -> Option<(Severity, f64)> {
        let idx = Self::shard_idx(cell);
        let shard = self.shards[idx].read().expect("risk map shard poisoned");
        shard
            .iter()
            .filter(|((c, _), _)| *c == cell)
            .map(|(_, e)| (e.severity, e.score))
            .max_by(|a, b| {
                a.0.cmp(&b.0)
                    .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            })
    }

    /// All active events within `radius_km` of `center`.
    ///
    /// # Panics
    ///
    /// Panics if a shard lock is poisoned.
    #[must_use]
    pub fn query_radius(&self, center: Location, radius_km: f64) -> Vec<RiskEvent> {
        let mut hits: Vec<RiskEvent> = Vec::new();
        for shard in &self.shards {
            let shard = shard.read().expect("risk map shard poisoned");
            for event in shard.values() {
                if center.distance_km(&event.cell.center()) <= radius_km {
                    hits.push(event.clone());
                }
            }
        }
        hits.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
        });
        hits
    }

    /// A consistent per-shard snapshot of all active events.
    ///
    /// # Panics
    ///
    /// Panics if a shard lock is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> RiskSnapshot {
        let version = self.version.load(Ordering::Acquire);
        let mut events = Vec::new();
        for shard in &self.shards {
            let shard = shard.read().expect("risk map shard poisoned");
            events.extend(shard.values().cloned());
        }
        RiskSnapshot { version, events }
    }

    /// Number of active events.
    ///
    /// # Panics
    ///
    /// Panics if a shard lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().expect("risk map shard poisoned").len())
            .sum()
    }

    /// Whether no events are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
