#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory sharded geospatial index.
//!
//! Entities (subscribers, facilities) live in R-tree shards keyed by their
//! coarse-resolution H3 parent cell, so a write to one region only locks
//! that region's shard and never blocks reads elsewhere. Radius queries
//! select the shards whose coarse cells overlap the query circle, run an
//! envelope intersection on each R-tree, and finish with an exact
//! haversine filter.
//!
//! Active risk events live in a separate versioned [`RiskCellMap`] keyed
//! by (cell, hazard kind).

mod risk_map;

pub use risk_map::{RiskCellMap, RiskSnapshot};

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use h3o::Resolution;
use hazard_watch_models::{Facility, GeoCell, Location, Subscriber};
use rstar::{AABB, RTree, RTreeObject};

/// Number of lock-striped shards per index.
const SHARD_COUNT: usize = 32;

/// Approximate km per degree of latitude, for envelope construction.
const KM_PER_DEGREE_LAT: f64 = 111.0;

/// An entity that can be stored in a [`SpatialIndex`].
pub trait Positioned {
    /// Stable identifier used for atomic replacement.
    type Id: Clone + Eq + Hash + Ord + std::fmt::Debug;

    /// The entity's id.
    fn id(&self) -> Self::Id;

    /// The entity's current location.
    fn location(&self) -> Location;
}

impl Positioned for Subscriber {
    type Id = hazard_watch_models::SubscriberId;

    fn id(&self) -> Self::Id {
        self.id.clone()
    }

    fn location(&self) -> Location {
        self.location
    }
}

impl Positioned for Facility {
    type Id = hazard_watch_models::FacilityId;

    fn id(&self) -> Self::Id {
        self.id.clone()
    }

    fn location(&self) -> Location {
        self.location
    }
}

/// R-tree entry: id plus point, with the payload held in the shard's id
/// map (removal needs an equality probe, which a bare id+point allows).
#[derive(Debug, Clone, PartialEq)]
struct IndexEntry<I: PartialEq> {
    id: I,
    point: [f64; 2],
}

impl<I: PartialEq> RTreeObject for IndexEntry<I> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

struct Shard<T: Positioned> {
    rtree: RTree<IndexEntry<T::Id>>,
    by_id: HashMap<T::Id, T>,
}

impl<T: Positioned> Default for Shard<T> {
    fn default() -> Self {
        Self {
            rtree: RTree::new(),
            by_id: HashMap::new(),
        }
    }
}

/// Where an entity currently lives: shard slot plus indexed point.
#[derive(Debug, Clone, Copy)]
struct Placement {
    shard: usize,
    point: [f64; 2],
}

/// A lock-striped spatial index over one entity type.
///
/// Each entity is stored at exactly one index position at a time; `upsert`
/// is an atomic replace, never a merge. Queries take read locks on the
/// shards they touch, so concurrent writes to unrelated regions proceed
/// unhindered and readers never observe a partially updated entity.
pub struct SpatialIndex<T: Positioned> {
    shard_resolution: Resolution,
    shards: Vec<RwLock<Shard<T>>>,
    /// id -> current placement; touched only by writers and id lookups,
    /// never by radius queries.
    directory: RwLock<HashMap<T::Id, Placement>>,
}

impl<T: Positioned + Clone> SpatialIndex<T> {
    /// Creates an empty index sharded at `shard_resolution` (coarser than
    /// the engine's cell resolution).
    #[must_use]
    pub fn new(shard_resolution: Resolution) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| RwLock::new(Shard::default())).collect();
        Self {
            shard_resolution,
            shards,
            directory: RwLock::new(HashMap::new()),
        }
    }

    fn shard_for(&self, location: Location) -> usize {
        GeoCell::containing(location, self.shard_resolution).map_or(0, Self::shard_for_cell)
    }

    fn shard_for_cell(cell: GeoCell) -> usize {
        let mut hasher = DefaultHasher::new();
        cell.as_u64().hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)]
        let idx = (hasher.finish() as usize) % SHARD_COUNT;
        idx
    }

    /// Inserts or atomically replaces an entity.
    ///
    /// # Panics
    ///
    /// Panics if a shard lock is poisoned.
    pub fn upsert(&self, entity: T) {
        let id = entity.id();
        let location = entity.location();
        let point = [location.lng, location.lat];
        let new_shard = self.shard_for(location);

        let mut directory = self.directory.write().expect("index directory poisoned");
        let previous = directory.insert(id.clone(), Placement { shard: new_shard, point });

        if let Some(prev) = previous {
            if prev.shard != new_shard {
                let mut old = self.shards[prev.shard].write().expect("index shard poisoned");
                old.rtree.remove(&IndexEntry { id: id.clone(), point: prev.point });
                old.by_id.remove(&id);
            }
        }

        let mut shard = self.shards[new_shard].write().expect("index shard poisoned");
        if let Some(prev) = shard.by_id.insert(id.clone(), entity) {
            let prev_loc = prev.location();
            shard.rtree.remove(&IndexEntry {
                id: id.clone(),
                point: [prev_loc.lng, prev_loc.lat],
            });
        }
        log::trace!("Indexed {id:?} into shard {new_shard}");
        shard.rtree.insert(IndexEntry { id, point });
    }

    /// Removes an entity. Returns the removed value, if any.
    ///
    /// # Panics
    ///
    /// Panics if a shard lock is poisoned.
    pub fn remove(&self, id: &T::Id) -> Option<T> {
        let mut directory = self.directory.write().expect("index directory poisoned");
        let placement = directory.remove(id)?;
        let mut shard = self.shards[placement.shard].write().expect("index shard poisoned");
        shard.rtree.remove(&IndexEntry { id: id.clone(), point: placement.point });
        log::trace!("Removed {id:?} from shard {}", placement.shard);
        shard.by_id.remove(id)
    }

    /// Looks up an entity by id.
    ///
    /// # Panics
    ///
    /// Panics if a shard lock is poisoned.
    #[must_use]
    pub fn get(&self, id: &T::Id) -> Option<T> {
        let directory = self.directory.read().expect("index directory poisoned");
        let placement = directory.get(id)?;
        let shard = self.shards[placement.shard].read().expect("index shard poisoned");
        shard.by_id.get(id).cloned()
    }

    /// Number of entities currently indexed.
    ///
    /// # Panics
    ///
    /// Panics if the directory lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.directory.read().expect("index directory poisoned").len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entities within `radius_km` of `center`, with their distance,
    /// ordered nearest first.
    ///
    /// Shard selection walks the coarse-cell disk covering the circle, so
    /// cost scales with the query area rather than the index size.
    ///
    /// # Panics
    ///
    /// Panics if a shard lock is poisoned.
    #[must_use]
    pub fn query_radius(&self, center: Location, radius_km: f64) -> Vec<(T, f64)> {
        let Ok(center_cell) = GeoCell::containing(center, self.shard_resolution) else {
            return Vec::new();
        };
        let mut shard_ids: Vec<usize> = cells_within(center_cell, radius_km)
            .into_iter()
            .map(Self::shard_for_cell)
            .collect();
        shard_ids.sort_unstable();
        shard_ids.dedup();

        let envelope = radius_envelope(center, radius_km);
        let mut hits: Vec<(T, f64)> = Vec::new();

        for shard_id in shard_ids {
            let shard = self.shards[shard_id].read().expect("index shard poisoned");
            for entry in shard.rtree.locate_in_envelope_intersecting(&envelope) {
                let Some(entity) = shard.by_id.get(&entry.id) else {
                    continue;
                };
                let distance = center.distance_km(&entity.location());
                if distance <= radius_km {
                    hits.push((entity.clone(), distance));
                }
            }
        }

        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        hits
    }
}

/// Bounding box around a circle of `radius_km` at `center`, in degrees.
fn radius_envelope(center: Location, radius_km: f64) -> AABB<[f64; 2]> {
    let dlat = radius_km / KM_PER_DEGREE_LAT;
    let cos_lat = center.lat.to_radians().cos().abs().max(0.01);
    let dlng = radius_km / (KM_PER_DEGREE_LAT * cos_lat);
    AABB::from_corners(
        [center.lng - dlng, center.lat - dlat],
        [center.lng + dlng, center.lat + dlat],
    )
}

/// All cells within `radius_km` of `cell`'s center, including `cell`:
/// the neighbor expansion behind [`SpatialIndex::query_radius`], and so
/// behind every distance-banded lookup (dispatch candidates, facility
/// searches).
#[must_use]
pub fn cells_within(cell: GeoCell, radius_km: f64) -> Vec<GeoCell> {
    cell.disk(cell.rings_for_radius(radius_km))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazard_watch_models::{SubscriberId, Subscriber};
    use std::collections::BTreeSet;

    fn subscriber(id: &str, lat: f64, lng: f64) -> Subscriber {
        Subscriber {
            id: SubscriberId::new(id),
            location: Location::new(lat, lng),
            filters: BTreeSet::new(),
            max_distance_km: 25.0,
        }
    }

    fn index() -> SpatialIndex<Subscriber> {
        SpatialIndex::new(Resolution::Four)
    }

    #[test]
    fn radius_query_finds_nearby_only() {
        let index = index();
        index.upsert(subscriber("near", 19.08, 72.88));
        index.upsert(subscriber("far", 28.61, 77.21));

        let hits = index.query_radius(Location::new(19.076, 72.8777), 10.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, SubscriberId::new("near"));
        assert!(hits[0].1 <= 10.0);
    }

    #[test]
    fn results_ordered_nearest_first() {
        let index = index();
        index.upsert(subscriber("a", 19.10, 72.90));
        index.upsert(subscriber("b", 19.08, 72.88));
        index.upsert(subscriber("c", 19.20, 73.00));

        let hits = index.query_radius(Location::new(19.076, 72.8777), 30.0);
        assert_eq!(hits.len(), 3);
        assert!(hits[0].1 <= hits[1].1 && hits[1].1 <= hits[2].1);
    }

    #[test]
    fn upsert_replaces_not_merges() {
        let index = index();
        index.upsert(subscriber("s", 19.08, 72.88));
        // Move the subscriber far away; the old position must be gone.
        index.upsert(subscriber("s", 28.61, 77.21));

        assert_eq!(index.len(), 1);
        let near_old = index.query_radius(Location::new(19.076, 72.8777), 10.0);
        assert!(near_old.is_empty());
        let near_new = index.query_radius(Location::new(28.6139, 77.209), 10.0);
        assert_eq!(near_new.len(), 1);
    }

    #[test]
    fn remove_clears_entity() {
        let index = index();
        index.upsert(subscriber("s", 19.08, 72.88));
        assert!(index.remove(&SubscriberId::new("s")).is_some());
        assert!(index.remove(&SubscriberId::new("s")).is_none());
        assert!(index.query_radius(Location::new(19.08, 72.88), 10.0).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn get_by_id() {
        let index = index();
        index.upsert(subscriber("s", 19.08, 72.88));
        assert!(index.get(&SubscriberId::new("s")).is_some());
        assert!(index.get(&SubscriberId::new("missing")).is_none());
    }

    #[test]
    fn cells_within_cover_requested_band() {
        let cell = GeoCell::containing(Location::new(19.076, 72.8777), Resolution::Eight).unwrap();
        let near = cells_within(cell, 5.0);
        let wide = cells_within(cell, 25.0);
        assert!(near.contains(&cell));
        assert!(wide.len() > near.len());
    }
}
