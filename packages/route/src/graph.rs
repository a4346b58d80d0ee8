//! Corridor graph: evacuation roads as waypoints and bidirectional links.
//!
//! Each link records the grid cells it crosses, sampled at the engine
//! resolution, so edge costs can be inflated by the live risk of the
//! terrain the road actually passes through.

use std::collections::HashMap;

use h3o::Resolution;
use hazard_watch_models::{GeoCell, InvalidLocation, Location};
use serde::{Deserialize, Serialize};

/// A named point on the corridor network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    /// External waypoint id.
    pub id: String,
    /// Waypoint coordinate.
    pub location: Location,
}

/// One directed half of a corridor link.
#[derive(Debug, Clone)]
pub(crate) struct Edge {
    pub to: usize,
    /// Great-circle length of the corridor, in km.
    pub base_cost_km: f64,
    /// Grid cells the corridor crosses, in travel order.
    pub cells: Vec<GeoCell>,
}

/// The evacuation corridor network.
pub struct CorridorGraph {
    resolution: Resolution,
    waypoints: Vec<Waypoint>,
    by_id: HashMap<String, usize>,
    adjacency: Vec<Vec<Edge>>,
}

impl CorridorGraph {
    /// Creates an empty graph; corridor cells are sampled at `resolution`.
    #[must_use]
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            waypoints: Vec::new(),
            by_id: HashMap::new(),
            adjacency: Vec::new(),
        }
    }

    /// Adds a waypoint and returns its node index. Re-adding an existing
    /// id returns the original index without moving the waypoint.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidLocation`] if the coordinate cannot be mapped to
    /// a grid cell.
    pub fn add_waypoint(
        &mut self,
        id: impl Into<String>,
        location: Location,
    ) -> Result<usize, InvalidLocation> {
        let id = id.into();
        if let Some(&idx) = self.by_id.get(&id) {
            return Ok(idx);
        }
        // Validates the coordinate up front so links never fail mid-sample.
        GeoCell::containing(location, self.resolution)?;

        let idx = self.waypoints.len();
        self.waypoints.push(Waypoint { id: id.clone(), location });
        self.by_id.insert(id, idx);
        self.adjacency.push(Vec::new());
        Ok(idx)
    }

    /// Links two waypoints with a bidirectional corridor. The base cost
    /// is the great-circle length; crossed cells are sampled at half the
    /// cell pitch so no crossed cell is skipped.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn link(&mut self, a: usize, b: usize) {
        let from = self.waypoints[a].location;
        let to = self.waypoints[b].location;
        let cells = self.sample_cells(from, to);
        let base_cost_km = from.distance_km(&to);

        self.adjacency[a].push(Edge { to: b, base_cost_km, cells: cells.clone() });
        self.adjacency[b].push(Edge { to: a, base_cost_km, cells });
    }

    fn sample_cells(&self, from: Location, to: Location) -> Vec<GeoCell> {
        let mut cells = Vec::new();
        let Ok(start) = GeoCell::containing(from, self.resolution) else {
            return cells;
        };

        let distance = from.distance_km(&to);
        let step = (start.pitch_km() / 2.0).max(0.01);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let samples = (distance / step).ceil().max(1.0) as u32;

        for i in 0..=samples {
            let t = f64::from(i) / f64::from(samples);
            let point = Location::new(
                from.lat + (to.lat - from.lat) * t,
                from.lng + (to.lng - from.lng) * t,
            );
            if let Ok(cell) = GeoCell::containing(point, self.resolution)
                && !cells.contains(&cell)
            {
                cells.push(cell);
            }
        }
        cells
    }

    /// The waypoint at a node index.
    #[must_use]
    pub fn waypoint(&self, idx: usize) -> Option<&Waypoint> {
        self.waypoints.get(idx)
    }

    /// The node index of a waypoint id.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// The waypoint closest to `location` by great-circle distance.
    #[must_use]
    pub fn nearest_waypoint(&self, location: Location) -> Option<usize> {
        self.waypoints
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = location.distance_km(&a.location);
                let db = location.distance_km(&b.location);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(idx, _)| idx)
    }

    /// Shortest corridor distance between the waypoints nearest to two
    /// locations, ignoring risk. `None` when the graph is empty or the
    /// endpoints are disconnected.
    #[must_use]
    pub fn shortest_distance_km(&self, from: Location, to: Location) -> Option<f64> {
        let start = self.nearest_waypoint(from)?;
        let goal = self.nearest_waypoint(to)?;

        let (_, meters) = pathfinding::prelude::dijkstra(
            &start,
            |&node| {
                self.edges_from(node)
                    .iter()
                    .map(|edge| {
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        let cost = (edge.base_cost_km * 1000.0).round().max(1.0) as u64;
                        (edge.to, cost)
                    })
                    .collect::<Vec<_>>()
            },
            |&node| node == goal,
        )?;
        #[allow(clippy::cast_precision_loss)]
        Some(meters as f64 / 1000.0)
    }

    pub(crate) fn edges_from(&self, idx: usize) -> &[Edge] {
        self.adjacency.get(idx).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn edge_between(&self, a: usize, b: usize) -> Option<&Edge> {
        self.edges_from(a).iter().find(|e| e.to == b)
    }

    /// Number of waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Whether the graph has no waypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_are_bidirectional_and_sampled() {
        let mut graph = CorridorGraph::new(Resolution::Eight);
        let a = graph.add_waypoint("a", Location::new(19.08, 72.88)).unwrap();
        let b = graph.add_waypoint("b", Location::new(19.12, 72.92)).unwrap();
        graph.link(a, b);

        let forward = graph.edge_between(a, b).unwrap();
        let back = graph.edge_between(b, a).unwrap();
        assert!((forward.base_cost_km - back.base_cost_km).abs() < f64::EPSILON);
        // A multi-km corridor at resolution 8 crosses several cells.
        assert!(forward.cells.len() > 2, "sampled {} cells", forward.cells.len());
    }

    #[test]
    fn readding_waypoint_keeps_index() {
        let mut graph = CorridorGraph::new(Resolution::Eight);
        let a = graph.add_waypoint("a", Location::new(19.08, 72.88)).unwrap();
        let again = graph.add_waypoint("a", Location::new(0.0, 0.0)).unwrap();
        assert_eq!(a, again);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn shortest_distance_follows_corridors() {
        let mut graph = CorridorGraph::new(Resolution::Eight);
        let a = graph.add_waypoint("a", Location::new(19.00, 72.80)).unwrap();
        let b = graph.add_waypoint("b", Location::new(19.05, 72.85)).unwrap();
        let c = graph.add_waypoint("c", Location::new(19.10, 72.90)).unwrap();
        graph.link(a, b);
        graph.link(b, c);

        let direct = Location::new(19.00, 72.80).distance_km(&Location::new(19.10, 72.90));
        let via = graph
            .shortest_distance_km(Location::new(19.00, 72.80), Location::new(19.10, 72.90))
            .unwrap();
        // Two legs through b are at least the direct great-circle line.
        assert!(via >= direct - 0.01);

        graph.add_waypoint("lonely", Location::new(20.00, 74.00)).unwrap();
        assert!(graph
            .shortest_distance_km(Location::new(19.00, 72.80), Location::new(20.00, 74.00))
            .is_none());
    }

    #[test]
    fn nearest_waypoint_picks_closest() {
        let mut graph = CorridorGraph::new(Resolution::Eight);
        graph.add_waypoint("near", Location::new(19.08, 72.88)).unwrap();
        graph.add_waypoint("far", Location::new(19.50, 73.20)).unwrap();

        let idx = graph.nearest_waypoint(Location::new(19.09, 72.89)).unwrap();
        assert_eq!(graph.waypoint(idx).unwrap().id, "near");
    }
}
