#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Risk-aware evacuation routing.
//!
//! Routes run over a corridor graph whose edge costs are inflated by the
//! live risk of the cells each corridor crosses. Planning is two-pass:
//! the first pass refuses corridors through high-severity cells outright;
//! only when that leaves no path does a fallback pass admit them, and the
//! resulting plan is flagged so callers can surface the residual danger.
//! Destination candidates come from the capacity tracker, so full or
//! closed facilities are never routed to.

mod graph;

use std::sync::Arc;

use hazard_watch_capacity::{AvailableFacility, CapacityTracker};
use hazard_watch_index::RiskCellMap;
use hazard_watch_models::{Facility, FacilityKind, Location, Severity};
use pathfinding::prelude::dijkstra;
use serde::{Deserialize, Serialize};

pub use graph::{CorridorGraph, Waypoint};

use graph::Edge;

/// Fixed-point scale for edge costs: dijkstra needs `Ord`, so costs are
/// carried as integer meters.
const COST_SCALE: f64 = 1000.0;

/// Errors raised by route planning.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// No facility of the requested kind is currently accepting.
    #[error("no available {kind} within reach")]
    NoDestination {
        /// The requested facility kind.
        kind: FacilityKind,
    },

    /// No corridor path reaches any available facility, even through
    /// high-severity cells. The network is disconnected from the origin.
    #[error("no route to any available facility")]
    NoSafeRoute,
}

/// Routing parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteConfig {
    /// Multiplier applied to an edge's risk score when inflating its
    /// cost: `base * (1 + risk_penalty * score)`.
    pub risk_penalty: f64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self { risk_penalty: 4.0 }
    }
}

/// A planned evacuation route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlan {
    /// Waypoints from origin to destination, in travel order.
    pub waypoints: Vec<Waypoint>,
    /// The facility being routed to.
    pub destination: Facility,
    /// Corridor length actually travelled, in km.
    pub distance_km: f64,
    /// Risk-inflated cost of the route, in km-equivalents.
    pub total_cost_km: f64,
    /// `true` when the route crosses a high-severity cell. Only set by
    /// the fallback pass.
    pub passes_high_risk: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pass {
    AvoidHigh,
    AdmitHigh,
}

/// Plans routes over a corridor graph using live risk and capacity state.
pub struct RouteAdvisor {
    config: RouteConfig,
    graph: CorridorGraph,
    risk_map: Arc<RiskCellMap>,
    capacity: Arc<CapacityTracker>,
}

impl RouteAdvisor {
    /// Creates an advisor over the given corridor graph and live state.
    #[must_use]
    pub fn new(
        config: RouteConfig,
        graph: CorridorGraph,
        risk_map: Arc<RiskCellMap>,
        capacity: Arc<CapacityTracker>,
    ) -> Self {
        Self { config, graph, risk_map, capacity }
    }

    /// The corridor graph being planned over.
    #[must_use]
    pub const fn graph(&self) -> &CorridorGraph {
        &self.graph
    }

    /// Plans a route from `origin` to the best available facility of
    /// `kind`.
    ///
    /// Candidates are ordered by distance, then by higher free-capacity
    /// ratio. Each is tried with high-severity corridors excluded; only
    /// when no candidate is reachable that way does the fallback pass
    /// admit them and flag the plan.
    ///
    /// # Errors
    ///
    /// * [`RouteError::NoDestination`] when no facility of `kind` is
    ///   currently accepting.
    /// * [`RouteError::NoSafeRoute`] when the corridor network cannot
    ///   reach any candidate at all.
    pub fn route(&self, origin: Location, kind: FacilityKind) -> Result<RoutePlan, RouteError> {
        let mut candidates: Vec<AvailableFacility> = self
            .capacity
            .nearest_available(origin, None)
            .into_iter()
            .filter(|c| c.facility.kind == kind)
            .collect();
        candidates.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let fa = a.facility.free_ratio().unwrap_or(0.0);
                    let fb = b.facility.free_ratio().unwrap_or(0.0);
                    fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        if candidates.is_empty() {
            return Err(RouteError::NoDestination { kind });
        }

        let start = self.graph.nearest_waypoint(origin).ok_or(RouteError::NoSafeRoute)?;

        for pass in [Pass::AvoidHigh, Pass::AdmitHigh] {
            for candidate in &candidates {
                let Some(goal) = self.graph.nearest_waypoint(candidate.facility.location) else {
                    continue;
                };
                if let Some((path, cost)) = self.shortest_path(start, goal, pass) {
                    log::debug!(
                        "Routed to {} over {} waypoints (pass {})",
                        candidate.facility.id,
                        path.len(),
                        if pass == Pass::AvoidHigh { "avoid" } else { "admit" },
                    );
                    return Ok(self.build_plan(&path, cost, candidate.facility.clone()));
                }
            }
        }

        Err(RouteError::NoSafeRoute)
    }

    fn shortest_path(&self, start: usize, goal: usize, pass: Pass) -> Option<(Vec<usize>, u64)> {
        dijkstra(
            &start,
            |&node| {
                self.graph
                    .edges_from(node)
                    .iter()
                    .filter_map(|edge| {
                        let (has_high, max_score) = self.edge_risk(edge);
                        if pass == Pass::AvoidHigh && has_high {
                            return None;
                        }
                        let cost_km =
                            edge.base_cost_km * (1.0 + self.config.risk_penalty * max_score);
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        let cost = (cost_km * COST_SCALE).round().max(1.0) as u64;
                        Some((edge.to, cost))
                    })
                    .collect::<Vec<_>>()
            },
            |&node| node == goal,
        )
    }

    /// Highest risk touching any cell the edge crosses: whether a
    /// high-severity cell is among them, and the maximum risk score.
    fn edge_risk(&self, edge: &Edge) -> (bool, f64) {
        let mut has_high = false;
        let mut max_score = 0.0_f64;
        for cell in &edge.cells {
            if let Some((severity, score)) = self.risk_map.max_severity(*cell) {
                has_high |= severity == Severity::High;
                max_score = max_score.max(score);
            }
        }
        (has_high, max_score)
    }

    fn build_plan(&self, path: &[usize], cost: u64, destination: Facility) -> RoutePlan {
        let waypoints: Vec<Waypoint> = path
            .iter()
            .filter_map(|&idx| self.graph.waypoint(idx).cloned())
            .collect();

        let mut distance_km = 0.0;
        let mut passes_high_risk = false;
        for pair in path.windows(2) {
            if let Some(edge) = self.graph.edge_between(pair[0], pair[1]) {
                distance_km += edge.base_cost_km;
                passes_high_risk |= self.edge_risk(edge).0;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let total_cost_km = cost as f64 / COST_SCALE;
        RoutePlan {
            waypoints,
            destination,
            distance_km,
            total_cost_km,
            passes_high_risk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};
    use h3o::Resolution;
    use hazard_watch_capacity::{CapacityConfig, ResourceDelta};
    use hazard_watch_models::{
        FacilityId, FacilityStatus, GeoCell, HazardKind, ResourceKind, ResourceLevels, RiskEvent,
        RiskEventId,
    };

    const RES: Resolution = Resolution::Eight;

    fn facility(id: &str, kind: FacilityKind, location: Location, used: u32, total: u32) -> Facility {
        let mut resources = BTreeMap::new();
        resources.insert(ResourceKind::IcuBeds, ResourceLevels::new(used, total));
        Facility {
            id: FacilityId::new(id),
            name: id.to_uppercase(),
            kind,
            location,
            resources,
            status: FacilityStatus::Accepting,
            last_updated: Utc::now(),
        }
    }

    fn high_risk(cell: GeoCell) -> RiskEvent {
        let now = Utc::now();
        RiskEvent {
            id: RiskEventId::random(),
            cell,
            kind: HazardKind::Flood,
            severity: Severity::High,
            score: 0.9,
            first_seen: now,
            last_updated: now,
            expires_at: now + Duration::hours(6),
        }
    }

    /// A diamond network: origin at `a`, shelter at `d`, short path
    /// through `b`, longer detour through `e`.
    ///
    /// ```text
    ///       b
    ///      / \
    ///     a   d   (shelter at d)
    ///      \ /
    ///       e
    /// ```
    fn diamond() -> (CorridorGraph, Location, Location, Location) {
        let origin = Location::new(19.00, 72.80);
        let shelter = Location::new(19.00, 72.90);
        let via_b = Location::new(19.03, 72.85);
        let via_e = Location::new(18.95, 72.85);

        let mut graph = CorridorGraph::new(RES);
        let a = graph.add_waypoint("a", origin).unwrap();
        let b = graph.add_waypoint("b", via_b).unwrap();
        let d = graph.add_waypoint("d", shelter).unwrap();
        let e = graph.add_waypoint("e", via_e).unwrap();
        graph.link(a, b);
        graph.link(b, d);
        graph.link(a, e);
        graph.link(e, d);

        (graph, origin, shelter, via_b)
    }

    fn advisor_with(
        graph: CorridorGraph,
        risk_map: Arc<RiskCellMap>,
        facilities: Vec<Facility>,
    ) -> RouteAdvisor {
        let capacity = Arc::new(CapacityTracker::new(CapacityConfig::default(), Resolution::Four));
        for f in facilities {
            capacity.register(f);
        }
        RouteAdvisor::new(RouteConfig::default(), graph, risk_map, capacity)
    }

    #[test]
    fn clear_network_takes_shortest_path() {
        let (graph, origin, shelter, _) = diamond();
        let risk_map = Arc::new(RiskCellMap::new());
        let advisor = advisor_with(
            graph,
            risk_map,
            vec![facility("shelter", FacilityKind::Shelter, shelter, 2, 10)],
        );

        let plan = advisor.route(origin, FacilityKind::Shelter).unwrap();
        assert!(!plan.passes_high_risk);
        // b is north of the direct line and closer than the e detour.
        let ids: Vec<&str> = plan.waypoints.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);
        assert!((plan.total_cost_km - plan.distance_km).abs() < 1e-6);
    }

    #[test]
    fn high_severity_corridor_is_avoided() {
        let (graph, origin, shelter, via_b) = diamond();
        let risk_map = Arc::new(RiskCellMap::new());
        risk_map.publish(high_risk(GeoCell::containing(via_b, RES).unwrap()));

        let advisor = advisor_with(
            graph,
            risk_map,
            vec![facility("shelter", FacilityKind::Shelter, shelter, 2, 10)],
        );

        let plan = advisor.route(origin, FacilityKind::Shelter).unwrap();
        assert!(!plan.passes_high_risk);
        let ids: Vec<&str> = plan.waypoints.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "e", "d"]);
    }

    #[test]
    fn fallback_admits_high_risk_and_flags_it() {
        // Only one corridor: a - b - d, with high risk on b.
        let origin = Location::new(19.00, 72.80);
        let shelter = Location::new(19.00, 72.90);
        let via_b = Location::new(19.03, 72.85);

        let mut graph = CorridorGraph::new(RES);
        let a = graph.add_waypoint("a", origin).unwrap();
        let b = graph.add_waypoint("b", via_b).unwrap();
        let d = graph.add_waypoint("d", shelter).unwrap();
        graph.link(a, b);
        graph.link(b, d);

        let risk_map = Arc::new(RiskCellMap::new());
        risk_map.publish(high_risk(GeoCell::containing(via_b, RES).unwrap()));

        let advisor = advisor_with(
            graph,
            risk_map,
            vec![facility("shelter", FacilityKind::Shelter, shelter, 2, 10)],
        );

        let plan = advisor.route(origin, FacilityKind::Shelter).unwrap();
        assert!(plan.passes_high_risk);
        // Inflated cost exceeds the raw corridor length.
        assert!(plan.total_cost_km > plan.distance_km);
    }

    #[test]
    fn disconnected_network_is_no_safe_route() {
        let origin = Location::new(19.00, 72.80);
        let shelter = Location::new(19.00, 72.90);

        let mut graph = CorridorGraph::new(RES);
        graph.add_waypoint("a", origin).unwrap();
        graph.add_waypoint("d", shelter).unwrap();
        // No links at all.

        let advisor = advisor_with(
            graph,
            Arc::new(RiskCellMap::new()),
            vec![facility("shelter", FacilityKind::Shelter, shelter, 2, 10)],
        );

        let err = advisor.route(origin, FacilityKind::Shelter).unwrap_err();
        assert!(matches!(err, RouteError::NoSafeRoute));
    }

    #[test]
    fn full_and_closed_facilities_are_not_destinations() {
        let (graph, origin, shelter, _) = diamond();
        let capacity = Arc::new(CapacityTracker::new(CapacityConfig::default(), Resolution::Four));
        capacity.register(facility("full", FacilityKind::Shelter, shelter, 10, 10));
        capacity
            .update(&FacilityId::new("full"), &[ResourceDelta::Set {
                resource: ResourceKind::IcuBeds,
                used: 10,
                total: 10,
            }])
            .unwrap();
        capacity.register(facility("closed", FacilityKind::Shelter, shelter, 0, 10));
        capacity.update(&FacilityId::new("closed"), &[ResourceDelta::Close]).unwrap();

        let advisor = RouteAdvisor::new(
            RouteConfig::default(),
            graph,
            Arc::new(RiskCellMap::new()),
            capacity,
        );

        let err = advisor.route(origin, FacilityKind::Shelter).unwrap_err();
        assert!(matches!(err, RouteError::NoDestination { kind: FacilityKind::Shelter }));
    }

    #[test]
    fn equidistant_tie_broken_by_free_capacity() {
        let (graph, origin, shelter, _) = diamond();
        let risk_map = Arc::new(RiskCellMap::new());
        let advisor = advisor_with(
            graph,
            risk_map,
            vec![
                facility("tight", FacilityKind::Shelter, shelter, 8, 10),
                facility("roomy", FacilityKind::Shelter, shelter, 1, 10),
            ],
        );

        let plan = advisor.route(origin, FacilityKind::Shelter).unwrap();
        assert_eq!(plan.destination.id, FacilityId::new("roomy"));
    }

    #[test]
    fn hospital_and_shelter_kinds_are_separate_pools() {
        let (graph, origin, shelter, _) = diamond();
        let advisor = advisor_with(
            graph,
            Arc::new(RiskCellMap::new()),
            vec![facility("hospital", FacilityKind::Hospital, shelter, 2, 10)],
        );

        assert!(matches!(
            advisor.route(origin, FacilityKind::Shelter),
            Err(RouteError::NoDestination { .. })
        ));
        assert!(advisor.route(origin, FacilityKind::Hospital).is_ok());
    }
}
