#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Greedy relief-supply allocation.
//!
//! Disaster zones are served in (priority, demand) order: priority 1 is
//! most urgent, and among equal priorities the larger demand goes first.
//! Each zone draws from the nearest center that still has supply until
//! its demand is met or every center is exhausted. Shortages are part of
//! the report, never an error.

use std::collections::BTreeMap;

use hazard_watch_models::Location;
use serde::{Deserialize, Serialize};

/// Remaining amounts below this are treated as zero.
const EPSILON: f64 = 1e-3;

/// Identifier of a relief center.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CenterId(pub String);

impl CenterId {
    /// Creates a center id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for CenterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a disaster zone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl ZoneId {
    /// Creates a zone id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A relief center with a supply pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReliefCenter {
    /// External center id.
    pub id: CenterId,
    /// Human-readable name.
    pub name: String,
    /// Center location.
    pub location: Location,
    /// Supply units on hand.
    pub supply: f64,
}

/// A disaster zone with demand and urgency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisasterZone {
    /// External zone id.
    pub id: ZoneId,
    /// Human-readable name.
    pub name: String,
    /// Zone location.
    pub location: Location,
    /// Supply units required.
    pub demand: f64,
    /// Urgency: 1 is most urgent, larger is less urgent.
    pub priority: u8,
}

/// One delivery from a center to a zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    /// Source center.
    pub center: CenterId,
    /// Receiving zone.
    pub zone: ZoneId,
    /// Units delivered.
    pub amount: f64,
    /// Travel distance, in km.
    pub distance_km: f64,
}

/// Post-allocation view of one center.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CenterSummary {
    /// The center.
    pub id: CenterId,
    /// Supply before allocation.
    pub initial_supply: f64,
    /// Units shipped out.
    pub allocated: f64,
    /// Units left.
    pub remaining: f64,
    /// allocated / initial, in [0, 1]. Zero-supply centers read 0.
    pub utilization: f64,
}

/// Post-allocation view of one zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSummary {
    /// The zone.
    pub id: ZoneId,
    /// Urgency the zone was served at.
    pub priority: u8,
    /// Demand before allocation.
    pub demand: f64,
    /// Units received.
    pub received: f64,
    /// Demand left unmet.
    pub shortage: f64,
    /// received / demand, in [0, 1]. Zero-demand zones read 1.
    pub fulfillment: f64,
}

/// Whole-run totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationTotals {
    /// Units delivered across all shipments.
    pub delivered: f64,
    /// Distance covered across all shipments, in km.
    pub distance_km: f64,
    /// Total demand across zones.
    pub demand: f64,
    /// Total supply across centers.
    pub supply: f64,
    /// delivered / demand, in [0, 1].
    pub fulfillment_rate: f64,
    /// Units delivered per km travelled.
    pub efficiency: f64,
}

/// The full allocation result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationReport {
    /// Every delivery, in execution order.
    pub shipments: Vec<Shipment>,
    /// Per-center summaries.
    pub centers: Vec<CenterSummary>,
    /// Per-zone summaries, in service order.
    pub zones: Vec<ZoneSummary>,
    /// Whole-run totals.
    pub totals: AllocationTotals,
}

/// Runs the greedy allocation.
///
/// Distances come from `distance_km`, letting the caller plug corridor
/// shortest-path distances; [`plan`] is the great-circle default.
#[must_use]
pub fn plan_with_distances<F>(
    centers: &[ReliefCenter],
    zones: &[DisasterZone],
    distance_km: F,
) -> AllocationReport
where
    F: Fn(&ReliefCenter, &DisasterZone) -> f64,
{
    let mut remaining_supply: BTreeMap<CenterId, f64> =
        centers.iter().map(|c| (c.id.clone(), c.supply)).collect();

    let mut ordered: Vec<&DisasterZone> = zones.iter().collect();
    ordered.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.demand.partial_cmp(&a.demand).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut shipments = Vec::new();
    let mut zone_summaries = Vec::new();
    let mut total_delivered = 0.0_f64;
    let mut total_distance = 0.0_f64;

    for zone in ordered {
        let mut remaining_demand = zone.demand;

        while remaining_demand > EPSILON {
            // Nearest center that still has supply.
            let nearest = centers
                .iter()
                .filter(|c| remaining_supply.get(&c.id).copied().unwrap_or(0.0) > EPSILON)
                .map(|c| (c, distance_km(c, zone)))
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

            let Some((center, distance)) = nearest else {
                log::warn!(
                    "Supplies exhausted; zone {} short {remaining_demand:.2} units",
                    zone.id
                );
                break;
            };

            let available = remaining_supply
                .get(&center.id)
                .copied()
                .unwrap_or(0.0);
            let amount = remaining_demand.min(available);

            remaining_demand -= amount;
            remaining_supply.insert(center.id.clone(), available - amount);
            total_delivered += amount;
            total_distance += distance;

            log::debug!(
                "Allocated {amount:.2} units from {} to {} ({distance:.2} km)",
                center.id,
                zone.id
            );
            shipments.push(Shipment {
                center: center.id.clone(),
                zone: zone.id.clone(),
                amount,
                distance_km: distance,
            });
        }

        let received = zone.demand - remaining_demand;
        zone_summaries.push(ZoneSummary {
            id: zone.id.clone(),
            priority: zone.priority,
            demand: zone.demand,
            received,
            shortage: remaining_demand,
            fulfillment: if zone.demand > EPSILON { received / zone.demand } else { 1.0 },
        });
    }

    let center_summaries = centers
        .iter()
        .map(|c| {
            let remaining = remaining_supply.get(&c.id).copied().unwrap_or(0.0);
            let allocated = c.supply - remaining;
            CenterSummary {
                id: c.id.clone(),
                initial_supply: c.supply,
                allocated,
                remaining,
                utilization: if c.supply > EPSILON { allocated / c.supply } else { 0.0 },
            }
        })
        .collect();

    let total_demand: f64 = zones.iter().map(|z| z.demand).sum();
    let total_supply: f64 = centers.iter().map(|c| c.supply).sum();

    AllocationReport {
        shipments,
        centers: center_summaries,
        zones: zone_summaries,
        totals: AllocationTotals {
            delivered: total_delivered,
            distance_km: total_distance,
            demand: total_demand,
            supply: total_supply,
            fulfillment_rate: if total_demand > EPSILON {
                total_delivered / total_demand
            } else {
                1.0
            },
            efficiency: if total_distance > EPSILON {
                total_delivered / total_distance
            } else {
                0.0
            },
        },
    }
}

/// Runs the greedy allocation with great-circle distances.
#[must_use]
pub fn plan(centers: &[ReliefCenter], zones: &[DisasterZone]) -> AllocationReport {
    plan_with_distances(centers, zones, |c, z| c.location.distance_km(&z.location))
}
