#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! API request and response types for the hazard watch server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the engine's internal types to allow independent evolution of the
//! API contract.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hazard_watch_capacity::{AvailableFacility, CapacitySnapshot, ResourceDelta};
use hazard_watch_models::{
    Facility, FacilityKind, FacilityStatus, HazardKind, Location, ResourceKind, ResourceLevels,
    RiskEvent, Severity, Subscriber, SubscriberId,
};
use hazard_watch_route::RoutePlan;
use serde::{Deserialize, Serialize};

/// Health endpoint payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Always `true` when the process is serving.
    pub healthy: bool,
    /// `true` while the subscriber projection is unavailable or stale;
    /// no new alerts go out in that state.
    pub degraded: bool,
    /// Active risk events.
    pub active_risk_events: usize,
    /// Subscribers in the current projection.
    pub subscribers: usize,
    /// Monotone risk map version.
    pub risk_version: u64,
    /// Server version.
    pub version: String,
}

/// One raw feed record submitted to an ingress endpoint. The reading
/// shape depends on the feed kind in the URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFeedSubmission {
    /// Identifier of the submitting source.
    pub source: String,
    /// The source-native reading.
    pub reading: serde_json::Value,
}

/// Outcome of a feed submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApiIngestResult {
    /// The record was normalized and queued for scoring.
    #[serde(rename_all = "camelCase")]
    Accepted {
        /// The grid cell the observation was mapped to.
        cell: u64,
        /// The per-source sequence number assigned.
        sequence: u64,
    },
    /// The record was rejected.
    Rejected {
        /// Why the record was rejected.
        reason: String,
    },
}

/// An active risk event as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRiskEvent {
    /// Risk event id.
    pub id: String,
    /// Grid cell the event covers.
    pub cell: u64,
    /// Cell center latitude.
    pub latitude: f64,
    /// Cell center longitude.
    pub longitude: f64,
    /// Hazard kind.
    pub kind: HazardKind,
    /// Severity band.
    pub severity: Severity,
    /// Severity numeric value (1-3).
    pub severity_value: u8,
    /// Current risk score.
    pub score: f64,
    /// When the event was first raised.
    pub first_seen: DateTime<Utc>,
    /// Last score update.
    pub last_updated: DateTime<Utc>,
    /// When the event expires without further observations.
    pub expires_at: DateTime<Utc>,
}

impl From<RiskEvent> for ApiRiskEvent {
    fn from(event: RiskEvent) -> Self {
        let center = event.cell.center();
        Self {
            id: event.id.to_string(),
            cell: event.cell.as_u64(),
            latitude: center.lat,
            longitude: center.lng,
            kind: event.kind,
            severity: event.severity,
            severity_value: event.severity.value(),
            score: event.score,
            first_seen: event.first_seen,
            last_updated: event.last_updated,
            expires_at: event.expires_at,
        }
    }
}

/// Query parameters for the risk endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskQueryParams {
    /// Query origin latitude.
    pub lat: f64,
    /// Query origin longitude.
    pub lng: f64,
    /// Search radius in km.
    pub radius_km: f64,
}

/// An operator capacity report: a batch of resource deltas applied
/// atomically to one facility.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCapacityReport {
    /// The deltas to apply, in order.
    pub deltas: Vec<ResourceDelta>,
}

/// A facility as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFacility {
    /// Facility id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Hospital or shelter.
    pub kind: FacilityKind,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Per-resource used/total counts.
    pub resources: BTreeMap<ResourceKind, ResourceLevels>,
    /// Operational status.
    pub status: FacilityStatus,
    /// When the last operator report was applied.
    pub last_updated: DateTime<Utc>,
    /// `true` when the last report is older than the freshness bound.
    pub stale: Option<bool>,
    /// Distance from the query origin, when the query had one.
    pub distance_km: Option<f64>,
}

impl ApiFacility {
    fn from_facility(facility: Facility, stale: Option<bool>, distance_km: Option<f64>) -> Self {
        Self {
            id: facility.id.to_string(),
            name: facility.name,
            kind: facility.kind,
            latitude: facility.location.lat,
            longitude: facility.location.lng,
            resources: facility.resources,
            status: facility.status,
            last_updated: facility.last_updated,
            stale,
            distance_km,
        }
    }
}

impl From<CapacitySnapshot> for ApiFacility {
    fn from(snapshot: CapacitySnapshot) -> Self {
        Self::from_facility(snapshot.facility, Some(snapshot.stale), None)
    }
}

impl From<AvailableFacility> for ApiFacility {
    fn from(available: AvailableFacility) -> Self {
        Self::from_facility(available.facility, None, Some(available.distance_km))
    }
}

/// A facility registration record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFacilityRegistration {
    /// Facility id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Hospital or shelter.
    pub kind: FacilityKind,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Initial per-resource used/total counts.
    #[serde(default)]
    pub resources: BTreeMap<ResourceKind, ResourceLevels>,
}

impl From<ApiFacilityRegistration> for Facility {
    fn from(reg: ApiFacilityRegistration) -> Self {
        Self {
            id: hazard_watch_models::FacilityId::new(reg.id),
            name: reg.name,
            kind: reg.kind,
            location: Location::new(reg.lat, reg.lng),
            resources: reg.resources,
            status: FacilityStatus::Accepting,
            last_updated: Utc::now(),
        }
    }
}

/// Query parameters for the facilities endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitiesQueryParams {
    /// Query origin latitude; omit (with `lng`) to list everything.
    pub lat: Option<f64>,
    /// Query origin longitude.
    pub lng: Option<f64>,
    /// Only facilities with free units of this resource.
    pub need: Option<ResourceKind>,
}

/// One subscriber in a projection push.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSubscriber {
    /// Subscriber id, owned by the external registry.
    pub id: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Hazard kinds the subscriber wants; empty means all.
    #[serde(default)]
    pub filters: Vec<HazardKind>,
    /// Farthest hazard the subscriber cares about, in km.
    pub max_distance_km: f64,
}

impl From<ApiSubscriber> for Subscriber {
    fn from(api: ApiSubscriber) -> Self {
        Self {
            id: SubscriberId::new(api.id),
            location: Location::new(api.lat, api.lng),
            filters: api.filters.into_iter().collect(),
            max_distance_km: api.max_distance_km,
        }
    }
}

/// Query parameters for the route endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteQueryParams {
    /// Origin latitude.
    pub lat: f64,
    /// Origin longitude.
    pub lng: f64,
    /// Destination facility kind.
    pub category: FacilityKind,
}

/// A planned route as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRoutePlan {
    /// Waypoints from origin to destination.
    pub waypoints: Vec<ApiWaypoint>,
    /// The destination facility.
    pub destination: ApiFacility,
    /// Corridor length travelled, in km.
    pub distance_km: f64,
    /// Risk-inflated route cost, in km-equivalents.
    pub total_cost_km: f64,
    /// `true` when the route crosses a high-severity cell.
    pub passes_high_risk: bool,
}

/// One waypoint on a planned route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiWaypoint {
    /// Waypoint id.
    pub id: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

impl From<RoutePlan> for ApiRoutePlan {
    fn from(plan: RoutePlan) -> Self {
        Self {
            waypoints: plan
                .waypoints
                .into_iter()
                .map(|w| ApiWaypoint {
                    id: w.id,
                    lat: w.location.lat,
                    lng: w.location.lng,
                })
                .collect(),
            destination: ApiFacility::from_facility(plan.destination, None, None),
            distance_km: plan.distance_km,
            total_cost_km: plan.total_cost_km,
            passes_high_risk: plan.passes_high_risk,
        }
    }
}
