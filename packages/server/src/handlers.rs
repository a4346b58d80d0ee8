//! HTTP handler functions for the hazard watch API.

use actix_web::{HttpResponse, web};
use hazard_watch_allocation::{DisasterZone, ReliefCenter};
use hazard_watch_engine::EngineError;
use hazard_watch_feed::{
    FeedKind, FeedPayload, HydrologicalReading, MeteorologicalReading, SatelliteReading,
    SeismicReading,
};
use hazard_watch_models::{FacilityId, Location, SourceId};
use hazard_watch_route::RouteError;
use hazard_watch_server_models::{
    ApiCapacityReport, ApiFacility, ApiFacilityRegistration, ApiFeedSubmission, ApiHealth,
    ApiIngestResult, ApiRiskEvent, ApiRoutePlan, ApiSubscriber, FacilitiesQueryParams,
    RiskQueryParams, RouteQueryParams,
};
use serde::Deserialize;

use crate::AppState;

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let health = state.engine.health();
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        degraded: health.degraded,
        active_risk_events: health.active_risk_events,
        subscribers: health.subscribers,
        risk_version: health.risk_version,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /api/feeds/{kind}`
///
/// Ingests one raw record from an external feed. The body carries the
/// source id and the source-native reading; the URL names which shape
/// the reading has.
pub async fn ingest_feed(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ApiFeedSubmission>,
) -> HttpResponse {
    let Ok(kind) = path.as_str().parse::<FeedKind>() else {
        return HttpResponse::NotFound().json(ApiIngestResult::Rejected {
            reason: format!("unknown feed kind {path}"),
        });
    };

    let submission = body.into_inner();
    let payload = match parse_reading(kind, submission.reading) {
        Ok(payload) => payload,
        Err(e) => {
            return HttpResponse::UnprocessableEntity().json(ApiIngestResult::Rejected {
                reason: format!("malformed {kind} reading: {e}"),
            });
        }
    };

    let source = SourceId::new(submission.source);
    match state.engine.ingest(&payload, &source).await {
        Ok(observation) => HttpResponse::Ok().json(ApiIngestResult::Accepted {
            cell: observation.cell.as_u64(),
            sequence: observation.sequence,
        }),
        Err(e @ EngineError::Feed(_)) => {
            HttpResponse::UnprocessableEntity().json(ApiIngestResult::Rejected {
                reason: e.to_string(),
            })
        }
        Err(e @ EngineError::QueueFull { .. }) => {
            HttpResponse::ServiceUnavailable().json(ApiIngestResult::Rejected {
                reason: e.to_string(),
            })
        }
        Err(e) => {
            log::error!("Feed ingestion failed: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to ingest record"
            }))
        }
    }
}

fn parse_reading(kind: FeedKind, reading: serde_json::Value) -> serde_json::Result<FeedPayload> {
    Ok(match kind {
        FeedKind::Meteorological => {
            FeedPayload::Meteorological(serde_json::from_value::<MeteorologicalReading>(reading)?)
        }
        FeedKind::Hydrological => {
            FeedPayload::Hydrological(serde_json::from_value::<HydrologicalReading>(reading)?)
        }
        FeedKind::Seismic => {
            FeedPayload::Seismic(serde_json::from_value::<SeismicReading>(reading)?)
        }
        FeedKind::Satellite => {
            FeedPayload::Satellite(serde_json::from_value::<SatelliteReading>(reading)?)
        }
    })
}

/// `POST /api/capacity/{facility_id}`
///
/// Applies an operator capacity report and returns the resulting
/// facility snapshot.
pub async fn update_capacity(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ApiCapacityReport>,
) -> HttpResponse {
    let id = FacilityId::new(path.into_inner());
    match state.engine.update_capacity(&id, &body.deltas) {
        Ok(snapshot) => HttpResponse::Ok().json(ApiFacility::from(snapshot)),
        Err(EngineError::Capacity(e)) => HttpResponse::NotFound().json(serde_json::json!({
            "error": e.to_string()
        })),
        Err(e) => {
            log::error!("Capacity update failed: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to apply capacity report"
            }))
        }
    }
}

/// `PUT /api/facilities`
///
/// Registers (or re-registers) facilities.
pub async fn register_facilities(
    state: web::Data<AppState>,
    body: web::Json<Vec<ApiFacilityRegistration>>,
) -> HttpResponse {
    let registrations = body.into_inner();
    let count = registrations.len();
    for registration in registrations {
        state.engine.register_facility(registration.into());
    }
    HttpResponse::Ok().json(serde_json::json!({ "registered": count }))
}

/// `PUT /api/subscribers`
///
/// Replaces the subscriber projection. The external registry is
/// authoritative; this never merges.
pub async fn refresh_subscribers(
    state: web::Data<AppState>,
    body: web::Json<Vec<ApiSubscriber>>,
) -> HttpResponse {
    let projection = body.into_inner().into_iter().map(Into::into).collect();
    let count = state.engine.refresh_subscribers(projection);
    HttpResponse::Ok().json(serde_json::json!({ "subscribers": count }))
}

/// `GET /api/risk`
///
/// Active risk events within a radius, most severe first.
pub async fn risk(state: web::Data<AppState>, params: web::Query<RiskQueryParams>) -> HttpResponse {
    let origin = Location::new(params.lat, params.lng);
    let events: Vec<ApiRiskEvent> = state
        .engine
        .risk_near(origin, params.radius_km)
        .into_iter()
        .map(ApiRiskEvent::from)
        .collect();
    HttpResponse::Ok().json(events)
}

/// `GET /api/facilities`
///
/// With `lat`/`lng`: facilities currently able to accept, nearest
/// first. Without: every registered facility with its staleness flag.
pub async fn facilities(
    state: web::Data<AppState>,
    params: web::Query<FacilitiesQueryParams>,
) -> HttpResponse {
    let facilities: Vec<ApiFacility> = match (params.lat, params.lng) {
        (Some(lat), Some(lng)) => state
            .engine
            .facilities_near(Location::new(lat, lng), params.need)
            .into_iter()
            .map(ApiFacility::from)
            .collect(),
        _ => state
            .engine
            .facilities()
            .into_iter()
            .map(ApiFacility::from)
            .collect(),
    };
    HttpResponse::Ok().json(facilities)
}

/// `GET /api/route`
///
/// Plans an evacuation route to the best available facility of the
/// requested kind.
pub async fn route(state: web::Data<AppState>, params: web::Query<RouteQueryParams>) -> HttpResponse {
    let origin = Location::new(params.lat, params.lng);
    match state.engine.route(origin, params.category) {
        Ok(plan) => HttpResponse::Ok().json(ApiRoutePlan::from(plan)),
        Err(e @ (RouteError::NoDestination { .. } | RouteError::NoSafeRoute)) => {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": e.to_string()
            }))
        }
    }
}

/// Request body for the allocation endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRequest {
    /// Relief centers with their supply pools.
    pub centers: Vec<ReliefCenter>,
    /// Disaster zones with demand and priority.
    pub zones: Vec<DisasterZone>,
}

/// `POST /api/allocation`
///
/// Runs the greedy relief allocation over the submitted centers and
/// zones, using corridor distances where the network connects them.
pub async fn plan_allocation(
    state: web::Data<AppState>,
    body: web::Json<AllocationRequest>,
) -> HttpResponse {
    let request = body.into_inner();
    let report = state.engine.plan_allocation(&request.centers, &request.zones);
    HttpResponse::Ok().json(report)
}
