//! End-to-end pipeline scenarios: feed ingress through scoring to
//! dispatch, capacity exclusion, and corridor routing, all through the
//! engine facade.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use hazard_watch_dispatch::{GatewayError, Notification, NotificationGateway, NotificationPayload};
use hazard_watch_engine::{CorridorSpec, Engine, EngineConfig, WaypointSpec};
use hazard_watch_feed::{FeedPayload, HydrologicalReading};
use hazard_watch_models::{
    Facility, FacilityId, FacilityKind, FacilityStatus, Location, ResourceKind, ResourceLevels,
    SourceId, Subscriber, SubscriberId,
};
use hazard_watch_capacity::ResourceDelta;

#[derive(Default)]
struct CountingGateway {
    alerts: AtomicUsize,
    retractions: AtomicUsize,
}

#[async_trait]
impl NotificationGateway for CountingGateway {
    async fn deliver(&self, notification: &Notification) -> Result<(), GatewayError> {
        match notification.payload {
            NotificationPayload::Alert { .. } => self.alerts.fetch_add(1, Ordering::SeqCst),
            NotificationPayload::Retraction { .. } => {
                self.retractions.fetch_add(1, Ordering::SeqCst)
            }
        };
        Ok(())
    }
}

const RIVERSIDE: Location = Location::new(25.32, 83.01);

fn subscriber(id: &str, location: Location) -> Subscriber {
    Subscriber {
        id: SubscriberId::new(id),
        location,
        filters: BTreeSet::new(),
        max_distance_km: 50.0,
    }
}

fn gauge_reading(location: Location, gauge_height_m: f64) -> FeedPayload {
    FeedPayload::Hydrological(HydrologicalReading {
        location,
        gauge_height_m,
        danger_level_m: 5.0,
        observed_at: Utc::now(),
        confidence: 0.95,
    })
}

fn shelter(id: &str, location: Location) -> Facility {
    let mut resources = std::collections::BTreeMap::new();
    resources.insert(ResourceKind::IcuBeds, ResourceLevels::new(2, 10));
    Facility {
        id: FacilityId::new(id),
        name: id.to_uppercase(),
        kind: FacilityKind::Shelter,
        location,
        resources,
        status: FacilityStatus::Accepting,
        last_updated: Utc::now(),
    }
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread")]
async fn rising_flood_alerts_each_subscriber_exactly_once() {
    let gateway = Arc::new(CountingGateway::default());
    let engine = Engine::start_with_gateway(EngineConfig::default(), Arc::clone(&gateway) as Arc<dyn NotificationGateway>).unwrap();
    engine.refresh_subscribers(vec![subscriber("s1", RIVERSIDE)]);

    let source = SourceId::new("cwc-gauge-17");

    // Gauge climbs over danger level: medium risk first, then high.
    let receipt = engine.ingest(&gauge_reading(RIVERSIDE, 10.0), &source).await.unwrap();
    assert_eq!(receipt.sequence, 1);
    wait_until("first alert", || gateway.alerts.load(Ordering::SeqCst) == 1).await;

    // The high-severity escalation re-evaluates the same event; the
    // uniqueness key already exists, so no second alert goes out.
    engine.ingest(&gauge_reading(RIVERSIDE, 15.0), &source).await.unwrap();
    wait_until("escalation processed", || {
        engine.risk_near(RIVERSIDE, 5.0).first().is_some_and(|e| e.score > 0.8)
    })
    .await;

    tokio::time::sleep(StdDuration::from_millis(200)).await;
    assert_eq!(gateway.alerts.load(Ordering::SeqCst), 1);
    assert_eq!(engine.alerts().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_same_source_submissions_all_score() {
    let engine = Arc::new(Engine::start(EngineConfig::default()).unwrap());
    let source = SourceId::new("cwc-burst");

    // A burst of parallel submissions from one gauge network, each for a
    // different stretch of river. Sequence assignment and enqueueing are
    // serialized per source, so none may be lost to reordering.
    let spots: Vec<Location> = (0..16)
        .map(|i| Location::new(25.0 + f64::from(i) * 0.2, 83.0))
        .collect();
    let mut handles = Vec::new();
    for spot in spots.clone() {
        let engine = Arc::clone(&engine);
        let source = source.clone();
        handles.push(tokio::spawn(async move {
            engine.ingest(&gauge_reading(spot, 15.0), &source).await.unwrap()
        }));
    }

    let mut sequences: Vec<u64> = Vec::new();
    for handle in handles {
        sequences.push(handle.await.unwrap().sequence);
    }
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=16).collect::<Vec<_>>());

    for spot in spots {
        wait_until("scored observation", || !engine.risk_near(spot, 5.0).is_empty()).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cleared_hazard_retracts_open_alerts() {
    let gateway = Arc::new(CountingGateway::default());
    let engine = Engine::start_with_gateway(EngineConfig::default(), Arc::clone(&gateway) as Arc<dyn NotificationGateway>).unwrap();
    engine.refresh_subscribers(vec![subscriber("s1", RIVERSIDE)]);

    engine
        .ingest(&gauge_reading(RIVERSIDE, 15.0), &SourceId::new("cwc"))
        .await
        .unwrap();
    wait_until("alert", || gateway.alerts.load(Ordering::SeqCst) == 1).await;

    // Long after expiry, a sweep clears the event and retracts.
    let cleared = engine.sweep_now(Utc::now() + Duration::days(2)).await.unwrap();
    assert_eq!(cleared, 1);
    assert_eq!(gateway.retractions.load(Ordering::SeqCst), 1);
    assert!(engine.risk_near(RIVERSIDE, 5.0).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn no_dispatch_while_projection_missing() {
    let gateway = Arc::new(CountingGateway::default());
    let engine = Engine::start_with_gateway(EngineConfig::default(), Arc::clone(&gateway) as Arc<dyn NotificationGateway>).unwrap();

    assert!(engine.health().degraded);
    engine
        .ingest(&gauge_reading(RIVERSIDE, 15.0), &SourceId::new("cwc"))
        .await
        .unwrap();
    wait_until("risk event", || !engine.risk_near(RIVERSIDE, 5.0).is_empty()).await;

    tokio::time::sleep(StdDuration::from_millis(200)).await;
    assert_eq!(gateway.alerts.load(Ordering::SeqCst), 0);

    // The projection push recovers the dispatcher for later events.
    engine.refresh_subscribers(vec![subscriber("s1", RIVERSIDE)]);
    assert!(!engine.health().degraded);

    let elsewhere = Location::new(25.40, 83.10);
    engine
        .ingest(&gauge_reading(elsewhere, 15.0), &SourceId::new("cwc-2"))
        .await
        .unwrap();
    wait_until("post-recovery alert", || gateway.alerts.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn icu_exhaustion_excludes_hospital_until_discharge() {
    let engine = Engine::start(EngineConfig::default()).unwrap();
    let mut hospital = shelter("h1", RIVERSIDE);
    hospital.kind = FacilityKind::Hospital;
    engine.register_facility(hospital);
    let id = FacilityId::new("h1");

    // Admissions push ICU occupancy to the limited threshold.
    let snapshot = engine
        .update_capacity(&id, &[ResourceDelta::Set {
            resource: ResourceKind::IcuBeds,
            used: 9,
            total: 10,
        }])
        .unwrap();
    assert_eq!(snapshot.facility.status, FacilityStatus::Limited);
    assert_eq!(engine.facilities_near(RIVERSIDE, Some(ResourceKind::IcuBeds)).len(), 1);

    // The last bed fills: the hospital leaves the available pool.
    engine
        .update_capacity(&id, &[ResourceDelta::Adjust {
            resource: ResourceKind::IcuBeds,
            used_delta: 1,
        }])
        .unwrap();
    assert!(engine.facilities_near(RIVERSIDE, Some(ResourceKind::IcuBeds)).is_empty());

    // Discharges bring it back.
    let snapshot = engine
        .update_capacity(&id, &[ResourceDelta::Adjust {
            resource: ResourceKind::IcuBeds,
            used_delta: -3,
        }])
        .unwrap();
    assert_eq!(snapshot.facility.status, FacilityStatus::Accepting);
    assert_eq!(engine.facilities_near(RIVERSIDE, Some(ResourceKind::IcuBeds)).len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn corridor_route_reaches_registered_shelter() {
    let mut config = EngineConfig::default();
    config.route.corridor = CorridorSpec {
        waypoints: vec![
            WaypointSpec { id: "origin".into(), lat: 25.32, lng: 83.01 },
            WaypointSpec { id: "mid".into(), lat: 25.36, lng: 83.05 },
            WaypointSpec { id: "shelter".into(), lat: 25.40, lng: 83.09 },
        ],
        links: vec![
            ("origin".into(), "mid".into()),
            ("mid".into(), "shelter".into()),
        ],
    };
    let engine = Engine::start(config).unwrap();
    engine.register_facility(shelter("relief-1", Location::new(25.40, 83.09)));

    let plan = engine.route(RIVERSIDE, FacilityKind::Shelter).unwrap();
    assert_eq!(plan.destination.id, FacilityId::new("relief-1"));
    assert_eq!(plan.waypoints.len(), 3);
    assert!(!plan.passes_high_risk);
}

#[tokio::test(flavor = "multi_thread")]
async fn allocation_uses_corridor_distances() {
    use hazard_watch_allocation::{CenterId, DisasterZone, ReliefCenter, ZoneId};

    let mut config = EngineConfig::default();
    config.route.corridor = CorridorSpec {
        waypoints: vec![
            WaypointSpec { id: "depot".into(), lat: 25.32, lng: 83.01 },
            WaypointSpec { id: "zone".into(), lat: 25.40, lng: 83.09 },
        ],
        links: vec![("depot".into(), "zone".into())],
    };
    let engine = Engine::start(config).unwrap();

    let centers = vec![ReliefCenter {
        id: CenterId::new("depot"),
        name: "Depot".into(),
        location: Location::new(25.32, 83.01),
        supply: 100.0,
    }];
    let zones = vec![DisasterZone {
        id: ZoneId::new("z1"),
        name: "Zone 1".into(),
        location: Location::new(25.40, 83.09),
        demand: 60.0,
        priority: 1,
    }];

    let report = engine.plan_allocation(&centers, &zones);
    assert!((report.totals.delivered - 60.0).abs() < 1e-9);
    assert!((report.totals.fulfillment_rate - 1.0).abs() < 1e-9);
    assert!(report.shipments[0].distance_km > 0.0);
}
