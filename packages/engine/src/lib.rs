#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Pipeline wiring and the engine facade.
//!
//! Feed normalization, risk scoring, and alert dispatch run as
//! independent tasks joined by bounded queues, so a slow notification
//! gateway can never stall ingestion. When a queue fills, the configured
//! backpressure policy decides between waiting with a timeout and
//! dropping the newest item; either way the producer is never blocked
//! indefinitely and drops are observable.
//!
//! [`Engine`] is the single entry point the HTTP surface talks to:
//! ingestion, capacity reports, subscriber projection pushes, and the
//! read-side queries all go through it.

mod config;

pub use config::{
    BackpressurePolicy, CapacitySettings, ConfigError, CorridorSpec, DispatchSettings,
    EngineConfig, QueueSettings, RouteSettings, WaypointSpec,
};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use hazard_watch_allocation::{AllocationReport, DisasterZone, ReliefCenter};
use hazard_watch_capacity::{
    AvailableFacility, CapacityConfig, CapacitySnapshot, CapacityTracker, ResourceDelta,
};
use hazard_watch_dispatch::{
    AlertDispatcher, AlertStore, DispatchConfig, DispatchError, DispatchOutcome, LogGateway,
    NotificationGateway, RetryPolicy, StoreError,
};
use hazard_watch_feed::{FeedAdapter, FeedConfig, FeedError, FeedPayload};
use hazard_watch_index::{RiskCellMap, RiskSnapshot, SpatialIndex};
use hazard_watch_models::{
    Facility, FacilityId, FacilityKind, HazardObservation, Location, ResourceKind, RiskEvent,
    SourceId, Subscriber, SubscriberId,
};
use hazard_watch_route::{CorridorGraph, RouteAdvisor, RouteError, RoutePlan};
use hazard_watch_scorer::{RiskDelta, RiskScorer};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Errors raised by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A feed record was rejected.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// A capacity operation failed.
    #[error(transparent)]
    Capacity(#[from] hazard_watch_capacity::CapacityError),

    /// The dispatcher's durable store failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The alert store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A stage queue was full and the backpressure policy dropped the
    /// item.
    #[error("queue full at {stage} stage")]
    QueueFull {
        /// The stage whose queue was full.
        stage: &'static str,
    },
}

/// Liveness report for the health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineHealth {
    /// `true` while the subscriber projection is unavailable or stale.
    pub degraded: bool,
    /// Active risk events.
    pub active_risk_events: usize,
    /// Subscribers in the current projection.
    pub subscribers: usize,
    /// Risk map version (monotone; lets clients detect staleness).
    pub risk_version: u64,
}

/// The assembled hazard engine: pipeline tasks plus the query surface.
///
/// Dropping the engine aborts its background tasks.
pub struct Engine {
    config: EngineConfig,
    adapter: FeedAdapter,
    scorer: Arc<RiskScorer>,
    dispatcher: Arc<AlertDispatcher>,
    risk_map: Arc<RiskCellMap>,
    capacity: Arc<CapacityTracker>,
    subscribers: Arc<SpatialIndex<Subscriber>>,
    subscriber_ids: Mutex<HashSet<SubscriberId>>,
    projection_refreshed: Arc<RwLock<Option<DateTime<Utc>>>>,
    advisor: RouteAdvisor,
    obs_tx: mpsc::Sender<HazardObservation>,
    /// Per-source ingest serialization: sequence assignment and the
    /// enqueue must not interleave between concurrent submissions from
    /// one source, or channel order could invert sequence order and the
    /// scorer would reject the earlier observation as stale.
    ingest_locks: Mutex<HashMap<SourceId, Arc<tokio::sync::Mutex<()>>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Starts the engine with the default (logging) notification
    /// gateway.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the configuration is invalid or the
    /// alert log cannot be opened.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(config: EngineConfig) -> Result<Self, EngineError> {
        Self::start_with_gateway(config, Arc::new(LogGateway))
    }

    /// Starts the engine, delivering notifications through `gateway`.
    ///
    /// The dispatcher begins degraded: nothing is sent until the first
    /// subscriber projection push arrives.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the configuration is invalid or the
    /// alert log cannot be opened.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start_with_gateway(
        config: EngineConfig,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Result<Self, EngineError> {
        let resolution = config.cell_resolution()?;
        // Spatial indexes shard on a coarser parent of the cell
        // resolution so one shard covers a city-scale area.
        let shard_resolution =
            h3o::Resolution::try_from(config.resolution.saturating_sub(4)).unwrap_or(resolution);

        let adapter = FeedAdapter::new(FeedConfig {
            resolution,
            staleness_bound: Duration::seconds(config.staleness_bound_secs),
        });

        let risk_map = Arc::new(RiskCellMap::new());
        let scorer = Arc::new(RiskScorer::new(config.scorer.clone(), Arc::clone(&risk_map)));

        let capacity = Arc::new(CapacityTracker::new(
            CapacityConfig {
                thresholds: config.capacity.thresholds,
                freshness_bound: Duration::seconds(config.capacity.freshness_bound_secs),
                search_radius_km: config.capacity.search_radius_km,
            },
            shard_resolution,
        ));

        let subscribers = Arc::new(SpatialIndex::new(shard_resolution));

        let store = match &config.alert_log {
            Some(path) => AlertStore::open(path)?,
            None => AlertStore::in_memory(),
        };
        let dispatcher = Arc::new(AlertDispatcher::new(
            DispatchConfig {
                distance_band_km: config.dispatch.distance_band_km,
                channel: config.dispatch.channel,
                retry: RetryPolicy::default(),
            },
            Arc::clone(&subscribers),
            store,
            gateway,
        ));
        // No projection has been pushed yet.
        dispatcher.set_degraded(true);

        let advisor = RouteAdvisor::new(
            config.route.planner,
            build_graph(&config.route.corridor, resolution)?,
            Arc::clone(&risk_map),
            Arc::clone(&capacity),
        );

        let (obs_tx, obs_rx) = mpsc::channel(config.queue.capacity);
        let (delta_tx, delta_rx) = mpsc::channel(config.queue.capacity);
        let projection_refreshed = Arc::new(RwLock::new(None));

        let tasks = vec![
            spawn_scoring(Arc::clone(&scorer), obs_rx, delta_tx.clone(), config.queue),
            spawn_dispatch(Arc::clone(&dispatcher), delta_rx),
            spawn_sweep(
                Arc::clone(&scorer),
                Arc::clone(&dispatcher),
                delta_tx,
                Arc::clone(&projection_refreshed),
                config.sweep_interval_secs,
                config.projection_staleness_secs,
                config.queue,
            ),
        ];

        Ok(Self {
            config,
            adapter,
            scorer,
            dispatcher,
            risk_map,
            capacity,
            subscribers,
            subscriber_ids: Mutex::new(HashSet::new()),
            projection_refreshed,
            advisor,
            obs_tx,
            ingest_locks: Mutex::new(HashMap::new()),
            tasks,
        })
    }

    /// Normalizes one feed record and hands it to the scoring stage.
    /// The returned observation carries the assigned cell and sequence.
    ///
    /// # Errors
    ///
    /// * [`EngineError::Feed`] when the record is malformed, stale, or
    ///   has invalid coordinates.
    /// * [`EngineError::QueueFull`] when the scoring queue rejected the
    ///   observation under the backpressure policy.
    ///
    /// # Panics
    ///
    /// Panics if the ingest lock map is poisoned.
    pub async fn ingest(
        &self,
        payload: &FeedPayload,
        source: &SourceId,
    ) -> Result<HazardObservation, EngineError> {
        let lock = {
            let mut locks = self.ingest_locks.lock().expect("ingest lock map poisoned");
            Arc::clone(locks.entry(source.clone()).or_default())
        };
        let _guard = lock.lock().await;

        let observation = self.adapter.ingest(payload, source)?;
        enqueue(&self.obs_tx, observation.clone(), self.config.queue, "scoring").await?;
        Ok(observation)
    }

    /// Replaces the subscriber projection (the external registry is
    /// authoritative, so this never merges). Clears the degraded flag.
    ///
    /// # Panics
    ///
    /// Panics if a projection lock is poisoned.
    pub fn refresh_subscribers(&self, projection: Vec<Subscriber>) -> usize {
        let incoming: HashSet<SubscriberId> =
            projection.iter().map(|s| s.id.clone()).collect();

        let mut known = self.subscriber_ids.lock().expect("subscriber id set poisoned");
        for stale in known.difference(&incoming) {
            self.subscribers.remove(stale);
        }
        let count = projection.len();
        for subscriber in projection {
            self.subscribers.upsert(subscriber);
        }
        *known = incoming;
        drop(known);

        *self
            .projection_refreshed
            .write()
            .expect("projection clock poisoned") = Some(Utc::now());
        self.dispatcher.set_degraded(false);
        log::info!("Subscriber projection refreshed: {count} subscribers");
        count
    }

    /// Registers (or re-registers) a facility.
    pub fn register_facility(&self, facility: Facility) {
        self.capacity.register(facility);
    }

    /// Applies an operator capacity report, returning the resulting
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Capacity`] for an unknown facility.
    pub fn update_capacity(
        &self,
        id: &FacilityId,
        deltas: &[ResourceDelta],
    ) -> Result<CapacitySnapshot, EngineError> {
        self.capacity.update(id, deltas)?;
        Ok(self.capacity.snapshot(id)?)
    }

    /// Active risk events within `radius_km` of `origin`, most severe
    /// first.
    #[must_use]
    pub fn risk_near(&self, origin: Location, radius_km: f64) -> Vec<RiskEvent> {
        self.risk_map.query_radius(origin, radius_km)
    }

    /// A versioned snapshot of all active risk events.
    #[must_use]
    pub fn risk_snapshot(&self) -> RiskSnapshot {
        self.risk_map.snapshot()
    }

    /// Facilities currently able to accept, nearest first.
    #[must_use]
    pub fn facilities_near(
        &self,
        origin: Location,
        need: Option<ResourceKind>,
    ) -> Vec<AvailableFacility> {
        self.capacity.nearest_available(origin, need)
    }

    /// All registered facility snapshots.
    #[must_use]
    pub fn facilities(&self) -> Vec<CapacitySnapshot> {
        self.capacity.all()
    }

    /// Plans an evacuation route to the best available facility of
    /// `kind`.
    ///
    /// # Errors
    ///
    /// See [`RouteAdvisor::route`].
    pub fn route(&self, origin: Location, kind: FacilityKind) -> Result<RoutePlan, RouteError> {
        self.advisor.route(origin, kind)
    }

    /// Runs the greedy relief allocation, measuring distances along the
    /// corridor network where it connects a center to a zone and falling
    /// back to great-circle distance where it does not.
    #[must_use]
    pub fn plan_allocation(
        &self,
        centers: &[ReliefCenter],
        zones: &[DisasterZone],
    ) -> AllocationReport {
        hazard_watch_allocation::plan_with_distances(centers, zones, |center, zone| {
            self.advisor
                .graph()
                .shortest_distance_km(center.location, zone.location)
                .unwrap_or_else(|| center.location.distance_km(&zone.location))
        })
    }

    /// Read access to the alert store.
    #[must_use]
    pub fn alerts(&self) -> &AlertStore {
        self.dispatcher.store()
    }

    /// Current liveness view.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn health(&self) -> EngineHealth {
        EngineHealth {
            degraded: self.dispatcher.is_degraded(),
            active_risk_events: self.scorer.active_count(),
            subscribers: self
                .subscriber_ids
                .lock()
                .expect("subscriber id set poisoned")
                .len(),
            risk_version: self.risk_map.snapshot().version,
        }
    }

    /// Runs one expiry sweep inline and retracts alerts for everything
    /// cleared. The background sweep does the same on its interval; this
    /// entry point exists so operators (and tests) can force one.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Dispatch`] if the durable store fails
    /// during retraction.
    pub async fn sweep_now(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let cleared = self.scorer.sweep(now);
        let count = cleared.len();
        for delta in &cleared {
            self.dispatcher.handle(delta).await?;
        }
        Ok(count)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn build_graph(spec: &CorridorSpec, resolution: h3o::Resolution) -> Result<CorridorGraph, ConfigError> {
    let mut graph = CorridorGraph::new(resolution);
    for wp in &spec.waypoints {
        graph
            .add_waypoint(wp.id.clone(), Location::new(wp.lat, wp.lng))
            .map_err(|e| ConfigError::Invalid {
                message: format!("waypoint {}: {e}", wp.id),
            })?;
    }
    for (a, b) in &spec.links {
        let a_idx = graph.index_of(a).ok_or_else(|| ConfigError::Invalid {
            message: format!("link references unknown waypoint {a}"),
        })?;
        let b_idx = graph.index_of(b).ok_or_else(|| ConfigError::Invalid {
            message: format!("link references unknown waypoint {b}"),
        })?;
        graph.link(a_idx, b_idx);
    }
    Ok(graph)
}

async fn enqueue<T: Send>(
    tx: &mpsc::Sender<T>,
    item: T,
    queue: QueueSettings,
    stage: &'static str,
) -> Result<(), EngineError> {
    match queue.backpressure {
        BackpressurePolicy::Block { timeout_ms } => tx
            .send_timeout(item, StdDuration::from_millis(timeout_ms))
            .await
            .map_err(|_| EngineError::QueueFull { stage }),
        BackpressurePolicy::DropNewest => {
            tx.try_send(item).map_err(|_| EngineError::QueueFull { stage })
        }
    }
}

fn spawn_scoring(
    scorer: Arc<RiskScorer>,
    mut rx: mpsc::Receiver<HazardObservation>,
    delta_tx: mpsc::Sender<RiskDelta>,
    queue: QueueSettings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(observation) = rx.recv().await {
            match scorer.apply(&observation) {
                Ok(Some(delta)) => {
                    if let Err(e) = enqueue(&delta_tx, delta, queue, "dispatch").await {
                        log::warn!("Dropping risk delta: {e}");
                    }
                }
                Ok(None) => {}
                // The adapter assigns monotone sequences, so this only
                // fires for replayed or duplicated observations.
                Err(e) => log::warn!("Observation rejected by scorer: {e}"),
            }
        }
    })
}

fn spawn_dispatch(
    dispatcher: Arc<AlertDispatcher>,
    mut rx: mpsc::Receiver<RiskDelta>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(delta) = rx.recv().await {
            match dispatcher.handle(&delta).await {
                Ok(DispatchOutcome::Sent(count)) if count > 0 => {
                    log::info!("Dispatched {count} notifications");
                }
                Ok(DispatchOutcome::Sent(_)) => {}
                Ok(DispatchOutcome::Degraded) => {
                    log::warn!("Risk delta evaluated while degraded; nothing sent");
                }
                Err(e) => log::error!("Dispatch failed: {e}"),
            }
        }
    })
}

fn spawn_sweep(
    scorer: Arc<RiskScorer>,
    dispatcher: Arc<AlertDispatcher>,
    delta_tx: mpsc::Sender<RiskDelta>,
    projection_refreshed: Arc<RwLock<Option<DateTime<Utc>>>>,
    interval_secs: u64,
    projection_staleness_secs: i64,
    queue: QueueSettings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(StdDuration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = Utc::now();

            for delta in scorer.sweep(now) {
                if let Err(e) = enqueue(&delta_tx, delta, queue, "dispatch").await {
                    log::warn!("Dropping retraction: {e}");
                }
            }

            let refreshed = *projection_refreshed.read().expect("projection clock poisoned");
            let stale = refreshed.is_none_or(|at| {
                now - at > Duration::seconds(projection_staleness_secs)
            });
            if stale && !dispatcher.is_degraded() {
                dispatcher.set_degraded(true);
            }
        }
    })
}
