#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Alert dispatch: matches active risk events against subscribers and
//! emits deduplicated alerts.
//!
//! Correctness properties:
//! * at most one alert per (subscriber, risk event) while the event is
//!   active — enforced by an atomic test-and-insert on the durable
//!   [`AlertStore`], safe under concurrent evaluation of the same event;
//! * at least one alert within bounded latency of an event first
//!   matching a subscriber's filters and distance preference;
//! * on "hazard cleared", one idempotent retraction per still-open alert.
//!
//! Delivery failures are retried with bounded exponential backoff; after
//! the cap the alert is marked delivery-failed and surfaced, never
//! silently dropped. When the subscriber projection is unavailable the
//! dispatcher degrades to "no new dispatch" — distinguishable from "no
//! risk currently active".

mod gateway;
mod store;

pub use gateway::{GatewayError, LogGateway, Notification, NotificationGateway, NotificationPayload};
pub use store::{AlertStore, StoreError};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use hazard_watch_index::SpatialIndex;
use hazard_watch_models::{AlertChannel, AlertKey, DeliveryState, RiskEvent, Subscriber};
use hazard_watch_scorer::RiskDelta;

/// Errors raised during dispatch evaluation.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The durable alert store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Retry policy for the notification gateway.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum delivery attempts (including the first).
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub base_backoff: Duration,
    /// Backoff cap.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn backoff_for(self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Radius of the alert relevance band around a risk cell, in km
    /// (the engine accepts 5-50).
    pub distance_band_km: f64,
    /// Channel hint passed to the gateway.
    pub channel: AlertChannel,
    /// Gateway retry policy.
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            distance_band_km: 25.0,
            channel: AlertChannel::Push,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of evaluating one risk delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Evaluation ran; this many new alerts (or retractions) were sent.
    Sent(usize),
    /// The subscriber projection is unavailable; nothing was dispatched.
    /// Explicitly not the same as `Sent(0)`.
    Degraded,
}

/// The alert dispatcher.
pub struct AlertDispatcher {
    config: DispatchConfig,
    subscribers: Arc<SpatialIndex<Subscriber>>,
    store: AlertStore,
    gateway: Arc<dyn NotificationGateway>,
    degraded: AtomicBool,
}

impl AlertDispatcher {
    /// Creates a dispatcher reading candidates from `subscribers`,
    /// deduplicating through `store`, and delivering via `gateway`.
    #[must_use]
    pub fn new(
        config: DispatchConfig,
        subscribers: Arc<SpatialIndex<Subscriber>>,
        store: AlertStore,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            config,
            subscribers,
            store,
            gateway,
            degraded: AtomicBool::new(false),
        }
    }

    /// Marks the subscriber projection unavailable/restored. While
    /// degraded the dispatcher sends nothing new.
    pub fn set_degraded(&self, degraded: bool) {
        let was = self.degraded.swap(degraded, Ordering::AcqRel);
        if degraded && !was {
            log::warn!("Dispatcher degraded: subscriber projection unavailable");
        } else if !degraded && was {
            log::info!("Dispatcher recovered: subscriber projection restored");
        }
    }

    /// Whether the dispatcher is currently degraded.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Read access to the alert store (for queries and surfacing
    /// delivery failures).
    #[must_use]
    pub const fn store(&self) -> &AlertStore {
        &self.store
    }

    /// Evaluates one risk delta: dispatch on raise/boundary change,
    /// retract on clear.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] only when the durable store fails; all
    /// per-subscriber delivery failures are absorbed by the retry policy
    /// and recorded on the alert instead.
    pub async fn handle(&self, delta: &RiskDelta) -> Result<DispatchOutcome, DispatchError> {
        match delta {
            RiskDelta::Raised(event) | RiskDelta::Changed { event, .. } => {
                self.dispatch_event(event).await
            }
            RiskDelta::Cleared(event) => self.retract_event(event).await,
        }
    }

    /// Matches an active event against subscribers in the distance band
    /// and sends at most one alert per (subscriber, event).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the durable store fails.
    pub async fn dispatch_event(&self, event: &RiskEvent) -> Result<DispatchOutcome, DispatchError> {
        if self.is_degraded() {
            log::warn!(
                "Skipping dispatch for {} in {}: dispatcher degraded",
                event.kind,
                event.cell
            );
            return Ok(DispatchOutcome::Degraded);
        }

        let center = event.cell.center();
        let candidates = self.subscribers.query_radius(center, self.config.distance_band_km);

        let mut sent = 0_usize;
        for (subscriber, distance_km) in candidates {
            if !subscriber.wants(event.kind) || distance_km > subscriber.max_distance_km {
                continue;
            }

            let key = AlertKey {
                subscriber: subscriber.id.clone(),
                risk_event: event.id,
            };
            // Test-and-insert: the key is reserved before delivery, so a
            // concurrent evaluation of the same event loses the race and
            // sends nothing.
            let Some(_reserved) = self.store.try_insert(key.clone(), self.config.channel, Utc::now())?
            else {
                continue;
            };

            let notification = Notification {
                subscriber: subscriber.id.clone(),
                payload: NotificationPayload::Alert {
                    event: event.clone(),
                    distance_km,
                },
                channel: self.config.channel,
            };

            if self.deliver_with_retry(&notification).await {
                self.store.mark(&key, DeliveryState::Delivered)?;
                sent += 1;
            } else {
                log::error!(
                    "Delivery to {} for event {} failed after {} attempts",
                    subscriber.id,
                    event.id,
                    self.config.retry.max_attempts
                );
                self.store.mark(&key, DeliveryState::DeliveryFailed)?;
            }
        }

        Ok(DispatchOutcome::Sent(sent))
    }

    /// Sends a retraction to every still-open alert of a cleared event.
    /// Idempotent: alerts already retracted are skipped, so retracting
    /// twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the durable store fails.
    pub async fn retract_event(&self, event: &RiskEvent) -> Result<DispatchOutcome, DispatchError> {
        let open = self.store.open_alerts_for_event(event.id);
        let mut sent = 0_usize;

        for alert in open {
            let notification = Notification {
                subscriber: alert.key.subscriber.clone(),
                payload: NotificationPayload::Retraction { event: event.clone() },
                channel: alert.channel,
            };
            // Retractions are best-effort beyond the retry cap; the state
            // still advances so the alert is not retracted twice.
            if !self.deliver_with_retry(&notification).await {
                log::error!("Retraction to {} for event {} failed", alert.key.subscriber, event.id);
            }
            self.store.mark(&alert.key, DeliveryState::Retracted)?;
            sent += 1;
        }

        Ok(DispatchOutcome::Sent(sent))
    }

    /// Attempts delivery under the bounded-backoff retry policy.
    /// Returns whether delivery eventually succeeded.
    async fn deliver_with_retry(&self, notification: &Notification) -> bool {
        let policy = self.config.retry;
        for attempt in 0..policy.max_attempts {
            match self.gateway.deliver(notification).await {
                Ok(()) => return true,
                Err(e) => {
                    log::warn!(
                        "Delivery attempt {} to {} failed: {e}",
                        attempt + 1,
                        notification.subscriber
                    );
                    if attempt + 1 < policy.max_attempts {
                        tokio::time::sleep(policy.backoff_for(attempt)).await;
                    }
                }
            }
        }
        false
    }
}
