//! Notification egress seam.
//!
//! Delivery is owned by an external messaging gateway; the engine only
//! hands over (subscriber, payload, channel) and hears back
//! success/failure. The trait keeps the dispatcher testable and lets
//! deployments plug their own transport.

use async_trait::async_trait;
use hazard_watch_models::{AlertChannel, RiskEvent, SubscriberId};
use serde::{Deserialize, Serialize};

/// Errors reported back by the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Delivery failed; the dispatcher may retry.
    #[error("delivery failed: {message}")]
    Delivery {
        /// Gateway-provided failure description.
        message: String,
    },
}

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    /// A hazard alert for an active risk event.
    Alert {
        /// The risk event being alerted on.
        event: RiskEvent,
        /// Distance from the subscriber to the hazard cell, in km.
        distance_km: f64,
    },
    /// The hazard previously alerted on has cleared.
    Retraction {
        /// The cleared risk event.
        event: RiskEvent,
    },
}

/// One outbound notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Who to notify.
    pub subscriber: SubscriberId,
    /// What to tell them.
    pub payload: NotificationPayload,
    /// Channel hint for the gateway.
    pub channel: AlertChannel,
}

/// External messaging gateway seam.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the gateway reports failure; the
    /// dispatcher applies its retry policy.
    async fn deliver(&self, notification: &Notification) -> Result<(), GatewayError>;
}

/// Default gateway: logs deliveries. Stands in until a real transport
/// is wired up by the deployment.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogGateway;

#[async_trait]
impl NotificationGateway for LogGateway {
    async fn deliver(&self, notification: &Notification) -> Result<(), GatewayError> {
        match &notification.payload {
            NotificationPayload::Alert { event, distance_km } => {
                log::info!(
                    "ALERT -> {} via {:?}: {} {} in cell {} ({distance_km:.1} km away)",
                    notification.subscriber,
                    notification.channel,
                    event.severity,
                    event.kind,
                    event.cell
                );
            }
            NotificationPayload::Retraction { event } => {
                log::info!(
                    "RETRACT -> {}: {} in cell {} cleared",
                    notification.subscriber,
                    event.kind,
                    event.cell
                );
            }
        }
        Ok(())
    }
}
