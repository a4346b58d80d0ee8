//! Alert records and the deduplication key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{RiskEventId, SubscriberId};

/// Delivery channel hint passed to the external messaging gateway.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertChannel {
    /// SMS text message.
    Sms,
    /// Mobile push notification.
    Push,
    /// Email.
    Email,
}

/// Delivery lifecycle of an alert.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    /// Key reserved; delivery in flight.
    Pending,
    /// Handed to the gateway successfully.
    Delivered,
    /// Retries exhausted; surfaced, never retried again.
    DeliveryFailed,
    /// Hazard cleared and a retraction notice was sent.
    Retracted,
}

/// The alert uniqueness key. Existence of a stored key is the
/// deduplication invariant: no two alerts share a key while the risk
/// event remains active.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertKey {
    /// The alerted subscriber.
    pub subscriber: SubscriberId,
    /// The risk event the alert describes.
    pub risk_event: RiskEventId,
}

/// A dispatched alert. Write-once; only `state` advances afterwards
/// (delivered → retracted, or → delivery-failed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// The uniqueness key.
    pub key: AlertKey,
    /// When dispatch succeeded (or was abandoned).
    pub dispatched_at: DateTime<Utc>,
    /// The channel the gateway was asked to use.
    pub channel: AlertChannel,
    /// Current delivery state.
    pub state: DeliveryState,
}
