//! Durable alert store: the deduplication key set.
//!
//! Existence of a key is the idempotency invariant, so `try_insert` is a
//! single atomic test-and-insert under one lock, and every mutation is
//! appended to a JSON-lines log before it becomes visible. Replaying the
//! log at startup restores the key set so a restart never re-dispatches
//! an already-sent alert.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use hazard_watch_models::{Alert, AlertChannel, AlertKey, DeliveryState, RiskEventId};

/// Errors raised by the alert store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The durable log could not be read or written.
    #[error("alert log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A log line could not be parsed during replay.
    #[error("corrupt alert log entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

struct Inner {
    alerts: HashMap<AlertKey, Alert>,
    log: Option<File>,
}

/// The alert key set, optionally backed by an append-only log.
pub struct AlertStore {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
}

impl AlertStore {
    /// Creates an in-memory store (no durability). Used in tests and when
    /// the engine runs without a data directory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner { alerts: HashMap::new(), log: None }),
            path: None,
        }
    }

    /// Opens a store backed by the JSON-lines log at `path`, replaying
    /// any existing entries (last write per key wins).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the log cannot be opened or an existing
    /// entry fails to parse.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut alerts = HashMap::new();

        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let alert: Alert = serde_json::from_str(&line)?;
                alerts.insert(alert.key.clone(), alert);
            }
            log::info!("Replayed {} alert keys from {}", alerts.len(), path.display());
        }

        let log = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Mutex::new(Inner { alerts, log: Some(log) }),
            path: Some(path.to_path_buf()),
        })
    }

    /// Path of the durable log, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn append(inner: &mut Inner, alert: &Alert) -> Result<(), StoreError> {
        if let Some(log) = inner.log.as_mut() {
            let mut line = serde_json::to_string(alert)?;
            line.push('\n');
            log.write_all(line.as_bytes())?;
            log.flush()?;
        }
        Ok(())
    }

    /// Atomic test-and-insert of the uniqueness key.
    ///
    /// Returns the reserved [`Alert`] (state `Pending`) when the key was
    /// free, or `None` when an alert for this (subscriber, risk event)
    /// already exists. The append to the durable log happens before the
    /// key becomes visible, so a crash cannot lose a reservation that a
    /// notification was sent for.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the durable append fails; the key is
    /// not inserted in that case.
    ///
    /// # Panics
    ///
    /// Panics if the store mutex is poisoned.
    pub fn try_insert(
        &self,
        key: AlertKey,
        channel: AlertChannel,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        let mut inner = self.inner.lock().expect("alert store mutex poisoned");
        if inner.alerts.contains_key(&key) {
            return Ok(None);
        }
        let alert = Alert {
            key: key.clone(),
            dispatched_at: now,
            channel,
            state: DeliveryState::Pending,
        };
        Self::append(&mut inner, &alert)?;
        inner.alerts.insert(key, alert.clone());
        Ok(Some(alert))
    }

    /// Advances the delivery state of an existing alert. Returns the
    /// updated record, or `None` if the key is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the durable append fails.
    ///
    /// # Panics
    ///
    /// Panics if the store mutex is poisoned.
    pub fn mark(&self, key: &AlertKey, state: DeliveryState) -> Result<Option<Alert>, StoreError> {
        let mut inner = self.inner.lock().expect("alert store mutex poisoned");
        let Some(mut alert) = inner.alerts.get(key).cloned() else {
            return Ok(None);
        };
        if alert.state == state {
            return Ok(Some(alert));
        }
        alert.state = state;
        Self::append(&mut inner, &alert)?;
        inner.alerts.insert(key.clone(), alert.clone());
        Ok(Some(alert))
    }

    /// The stored alert for a key, if any.
    ///
    /// # Panics
    ///
    /// Panics if the store mutex is poisoned.
    #[must_use]
    pub fn get(&self, key: &AlertKey) -> Option<Alert> {
        let inner = self.inner.lock().expect("alert store mutex poisoned");
        inner.alerts.get(key).cloned()
    }

    /// Alerts for a risk event that are still open (pending or
    /// delivered) — the retraction targets.
    ///
    /// # Panics
    ///
    /// Panics if the store mutex is poisoned.
    #[must_use]
    pub fn open_alerts_for_event(&self, event: RiskEventId) -> Vec<Alert> {
        let inner = self.inner.lock().expect("alert store mutex poisoned");
        inner
            .alerts
            .values()
            .filter(|a| {
                a.key.risk_event == event
                    && matches!(a.state, DeliveryState::Pending | DeliveryState::Delivered)
            })
            .cloned()
            .collect()
    }

    /// Total number of stored keys.
    ///
    /// # Panics
    ///
    /// Panics if the store mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("alert store mutex poisoned").alerts.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazard_watch_models::SubscriberId;

    fn key(subscriber: &str, event: RiskEventId) -> AlertKey {
        AlertKey {
            subscriber: SubscriberId::new(subscriber),
            risk_event: event,
        }
    }

    #[test]
    fn second_insert_of_same_key_is_rejected() {
        let store = AlertStore::in_memory();
        let event = RiskEventId::random();
        let k = key("s1", event);

        assert!(store.try_insert(k.clone(), AlertChannel::Push, Utc::now()).unwrap().is_some());
        assert!(store.try_insert(k, AlertChannel::Push, Utc::now()).unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn mark_advances_state() {
        let store = AlertStore::in_memory();
        let event = RiskEventId::random();
        let k = key("s1", event);
        store.try_insert(k.clone(), AlertChannel::Sms, Utc::now()).unwrap();

        let updated = store.mark(&k, DeliveryState::Delivered).unwrap().unwrap();
        assert_eq!(updated.state, DeliveryState::Delivered);
        assert!(store.mark(&key("ghost", event), DeliveryState::Delivered).unwrap().is_none());
    }

    #[test]
    fn open_alerts_exclude_retracted_and_failed() {
        let store = AlertStore::in_memory();
        let event = RiskEventId::random();
        for (subscriber, state) in [
            ("delivered", DeliveryState::Delivered),
            ("retracted", DeliveryState::Retracted),
            ("failed", DeliveryState::DeliveryFailed),
        ] {
            let k = key(subscriber, event);
            store.try_insert(k.clone(), AlertChannel::Push, Utc::now()).unwrap();
            store.mark(&k, state).unwrap();
        }

        let open = store.open_alerts_for_event(event);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].key.subscriber, SubscriberId::new("delivered"));
    }

    #[test]
    fn replay_restores_keys_across_restart() {
        let dir = std::env::temp_dir().join(format!("alert-log-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("alerts.jsonl");

        let event = RiskEventId::random();
        let k = key("s1", event);
        {
            let store = AlertStore::open(&path).unwrap();
            store.try_insert(k.clone(), AlertChannel::Push, Utc::now()).unwrap();
            store.mark(&k, DeliveryState::Delivered).unwrap();
        }

        let reopened = AlertStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        // The key survives, so the restarted engine will not re-dispatch.
        assert!(reopened.try_insert(k.clone(), AlertChannel::Push, Utc::now()).unwrap().is_none());
        assert_eq!(reopened.get(&k).unwrap().state, DeliveryState::Delivered);

        std::fs::remove_dir_all(&dir).ok();
    }
}
