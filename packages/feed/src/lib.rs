#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Feed adapters: normalize heterogeneous hazard sources into
//! [`HazardObservation`]s.
//!
//! Each external source type (meteorological, hydrological, seismic,
//! satellite) has its own payload shape. The adapter performs unit and
//! coordinate normalization, tags a per-source monotone sequence number,
//! and rejects records older than the configured staleness bound. Rejects
//! are logged and dropped, never fatal — one malformed record must not
//! halt the feed.

mod payload;

pub use payload::{
    FeedKind, FeedPayload, HydrologicalReading, MeteorologicalReading, SatelliteReading,
    SeismicReading,
};

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use h3o::Resolution;
use hazard_watch_models::{GeoCell, HazardObservation, InvalidLocation, SourceId};

/// Errors raised while ingesting a raw feed record.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The record could not be normalized.
    #[error("malformed record: {message}")]
    MalformedRecord {
        /// Description of what was wrong with the record.
        message: String,
    },

    /// The record's timestamp is older than the staleness bound.
    #[error("stale record: observed at {observed_at}, bound is {bound_secs}s")]
    StaleRecord {
        /// The rejected observation timestamp.
        observed_at: DateTime<Utc>,
        /// The configured staleness bound in seconds.
        bound_secs: i64,
    },

    /// The record's coordinates are outside the valid range.
    #[error(transparent)]
    InvalidLocation(#[from] InvalidLocation),
}

/// Configuration for a [`FeedAdapter`].
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// H3 resolution observations are indexed at.
    pub resolution: Resolution,
    /// Records observed longer ago than this are rejected.
    pub staleness_bound: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Eight,
            staleness_bound: Duration::hours(6),
        }
    }
}

/// Normalizes raw feed payloads into [`HazardObservation`]s.
///
/// Thread-safe: sequence counters are kept per source behind a mutex, so
/// multiple ingress handlers can share one adapter.
pub struct FeedAdapter {
    config: FeedConfig,
    sequences: Mutex<BTreeMap<SourceId, u64>>,
}

impl FeedAdapter {
    /// Creates an adapter with the given configuration.
    #[must_use]
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            sequences: Mutex::new(BTreeMap::new()),
        }
    }

    /// Normalizes one raw record from `source`.
    ///
    /// Performs unit normalization (magnitudes scale into [0, 1] against
    /// per-phenomenon caps), maps coordinates onto the configured cell
    /// resolution, and assigns the next per-source sequence number. The
    /// caller owns emitting the result onto the pipeline's event stream.
    ///
    /// # Errors
    ///
    /// * [`FeedError::MalformedRecord`] if magnitudes or confidence are
    ///   out of range or non-finite.
    /// * [`FeedError::StaleRecord`] if the record's timestamp is older
    ///   than the staleness bound.
    /// * [`FeedError::InvalidLocation`] if the coordinates are invalid.
    ///
    /// # Panics
    ///
    /// Panics if the internal sequence mutex is poisoned.
    pub fn ingest(
        &self,
        payload: &FeedPayload,
        source: &SourceId,
    ) -> Result<HazardObservation, FeedError> {
        let (kind, magnitude) = payload.normalize()?;
        let location = payload.location();
        let observed_at = payload.observed_at();
        let confidence = payload.confidence();

        if !(0.0..=1.0).contains(&confidence) || !confidence.is_finite() {
            return Err(FeedError::MalformedRecord {
                message: format!("confidence {confidence} outside [0, 1]"),
            });
        }

        let age = Utc::now() - observed_at;
        if age > self.config.staleness_bound {
            return Err(FeedError::StaleRecord {
                observed_at,
                bound_secs: self.config.staleness_bound.num_seconds(),
            });
        }

        let cell = GeoCell::containing(location, self.config.resolution)?;

        let sequence = {
            let mut sequences = self.sequences.lock().expect("feed sequence mutex poisoned");
            let next = sequences.entry(source.clone()).or_insert(0);
            *next += 1;
            *next
        };

        Ok(HazardObservation {
            source: source.clone(),
            sequence,
            kind,
            cell,
            magnitude,
            observed_at,
            confidence,
        })
    }

    /// Ingests a record, logging and swallowing per-record failures.
    /// Returns `None` when the record was dropped.
    pub fn ingest_lossy(
        &self,
        payload: &FeedPayload,
        source: &SourceId,
    ) -> Option<HazardObservation> {
        match self.ingest(payload, source) {
            Ok(observation) => Some(observation),
            Err(e) => {
                log::warn!("Dropping record from {source}: {e}");
                None
            }
        }
    }
}

/// Validates that a raw reading value is finite and non-negative.
pub(crate) fn check_reading(name: &str, value: f64) -> Result<f64, FeedError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(FeedError::MalformedRecord {
            message: format!("{name} reading {value} is not a finite non-negative number"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazard_watch_models::{HazardKind, Location};

    fn adapter() -> FeedAdapter {
        FeedAdapter::new(FeedConfig::default())
    }

    fn seismic(observed_at: DateTime<Utc>) -> FeedPayload {
        FeedPayload::Seismic(SeismicReading {
            location: Location::new(23.0, 70.2),
            richter_magnitude: 6.3,
            depth_km: 12.0,
            observed_at,
            confidence: 0.95,
        })
    }

    #[test]
    fn seismic_reading_normalizes() {
        let adapter = adapter();
        let source = SourceId::new("ncs-bhuj");
        let obs = adapter.ingest(&seismic(Utc::now()), &source).unwrap();

        assert_eq!(obs.kind, HazardKind::Seismic);
        assert_eq!(obs.sequence, 1);
        assert!((0.0..=1.0).contains(&obs.magnitude));
    }

    #[test]
    fn sequence_is_monotone_per_source() {
        let adapter = adapter();
        let a = SourceId::new("a");
        let b = SourceId::new("b");

        let s1 = adapter.ingest(&seismic(Utc::now()), &a).unwrap().sequence;
        let s2 = adapter.ingest(&seismic(Utc::now()), &a).unwrap().sequence;
        let s3 = adapter.ingest(&seismic(Utc::now()), &b).unwrap().sequence;

        assert_eq!((s1, s2), (1, 2));
        // Independent counter per source.
        assert_eq!(s3, 1);
    }

    #[test]
    fn stale_record_rejected() {
        let adapter = adapter();
        let source = SourceId::new("ncs");
        let old = Utc::now() - Duration::hours(12);
        let err = adapter.ingest(&seismic(old), &source).unwrap_err();
        assert!(matches!(err, FeedError::StaleRecord { .. }));
    }

    #[test]
    fn malformed_coordinates_rejected() {
        let adapter = adapter();
        let payload = FeedPayload::Seismic(SeismicReading {
            location: Location::new(200.0, 70.2),
            richter_magnitude: 5.0,
            depth_km: 10.0,
            observed_at: Utc::now(),
            confidence: 0.9,
        });
        let err = adapter.ingest(&payload, &SourceId::new("ncs")).unwrap_err();
        assert!(matches!(err, FeedError::InvalidLocation(_)));
    }

    #[test]
    fn non_finite_magnitude_rejected() {
        let adapter = adapter();
        let payload = FeedPayload::Seismic(SeismicReading {
            location: Location::new(23.0, 70.2),
            richter_magnitude: f64::NAN,
            depth_km: 10.0,
            observed_at: Utc::now(),
            confidence: 0.9,
        });
        let err = adapter.ingest(&payload, &SourceId::new("ncs")).unwrap_err();
        assert!(matches!(err, FeedError::MalformedRecord { .. }));
    }

    #[test]
    fn lossy_ingest_drops_without_error() {
        let adapter = adapter();
        let old = Utc::now() - Duration::days(2);
        assert!(adapter.ingest_lossy(&seismic(old), &SourceId::new("ncs")).is_none());
        assert!(adapter
            .ingest_lossy(&seismic(Utc::now()), &SourceId::new("ncs"))
            .is_some());
    }
}
