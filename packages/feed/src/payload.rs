//! Source-specific feed payload shapes and their unit normalization.
//!
//! Raw magnitudes arrive in source-native units (km/h, meters over danger
//! level, Richter, anomaly index). Normalization maps each onto [0, 1]
//! against a per-phenomenon cap so the scorer sees a common scale; the
//! calibration from that scale into score space stays pluggable in the
//! scorer.

use chrono::{DateTime, Utc};
use hazard_watch_models::{HazardKind, Location};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{FeedError, check_reading};

/// Sustained winds at or above this (km/h) read as a maximal cyclone signal.
const WIND_CAP_KMH: f64 = 250.0;
/// 24-hour rainfall at or above this (mm) reads as a maximal rainfall signal.
const RAINFALL_CAP_MM: f64 = 300.0;
/// Gauge height this far above danger level (m) reads as a maximal flood signal.
const GAUGE_OVERFLOW_CAP_M: f64 = 10.0;
/// Richter magnitude at or above this reads as a maximal seismic signal.
const RICHTER_CAP: f64 = 9.0;

/// The external source categories the engine accepts feeds from.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeedKind {
    /// Wind/pressure/rainfall stations and forecasts.
    Meteorological,
    /// River gauge networks.
    Hydrological,
    /// Seismograph networks.
    Seismic,
    /// Satellite anomaly detection.
    Satellite,
}

/// A raw record from one of the external feeds.
///
/// Tagged so ingress endpoints can deserialize the right shape per source
/// type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedPayload {
    /// Weather station / forecast reading.
    Meteorological(MeteorologicalReading),
    /// River gauge reading.
    Hydrological(HydrologicalReading),
    /// Seismograph reading.
    Seismic(SeismicReading),
    /// Satellite anomaly detection.
    Satellite(SatelliteReading),
}

/// Wind and rainfall from a weather source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeteorologicalReading {
    /// Where the reading applies.
    pub location: Location,
    /// Sustained wind speed in km/h.
    pub wind_speed_kmh: f64,
    /// Accumulated rainfall over the last 24h, in mm.
    pub rainfall_mm: f64,
    /// When the reading was taken.
    pub observed_at: DateTime<Utc>,
    /// Source confidence in [0, 1].
    pub confidence: f64,
}

/// River gauge height relative to the local danger level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrologicalReading {
    /// Gauge site location.
    pub location: Location,
    /// Current gauge height in meters.
    pub gauge_height_m: f64,
    /// Local danger level in meters.
    pub danger_level_m: f64,
    /// When the reading was taken.
    pub observed_at: DateTime<Utc>,
    /// Source confidence in [0, 1].
    pub confidence: f64,
}

/// Earthquake reading from a seismograph network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeismicReading {
    /// Epicenter location.
    pub location: Location,
    /// Richter magnitude.
    pub richter_magnitude: f64,
    /// Hypocenter depth in km.
    pub depth_km: f64,
    /// When the event was recorded.
    pub observed_at: DateTime<Utc>,
    /// Source confidence in [0, 1].
    pub confidence: f64,
}

/// Satellite-detected surface anomaly (inundation, slope failure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SatelliteReading {
    /// Center of the detected anomaly.
    pub location: Location,
    /// What the anomaly was classified as (flood or landslide).
    pub phenomenon: HazardKind,
    /// Detection strength, already in [0, 1].
    pub anomaly_index: f64,
    /// Acquisition time of the underlying imagery.
    pub observed_at: DateTime<Utc>,
    /// Classifier confidence in [0, 1].
    pub confidence: f64,
}

impl FeedPayload {
    /// Which feed category this payload belongs to.
    #[must_use]
    pub const fn feed_kind(&self) -> FeedKind {
        match self {
            Self::Meteorological(_) => FeedKind::Meteorological,
            Self::Hydrological(_) => FeedKind::Hydrological,
            Self::Seismic(_) => FeedKind::Seismic,
            Self::Satellite(_) => FeedKind::Satellite,
        }
    }

    /// The coordinate the reading applies to.
    #[must_use]
    pub const fn location(&self) -> Location {
        match self {
            Self::Meteorological(r) => r.location,
            Self::Hydrological(r) => r.location,
            Self::Seismic(r) => r.location,
            Self::Satellite(r) => r.location,
        }
    }

    /// When the reading was observed.
    #[must_use]
    pub const fn observed_at(&self) -> DateTime<Utc> {
        match self {
            Self::Meteorological(r) => r.observed_at,
            Self::Hydrological(r) => r.observed_at,
            Self::Seismic(r) => r.observed_at,
            Self::Satellite(r) => r.observed_at,
        }
    }

    /// Source confidence in [0, 1].
    #[must_use]
    pub const fn confidence(&self) -> f64 {
        match self {
            Self::Meteorological(r) => r.confidence,
            Self::Hydrological(r) => r.confidence,
            Self::Seismic(r) => r.confidence,
            Self::Satellite(r) => r.confidence,
        }
    }

    /// Maps the reading onto a hazard kind and a [0, 1] magnitude.
    ///
    /// A meteorological reading describes whichever of its two signals
    /// (wind, rainfall) is stronger after normalization.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::MalformedRecord`] when a reading value is
    /// non-finite, negative, or (for satellite detections) not a hazard
    /// kind a satellite can classify.
    pub fn normalize(&self) -> Result<(HazardKind, f64), FeedError> {
        match self {
            Self::Meteorological(r) => {
                let wind = check_reading("wind speed", r.wind_speed_kmh)? / WIND_CAP_KMH;
                let rain = check_reading("rainfall", r.rainfall_mm)? / RAINFALL_CAP_MM;
                if wind >= rain {
                    Ok((HazardKind::Cyclone, wind.min(1.0)))
                } else {
                    Ok((HazardKind::Rainfall, rain.min(1.0)))
                }
            }
            Self::Hydrological(r) => {
                let height = check_reading("gauge height", r.gauge_height_m)?;
                let danger = check_reading("danger level", r.danger_level_m)?;
                let overflow = ((height - danger) / GAUGE_OVERFLOW_CAP_M).clamp(0.0, 1.0);
                Ok((HazardKind::Flood, overflow))
            }
            Self::Seismic(r) => {
                let richter = check_reading("richter magnitude", r.richter_magnitude)?;
                check_reading("depth", r.depth_km)?;
                Ok((HazardKind::Seismic, (richter / RICHTER_CAP).min(1.0)))
            }
            Self::Satellite(r) => {
                let index = check_reading("anomaly index", r.anomaly_index)?;
                if !matches!(r.phenomenon, HazardKind::Flood | HazardKind::Landslide) {
                    return Err(FeedError::MalformedRecord {
                        message: format!(
                            "satellite detection cannot classify {} hazards",
                            r.phenomenon
                        ),
                    });
                }
                Ok((r.phenomenon, index.min(1.0)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meteorological_picks_dominant_signal() {
        let mut reading = MeteorologicalReading {
            location: Location::new(19.0, 72.8),
            wind_speed_kmh: 180.0,
            rainfall_mm: 40.0,
            observed_at: Utc::now(),
            confidence: 0.8,
        };
        let (kind, mag) = FeedPayload::Meteorological(reading.clone()).normalize().unwrap();
        assert_eq!(kind, HazardKind::Cyclone);
        assert!((mag - 180.0 / 250.0).abs() < 1e-9);

        reading.wind_speed_kmh = 20.0;
        reading.rainfall_mm = 280.0;
        let (kind, _) = FeedPayload::Meteorological(reading).normalize().unwrap();
        assert_eq!(kind, HazardKind::Rainfall);
    }

    #[test]
    fn hydrological_below_danger_is_zero() {
        let reading = HydrologicalReading {
            location: Location::new(25.3, 83.0),
            gauge_height_m: 4.0,
            danger_level_m: 6.0,
            observed_at: Utc::now(),
            confidence: 0.9,
        };
        let (kind, mag) = FeedPayload::Hydrological(reading).normalize().unwrap();
        assert_eq!(kind, HazardKind::Flood);
        assert!(mag.abs() < f64::EPSILON);
    }

    #[test]
    fn magnitudes_are_capped_at_one() {
        let reading = SeismicReading {
            location: Location::new(23.0, 70.2),
            richter_magnitude: 12.0,
            depth_km: 5.0,
            observed_at: Utc::now(),
            confidence: 1.0,
        };
        let (_, mag) = FeedPayload::Seismic(reading).normalize().unwrap();
        assert!((mag - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn satellite_rejects_nonsense_phenomenon() {
        let reading = SatelliteReading {
            location: Location::new(10.0, 76.3),
            phenomenon: HazardKind::Cyclone,
            anomaly_index: 0.7,
            observed_at: Utc::now(),
            confidence: 0.85,
        };
        assert!(FeedPayload::Satellite(reading).normalize().is_err());
    }

    #[test]
    fn payload_serde_tagging() {
        let json = serde_json::json!({
            "type": "seismic",
            "location": { "lat": 23.0, "lng": 70.2 },
            "richterMagnitude": 6.1,
            "depthKm": 14.0,
            "observedAt": "2026-08-01T04:30:00Z",
            "confidence": 0.92
        });
        let payload: FeedPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.feed_kind(), FeedKind::Seismic);
    }
}
