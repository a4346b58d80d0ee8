//! Engine configuration, loaded from TOML with full defaults.

use std::path::{Path, PathBuf};

use hazard_watch_capacity::CapacityThresholds;
use hazard_watch_models::AlertChannel;
use hazard_watch_route::RouteConfig;
use hazard_watch_scorer::ScorerConfig;
use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config file could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value was out of its accepted range.
    #[error("invalid config: {message}")]
    Invalid {
        /// What was out of range.
        message: String,
    },
}

/// What a full stage queue does with new items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Wait for space up to the timeout, then drop and log.
    #[serde(rename_all = "camelCase")]
    Block {
        /// Longest a producer will wait, in milliseconds.
        timeout_ms: u64,
    },
    /// Drop the incoming item immediately when the queue is full.
    DropNewest,
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        Self::Block { timeout_ms: 1000 }
    }
}

/// Bounded stage queue settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueSettings {
    /// Queue depth between pipeline stages.
    pub capacity: usize,
    /// What to do when the queue is full.
    pub backpressure: BackpressurePolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: 256,
            backpressure: BackpressurePolicy::default(),
        }
    }
}

/// Capacity tracker settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapacitySettings {
    /// Ratio thresholds for limited/full transitions.
    pub thresholds: CapacityThresholds,
    /// Reports older than this mark facilities stale, in seconds.
    pub freshness_bound_secs: i64,
    /// Facility search radius, in km.
    pub search_radius_km: f64,
}

impl Default for CapacitySettings {
    fn default() -> Self {
        Self {
            thresholds: CapacityThresholds::default(),
            freshness_bound_secs: 2 * 3600,
            search_radius_km: 50.0,
        }
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Alert relevance band around a risk cell, in km. Accepted range
    /// is 5-50.
    pub distance_band_km: f64,
    /// Channel hint passed to the notification gateway.
    pub channel: AlertChannel,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            distance_band_km: 25.0,
            channel: AlertChannel::Push,
        }
    }
}

/// One corridor waypoint in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointSpec {
    /// Waypoint id, referenced by links.
    pub id: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

/// Corridor network in configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorridorSpec {
    /// Waypoints of the network.
    pub waypoints: Vec<WaypointSpec>,
    /// Bidirectional links between waypoint ids.
    pub links: Vec<(String, String)>,
}

/// Route advisor settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteSettings {
    /// Cost-inflation parameters.
    pub planner: RouteConfig,
    /// The corridor network.
    pub corridor: CorridorSpec,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// H3 resolution observations and risk cells are indexed at (0-15).
    pub resolution: u8,
    /// Feed records older than this are rejected, in seconds.
    pub staleness_bound_secs: i64,
    /// Scoring calibration.
    pub scorer: ScorerConfig,
    /// Capacity tracker settings.
    pub capacity: CapacitySettings,
    /// Dispatcher settings.
    pub dispatch: DispatchSettings,
    /// Stage queue settings.
    pub queue: QueueSettings,
    /// Route advisor settings.
    pub route: RouteSettings,
    /// How often the expiry sweep runs, in seconds.
    pub sweep_interval_secs: u64,
    /// A subscriber projection older than this degrades the dispatcher,
    /// in seconds.
    pub projection_staleness_secs: i64,
    /// Durable alert key log. In-memory when unset.
    pub alert_log: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolution: 8,
            staleness_bound_secs: 6 * 3600,
            scorer: ScorerConfig::default(),
            capacity: CapacitySettings::default(),
            dispatch: DispatchSettings::default(),
            queue: QueueSettings::default(),
            route: RouteSettings::default(),
            sweep_interval_secs: 60,
            projection_staleness_secs: 900,
            alert_log: None,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on parse failure or out-of-range values.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// The configured cell resolution.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the value is not a valid H3
    /// resolution.
    pub fn cell_resolution(&self) -> Result<h3o::Resolution, ConfigError> {
        h3o::Resolution::try_from(self.resolution).map_err(|_| ConfigError::Invalid {
            message: format!("resolution {} is not a valid H3 resolution", self.resolution),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.cell_resolution()?;
        if !(5.0..=50.0).contains(&self.dispatch.distance_band_km) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "distanceBandKm {} outside accepted range 5-50",
                    self.dispatch.distance_band_km
                ),
            });
        }
        if self.queue.capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "queue capacity must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config.resolution, 8);
        assert_eq!(config.queue.capacity, 256);
        assert!(matches!(
            config.queue.backpressure,
            BackpressurePolicy::Block { timeout_ms: 1000 }
        ));
    }

    #[test]
    fn overrides_parse() {
        let config = EngineConfig::from_toml(
            r#"
            resolution = 7
            sweepIntervalSecs = 30

            [queue]
            capacity = 16

            [queue.backpressure]
            policy = "drop_newest"

            [dispatch]
            distanceBandKm = 10.0
            channel = "SMS"

            [[route.corridor.waypoints]]
            id = "a"
            lat = 19.0
            lng = 72.8
            "#,
        )
        .unwrap();
        assert_eq!(config.resolution, 7);
        assert_eq!(config.queue.capacity, 16);
        assert_eq!(config.queue.backpressure, BackpressurePolicy::DropNewest);
        assert!((config.dispatch.distance_band_km - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.route.corridor.waypoints.len(), 1);
    }

    #[test]
    fn out_of_range_band_rejected() {
        let err = EngineConfig::from_toml("[dispatch]\ndistanceBandKm = 100.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
