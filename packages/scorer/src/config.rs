//! Scorer configuration: thresholds, decay half-lives, weights.
//!
//! The exact calibration is deliberately not fixed by the engine — every
//! value here can be overridden from the TOML config file.

use std::collections::BTreeMap;

use chrono::Duration;
use hazard_watch_models::{HazardKind, Severity};
use serde::{Deserialize, Serialize};

/// Score thresholds separating the severity bands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeverityThresholds {
    /// Score at or above this is at least `medium`.
    pub medium: f64,
    /// Score at or above this is `high`.
    pub high: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self { medium: 0.4, high: 0.8 }
    }
}

impl SeverityThresholds {
    /// Classifies a continuous score into a severity band.
    #[must_use]
    pub fn classify(&self, score: f64) -> Severity {
        if score >= self.high {
            Severity::High
        } else if score >= self.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Full scorer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScorerConfig {
    /// Severity band thresholds.
    pub thresholds: SeverityThresholds,
    /// Scores below this are considered inactive.
    pub floor: f64,
    /// How long a score must stay below the floor before the event is
    /// removed, in seconds.
    pub grace_secs: u64,
    /// Absent further observations, an event expires this long after its
    /// last update, in seconds.
    pub expiry_ttl_secs: u64,
    /// Decay half-life per hazard kind, in seconds. Kinds not listed use
    /// `default_half_life_secs`.
    pub half_lives_secs: BTreeMap<HazardKind, u64>,
    /// Fallback half-life, in seconds.
    pub default_half_life_secs: u64,
    /// Additive weight per hazard kind. Kinds not listed use 1.0.
    pub weights: BTreeMap<HazardKind, f64>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        let mut half_lives_secs = BTreeMap::new();
        // Seismic risk is acute and short-lived; flooding lingers.
        half_lives_secs.insert(HazardKind::Seismic, 1800);
        half_lives_secs.insert(HazardKind::Cyclone, 10_800);
        half_lives_secs.insert(HazardKind::Rainfall, 7200);
        half_lives_secs.insert(HazardKind::Landslide, 10_800);
        half_lives_secs.insert(HazardKind::Flood, 21_600);

        let mut weights = BTreeMap::new();
        weights.insert(HazardKind::Seismic, 1.2);

        Self {
            thresholds: SeverityThresholds::default(),
            floor: 0.05,
            grace_secs: 300,
            expiry_ttl_secs: 3600,
            half_lives_secs,
            default_half_life_secs: 7200,
            weights,
        }
    }
}

impl ScorerConfig {
    /// Half-life for a hazard kind, in seconds.
    #[must_use]
    pub fn half_life_secs(&self, kind: HazardKind) -> u64 {
        self.half_lives_secs
            .get(&kind)
            .copied()
            .unwrap_or(self.default_half_life_secs)
    }

    /// Additive weight for a hazard kind.
    #[must_use]
    pub fn weight(&self, kind: HazardKind) -> f64 {
        self.weights.get(&kind).copied().unwrap_or(1.0)
    }

    /// Grace period as a [`Duration`].
    ///
    /// # Panics
    ///
    /// Panics if the configured value overflows a `Duration` (bounded by
    /// config validation in practice).
    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::seconds(i64::try_from(self.grace_secs).expect("grace period out of range"))
    }

    /// Expiry TTL as a [`Duration`].
    ///
    /// # Panics
    ///
    /// Panics if the configured value overflows a `Duration`.
    #[must_use]
    pub fn expiry_ttl(&self) -> Duration {
        Duration::seconds(i64::try_from(self.expiry_ttl_secs).expect("expiry TTL out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_classify_bands() {
        let thresholds = SeverityThresholds::default();
        assert_eq!(thresholds.classify(0.1), Severity::Low);
        assert_eq!(thresholds.classify(0.4), Severity::Medium);
        assert_eq!(thresholds.classify(0.79), Severity::Medium);
        assert_eq!(thresholds.classify(0.8), Severity::High);
    }

    #[test]
    fn unlisted_kinds_fall_back() {
        let config = ScorerConfig {
            half_lives_secs: BTreeMap::new(),
            weights: BTreeMap::new(),
            ..ScorerConfig::default()
        };
        assert_eq!(config.half_life_secs(HazardKind::Flood), config.default_half_life_secs);
        assert!((config.weight(HazardKind::Seismic) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn config_parses_from_toml() {
        let parsed: ScorerConfig = toml::from_str(
            r#"
            floor = 0.1
            graceSecs = 600

            [thresholds]
            medium = 0.3
            high = 0.7

            [halfLivesSecs]
            FLOOD = 3600
            "#,
        )
        .unwrap();
        assert!((parsed.floor - 0.1).abs() < f64::EPSILON);
        assert_eq!(parsed.grace_secs, 600);
        assert!((parsed.thresholds.high - 0.7).abs() < f64::EPSILON);
        assert_eq!(parsed.half_life_secs(HazardKind::Flood), 3600);
        // Unspecified fields keep their defaults.
        assert_eq!(parsed.expiry_ttl_secs, 3600);
    }
}
