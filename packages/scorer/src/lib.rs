#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Risk scoring: exponentially decaying accumulators per (cell, hazard).
//!
//! Every observation adds `weight(kind) * normalize(magnitude)` on top of
//! the decayed previous score. Decay is computed from observation
//! timestamps, not arrival time, and late contributions from other
//! sources are discounted forward to the accumulator's reference time —
//! which makes cross-source application commutative while same-source
//! ordering is enforced through sequence numbers.
//!
//! Severity thresholds, decay half-lives, and per-kind weights are
//! configuration; the calibration from magnitude to contribution is a
//! [`ScoringStrategy`] injected at construction.

mod config;

pub use config::{ScorerConfig, SeverityThresholds};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use hazard_watch_index::RiskCellMap;
use hazard_watch_models::{
    GeoCell, HazardKind, HazardObservation, RiskEvent, RiskEventId, Severity, SourceId,
};

/// Errors raised while applying an observation.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    /// A same-source observation arrived with a sequence number at or
    /// below one already applied.
    #[error("stale write from {source_id}: sequence {sequence} already applied (last {last_applied})")]
    StaleWrite {
        /// The offending source.
        source_id: SourceId,
        /// The rejected sequence number.
        sequence: u64,
        /// The highest sequence already applied for that source.
        last_applied: u64,
    },
}

/// Calibration from a normalized feed magnitude into score contribution.
///
/// One strategy per hazard kind, injected at construction — never
/// branched inline.
pub trait ScoringStrategy: Send + Sync {
    /// Additive weight applied to every contribution of this kind.
    fn weight(&self) -> f64;

    /// Maps a [0, 1] magnitude and source confidence into contribution
    /// space.
    fn normalize(&self, magnitude: f64, confidence: f64) -> f64;
}

/// Default calibration: contribution = `weight * magnitude * confidence`.
#[derive(Debug, Clone, Copy)]
pub struct LinearStrategy {
    weight: f64,
}

impl LinearStrategy {
    /// Creates a linear strategy with the given weight.
    #[must_use]
    pub const fn new(weight: f64) -> Self {
        Self { weight }
    }
}

impl ScoringStrategy for LinearStrategy {
    fn weight(&self) -> f64 {
        self.weight
    }

    fn normalize(&self, magnitude: f64, confidence: f64) -> f64 {
        magnitude.clamp(0.0, 1.0) * confidence.clamp(0.0, 1.0)
    }
}

/// A state change worth telling downstream consumers about.
#[derive(Debug, Clone)]
pub enum RiskDelta {
    /// A new risk event became active.
    Raised(RiskEvent),
    /// An active event crossed a severity boundary.
    Changed {
        /// The event in its new state.
        event: RiskEvent,
        /// The severity band before this update.
        previous: Severity,
    },
    /// An event decayed below the floor (or expired) and was removed.
    Cleared(RiskEvent),
}

impl RiskDelta {
    /// The event this delta describes.
    #[must_use]
    pub const fn event(&self) -> &RiskEvent {
        match self {
            Self::Raised(event) | Self::Cleared(event) => event,
            Self::Changed { event, .. } => event,
        }
    }
}

/// Per-(cell, kind) accumulator state.
struct CellState {
    event_id: RiskEventId,
    first_seen: DateTime<Utc>,
    /// Score referenced at `reference_at`.
    score: f64,
    /// The observation time the score is currently referenced at.
    reference_at: DateTime<Utc>,
    severity: Severity,
    /// When the decayed score first dropped below the floor, if it has.
    below_floor_since: Option<DateTime<Utc>>,
}

/// The risk scorer. Owns the accumulators and the published risk map
/// state, enforcing at most one active event per (cell, kind).
pub struct RiskScorer {
    config: ScorerConfig,
    strategies: BTreeMap<HazardKind, Arc<dyn ScoringStrategy>>,
    risk_map: Arc<RiskCellMap>,
    state: Mutex<HashMap<(GeoCell, HazardKind), CellState>>,
    /// Highest applied sequence number per source.
    source_seq: Mutex<HashMap<SourceId, u64>>,
}

impl RiskScorer {
    /// Creates a scorer publishing into `risk_map`, with [`LinearStrategy`]
    /// calibration built from the configured per-kind weights.
    #[must_use]
    pub fn new(config: ScorerConfig, risk_map: Arc<RiskCellMap>) -> Self {
        let strategies = HazardKind::all()
            .iter()
            .map(|kind| {
                let weight = config.weight(*kind);
                (
                    *kind,
                    Arc::new(LinearStrategy::new(weight)) as Arc<dyn ScoringStrategy>,
                )
            })
            .collect();
        Self {
            config,
            strategies,
            risk_map,
            state: Mutex::new(HashMap::new()),
            source_seq: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the calibration strategy for one hazard kind.
    #[must_use]
    pub fn with_strategy(mut self, kind: HazardKind, strategy: Arc<dyn ScoringStrategy>) -> Self {
        self.strategies.insert(kind, strategy);
        self
    }

    fn decay_factor(&self, kind: HazardKind, dt: Duration) -> f64 {
        let half_life = self.config.half_life_secs(kind);
        if half_life == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let dt_secs = dt.num_milliseconds() as f64 / 1000.0;
        if dt_secs <= 0.0 {
            return 1.0;
        }
        0.5_f64.powf(dt_secs / half_life as f64)
    }

    /// Applies one observation, publishing the updated event and
    /// returning a delta when the event was raised or crossed a severity
    /// boundary.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreError::StaleWrite`] when a same-source observation
    /// arrives out of sequence order; the accumulator is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if an internal mutex is poisoned.
    pub fn apply(&self, observation: &HazardObservation) -> Result<Option<RiskDelta>, ScoreError> {
        {
            let mut seqs = self.source_seq.lock().expect("source sequence mutex poisoned");
            let last = seqs.entry(observation.source.clone()).or_insert(0);
            if observation.sequence <= *last {
                return Err(ScoreError::StaleWrite {
                    source_id: observation.source.clone(),
                    sequence: observation.sequence,
                    last_applied: *last,
                });
            }
            *last = observation.sequence;
        }

        let strategy = self
            .strategies
            .get(&observation.kind)
            .expect("strategy registered for every hazard kind");
        let contribution =
            strategy.weight() * strategy.normalize(observation.magnitude, observation.confidence);

        let key = (observation.cell, observation.kind);
        let mut state = self.state.lock().expect("scorer state mutex poisoned");

        let delta = match state.get_mut(&key) {
            None => {
                let severity = self.config.thresholds.classify(contribution);
                let cell_state = CellState {
                    event_id: RiskEventId::random(),
                    first_seen: observation.observed_at,
                    score: contribution,
                    reference_at: observation.observed_at,
                    severity,
                    below_floor_since: None,
                };
                let event = self.to_event(&cell_state, key);
                state.insert(key, cell_state);
                self.risk_map.publish(event.clone());
                log::debug!(
                    "Raised {} risk in {} at {severity} (score {:.3})",
                    observation.kind,
                    observation.cell,
                    event.score
                );
                Some(RiskDelta::Raised(event))
            }
            Some(cell_state) => {
                if observation.observed_at >= cell_state.reference_at {
                    let dt = observation.observed_at - cell_state.reference_at;
                    cell_state.score =
                        (cell_state.score * self.decay_factor(observation.kind, dt)).max(0.0)
                            + contribution;
                    cell_state.reference_at = observation.observed_at;
                } else {
                    // Late arrival from another source: discount its
                    // contribution forward to the reference time so
                    // cross-source application order cannot matter.
                    let dt = cell_state.reference_at - observation.observed_at;
                    cell_state.score += contribution * self.decay_factor(observation.kind, dt);
                }
                if cell_state.score >= self.config.floor {
                    cell_state.below_floor_since = None;
                }

                let previous = cell_state.severity;
                cell_state.severity = self.config.thresholds.classify(cell_state.score);
                let event = self.to_event(cell_state, key);
                self.risk_map.publish(event.clone());

                if cell_state.severity == previous {
                    None
                } else {
                    log::debug!(
                        "{} risk in {} moved {previous} -> {} (score {:.3})",
                        observation.kind,
                        observation.cell,
                        cell_state.severity,
                        cell_state.score
                    );
                    Some(RiskDelta::Changed { event, previous })
                }
            }
        };

        Ok(delta)
    }

    fn to_event(&self, state: &CellState, (cell, kind): (GeoCell, HazardKind)) -> RiskEvent {
        RiskEvent {
            id: state.event_id,
            cell,
            kind,
            severity: state.severity,
            score: state.score,
            first_seen: state.first_seen,
            last_updated: state.reference_at,
            expires_at: state.reference_at + self.config.expiry_ttl(),
        }
    }

    /// Expires events whose decayed score stayed below the floor past the
    /// grace period, or whose expiry elapsed. Returns one `Cleared` delta
    /// per removed event ("hazard cleared", drives alert retraction).
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<RiskDelta> {
        let mut state = self.state.lock().expect("scorer state mutex poisoned");
        let mut cleared = Vec::new();

        state.retain(|key, cell_state| {
            let decayed =
                cell_state.score * self.decay_factor(key.1, now - cell_state.reference_at);

            let expired = now > cell_state.reference_at + self.config.expiry_ttl();
            let below_floor = decayed < self.config.floor;

            if below_floor {
                let since = *cell_state.below_floor_since.get_or_insert(now);
                if !expired && now - since <= self.config.grace() {
                    return true;
                }
            } else {
                cell_state.below_floor_since = None;
                if !expired {
                    return true;
                }
            }

            if let Some(event) = self.risk_map.clear(key.0, key.1) {
                log::info!("Hazard cleared: {} in {}", event.kind, event.cell);
                cleared.push(RiskDelta::Cleared(event));
            }
            false
        });

        cleared
    }

    /// Number of live accumulators (active risk events).
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state.lock().expect("scorer state mutex poisoned").len()
    }
}
