//! Per-target materialization state machine.
//!
//! One tracker per (session, target) pair, re-evaluated on every accepted
//! fix. Transitions fire only when the computed state differs from the
//! stored one, so re-delivering the same fix never re-fires an event.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::CollectError;
use crate::events::{ProximityEvent, ProximityEventKind};
use crate::geomath;
use crate::types::{LocationFix, Target};

/// Lifecycle of a coin relative to one player.
///
/// `Dormant → Approaching → Materialized → Collectible → Collected`, with
/// the hide edges (`Materialized/Collectible → Approaching`) reversible and
/// `Collected` terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityState {
    Dormant,
    Approaching,
    Materialized,
    Collectible,
    Collected,
}

pub struct TargetTracker {
    target: Target,
    state: ProximityState,
    /// Corrected hide radius; always > materialization radius.
    hide_radius_m: f64,
}

impl TargetTracker {
    pub fn new(target: Target, cfg: &EngineConfig) -> Self {
        let hide_radius_m = target.effective_hide_radius(cfg.hide_margin_m);
        if hide_radius_m != target.hide_radius_m {
            log::warn!(
                "[proximity] target {} hide radius {:.1} m <= materialization {:.1} m, corrected to {:.1} m",
                target.id,
                target.hide_radius_m,
                target.materialization_radius_m,
                hide_radius_m
            );
        }
        Self {
            target,
            state: ProximityState::Dormant,
            hide_radius_m,
        }
    }

    pub fn state(&self) -> ProximityState {
        self.state
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// External trigger: the target became the active hunt goal.
    pub fn activate(&mut self) {
        if self.state == ProximityState::Dormant {
            self.state = ProximityState::Approaching;
        }
    }

    /// Distance from a fix to this target.
    pub fn distance_from(&self, fix: &LocationFix) -> f64 {
        geomath::distance_meters(
            fix.latitude,
            fix.longitude,
            self.target.latitude,
            self.target.longitude,
        )
    }

    /// Re-evaluates the state machine against a fix.
    ///
    /// A single fix can step through two states (e.g. a player who was far
    /// away reconnects standing on the coin: Materialize then
    /// BecameCollectible, in order), so this returns every transition that
    /// fired. Empty when nothing changed.
    pub fn evaluate_fix(&mut self, fix: &LocationFix) -> Vec<ProximityEvent> {
        let distance = self.distance_from(fix);
        let mut events = Vec::new();

        loop {
            let step = match self.state {
                ProximityState::Dormant | ProximityState::Collected => None,
                ProximityState::Approaching => {
                    if distance <= self.target.materialization_radius_m {
                        Some((ProximityState::Materialized, ProximityEventKind::Materialize))
                    } else {
                        None
                    }
                }
                ProximityState::Materialized => {
                    if distance > self.hide_radius_m {
                        Some((ProximityState::Approaching, ProximityEventKind::Dematerialize))
                    } else if distance <= self.target.collection_radius_m {
                        Some((
                            ProximityState::Collectible,
                            ProximityEventKind::BecameCollectible,
                        ))
                    } else {
                        None
                    }
                }
                ProximityState::Collectible => {
                    if distance > self.hide_radius_m {
                        Some((ProximityState::Approaching, ProximityEventKind::Dematerialize))
                    } else {
                        None
                    }
                }
            };

            match step {
                Some((next, kind)) => {
                    self.state = next;
                    events.push(self.event(kind, fix, distance));
                }
                None => break,
            }
        }
        events
    }

    /// Attempts the external "collect" action.
    ///
    /// Only valid while `Collectible`, and the distance is re-checked
    /// against the live fix so a client acting on stale state cannot
    /// collect from out of range.
    pub fn collect(&mut self, fix: &LocationFix) -> Result<ProximityEvent, CollectError> {
        if self.state != ProximityState::Collectible {
            return Err(CollectError::NotCollectible(self.target.id));
        }
        let distance = self.distance_from(fix);
        if distance > self.target.collection_radius_m {
            return Err(CollectError::OutOfRange {
                target_id: self.target.id,
                distance_m: distance,
                radius_m: self.target.collection_radius_m,
            });
        }
        self.state = ProximityState::Collected;
        Ok(self.event(ProximityEventKind::Collected, fix, distance))
    }

    fn event(&self, kind: ProximityEventKind, fix: &LocationFix, distance: f64) -> ProximityEvent {
        let (local_east, local_north) = geomath::to_local_east_north(
            fix.latitude,
            fix.longitude,
            self.target.latitude,
            self.target.longitude,
        );
        ProximityEvent {
            kind,
            target_id: self.target.id,
            local_east,
            local_north,
            distance_m: distance,
        }
    }
}
