//! Turns raw device/network fixes into a validated, de-duplicated stream.
//!
//! One instance per session. Validation rejects physically invalid input;
//! the movement filter keeps "current" from churning on GPS jitter while a
//! heartbeat refresh keeps it alive for stationary players.

use std::collections::VecDeque;

use crate::config::EngineConfig;
use crate::error::FixError;
use crate::geomath;
use crate::types::{validate_coordinates, LocationFix};

/// What `accept` decided about a fix that passed validation.
#[derive(Clone, Debug)]
pub struct Acceptance {
    /// Whether the fix replaced the session's "current" position.
    pub updated_current: bool,
    /// Accuracy exceeded the configured ceiling. The fix still counts (poor
    /// accuracy is anti-cheat-relevant evidence), but consumers may weigh it
    /// accordingly.
    pub low_confidence: bool,
    /// The previously accepted fix, handed to the anti-cheat detector for
    /// speed math.
    pub previous: Option<LocationFix>,
}

pub struct LocationIngest {
    cfg: EngineConfig,
    current: Option<LocationFix>,
    last_accepted: Option<LocationFix>,
    /// Rolling window of recent accepted fixes for diagnostics and the
    /// last-known-good fallback.
    history: VecDeque<LocationFix>,
    accepted_count: u64,
    rejected_count: u64,
}

impl LocationIngest {
    pub fn new(cfg: EngineConfig) -> Self {
        let history_cap = cfg.fix_history_len;
        Self {
            cfg,
            current: None,
            last_accepted: None,
            history: VecDeque::with_capacity(history_cap),
            accepted_count: 0,
            rejected_count: 0,
        }
    }

    /// Validates and records a fix.
    ///
    /// Rejects out-of-range coordinates and non-monotonic timestamps. A fix
    /// only replaces "current" if it moved at least the minimum distance or
    /// the heartbeat interval has elapsed since the last replacement.
    pub fn accept(&mut self, fix: LocationFix) -> Result<Acceptance, FixError> {
        if let Err(e) = validate_coordinates(fix.latitude, fix.longitude) {
            self.rejected_count += 1;
            return Err(e);
        }

        if let Some(last) = &self.last_accepted {
            if fix.timestamp <= last.timestamp {
                self.rejected_count += 1;
                return Err(FixError::StaleFix {
                    timestamp: fix.timestamp,
                    last_accepted: last.timestamp,
                });
            }
        }

        let low_confidence = fix.accuracy_m > self.cfg.accuracy_ceiling_m;
        if low_confidence {
            log::debug!(
                "[ingest] low-confidence fix: accuracy {:.1} m > ceiling {:.1} m",
                fix.accuracy_m,
                self.cfg.accuracy_ceiling_m
            );
        }

        let updated_current = match &self.current {
            None => true,
            Some(cur) => {
                let moved = geomath::distance_meters(
                    cur.latitude,
                    cur.longitude,
                    fix.latitude,
                    fix.longitude,
                );
                moved >= self.cfg.min_move_distance_m
                    || fix.timestamp - cur.timestamp >= self.cfg.heartbeat_interval_s
            }
        };

        let previous = self.last_accepted.clone();
        if updated_current {
            self.current = Some(fix.clone());
        }
        self.last_accepted = Some(fix.clone());

        if self.history.len() == self.cfg.fix_history_len {
            self.history.pop_front();
        }
        self.history.push_back(fix);
        self.accepted_count += 1;

        Ok(Acceptance {
            updated_current,
            low_confidence,
            previous,
        })
    }

    /// The session's current position, if any fix has been accepted.
    pub fn current(&self) -> Option<&LocationFix> {
        self.current.as_ref()
    }

    /// Freshest usable position: "current" if it is within the max-age
    /// window, else the most recent accepted fix that is, else `None`.
    pub fn last_known_good(&self, now: f64) -> Option<&LocationFix> {
        let max_age = self.cfg.last_known_good_max_age_s;
        if let Some(cur) = &self.current {
            if now - cur.timestamp <= max_age {
                return Some(cur);
            }
        }
        self.history
            .iter()
            .rev()
            .find(|f| now - f.timestamp <= max_age)
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted_count
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    /// Recent accepted fixes, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &LocationFix> {
        self.history.iter()
    }
}
