//! Heuristic movement screening over consecutive accepted fixes.
//!
//! Stateless per invocation apart from the mock-flag dedup window; the
//! "previous fix" comes from ingest. The detector only raises flags with
//! evidence attached; enforcement is an external, policy-driven consumer
//! of the flag stream.

use crate::config::EngineConfig;
use crate::flags::{CheatFlag, FlagEvidence, FlagReason, Severity, SessionMeta};
use crate::geomath;
use crate::types::{LocationFix, MovementType};

const MPS_TO_KMH: f64 = 3.6;

/// Kinematics between two fixes, used both for flags and movement typing.
#[derive(Clone, Copy, Debug)]
pub struct SpeedEvaluation {
    pub distance_m: f64,
    pub time_delta_s: f64,
    pub speed_kmh: f64,
}

/// Implied speed between two consecutive fixes. Returns `None` when the
/// time delta is not positive: an out-of-order pair cannot be trusted, so
/// it is skipped rather than flagged.
pub fn implied_speed(prev: &LocationFix, curr: &LocationFix) -> Option<SpeedEvaluation> {
    let dt = curr.timestamp - prev.timestamp;
    if dt <= 0.0 {
        return None;
    }
    let distance_m = geomath::distance_meters(
        prev.latitude,
        prev.longitude,
        curr.latitude,
        curr.longitude,
    );
    Some(SpeedEvaluation {
        distance_m,
        time_delta_s: dt,
        speed_kmh: distance_m / dt * MPS_TO_KMH,
    })
}

/// Result of screening one fix: zero or more flags plus the qualitative
/// movement bucket reported back to the client.
#[derive(Clone, Debug)]
pub struct CheatAssessment {
    pub flags: Vec<CheatFlag>,
    pub movement_type: MovementType,
}

pub struct AntiCheatDetector {
    cfg: EngineConfig,
    /// Timestamp of the last mock-location flag, for the rolling dedup
    /// window (a continuously mocked device raises one flag per window).
    last_mock_flag_ts: Option<f64>,
}

impl AntiCheatDetector {
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            cfg,
            last_mock_flag_ts: None,
        }
    }

    /// Screens one accepted fix against its predecessor. Each heuristic is
    /// evaluated independently, so a single fix can raise several flags.
    pub fn evaluate(
        &mut self,
        meta: &SessionMeta,
        previous: Option<&LocationFix>,
        current: &LocationFix,
    ) -> CheatAssessment {
        let mut flags = Vec::new();
        let speed_eval = previous.and_then(|prev| implied_speed(prev, current));

        if let Some(eval) = speed_eval {
            let speed_flag = if eval.speed_kmh > self.cfg.teleport_speed_kmh {
                Some((FlagReason::Teleportation, Severity::Critical))
            } else if eval.speed_kmh > self.cfg.impossible_speed_kmh {
                Some((FlagReason::ImpossibleSpeed, Severity::High))
            } else {
                None
            };
            if let Some((reason, severity)) = speed_flag {
                flags.push(CheatFlag::new(
                    meta,
                    reason,
                    severity,
                    FlagEvidence {
                        previous_fix: previous.cloned(),
                        current_fix: current.clone(),
                        distance_m: Some(eval.distance_m),
                        time_delta_s: Some(eval.time_delta_s),
                        implied_speed_kmh: Some(eval.speed_kmh),
                    },
                ));
            }
        }

        if current.is_mock && self.mock_window_open(current.timestamp) {
            self.last_mock_flag_ts = Some(current.timestamp);
            flags.push(CheatFlag::new(
                meta,
                FlagReason::MockLocation,
                Severity::Medium,
                single_fix_evidence(current),
            ));
        }

        if current.accuracy_m > self.cfg.spoof_accuracy_m {
            flags.push(CheatFlag::new(
                meta,
                FlagReason::GpsSpoofing,
                Severity::High,
                single_fix_evidence(current),
            ));
        }

        let movement_type = self.movement_type(speed_eval, current);
        CheatAssessment {
            flags,
            movement_type,
        }
    }

    fn mock_window_open(&self, now: f64) -> bool {
        match self.last_mock_flag_ts {
            None => true,
            Some(last) => now - last >= self.cfg.mock_dedup_window_s,
        }
    }

    fn movement_type(&self, eval: Option<SpeedEvaluation>, current: &LocationFix) -> MovementType {
        if current.is_mock {
            return MovementType::Suspicious;
        }
        // Prefer the implied speed; fall back to the device-reported one on
        // a session's first fix.
        let speed_kmh = eval
            .map(|e| e.speed_kmh)
            .or(current.speed_mps.map(|s| s * MPS_TO_KMH))
            .unwrap_or(0.0);
        MovementType::classify(speed_kmh, false, &self.cfg)
    }
}

fn single_fix_evidence(current: &LocationFix) -> FlagEvidence {
    FlagEvidence {
        previous_fix: None,
        current_fix: current.clone(),
        distance_m: None,
        time_delta_s: None,
        implied_speed_kmh: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const BASE_LAT: f64 = 37.7749;
    const BASE_LON: f64 = -122.4194;

    fn meta() -> SessionMeta {
        SessionMeta {
            session_id: "sess-1".to_string(),
            user_id: "user-1".to_string(),
            device_id: None,
        }
    }

    fn fix(lat: f64, lon: f64, ts: f64) -> LocationFix {
        LocationFix::new(lat, lon, ts).unwrap()
    }

    /// A fix `meters` north of the base point.
    fn fix_north(meters: f64, ts: f64) -> LocationFix {
        let (lat, lon) = geomath::from_local_east_north(BASE_LAT, BASE_LON, 0.0, meters);
        fix(lat, lon, ts)
    }

    fn detector() -> AntiCheatDetector {
        AntiCheatDetector::new(EngineConfig::default())
    }

    #[test]
    fn test_teleportation_over_1000_kmh() {
        // 1500 m in 5 s → 1080 km/h → teleportation, not impossible_speed
        let mut det = detector();
        let prev = fix(BASE_LAT, BASE_LON, 100.0);
        let curr = fix_north(1500.0, 105.0);
        let out = det.evaluate(&meta(), Some(&prev), &curr);

        assert_eq!(out.flags.len(), 1);
        assert_eq!(out.flags[0].reason, FlagReason::Teleportation);
        assert_eq!(out.flags[0].severity, Severity::Critical);
        let speed = out.flags[0].evidence.implied_speed_kmh.unwrap();
        assert_relative_eq!(speed, 1080.0, epsilon = 1.0);
        assert_eq!(out.movement_type, MovementType::Suspicious);
    }

    #[test]
    fn test_impossible_speed_between_thresholds() {
        // 1000 m in 10 s → 360 km/h → impossible_speed, high
        let mut det = detector();
        let prev = fix(BASE_LAT, BASE_LON, 100.0);
        let curr = fix_north(1000.0, 110.0);
        let out = det.evaluate(&meta(), Some(&prev), &curr);

        assert_eq!(out.flags.len(), 1);
        assert_eq!(out.flags[0].reason, FlagReason::ImpossibleSpeed);
        assert_eq!(out.flags[0].severity, Severity::High);
    }

    #[test]
    fn test_highway_speed_not_flagged() {
        // 450 m in 15 s → 108 km/h → driving, below the 200 km/h flag line
        let mut det = detector();
        let prev = fix(BASE_LAT, BASE_LON, 100.0);
        let curr = fix_north(450.0, 115.0);
        let out = det.evaluate(&meta(), Some(&prev), &curr);

        assert!(out.flags.is_empty());
        assert_eq!(out.movement_type, MovementType::Driving);
    }

    #[test]
    fn test_fast_train_speed_flagged_but_not_teleport() {
        // 825 m in 15 s → 198 km/h stays clean; 900 m in 15 s → 216 km/h
        // crosses the impossible-speed line
        let mut det = detector();
        let prev = fix(BASE_LAT, BASE_LON, 100.0);
        let out = det.evaluate(&meta(), Some(&prev), &fix_north(825.0, 115.0));
        assert!(out.flags.is_empty());

        let mut det = detector();
        let out = det.evaluate(&meta(), Some(&prev), &fix_north(900.0, 115.0));
        assert_eq!(out.flags.len(), 1);
        assert_eq!(out.flags[0].reason, FlagReason::ImpossibleSpeed);
    }

    #[test]
    fn test_walking_speed_clean() {
        // ~5 m in 5 s → 3.6 km/h
        let mut det = detector();
        let prev = fix(BASE_LAT, BASE_LON, 100.0);
        let curr = fix_north(5.0, 105.0);
        let out = det.evaluate(&meta(), Some(&prev), &curr);

        assert!(out.flags.is_empty());
        assert_eq!(out.movement_type, MovementType::Walking);
    }

    #[test]
    fn test_non_positive_dt_skips_speed_evaluation() {
        let mut det = detector();
        let prev = fix(BASE_LAT, BASE_LON, 100.0);
        // Huge jump, but dt = 0: cannot trust the pair, no flag
        let curr = fix_north(50_000.0, 100.0);
        let out = det.evaluate(&meta(), Some(&prev), &curr);
        assert!(out.flags.is_empty());
    }

    #[test]
    fn test_gps_spoofing_on_poor_accuracy() {
        let mut det = detector();
        let mut curr = fix_north(3.0, 105.0);
        curr.accuracy_m = 150.0;
        let prev = fix(BASE_LAT, BASE_LON, 100.0);
        let out = det.evaluate(&meta(), Some(&prev), &curr);

        assert_eq!(out.flags.len(), 1);
        assert_eq!(out.flags[0].reason, FlagReason::GpsSpoofing);
        assert_eq!(out.flags[0].severity, Severity::High);
        // Accuracy alone does not make the movement suspicious
        assert_eq!(out.movement_type, MovementType::Walking);
    }

    #[test]
    fn test_mock_location_flag_deduped_within_window() {
        let mut det = detector();
        let mut first = fix_north(3.0, 100.0);
        first.is_mock = true;
        let out = det.evaluate(&meta(), None, &first);
        assert_eq!(out.flags.len(), 1);
        assert_eq!(out.flags[0].reason, FlagReason::MockLocation);
        assert_eq!(out.flags[0].severity, Severity::Medium);
        assert_eq!(out.movement_type, MovementType::Suspicious);

        // 10 minutes later, still mocked: inside the 1 h window, no new flag
        let mut second = fix_north(6.0, 700.0);
        second.is_mock = true;
        let out = det.evaluate(&meta(), Some(&first), &second);
        assert!(out.flags.is_empty());
        assert_eq!(out.movement_type, MovementType::Suspicious);

        // Past the window: flag again
        let mut third = fix_north(9.0, 100.0 + 3600.0);
        third.is_mock = true;
        let out = det.evaluate(&meta(), Some(&second), &third);
        assert_eq!(out.flags.len(), 1);
        assert_eq!(out.flags[0].reason, FlagReason::MockLocation);
    }

    #[test]
    fn test_single_fix_can_raise_multiple_flags() {
        // Teleportation + spoofed accuracy + mock hint, all at once
        let mut det = detector();
        let prev = fix(BASE_LAT, BASE_LON, 100.0);
        let mut curr = fix_north(2000.0, 105.0);
        curr.accuracy_m = 200.0;
        curr.is_mock = true;
        let out = det.evaluate(&meta(), Some(&prev), &curr);

        let reasons: Vec<FlagReason> = out.flags.iter().map(|f| f.reason).collect();
        assert!(reasons.contains(&FlagReason::Teleportation));
        assert!(reasons.contains(&FlagReason::GpsSpoofing));
        assert!(reasons.contains(&FlagReason::MockLocation));
        assert_eq!(out.movement_type, MovementType::Suspicious);
    }

    #[test]
    fn test_first_fix_uses_reported_speed() {
        let mut det = detector();
        let mut first = fix_north(0.0, 100.0);
        first.speed_mps = Some(4.0); // 14.4 km/h
        let out = det.evaluate(&meta(), None, &first);
        assert_eq!(out.movement_type, MovementType::Running);
    }

    #[test]
    fn test_evidence_carries_both_fixes() {
        let mut det = detector();
        let prev = fix(BASE_LAT, BASE_LON, 100.0);
        let curr = fix_north(1500.0, 105.0);
        let out = det.evaluate(&meta(), Some(&prev), &curr);
        let ev = &out.flags[0].evidence;
        assert!(ev.previous_fix.is_some());
        assert_relative_eq!(ev.distance_m.unwrap(), 1500.0, epsilon = 1.0);
        assert_relative_eq!(ev.time_delta_s.unwrap(), 5.0, epsilon = 1e-9);
    }
}
