use serde::{Deserialize, Serialize};

/// Tunable policy for the whole engine.
///
/// Every threshold the ingest, proximity, and anti-cheat paths consult lives
/// here instead of at the call sites. The defaults seed the test suite; real
/// deployments are expected to override them per region/event (a high-speed
/// train legitimately exceeds 200 km/h).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Horizontal accuracy ceiling in meters. Fixes above this are accepted
    /// but marked low-confidence (poor accuracy is itself evidence).
    pub accuracy_ceiling_m: f64,

    /// Minimum movement in meters before a new fix replaces "current".
    pub min_move_distance_m: f64,

    /// Maximum seconds a stationary player can go without a "current"
    /// refresh (heartbeat; keeps timestamps advancing while standing still).
    pub heartbeat_interval_s: f64,

    /// Maximum age in seconds for a fix to count as "last known good".
    pub last_known_good_max_age_s: f64,

    /// Implied speed above this flags teleportation (critical).
    pub teleport_speed_kmh: f64,

    /// Implied speed above this flags impossible speed (high).
    pub impossible_speed_kmh: f64,

    /// Horizontal accuracy above this flags GPS spoofing (high).
    pub spoof_accuracy_m: f64,

    /// Rolling dedup window in seconds for mock-location flags, so a
    /// continuously mocked device raises one flag per window, not a storm.
    pub mock_dedup_window_s: f64,

    /// Margin in meters added to the materialization radius when a target's
    /// hide radius is misconfigured (hide must exceed materialization).
    pub hide_margin_m: f64,

    /// Movement-type buckets (km/h): walking, running, driving ceilings.
    /// Anything above driving, or any mock-flagged fix, reads as suspicious.
    pub walking_max_kmh: f64,
    pub running_max_kmh: f64,
    pub driving_max_kmh: f64,

    /// Seconds of silence before the sweeper tears a session down.
    pub session_idle_timeout_s: f64,

    /// Capacity of each session's inbound fix/command queue.
    pub fix_queue_capacity: usize,

    /// Capacity of the shared outbound event queue.
    pub event_queue_capacity: usize,

    /// Rolling diagnostics window of recent accepted fixes per session.
    pub fix_history_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accuracy_ceiling_m: 50.0,
            min_move_distance_m: 2.0,
            heartbeat_interval_s: 30.0,
            last_known_good_max_age_s: 60.0,
            teleport_speed_kmh: 1000.0,
            impossible_speed_kmh: 200.0,
            spoof_accuracy_m: 100.0,
            mock_dedup_window_s: 3600.0, // 1 hour
            hide_margin_m: 5.0,
            walking_max_kmh: 6.0,
            running_max_kmh: 20.0,
            driving_max_kmh: 120.0,
            session_idle_timeout_s: 300.0,
            fix_queue_capacity: 64,
            event_queue_capacity: 256,
            fix_history_len: 16,
        }
    }
}
