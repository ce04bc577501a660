//! Cheat-flag records and the append-only ledger behind the moderation view.
//!
//! The engine only ever appends; review and enforcement (warn/suspend/ban)
//! happen in an external moderation workflow that consumes this data.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::LocationFix;

/// Which heuristic raised the flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    ImpossibleSpeed,
    Teleportation,
    MockLocation,
    GpsSpoofing,
}

impl FlagReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagReason::ImpossibleSpeed => "impossible_speed",
            FlagReason::Teleportation => "teleportation",
            FlagReason::MockLocation => "mock_location",
            FlagReason::GpsSpoofing => "gps_spoofing",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Everything a moderator needs to judge the flag without replaying the
/// session: the fixes involved and the computed kinematics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlagEvidence {
    /// Previous accepted fix, when the heuristic compared two fixes.
    pub previous_fix: Option<LocationFix>,
    pub current_fix: LocationFix,
    pub distance_m: Option<f64>,
    pub time_delta_s: Option<f64>,
    pub implied_speed_kmh: Option<f64>,
}

/// Identity attached to every flag a session raises.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: String,
    pub user_id: String,
    pub device_id: Option<String>,
}

/// A recorded suspicion of illegitimate play. Append-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheatFlag {
    pub id: Uuid,
    pub session_id: String,
    pub user_id: String,
    pub device_id: Option<String>,
    pub reason: FlagReason,
    pub severity: Severity,
    pub evidence: FlagEvidence,
    pub detected_at: DateTime<Utc>,
}

impl CheatFlag {
    pub fn new(
        meta: &SessionMeta,
        reason: FlagReason,
        severity: Severity,
        evidence: FlagEvidence,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: meta.session_id.clone(),
            user_id: meta.user_id.clone(),
            device_id: meta.device_id.clone(),
            reason,
            severity,
            evidence,
            detected_at: Utc::now(),
        }
    }
}

/// Aggregate view over the ledger for the moderation dashboard.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FlagStats {
    pub total: u64,
    pub by_reason: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
    pub last_day: u64,
    pub last_week: u64,
    pub last_month: u64,
    /// Distinct users with at least one flag on record.
    pub flagged_users: u64,
}

/// In-memory append-only store of cheat flags, shared across sessions.
#[derive(Debug, Default)]
pub struct FlagLedger {
    flags: Vec<CheatFlag>,
}

impl FlagLedger {
    pub fn new() -> Self {
        Self { flags: Vec::new() }
    }

    pub fn append(&mut self, flag: CheatFlag) {
        log::warn!(
            "[anticheat] flag {} ({}) for user {} session {}",
            flag.reason.as_str(),
            flag.severity.as_str(),
            flag.user_id,
            flag.session_id
        );
        self.flags.push(flag);
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn flags(&self) -> &[CheatFlag] {
        &self.flags
    }

    /// Computes the stats view relative to `now` (passed in so tests are
    /// deterministic).
    pub fn stats(&self, now: DateTime<Utc>) -> FlagStats {
        let day_ago = now - Duration::days(1);
        let week_ago = now - Duration::weeks(1);
        let month_ago = now - Duration::days(30);

        let mut stats = FlagStats {
            total: self.flags.len() as u64,
            ..FlagStats::default()
        };
        let mut users: HashSet<&str> = HashSet::new();

        for flag in &self.flags {
            *stats
                .by_reason
                .entry(flag.reason.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .by_severity
                .entry(flag.severity.as_str().to_string())
                .or_insert(0) += 1;
            if flag.detected_at >= day_ago {
                stats.last_day += 1;
            }
            if flag.detected_at >= week_ago {
                stats.last_week += 1;
            }
            if flag.detected_at >= month_ago {
                stats.last_month += 1;
            }
            users.insert(flag.user_id.as_str());
        }
        stats.flagged_users = users.len() as u64;
        stats
    }
}
