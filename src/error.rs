//! Typed errors for the engine's fallible operations.

use thiserror::Error;

/// Why an inbound fix was rejected by [`crate::ingest::LocationIngest`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FixError {
    /// Latitude/longitude out of range, or the (0, 0) "null island" pair.
    #[error("invalid coordinate: lat {latitude}, lon {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// Timestamp did not advance past the last accepted fix. Out-of-order
    /// fixes are rejected, never reordered: speed math needs forward deltas.
    #[error("stale fix: timestamp {timestamp:.3} is not after {last_accepted:.3}")]
    StaleFix { timestamp: f64, last_accepted: f64 },
}

/// Why a collect attempt was refused.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectError {
    /// The target is not in the `Collectible` state.
    #[error("target {0} is not collectible in its current state")]
    NotCollectible(u64),

    /// Distance re-checked at collect time exceeds the collection radius
    /// (the client acted on stale state).
    #[error("target {target_id} is {distance_m:.1} m away, beyond collection radius {radius_m:.1} m")]
    OutOfRange {
        target_id: u64,
        distance_m: f64,
        radius_m: f64,
    },

    /// The session has no such target registered.
    #[error("unknown target: {0}")]
    UnknownTarget(u64),

    /// No accepted fix yet, so there is no distance to check against.
    #[error("no location fix on record for this session")]
    NoFix,
}

/// Session-level lookup failures surfaced to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// The session worker is gone (shutting down); the caller should retry
    /// after re-establishing the session.
    #[error("session {0} is no longer accepting input")]
    SessionClosed(String),
}
