//! Outbound channel to the rendering/wallet/moderation consumers.
//!
//! The engine never calls into downstream systems directly; everything it
//! decides is published as messages on a bounded queue. Proximity events are
//! droppable under load (only the latest state per target matters; the next
//! transition supersedes anything missed), cheat flags are not.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::flags::CheatFlag;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityEventKind {
    /// The coin became visible; the rendering layer should place it using
    /// the ENU offset, a fixed viewing distance in front of the camera.
    Materialize,
    /// The player walked back out past the hide radius.
    Dematerialize,
    BecameCollectible,
    Collected,
}

/// One proximity transition, with the target's position in the local
/// tangent plane centered on the player's current fix.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ProximityEvent {
    pub kind: ProximityEventKind,
    pub target_id: u64,
    pub local_east: f64,
    pub local_north: f64,
    pub distance_m: f64,
}

/// Everything that leaves the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum OutboundEvent {
    Proximity {
        session_id: String,
        event: ProximityEvent,
    },
    Flag(CheatFlag),
}

#[derive(Error, Debug)]
pub enum SinkError {
    /// The consumer side is gone. For cheat flags this must escalate,
    /// silently losing anti-cheat evidence defeats the system's purpose.
    #[error("event sink closed; cheat flag {0} could not be delivered")]
    FlagSinkClosed(Uuid),
}

/// Producer half of the shared outbound queue. Clone-cheap; one per
/// session worker.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<OutboundEvent>,
    coalesced_drops: Arc<AtomicU64>,
}

impl EventSink {
    /// Creates the sink and its consumer end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                coalesced_drops: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Publishes a proximity transition. Never blocks: if the queue is full
    /// the event is coalesced away (counted and logged); the target's next
    /// transition carries the fresher state anyway.
    pub fn send_proximity(&self, session_id: &str, event: ProximityEvent) {
        let msg = OutboundEvent::Proximity {
            session_id: session_id.to_string(),
            event,
        };
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.coalesced_drops.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!(
                    "[sink] event queue full, coalesced {:?} for target {} ({} dropped so far)",
                    event.kind,
                    event.target_id,
                    dropped
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::warn!("[sink] event queue closed, dropping proximity event");
            }
        }
    }

    /// Publishes a cheat flag. Blocks briefly if the queue is full; errors
    /// (rather than dropping) if the consumer is gone.
    pub async fn send_flag(&self, flag: CheatFlag) -> Result<(), SinkError> {
        let id = flag.id;
        // Fast path first; fall back to an awaited send under backpressure.
        match self.tx.try_send(OutboundEvent::Flag(flag)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => self
                .tx
                .send(msg)
                .await
                .map_err(|_| SinkError::FlagSinkClosed(id)),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::FlagSinkClosed(id)),
        }
    }

    /// Proximity events coalesced away under backpressure since startup.
    pub fn coalesced_drops(&self) -> u64 {
        self.coalesced_drops.load(Ordering::Relaxed)
    }
}
