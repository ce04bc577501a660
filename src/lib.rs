//! Geospatial proximity and anti-cheat engine for a location-based AR
//! treasure hunt.
//!
//! Raw GPS fixes come in per session, get validated and movement-filtered
//! (`ingest`), then drive two parallel consumers: the per-target coin
//! state machines (`proximity`) and the cheating heuristics (`anticheat`).
//! Everything the engine decides leaves through a bounded outbound queue
//! (`events`); cheat flags are additionally recorded in an append-only
//! ledger (`flags`). The `server` module exposes the whole thing over HTTP.

pub mod anticheat;
pub mod config;
pub mod error;
pub mod events;
pub mod flags;
pub mod geomath;
pub mod ingest;
pub mod proximity;
pub mod server;
pub mod session;
pub mod types;

pub use config::EngineConfig;
pub use error::{CollectError, FixError, SessionError};
pub use events::{EventSink, OutboundEvent, ProximityEvent, ProximityEventKind};
pub use flags::{CheatFlag, FlagLedger, FlagReason, Severity};
pub use proximity::ProximityState;
pub use session::{Session, SessionManager};
pub use types::{LocationFix, MovementType, Target, ValueCategory};
