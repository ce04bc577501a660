//! Session state, the per-session worker loop, and the keyed session store.
//!
//! Each active play session owns its ingest/proximity/anti-cheat state
//! exclusively, behind one tokio task consuming an ordered command queue.
//! Nothing engine-side is a global: the manager is constructed explicitly
//! and handed to whoever needs it, which keeps multi-session tests cheap.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use uuid::Uuid;

use crate::anticheat::AntiCheatDetector;
use crate::config::EngineConfig;
use crate::error::{CollectError, FixError, SessionError};
use crate::events::{EventSink, ProximityEvent};
use crate::flags::{CheatFlag, FlagLedger, SessionMeta};
use crate::ingest::LocationIngest;
use crate::proximity::TargetTracker;
use crate::types::{LocationFix, MovementType, Target};

pub type SharedLedger = Arc<Mutex<FlagLedger>>;

/// Everything one accepted fix produced.
#[derive(Clone, Debug)]
pub struct FixOutcome {
    pub location_id: Uuid,
    pub movement_type: MovementType,
    pub low_confidence: bool,
    pub flags: Vec<CheatFlag>,
    pub events: Vec<ProximityEvent>,
}

/// The synchronous engine core for one session. No I/O; the worker owns
/// the async edges.
pub struct Session {
    meta: SessionMeta,
    cfg: EngineConfig,
    ingest: LocationIngest,
    detector: AntiCheatDetector,
    /// Keyed by target id; BTreeMap keeps event ordering deterministic.
    targets: BTreeMap<u64, TargetTracker>,
}

impl Session {
    pub fn new(meta: SessionMeta, cfg: EngineConfig) -> Self {
        Self {
            ingest: LocationIngest::new(cfg.clone()),
            detector: AntiCheatDetector::new(cfg.clone()),
            targets: BTreeMap::new(),
            meta,
            cfg,
        }
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    /// Registers coin candidates for this session's hunt and activates
    /// them. Already-registered targets keep their current state.
    pub fn register_targets(&mut self, targets: Vec<Target>) -> usize {
        let mut added = 0;
        for target in targets {
            self.targets.entry(target.id).or_insert_with(|| {
                added += 1;
                let mut tracker = TargetTracker::new(target, &self.cfg);
                tracker.activate();
                tracker
            });
        }
        added
    }

    /// Runs one fix through ingest, anti-cheat, and every active target's
    /// state machine.
    pub fn apply_fix(&mut self, fix: LocationFix) -> Result<FixOutcome, FixError> {
        let acceptance = self.ingest.accept(fix.clone())?;
        let assessment = self
            .detector
            .evaluate(&self.meta, acceptance.previous.as_ref(), &fix);

        // Proximity always works off the movement-filtered "current" fix,
        // so jitter below the filter threshold cannot flap a state machine.
        let mut events = Vec::new();
        if let Some(current) = self.ingest.current().cloned() {
            for tracker in self.targets.values_mut() {
                events.extend(tracker.evaluate_fix(&current));
            }
        }

        Ok(FixOutcome {
            location_id: Uuid::new_v4(),
            movement_type: assessment.movement_type,
            low_confidence: acceptance.low_confidence,
            flags: assessment.flags,
            events,
        })
    }

    /// The external collect action, re-checked against the live position.
    pub fn collect(&mut self, target_id: u64) -> Result<ProximityEvent, CollectError> {
        let fix = self
            .ingest
            .current()
            .cloned()
            .ok_or(CollectError::NoFix)?;
        let tracker = self
            .targets
            .get_mut(&target_id)
            .ok_or(CollectError::UnknownTarget(target_id))?;
        tracker.collect(&fix)
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }
}

/// Commands a session worker consumes, strictly in arrival order.
pub enum SessionCommand {
    Fix {
        fix: LocationFix,
        reply: oneshot::Sender<Result<FixOutcome, FixError>>,
    },
    Collect {
        target_id: u64,
        reply: oneshot::Sender<Result<ProximityEvent, CollectError>>,
    },
    RegisterTargets {
        targets: Vec<Target>,
        reply: oneshot::Sender<usize>,
    },
}

/// Worker loop: the only owner of a session's mutable state. Exits when
/// the manager drops the last sender (offline signal or idle sweep).
pub async fn session_worker(
    mut session: Session,
    mut rx: mpsc::Receiver<SessionCommand>,
    ledger: SharedLedger,
    sink: EventSink,
) {
    let session_id = session.meta().session_id.clone();
    log::info!("[session {}] worker started", session_id);

    while let Some(cmd) = rx.recv().await {
        match cmd {
            SessionCommand::Fix { fix, reply } => {
                let outcome = session.apply_fix(fix);
                if let Ok(outcome) = &outcome {
                    publish_outcome(&session_id, outcome, &ledger, &sink).await;
                }
                let _ = reply.send(outcome);
            }
            SessionCommand::Collect { target_id, reply } => {
                let result = session.collect(target_id);
                if let Ok(event) = &result {
                    sink.send_proximity(&session_id, *event);
                }
                let _ = reply.send(result);
            }
            SessionCommand::RegisterTargets { targets, reply } => {
                let added = session.register_targets(targets);
                let _ = reply.send(added);
            }
        }
    }
    log::info!("[session {}] worker stopped", session_id);
}

async fn publish_outcome(
    session_id: &str,
    outcome: &FixOutcome,
    ledger: &SharedLedger,
    sink: &EventSink,
) {
    for flag in &outcome.flags {
        // The ledger append is the durable record; forwarding to the
        // moderation consumer must not be silently lost either.
        if let Ok(mut ledger) = ledger.lock() {
            ledger.append(flag.clone());
        }
        if let Err(e) = sink.send_flag(flag.clone()).await {
            log::error!("[session {}] {}", session_id, e);
        }
    }
    for event in &outcome.events {
        sink.send_proximity(session_id, *event);
    }
}

/// Handle the manager keeps per live session.
struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    user_id: String,
    last_seen: Arc<Mutex<Instant>>,
}

impl SessionHandle {
    fn touch(&self) {
        if let Ok(mut t) = self.last_seen.lock() {
            *t = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }
}

/// Engine status snapshot for the health endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct EngineStatus {
    pub active_sessions: usize,
    pub fixes_accepted: u64,
    pub fixes_rejected: u64,
    pub flags_total: u64,
    pub events_coalesced: u64,
    pub uptime_seconds: u64,
}

struct ManagerInner {
    cfg: EngineConfig,
    ledger: SharedLedger,
    sink: EventSink,
    sessions: Mutex<HashMap<String, SessionHandle>>,
    fixes_accepted: AtomicU64,
    fixes_rejected: AtomicU64,
    started_at: Instant,
}

/// Keyed store of live sessions. Clone-cheap handle; pass it wherever
/// session access is needed instead of reaching for a global.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(cfg: EngineConfig, ledger: SharedLedger, sink: EventSink) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                cfg,
                ledger,
                sink,
                sessions: Mutex::new(HashMap::new()),
                fixes_accepted: AtomicU64::new(0),
                fixes_rejected: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    /// Returns the session's command queue, spawning a fresh worker on
    /// first contact (hunt start).
    fn ensure_session(
        &self,
        session_id: &str,
        user_id: &str,
        device_id: Option<String>,
    ) -> mpsc::Sender<SessionCommand> {
        let mut sessions = self.inner.sessions.lock().expect("session map poisoned");
        if let Some(handle) = sessions.get(session_id) {
            handle.touch();
            return handle.tx.clone();
        }

        let meta = SessionMeta {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            device_id,
        };
        let session = Session::new(meta, self.inner.cfg.clone());
        let (tx, rx) = mpsc::channel(self.inner.cfg.fix_queue_capacity);
        tokio::spawn(session_worker(
            session,
            rx,
            self.inner.ledger.clone(),
            self.inner.sink.clone(),
        ));
        sessions.insert(
            session_id.to_string(),
            SessionHandle {
                tx: tx.clone(),
                user_id: user_id.to_string(),
                last_seen: Arc::new(Mutex::new(Instant::now())),
            },
        );
        log::info!("[manager] session {} started for user {}", session_id, user_id);
        tx
    }

    fn existing_session(
        &self,
        session_id: &str,
    ) -> Result<mpsc::Sender<SessionCommand>, SessionError> {
        let sessions = self.inner.sessions.lock().expect("session map poisoned");
        sessions
            .get(session_id)
            .map(|handle| {
                handle.touch();
                handle.tx.clone()
            })
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))
    }

    /// Queues a fix for the session (created on first contact) and waits
    /// for the worker's verdict.
    pub async fn submit_fix(
        &self,
        session_id: &str,
        user_id: &str,
        device_id: Option<String>,
        fix: LocationFix,
    ) -> Result<Result<FixOutcome, FixError>, SessionError> {
        let tx = self.ensure_session(session_id, user_id, device_id);
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(SessionCommand::Fix {
            fix,
            reply: reply_tx,
        })
        .await
        .map_err(|_| SessionError::SessionClosed(session_id.to_string()))?;
        let outcome = reply_rx
            .await
            .map_err(|_| SessionError::SessionClosed(session_id.to_string()))?;

        match &outcome {
            Ok(_) => self.inner.fixes_accepted.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.inner.fixes_rejected.fetch_add(1, Ordering::Relaxed),
        };
        Ok(outcome)
    }

    pub async fn collect(
        &self,
        session_id: &str,
        target_id: u64,
    ) -> Result<Result<ProximityEvent, CollectError>, SessionError> {
        let tx = self.existing_session(session_id)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(SessionCommand::Collect {
            target_id,
            reply: reply_tx,
        })
        .await
        .map_err(|_| SessionError::SessionClosed(session_id.to_string()))?;
        reply_rx
            .await
            .map_err(|_| SessionError::SessionClosed(session_id.to_string()))
    }

    pub async fn register_targets(
        &self,
        session_id: &str,
        targets: Vec<Target>,
    ) -> Result<usize, SessionError> {
        let tx = self.existing_session(session_id)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(SessionCommand::RegisterTargets {
            targets,
            reply: reply_tx,
        })
        .await
        .map_err(|_| SessionError::SessionClosed(session_id.to_string()))?;
        reply_rx
            .await
            .map_err(|_| SessionError::SessionClosed(session_id.to_string()))
    }

    /// Offline signal: drops the session's live-tracking record. Dropping
    /// the last sender ends the worker; queued input drains, nothing else
    /// is persisted. Idempotent: returns whether anything was removed.
    pub fn remove_session(&self, session_id: &str) -> bool {
        let removed = self
            .inner
            .sessions
            .lock()
            .expect("session map poisoned")
            .remove(session_id);
        if let Some(handle) = &removed {
            log::info!(
                "[manager] session {} removed (user {})",
                session_id,
                handle.user_id
            );
        }
        removed.is_some()
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().expect("session map poisoned").len()
    }

    /// Reaps sessions idle past the configured timeout. Returns how many
    /// were torn down.
    pub fn sweep_idle(&self) -> usize {
        let timeout = Duration::from_secs_f64(self.inner.cfg.session_idle_timeout_s);
        let mut sessions = self.inner.sessions.lock().expect("session map poisoned");
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, handle)| handle.idle_for() > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            sessions.remove(id);
            log::info!("[manager] session {} timed out, removed", id);
        }
        stale.len()
    }

    pub fn status(&self) -> EngineStatus {
        let flags_total = self
            .inner
            .ledger
            .lock()
            .map(|l| l.len() as u64)
            .unwrap_or(0);
        EngineStatus {
            active_sessions: self.session_count(),
            fixes_accepted: self.inner.fixes_accepted.load(Ordering::Relaxed),
            fixes_rejected: self.inner.fixes_rejected.load(Ordering::Relaxed),
            flags_total,
            events_coalesced: self.inner.sink.coalesced_drops(),
            uptime_seconds: self.inner.started_at.elapsed().as_secs(),
        }
    }

    pub fn ledger(&self) -> SharedLedger {
        self.inner.ledger.clone()
    }
}

/// Periodic idle-session sweep, spawned alongside the server.
pub async fn idle_sweep_task(manager: SessionManager, check_interval: Duration) {
    loop {
        sleep(check_interval).await;
        let reaped = manager.sweep_idle();
        if reaped > 0 {
            log::info!("[manager] idle sweep reaped {} session(s)", reaped);
        }
    }
}
