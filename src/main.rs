use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;

use coinhunt_rs::events::{EventSink, OutboundEvent};
use coinhunt_rs::flags::FlagLedger;
use coinhunt_rs::session::{idle_sweep_task, SessionManager, SharedLedger};
use coinhunt_rs::{server, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "coinhunt_server")]
#[command(about = "AR treasure-hunt proximity and anti-cheat engine", long_about = None)]
struct Args {
    /// Port for the HTTP API
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Seconds of silence before an idle session is torn down
    #[arg(long, default_value = "300")]
    idle_timeout: u64,

    /// Horizontal accuracy ceiling in meters (fixes above it are
    /// low-confidence)
    #[arg(long, default_value = "50.0")]
    accuracy_ceiling: f64,

    /// Accuracy above this raises a gps_spoofing flag
    #[arg(long, default_value = "100.0")]
    spoof_accuracy: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut cfg = EngineConfig::default();
    cfg.session_idle_timeout_s = args.idle_timeout as f64;
    cfg.accuracy_ceiling_m = args.accuracy_ceiling;
    cfg.spoof_accuracy_m = args.spoof_accuracy;

    log::info!("coinhunt engine starting");
    log::info!("  port: {}", args.port);
    log::info!("  idle timeout: {} s", cfg.session_idle_timeout_s);
    log::info!(
        "  accuracy ceiling / spoof threshold: {:.0} m / {:.0} m",
        cfg.accuracy_ceiling_m,
        cfg.spoof_accuracy_m
    );

    let (sink, outbound_rx) = EventSink::channel(cfg.event_queue_capacity);
    let ledger: SharedLedger = Arc::new(Mutex::new(FlagLedger::new()));
    let manager = SessionManager::new(cfg.clone(), ledger, sink);

    // Stand-in for the rendering/wallet/moderation consumers: drain the
    // outbound queue and log what would be forwarded.
    tokio::spawn(forward_events(outbound_rx));

    let sweep_interval = Duration::from_secs((args.idle_timeout / 4).max(10));
    tokio::spawn(idle_sweep_task(manager.clone(), sweep_interval));

    server::serve(manager, args.port).await
}

async fn forward_events(mut rx: mpsc::Receiver<OutboundEvent>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            OutboundEvent::Proximity { session_id, event } => {
                log::info!(
                    "[outbound] {} target {} {:?} at {:.1} m (E {:.1}, N {:.1})",
                    session_id,
                    event.target_id,
                    event.kind,
                    event.distance_m,
                    event.local_east,
                    event.local_north
                );
            }
            OutboundEvent::Flag(flag) => {
                log::warn!(
                    "[outbound] cheat flag {} {} ({}) user {} session {}",
                    flag.id,
                    flag.reason.as_str(),
                    flag.severity.as_str(),
                    flag.user_id,
                    flag.session_id
                );
            }
        }
    }
    log::info!("[outbound] event stream closed");
}
