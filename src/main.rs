//! fastpath-sim — driver binary.
//!
//! Starts the pipeline, reports per-queue stats on a fixed period, and shuts
//! down cooperatively on SIGINT/SIGTERM before printing the final totals.

use fastpath_sim::{Engine, EngineConfig, EngineError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Process-wide shutdown flag. Set by the SIGINT/SIGTERM handler, observed
/// by the reporter loop which then stops the engine.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn signal_handler(_sig: i32) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("fastpath-sim v{}", env!("CARGO_PKG_VERSION"));

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "fastpath.json".into());
    let config = match EngineConfig::load(&config_path) {
        Ok(config) => config,
        Err(EngineError::ConfigIo(_)) => {
            tracing::warn!("config not found, using defaults");
            EngineConfig::default()
        }
        // A present-but-broken config must not start the pipeline.
        Err(e) => return Err(e.into()),
    };

    unsafe {
        libc::signal(libc::SIGINT, signal_handler as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, signal_handler as *const () as libc::sighandler_t);
    }

    let mut engine = Engine::new(config.clone())?;
    engine.start()?;

    let period = Duration::from_secs(config.report_interval_secs.max(1));
    while !SHUTDOWN.load(Ordering::Relaxed) {
        std::thread::sleep(period);
        report(&engine);
    }

    tracing::info!("shutdown requested, joining stage threads");
    engine.request_shutdown();
    engine.stop();

    report(&engine);
    let total = engine.total();
    tracing::info!(
        rx = total.rx_pkts,
        proc = total.proc_pkts,
        tx = total.tx_pkts,
        dropped = total.dropped,
        hw_lat_avg_ns = total.hw_latency_avg_ns(),
        sw_lat_avg_ns = total.sw_latency_avg_ns(),
        "final totals"
    );

    Ok(())
}

/// Emit one stats line per queue.
fn report(engine: &Engine) {
    for q in 0..engine.num_queues() {
        let s = engine.snapshot(q);
        tracing::info!(
            queue = q,
            rx = s.rx_pkts,
            proc = s.proc_pkts,
            tx = s.tx_pkts,
            dropped = s.dropped,
            hw_lat_avg_ns = s.hw_latency_avg_ns(),
            sw_lat_avg_ns = s.sw_latency_avg_ns(),
            "queue stats"
        );
    }
}
