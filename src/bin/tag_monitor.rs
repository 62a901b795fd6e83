//! Live tag monitor
//!
//! Runs an inventory session fed by the simulated reader and shows it in
//! the terminal console, or logs throughput when headless.
//!
//! Usage:
//!   cargo run --release --bin tag_monitor
//!
//! Environment variables (all optional, see `MonitorConfig`):
//!   TAGSCOPE_HEADLESS - log stats instead of drawing the console
//!   TAGSCOPE_EXPORT_PATH / TAGSCOPE_EXPORT_FORMAT - export target
//!   TAGSCOPE_SIM_TAGS / TAGSCOPE_SIM_READS_PER_SEC - simulated reader

use dotenv::dotenv;
use log::{error, info};
use std::time::Duration;
use tagscope::{
    config::MonitorConfig,
    persistence::SnapshotWriter,
    session::InventorySession,
    simulator::{SimulatedReader, SimulatorConfig},
    ui,
};
use tokio::{sync::watch, time::interval};

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Logs go to stderr; the console draws on stdout's alternate screen
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = MonitorConfig::from_env()?;

    info!("🚀 Starting tag monitor");
    info!("   ├─ Export: {} ({:?})", config.export_path.display(), config.export_format);
    info!("   ├─ Simulated reader: {} tags, {} reads/s", config.sim_tags, config.sim_reads_per_sec);
    info!("   └─ Mode: {}", if config.headless { "headless" } else { "console" });

    let mut session = InventorySession::new(config.clone());
    let mut writer = SnapshotWriter::new(config.export_format, &config.export_path)?;
    info!("📊 Export backend: {}", writer.backend_type());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reader = SimulatedReader::new(&SimulatorConfig {
        tags: config.sim_tags,
        reads_per_sec: config.sim_reads_per_sec,
        seed: None,
    });
    let reader_task = tokio::spawn(reader.run(session.ingest_handle(), session.clock(), shutdown_rx));

    if config.headless {
        run_headless(&mut session).await;
    } else if let Err(e) = ui::run_ui(&mut session, &mut writer).await {
        error!("UI error: {}", e);
    }

    shutdown_tx.send(true).ok();
    if let Err(e) = reader_task.await {
        error!("Simulated reader task failed: {}", e);
    }

    // Final snapshot before teardown
    session.tick();
    let rows = session.export();
    match writer.write_snapshot(&rows).await {
        Ok(()) => info!("✅ Exported {} tags to {}", rows.len(), config.export_path.display()),
        Err(e) => error!("❌ Final export failed: {}", e),
    }
    writer.flush().await?;

    session.stop();
    Ok(())
}

/// Tick the session and log a throughput summary until Ctrl+C
async fn run_headless(session: &mut InventorySession) {
    let mut ticker = interval(session.config().tick_interval);
    let mut stats_ticker = interval(STATS_LOG_INTERVAL);
    stats_ticker.tick().await; // Skip first immediate tick

    info!("✅ Headless session running (Ctrl+C to stop)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                session.tick();
            }
            _ = stats_ticker.tick() => {
                let stats = session.stats();
                info!(
                    "📈 {} | live {} stale {} | overflow {} malformed {} | palette {}/{}",
                    ui::renderer::format_status_line(&stats),
                    stats.live_tags,
                    stats.stale_tags,
                    stats.ingest.overflow_drops,
                    stats.ingest.malformed_drops,
                    stats.identities_in_use,
                    stats.palette_size,
                );
            }
            _ = &mut ctrl_c => {
                info!("🛑 Ctrl+C received, shutting down");
                break;
            }
        }
    }
}
