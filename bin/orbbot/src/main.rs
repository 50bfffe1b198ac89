use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{Config, SystemClock};
use engine::{Engine, EngineConfig, JsonLinesFeed, TracingSink};
use paper::PaperBroker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("loading environment")?;
    let mut engine_cfg = EngineConfig::load(&cfg.config_path).context("loading engine config")?;
    if let Some(capital) = cfg.account_capital {
        engine_cfg.limits.account_capital = capital;
        engine_cfg.validate().context("applying ORB_ACCOUNT_CAPITAL")?;
    }
    info!(
        symbol = %engine_cfg.instrument.symbol,
        capital = engine_cfg.limits.account_capital,
        feed = %cfg.feed_path,
        "orbbot starting"
    );

    // ── Collaborators ─────────────────────────────────────────────────────────
    info!(slippage_bps = cfg.paper_slippage_bps, "Paper trading mode, using PaperBroker");
    let broker = Arc::new(PaperBroker::new(cfg.paper_slippage_bps));
    let feed = Arc::new(JsonLinesFeed::new(&cfg.feed_path));

    // ── Engine ────────────────────────────────────────────────────────────────
    let (engine, handle) = Engine::new(&engine_cfg, broker, feed, Arc::new(TracingSink), Arc::new(SystemClock))
        .context("building engine")?;
    let task = tokio::spawn(engine.run());
    handle.start().await?;

    info!("Engine started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutdown signal received.");

    handle.stop().await?;
    let status = handle.status().await?;
    info!(
        open_positions = status.positions.len(),
        daily_pnl = status.daily_pnl,
        total_pnl = status.total_pnl,
        "Final status"
    );
    drop(handle);
    task.await.context("engine task")?;
    Ok(())
}
