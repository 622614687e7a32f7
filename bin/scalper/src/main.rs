use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use common::{Config, EngineCommand, ExchangeClient, TradingMode};
use engine::{BybitClient, Engine, EngineSettings, OrderExecutor};
use paper::PaperClient;
use risk::{PositionManager, RiskConfig};
use strategy::{IndicatorSettings, SignalAnalyzer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("invalid configuration")?;

    // ── Logging ──────────────────────────────────────────────────────────────
    // RUST_LOG wins over LOG_LEVEL when both are set.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(mode = %cfg.trading_mode, symbol = %cfg.symbol, "Scalper starting");

    let indicators = IndicatorSettings::load(cfg.strategy_config_path.as_deref())
        .context("failed to load indicator settings")?;

    // ── Exchange client (injected based on TRADING_MODE) ──────────────────────
    let client: Arc<dyn ExchangeClient> = match cfg.trading_mode {
        TradingMode::Live => {
            info!(testnet = cfg.bybit_testnet, "Live trading mode, using BybitClient");
            Arc::new(BybitClient::new(
                &cfg.bybit_api_key,
                &cfg.bybit_secret,
                cfg.bybit_testnet,
            )?)
        }
        TradingMode::Paper => {
            info!(
                slippage_bps = cfg.paper_slippage_bps,
                balance = cfg.paper_balance_usd,
                "Paper trading mode, using PaperClient over public Bybit data"
            );
            let feed = Arc::new(BybitClient::public(cfg.bybit_testnet)?);
            Arc::new(
                PaperClient::new(cfg.paper_balance_usd, cfg.paper_slippage_bps).with_feed(feed),
            )
        }
    };

    // ── Strategy loop ─────────────────────────────────────────────────────────
    let analyzer = SignalAnalyzer::from_config(&cfg, &indicators);
    let manager = PositionManager::new(RiskConfig::from(&cfg));
    let executor = OrderExecutor::new(client, cfg.symbol.clone());
    let (engine, handle) = Engine::new(
        EngineSettings::from(&cfg),
        Box::new(analyzer),
        manager,
        executor,
    );

    engine
        .initialize()
        .await
        .context("exchange unreachable at start-up")?;

    let task = tokio::spawn(engine.run());

    info!("Strategy loop started. Waiting for shutdown signal.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received. Closing positions.");

    handle.send(EngineCommand::Stop).await;
    task.await.context("strategy loop panicked")?;

    let status = handle.status().await;
    info!(open_positions = status.active_positions, "Scalper stopped");
    Ok(())
}
