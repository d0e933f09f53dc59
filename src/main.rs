//! Gale Trader - Main Entry Point

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gale_trader::api::{self, AppState};
use gale_trader::config::{Config, SharedConfig};
use gale_trader::exchange::{BinanceClient, ExecutionPort, MarketDataPort, PaperExchange};
use gale_trader::persistence::{EventLog, LossStreakStore, PersistenceManager, TradeLedger};
use gale_trader::status::{summarize, StatusBoard, StatusSnapshot};
use gale_trader::strategy::{PositionLifecycle, Ports, Stores, TradingLoop};
use gale_trader::utils::{Clock, SystemClock};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Gale Trader CLI
#[derive(Parser)]
#[command(name = "gale-trader")]
#[command(version, about = "Heikin-Ashi staking-ladder bot for Binance Futures")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Simulate execution against live market data, even if LIVE_TRADING is set
    #[arg(long)]
    paper: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show ledger summary and recent trades from the database
    Status {
        /// Path to SQLite database (defaults to the configured path)
        #[arg(short, long)]
        db: Option<String>,

        /// Also show recent trades in full and the event log
        #[arg(short, long)]
        verbose: bool,
    },
}

/// Trading mode: Live (real money) or Paper (simulated fills).
#[derive(Debug, Clone, Copy, PartialEq)]
enum TradingMode {
    Live,
    Paper,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;

    if let Some(Commands::Status { db, verbose }) = cli.command {
        let db = db.unwrap_or_else(|| config.persistence.db_path.clone());
        return show_status(&db, verbose);
    }

    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║              Gale Trader v{}                            ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");

    config.validate().context("Invalid configuration")?;
    log_config(&config);

    let trading_mode =
        if !cli.paper && std::env::var("LIVE_TRADING").unwrap_or_default() == "true" {
            warn!("⚠️  LIVE TRADING MODE - Real money at risk!");
            TradingMode::Live
        } else {
            info!("📝 PAPER TRADING MODE - Fills are simulated");
            TradingMode::Paper
        };

    let client = Arc::new(BinanceClient::new(&config.binance)?);
    if trading_mode == TradingMode::Live && !client.has_credentials() {
        bail!("Live trading requires binance.api_key and binance.secret_key");
    }
    match client.sync_time().await {
        Ok(offset) => info!("⏱️  [INIT] Server time offset: {}ms", offset),
        Err(e) => warn!("⚠️  [INIT] Failed to sync server time: {}", e),
    }

    let ports = match trading_mode {
        TradingMode::Live => Ports {
            market: client.clone() as Arc<dyn MarketDataPort>,
            execution: client.clone() as Arc<dyn ExecutionPort>,
        },
        TradingMode::Paper => {
            let paper = Arc::new(PaperExchange::new(dec!(10000)).with_feed(client.clone()));
            Ports {
                market: paper.clone(),
                execution: paper,
            }
        }
    };

    let persistence = Arc::new(
        PersistenceManager::new(&config.persistence.db_path)
            .context("Failed to initialize persistence database")?,
    );
    let stores = Stores::sqlite(persistence.clone());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let shared_config = SharedConfig::new(config.clone());
    let board = StatusBoard::new(StatusSnapshot::new(
        config.strategy.symbol.clone(),
        config.staking.ladder.clone(),
        clock.now(),
    ));

    let lifecycle = PositionLifecycle::new(
        ports,
        stores,
        shared_config.clone(),
        board.clone(),
        clock,
    )?;

    if config.api.enabled {
        let state = Arc::new(AppState {
            board: board.clone(),
            config: shared_config.clone(),
            ledger: persistence.clone(),
            events: persistence.clone(),
            force_close: lifecycle.force_close_flag(),
            password: config.api.password.clone(),
        });
        let bind = config.api.bind.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(&bind, state).await {
                error!("❌ [API] {:#}", e);
            }
        });
    }

    // Shutdown signal
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    info!("🚀 Starting trading loop...");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let lifecycle = TradingLoop::new(lifecycle, shared_config, shutdown).run().await;

    if let Some(position) = lifecycle.state().as_open() {
        warn!(
            symbol = %position.symbol,
            direction = %position.direction,
            quantity = %position.quantity,
            "⚠️  Exiting with an open position; it will be adopted on next start"
        );
    }
    info!("👋 Gale Trader shutdown complete");
    Ok(())
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "gale-trader.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("gale_trader=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!(
        "   Symbol: {} ({} candles of {})",
        config.strategy.symbol, config.strategy.candle_limit, config.strategy.interval
    );
    info!(
        "   Target: {}%, Stop: {}%",
        config.strategy.profit_percent * dec!(100),
        config.strategy.loss_percent * dec!(100)
    );
    let ladder: Vec<String> = config
        .staking
        .ladder
        .iter()
        .map(|size| size.to_string())
        .collect();
    info!("   Staking Ladder: [{}]", ladder.join(", "));
    info!(
        "   Max Ladder Index: {}, Emergency Stop: {} losses",
        config.staking.max_ladder_index, config.staking.emergency_stop_losses
    );
    info!(
        "   Cooldowns: emergency {}s, ladder {}s",
        config.staking.emergency_cooldown_secs, config.staking.ladder_cooldown_secs
    );
    info!("   Database: {}", config.persistence.db_path);
    if config.api.enabled {
        info!(
            "   Status API: {}{}",
            config.api.bind,
            if config.api.password.is_some() {
                " (password protected)"
            } else {
                ""
            }
        );
    }
}

/// Print the persisted ledger without starting the bot.
fn show_status(db_path: &str, verbose: bool) -> Result<()> {
    use std::path::Path;

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              GALE TRADER STATUS                            ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    if !Path::new(db_path).exists() {
        println!("\n❌ Database not found: {}", db_path);
        println!("   The bot has not been started yet, or the database path is incorrect.");
        return Ok(());
    }

    let persistence = PersistenceManager::new(db_path)?;
    let records = persistence.all_records_newest_first()?;
    let summary = summarize(&records);
    let streak = persistence.count()?;

    println!("\n📊 Performance");
    println!("   ├─ Trades:           {}", records.len());
    println!("   ├─ Gains / Losses:   {} / {}", summary.gains, summary.losses);
    println!("   ├─ Hit Rate:         {}%", summary.hit_rate);
    println!("   ├─ Total Profit:     ${:.2}", summary.total_profit);
    println!("   └─ Loss Streak:      {}", streak);

    let shown = if verbose { 20 } else { 5 };
    if !records.is_empty() {
        println!("\n📜 Recent Trades");
        for record in records.iter().take(shown) {
            println!(
                "   ├─ {} {} {} {} → {} qty {}: {} ${:.2} ({}%, {})",
                record.closed_at.format("%Y-%m-%d %H:%M:%S"),
                record.symbol,
                record.direction,
                record.entry_price,
                record.exit_price,
                record.quantity,
                record.outcome.as_str(),
                record.profit,
                record.roi_percent,
                record.exit_reason.as_str()
            );
        }
    }

    if verbose {
        let events = persistence.recent_events(20)?;
        if !events.is_empty() {
            println!("\n📝 Event Log");
            for event in &events {
                println!(
                    "   ├─ {} [{}] {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.level,
                    event.message
                );
            }
        }
    }

    Ok(())
}
