//! Configuration management for the gale trader.
//!
//! Loads settings from environment variables and config files. The trading
//! parameters can also be adjusted at runtime through [`SharedConfig`]; the
//! lifecycle reads a fresh copy on every tick.

use crate::error::TradeError;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Intervals accepted by the futures kline endpoint.
pub const VALID_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Binance API credentials
    #[serde(default)]
    pub binance: BinanceConfig,
    /// Symbol, candles and exit percentages
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Staking ladder and loss-streak safeguards
    #[serde(default)]
    pub staking: StakingConfig,
    /// Loop cadence and request timeouts
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// SQLite location
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Status API
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret key for signing requests
    #[serde(default, skip_serializing)]
    pub secret_key: String,
    /// Use testnet instead of production
    #[serde(default)]
    pub testnet: bool,
    /// Override the futures REST base URL (tests, proxies)
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Futures symbol traded (single symbol)
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Candle interval fed to the signal detector
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Number of candles requested per signal check
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u16,
    /// Take-profit distance as a fraction of entry (0.005 = 0.5%)
    #[serde(default = "default_profit_percent")]
    pub profit_percent: Decimal,
    /// Stop-loss distance as a fraction of entry (0.0045 = 0.45%)
    #[serde(default = "default_loss_percent")]
    pub loss_percent: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Stake sizes indexed by consecutive losses.
    /// Accepts a list or a comma separated string ("0.006,0.012,...").
    #[serde(default = "default_ladder", deserialize_with = "deserialize_ladder")]
    pub ladder: Vec<Decimal>,
    /// Streak at which the ladder is considered exhausted
    #[serde(default = "default_max_ladder_index")]
    pub max_ladder_index: u32,
    /// Streak that trips the emergency stop
    #[serde(default = "default_emergency_stop_losses")]
    pub emergency_stop_losses: u32,
    /// Entry suspension after an emergency stop
    #[serde(default = "default_emergency_cooldown_secs")]
    pub emergency_cooldown_secs: u64,
    /// Entry suspension after ladder exhaustion
    #[serde(default = "default_ladder_cooldown_secs")]
    pub ladder_cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound for every exchange call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Delay between ticks while a position is open
    #[serde(default = "default_open_poll_ms")]
    pub open_poll_ms: u64,
    /// Delay between ticks while flat
    #[serde(default = "default_flat_poll_ms")]
    pub flat_poll_ms: u64,
    /// Delay after a failed tick
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Serve the status API
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer password required on every route when set
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

// Default value functions
fn default_symbol() -> String {
    "ETHUSDT".to_string()
}

fn default_interval() -> String {
    "1m".to_string()
}

fn default_candle_limit() -> u16 {
    610
}

fn default_profit_percent() -> Decimal {
    Decimal::new(50, 4) // 0.0050
}

fn default_loss_percent() -> Decimal {
    Decimal::new(45, 4) // 0.0045
}

fn default_ladder() -> Vec<Decimal> {
    vec![
        Decimal::new(6, 3),
        Decimal::new(12, 3),
        Decimal::new(24, 3),
        Decimal::new(48, 3),
        Decimal::new(96, 3),
    ]
}

fn default_max_ladder_index() -> u32 {
    5
}

fn default_emergency_stop_losses() -> u32 {
    5
}

fn default_emergency_cooldown_secs() -> u64 {
    3600
}

fn default_ladder_cooldown_secs() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    10
}

fn default_open_poll_ms() -> u64 {
    1000
}

fn default_flat_poll_ms() -> u64 {
    5000
}

fn default_error_backoff_ms() -> u64 {
    10_000
}

fn default_db_path() -> String {
    "data/gale.db".to_string()
}

fn default_api_enabled() -> bool {
    true
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

/// Ladder as written in a config file (list) or an env var (comma string).
#[derive(Deserialize)]
#[serde(untagged)]
enum LadderRepr {
    List(Vec<Decimal>),
    Csv(String),
}

/// Parse "0.006, 0.012,0.024" into stake sizes.
pub fn parse_ladder(raw: &str) -> Result<Vec<Decimal>, TradeError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Decimal::from_str(s)
                .map_err(|e| TradeError::ConfigInvalid(format!("ladder entry '{}': {}", s, e)))
        })
        .collect()
}

fn deserialize_ladder<'de, D>(deserializer: D) -> std::result::Result<Vec<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match LadderRepr::deserialize(deserializer)? {
        LadderRepr::List(values) => Ok(values),
        LadderRepr::Csv(raw) => parse_ladder(&raw).map_err(serde::de::Error::custom),
    }
}

fn deserialize_opt_ladder<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<Decimal>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<LadderRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(LadderRepr::List(values)) => Ok(Some(values)),
        Some(LadderRepr::Csv(raw)) => parse_ladder(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("GALE"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), TradeError> {
        self.strategy.validate()?;
        self.staking.validate()?;
        self.execution.validate()
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), TradeError> {
        ensure(!self.symbol.trim().is_empty(), "symbol must not be empty")?;
        ensure(
            VALID_INTERVALS.contains(&self.interval.as_str()),
            &format!("unknown candle interval '{}'", self.interval),
        )?;
        ensure(self.candle_limit >= 2, "candle_limit must be at least 2")?;
        ensure(
            self.profit_percent > Decimal::ZERO && self.profit_percent < Decimal::ONE,
            "profit_percent must be between 0 and 1",
        )?;
        ensure(
            self.loss_percent > Decimal::ZERO && self.loss_percent < Decimal::ONE,
            "loss_percent must be between 0 and 1",
        )
    }
}

impl StakingConfig {
    pub fn validate(&self) -> Result<(), TradeError> {
        ensure(!self.ladder.is_empty(), "staking ladder must not be empty")?;
        ensure(
            self.ladder.iter().all(|size| *size > Decimal::ZERO),
            "staking ladder entries must be positive",
        )?;
        ensure(self.max_ladder_index >= 1, "max_ladder_index must be >= 1")?;
        ensure(
            self.emergency_stop_losses >= 1,
            "emergency_stop_losses must be >= 1",
        )
    }

    pub fn emergency_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.emergency_cooldown_secs as i64)
    }

    pub fn ladder_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ladder_cooldown_secs as i64)
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<(), TradeError> {
        ensure(
            self.request_timeout_secs >= 1,
            "request_timeout_secs must be >= 1",
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn open_poll(&self) -> Duration {
        Duration::from_millis(self.open_poll_ms)
    }

    pub fn flat_poll(&self) -> Duration {
        Duration::from_millis(self.flat_poll_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

fn ensure(condition: bool, message: &str) -> Result<(), TradeError> {
    if condition {
        Ok(())
    } else {
        Err(TradeError::ConfigInvalid(message.to_string()))
    }
}

/// Operator-supplied partial update of the trading parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub symbol: Option<String>,
    pub interval: Option<String>,
    pub profit_percent: Option<Decimal>,
    pub loss_percent: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_opt_ladder")]
    pub ladder: Option<Vec<Decimal>>,
    pub max_ladder_index: Option<u32>,
    pub emergency_stop_losses: Option<u32>,
}

impl ConfigUpdate {
    /// Produce the updated configuration without touching `base`.
    pub fn apply_to(&self, base: &Config) -> Result<Config, TradeError> {
        let mut next = base.clone();
        if let Some(symbol) = &self.symbol {
            next.strategy.symbol = symbol.trim().to_uppercase();
        }
        if let Some(interval) = &self.interval {
            next.strategy.interval = interval.clone();
        }
        if let Some(p) = self.profit_percent {
            next.strategy.profit_percent = p;
        }
        if let Some(l) = self.loss_percent {
            next.strategy.loss_percent = l;
        }
        if let Some(ladder) = &self.ladder {
            next.staking.ladder = ladder.clone();
        }
        if let Some(max) = self.max_ladder_index {
            next.staking.max_ladder_index = max;
        }
        if let Some(stop) = self.emergency_stop_losses {
            next.staking.emergency_stop_losses = stop;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Runtime-adjustable configuration shared by the loop and the status API.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current configuration.
    pub async fn snapshot(&self) -> Config {
        self.inner.read().await.clone()
    }

    /// Validate and swap in an update. The old config stays on error.
    pub async fn update(&self, update: &ConfigUpdate) -> Result<Config, TradeError> {
        let mut guard = self.inner.write().await;
        let next = update.apply_to(&guard)?;
        *guard = next.clone();
        Ok(next)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binance: BinanceConfig::default(),
            strategy: StrategyConfig::default(),
            staking: StakingConfig::default(),
            execution: ExecutionConfig::default(),
            persistence: PersistenceConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            interval: default_interval(),
            candle_limit: default_candle_limit(),
            profit_percent: default_profit_percent(),
            loss_percent: default_loss_percent(),
        }
    }
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            ladder: default_ladder(),
            max_ladder_index: default_max_ladder_index(),
            emergency_stop_losses: default_emergency_stop_losses(),
            emergency_cooldown_secs: default_emergency_cooldown_secs(),
            ladder_cooldown_secs: default_ladder_cooldown_secs(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            open_poll_ms: default_open_poll_ms(),
            flat_poll_ms: default_flat_poll_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            bind: default_bind(),
            password: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.staking.ladder.len(), 5);
        assert_eq!(config.staking.ladder[4], dec!(0.096));
    }

    #[test]
    fn test_empty_ladder_rejected() {
        let mut config = Config::default();
        config.staking.ladder.clear();
        assert!(matches!(
            config.validate(),
            Err(TradeError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_non_positive_percentages_rejected() {
        let mut config = Config::default();
        config.strategy.profit_percent = Decimal::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.strategy.loss_percent = dec!(-0.01);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.staking.ladder = vec![dec!(0.006), Decimal::ZERO];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_ladder_csv() {
        let ladder = parse_ladder("0.006, 0.012,0.024").unwrap();
        assert_eq!(ladder, vec![dec!(0.006), dec!(0.012), dec!(0.024)]);
        assert!(parse_ladder("0.006,abc").is_err());
    }

    #[test]
    fn test_ladder_deserializes_from_string_and_list() {
        let from_csv: StakingConfig =
            serde_json::from_str(r#"{"ladder": "0.01,0.02"}"#).unwrap();
        assert_eq!(from_csv.ladder, vec![dec!(0.01), dec!(0.02)]);

        let from_list: StakingConfig =
            serde_json::from_str(r#"{"ladder": ["0.01", "0.02", "0.04"]}"#).unwrap();
        assert_eq!(from_list.ladder.len(), 3);
        assert_eq!(from_list.max_ladder_index, 5);
    }

    #[test]
    fn test_update_applies_and_validates() {
        let base = Config::default();
        let update = ConfigUpdate {
            symbol: Some("btcusdt".into()),
            profit_percent: Some(dec!(0.01)),
            ..Default::default()
        };
        let next = update.apply_to(&base).unwrap();
        assert_eq!(next.strategy.symbol, "BTCUSDT");
        assert_eq!(next.strategy.profit_percent, dec!(0.01));
        assert_eq!(next.strategy.loss_percent, base.strategy.loss_percent);

        let bad = ConfigUpdate {
            ladder: Some(vec![]),
            ..Default::default()
        };
        assert!(bad.apply_to(&base).is_err());
    }

    #[tokio::test]
    async fn test_shared_config_keeps_old_value_on_invalid_update() {
        let shared = SharedConfig::new(Config::default());
        let bad = ConfigUpdate {
            interval: Some("7m".into()),
            ..Default::default()
        };
        assert!(shared.update(&bad).await.is_err());
        assert_eq!(shared.snapshot().await.strategy.interval, "1m");

        let good = ConfigUpdate {
            interval: Some("5m".into()),
            ..Default::default()
        };
        shared.update(&good).await.unwrap();
        assert_eq!(shared.snapshot().await.strategy.interval, "5m");
    }
}
