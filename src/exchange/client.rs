//! Binance USDⓈ-M futures REST client.

use crate::config::BinanceConfig;
use crate::error::{TradeError, TradeResult};
use crate::exchange::traits::{Candle, ExchangePosition, ExecutionPort, Fill, MarketDataPort};
use crate::exchange::types::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

const FUTURES_BASE_URL: &str = "https://fapi.binance.com";
const FUTURES_TESTNET_URL: &str = "https://testnet.binancefuture.com";

/// Binance API client for the futures market.
pub struct BinanceClient {
    http: Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    /// Server time minus local time, in milliseconds
    time_offset_ms: AtomicI64,
    /// LOT_SIZE step per symbol, fetched once
    lot_steps: RwLock<HashMap<String, Decimal>>,
}

impl BinanceClient {
    /// Create a new Binance client from configuration.
    pub fn new(config: &BinanceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = match &config.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if config.testnet => FUTURES_TESTNET_URL.to_string(),
            None => FUTURES_BASE_URL.to_string(),
        };

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            base_url,
            time_offset_ms: AtomicI64::new(0),
            lot_steps: RwLock::new(HashMap::new()),
        })
    }

    /// Whether credentials for signed endpoints are present.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty()
    }

    /// Generate HMAC-SHA256 signature for authenticated requests.
    fn sign(&self, query_string: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Local time in milliseconds, corrected by the server offset.
    fn timestamp(&self) -> i64 {
        let local = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        local + self.time_offset_ms.load(Ordering::Relaxed)
    }

    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let mut query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("timestamp={}", self.timestamp()));
        let signature = self.sign(&query);
        format!("{}&signature={}", query, signature)
    }

    /// Turn non-2xx responses into errors carrying the venue's message.
    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| format!("code {}: {}", e.code, e.msg))
                .unwrap_or(body);
            anyhow::bail!("{} failed with HTTP {}: {}", what, status, message);
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }

    /// Align request timestamps with the server clock.
    #[instrument(skip(self))]
    pub async fn sync_time(&self) -> Result<i64> {
        let url = format!("{}/fapi/v1/time", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch server time")?;
        let server: ServerTime = Self::decode(response, "server time").await?;

        let local = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        let offset = server.server_time - local;
        self.time_offset_ms.store(offset, Ordering::Relaxed);
        info!(offset_ms = offset, "Server time offset synchronised");
        Ok(offset)
    }

    // ==================== Market Data (Public) ====================

    /// Get the latest price for a symbol.
    #[instrument(skip(self))]
    pub async fn get_ticker_price(&self, symbol: &str) -> Result<TickerPrice> {
        let url = format!("{}/fapi/v1/ticker/price?symbol={}", self.base_url, symbol);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch ticker price")?;

        Self::decode(response, "ticker price").await
    }

    /// Get recent klines, oldest first.
    #[instrument(skip(self))]
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: u16) -> Result<Vec<RawKline>> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch klines")?;

        Self::decode(response, "klines").await
    }

    /// Get futures exchange information.
    #[instrument(skip(self))]
    pub async fn get_futures_exchange_info(&self) -> Result<FuturesExchangeInfo> {
        let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch exchange info")?;

        Self::decode(response, "exchange info").await
    }

    // ==================== Account (Authenticated) ====================

    /// Get current positions for a symbol.
    #[instrument(skip(self))]
    pub async fn get_position_risk(&self, symbol: &str) -> Result<Vec<PositionRisk>> {
        let query = self.signed_query(&[("symbol", symbol.to_string())]);
        let url = format!("{}/fapi/v2/positionRisk?{}", self.base_url, query);

        let response = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to fetch positions")?;

        Self::decode(response, "position risk").await
    }

    // ==================== Orders (Authenticated) ====================

    /// Place a new futures market order.
    #[instrument(skip(self))]
    pub async fn place_futures_order(&self, order: &NewOrder) -> Result<OrderResponse> {
        let mut params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", order.quantity.to_string()),
            // RESULT makes the venue report avgPrice for the fill
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if order.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        let query = self.signed_query(&params);
        let url = format!("{}/fapi/v1/order?{}", self.base_url, query);

        debug!("Placing futures order: {:?}", order);

        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to place futures order")?;

        Self::decode(response, "order").await
    }
}

fn candle_from_raw(raw: &RawKline) -> Option<Candle> {
    Some(Candle {
        open_time: raw.open_time()?,
        open: raw.decimal_at(1)?,
        high: raw.decimal_at(2)?,
        low: raw.decimal_at(3)?,
        close: raw.decimal_at(4)?,
    })
}

fn unavailable(err: anyhow::Error) -> TradeError {
    TradeError::DataUnavailable(format!("{:#}", err))
}

#[async_trait]
impl MarketDataPort for BinanceClient {
    async fn current_price(&self, symbol: &str) -> TradeResult<Decimal> {
        let ticker = self.get_ticker_price(symbol).await.map_err(unavailable)?;
        if ticker.price <= Decimal::ZERO {
            return Err(TradeError::DataUnavailable(format!(
                "non-positive price {} for {}",
                ticker.price, symbol
            )));
        }
        Ok(ticker.price)
    }

    async fn recent_candles(
        &self,
        symbol: &str,
        interval: &str,
        count: u16,
    ) -> TradeResult<Vec<Candle>> {
        let raw = self
            .get_klines(symbol, interval, count)
            .await
            .map_err(unavailable)?;

        let candles: Vec<Candle> = raw.iter().filter_map(candle_from_raw).collect();
        if candles.len() != raw.len() {
            warn!(
                %symbol,
                received = raw.len(),
                parsed = candles.len(),
                "Dropped malformed klines"
            );
        }
        Ok(candles)
    }

    async fn lot_step(&self, symbol: &str) -> TradeResult<Decimal> {
        if let Some(step) = self.lot_steps.read().await.get(symbol) {
            return Ok(*step);
        }

        let info = self
            .get_futures_exchange_info()
            .await
            .map_err(unavailable)?;
        let mut cache = self.lot_steps.write().await;
        for s in &info.symbols {
            if let Some(step) = s.lot_step() {
                cache.insert(s.symbol.clone(), step);
            }
        }

        cache.get(symbol).copied().ok_or_else(|| {
            TradeError::DataUnavailable(format!("no LOT_SIZE filter for {}", symbol))
        })
    }
}

#[async_trait]
impl ExecutionPort for BinanceClient {
    async fn market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    ) -> TradeResult<Fill> {
        let order = NewOrder {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            reduce_only,
        };
        let response = self
            .place_futures_order(&order)
            .await
            .map_err(|e| TradeError::OrderRejected(format!("{:#}", e)))?;

        match response.status {
            OrderStatus::Filled | OrderStatus::PartiallyFilled => Ok(Fill {
                order_id: response.order_id,
                side: response.side,
                quantity: response.executed_qty,
                avg_price: response.avg_price,
            }),
            // A market order still NEW has been accepted; the fill price is
            // resolved by the caller from the ticker.
            OrderStatus::New => Ok(Fill {
                order_id: response.order_id,
                side: response.side,
                quantity: response.orig_qty,
                avg_price: Decimal::ZERO,
            }),
            other => Err(TradeError::OrderRejected(format!(
                "order {} ended {:?}",
                response.order_id, other
            ))),
        }
    }

    async fn open_position(&self, symbol: &str) -> TradeResult<Option<ExchangePosition>> {
        let positions = self.get_position_risk(symbol).await.map_err(unavailable)?;
        Ok(positions
            .into_iter()
            .find(|p| p.symbol == symbol && p.position_amt != Decimal::ZERO)
            .map(|p| ExchangePosition {
                symbol: p.symbol,
                quantity: p.position_amt,
                entry_price: p.entry_price,
            }))
    }
}
