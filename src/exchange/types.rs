//! Type definitions for Binance USDⓈ-M futures API responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Server time, used to compute the request timestamp offset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    pub server_time: i64,
}

/// Latest price for a symbol.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerPrice {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
}

/// Exchange information for futures.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesExchangeInfo {
    pub symbols: Vec<FuturesSymbolInfo>,
}

/// Symbol information for futures.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesSymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub quantity_precision: u8,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

impl FuturesSymbolInfo {
    /// Step size of the LOT_SIZE filter, if present.
    pub fn lot_step(&self) -> Option<Decimal> {
        self.filters
            .iter()
            .find(|f| f.filter_type == "LOT_SIZE")
            .and_then(|f| f.step_size)
    }
}

/// One entry of a symbol's `filters` array. Only LOT_SIZE is of interest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolFilter {
    pub filter_type: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub step_size: Option<Decimal>,
}

/// Futures position information from `positionRisk`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub position_amt: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub entry_price: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub mark_price: Option<Decimal>,
}

/// A kline as returned by `/fapi/v1/klines`: a heterogeneous JSON array
/// `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct RawKline(pub Vec<serde_json::Value>);

impl RawKline {
    pub fn open_time(&self) -> Option<i64> {
        self.0.first().and_then(|v| v.as_i64())
    }

    /// Decimal field at `index`, sent as a string by the venue.
    pub fn decimal_at(&self, index: usize) -> Option<Decimal> {
        match self.0.get(index)? {
            serde_json::Value::String(s) => Decimal::from_str(s).ok(),
            serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            _ => None,
        }
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    ExpiredInMatch,
}

/// New market order request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub reduce_only: bool,
}

/// Order response from the exchange.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    pub symbol: String,
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::str")]
    pub avg_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub orig_qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub executed_qty: Decimal,
    pub side: OrderSide,
    pub update_time: i64,
}

/// Error body returned by the venue on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_raw_kline_fields() {
        let json = r#"[1700000000000,"100.10","101.00","99.50","100.80","1234.5",1700000059999,"0",10,"0","0","0"]"#;
        let kline: RawKline = serde_json::from_str(json).unwrap();
        assert_eq!(kline.open_time(), Some(1700000000000));
        assert_eq!(kline.decimal_at(1), Some(dec!(100.10)));
        assert_eq!(kline.decimal_at(4), Some(dec!(100.80)));
        assert_eq!(kline.decimal_at(20), None);
    }

    #[test]
    fn test_lot_step_from_filters() {
        let json = r#"{
            "symbol": "ETHUSDT",
            "quantityPrecision": 3,
            "filters": [
                {"filterType": "PRICE_FILTER", "tickSize": "0.01"},
                {"filterType": "LOT_SIZE", "stepSize": "0.001", "minQty": "0.001"}
            ]
        }"#;
        let info: FuturesSymbolInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.lot_step(), Some(dec!(0.001)));
    }

    #[test]
    fn test_order_response_parses() {
        let json = r#"{
            "orderId": 42, "symbol": "ETHUSDT", "status": "FILLED",
            "avgPrice": "2500.50", "origQty": "0.012", "executedQty": "0.012",
            "side": "BUY", "updateTime": 1700000000000, "type": "MARKET"
        }"#;
        let order: OrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.avg_price, dec!(2500.50));
        assert_eq!(order.side, OrderSide::Buy);
    }
}
