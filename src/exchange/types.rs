//! Type definitions for FCoin API requests and responses.

use crate::error::TradeError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Envelope around every FCoin response.
///
/// A zero `status` means success; anything else is an application-level
/// failure even though the HTTP exchange itself succeeded.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub status: i64,
    pub msg: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            status: 0,
            msg: None,
            data: Some(data),
        }
    }

    /// Failed response with an application status.
    pub fn error(status: i64, msg: impl Into<String>) -> Self {
        Self {
            status,
            msg: Some(msg.into()),
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    /// Unwrap the payload, turning a non-zero status into a [`TradeError`].
    pub fn into_result(self, endpoint: &'static str) -> Result<T, TradeError> {
        if self.status != 0 {
            return Err(TradeError::Status {
                endpoint,
                status: self.status,
                msg: self.msg,
            });
        }
        self.data.ok_or(TradeError::MissingData(endpoint))
    }
}

/// Raw market ticker payload.
///
/// `ticker` is a positional array of 11 numbers, see [`Quote::from_ticker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerData {
    #[serde(rename = "type")]
    pub kind: String,
    pub seq: i64,
    pub ticker: Vec<Decimal>,
}

/// Market snapshot for one trading pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub kind: String,
    pub seq: i64,
    pub last_price: Decimal,
    pub last_volume: Decimal,
    /// Highest bid ("buy one" price)
    pub best_bid: Decimal,
    pub best_bid_size: Decimal,
    /// Lowest ask ("sell one" price)
    pub best_ask: Decimal,
    pub best_ask_size: Decimal,
    /// Price 24 hours ago
    pub day_open: Decimal,
    pub day_high: Decimal,
    pub day_low: Decimal,
    pub base_volume: Decimal,
    pub quote_volume: Decimal,
}

impl Quote {
    /// Number of positional fields in a FCoin ticker.
    pub const TICKER_FIELDS: usize = 11;

    /// Build a quote from the positional ticker array.
    pub fn from_ticker(data: TickerData) -> Result<Self, TradeError> {
        let t = &data.ticker;
        if t.len() != Self::TICKER_FIELDS {
            return Err(TradeError::MalformedTicker(t.len()));
        }

        Ok(Self {
            last_price: t[0],
            last_volume: t[1],
            best_bid: t[2],
            best_bid_size: t[3],
            best_ask: t[4],
            best_ask_size: t[5],
            day_open: t[6],
            day_high: t[7],
            day_low: t[8],
            base_volume: t[9],
            quote_volume: t[10],
            kind: data.kind,
            seq: data.seq,
        })
    }
}

/// Balance of one currency, exactly as the exchange reports it.
///
/// Quantities stay strings until they are used so nothing is lost at the wire
/// boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub currency: String,
    pub available: String,
    pub frozen: String,
    /// Total holding (available + frozen)
    pub balance: String,
}

impl BalanceRecord {
    pub fn new(currency: &str, available: Decimal, frozen: Decimal) -> Self {
        Self {
            currency: currency.to_string(),
            available: available.to_string(),
            frozen: frozen.to_string(),
            balance: (available + frozen).to_string(),
        }
    }

    /// Parsed available quantity.
    pub fn available(&self) -> Result<Decimal, TradeError> {
        parse_decimal("available", &self.available)
    }

    /// Parsed frozen quantity.
    pub fn frozen(&self) -> Result<Decimal, TradeError> {
        parse_decimal("frozen", &self.frozen)
    }

    /// Parsed total quantity.
    pub fn total(&self) -> Result<Decimal, TradeError> {
        parse_decimal("balance", &self.balance)
    }
}

/// Parse an exchange decimal string. Malformed input is an error, never zero.
pub fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, TradeError> {
    Decimal::from_str(value.trim()).map_err(|_| TradeError::Parse {
        field,
        value: value.to_string(),
    })
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type. The engine only ever places limit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
        }
    }
}

/// Order lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Submitted,
    PartialFilled,
    PartialCanceled,
    Filled,
    Canceled,
    PendingCancel,
}

impl OrderState {
    /// States of orders still resting on the book.
    pub const OPEN: [OrderState; 2] = [OrderState::Submitted, OrderState::PartialFilled];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Submitted => "submitted",
            OrderState::PartialFilled => "partial_filled",
            OrderState::PartialCanceled => "partial_canceled",
            OrderState::Filled => "filled",
            OrderState::Canceled => "canceled",
            OrderState::PendingCancel => "pending_cancel",
        }
    }

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

/// An order as listed by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: OrderSide,
    pub price: String,
    pub amount: String,
    pub state: OrderState,
    #[serde(default)]
    pub executed_value: String,
    #[serde(default)]
    pub fill_fees: String,
    #[serde(default)]
    pub filled_amount: String,
    /// Creation time in milliseconds since the epoch
    pub created_at: i64,
    #[serde(default)]
    pub source: String,
}

/// New order request. Price and amount are pre-formatted decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrder {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub price: String,
    pub amount: String,
}

impl NewOrder {
    /// Limit order for `symbol`.
    pub fn limit(symbol: &str, side: OrderSide, price: String, amount: String) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            price,
            amount,
        }
    }

    /// Body parameters sorted by key, as used for request signing.
    pub fn params(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("amount", self.amount.clone()),
            ("price", self.price.clone()),
            ("side", self.side.as_str().to_string()),
            ("symbol", self.symbol.clone()),
            ("type", self.order_type.as_str().to_string()),
        ])
    }
}

/// Filter for listing orders.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderQuery {
    pub symbol: String,
    pub states: Vec<OrderState>,
    pub limit: u32,
}

impl OrderQuery {
    /// Default page size used by the engine.
    pub const DEFAULT_LIMIT: u32 = 10;

    /// Orders of `symbol` in a single `state`.
    pub fn new(symbol: &str, state: OrderState) -> Self {
        Self {
            symbol: symbol.to_string(),
            states: vec![state],
            limit: Self::DEFAULT_LIMIT,
        }
    }

    /// Query string with keys in sorted order.
    pub fn to_query_string(&self) -> String {
        let states = self
            .states
            .iter()
            .map(OrderState::as_str)
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "limit={}&states={}&symbol={}",
            self.limit,
            urlencoding::encode(&states),
            urlencoding::encode(&self.symbol)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_from_ticker() {
        let json = r#"{
            "status": 0,
            "data": {
                "type": "ticker.ftusdt",
                "seq": 2001,
                "ticker": [0.1201, 35.0, 0.12, 100.0, 0.1205, 80.0, 0.118, 0.125, 0.117, 1500000.0, 182000.5]
            }
        }"#;

        let response: ApiResponse<TickerData> = serde_json::from_str(json).unwrap();
        let quote = Quote::from_ticker(response.into_result("ticker").unwrap()).unwrap();

        assert_eq!(quote.seq, 2001);
        assert_eq!(quote.kind, "ticker.ftusdt");
        assert_eq!(quote.best_bid, dec!(0.12));
        assert_eq!(quote.best_ask, dec!(0.1205));
        assert_eq!(quote.best_bid_size, dec!(100));
        assert_eq!(quote.quote_volume, dec!(182000.5));
    }

    #[test]
    fn test_short_ticker_rejected() {
        let data = TickerData {
            kind: "ticker.ftusdt".to_string(),
            seq: 1,
            ticker: vec![dec!(1); 7],
        };
        assert!(matches!(
            Quote::from_ticker(data),
            Err(TradeError::MalformedTicker(7))
        ));
    }

    #[test]
    fn test_non_zero_status_is_error() {
        let json = r#"{"status": 6005, "msg": "api key error"}"#;
        let response: ApiResponse<Vec<BalanceRecord>> = serde_json::from_str(json).unwrap();
        assert!(!response.is_ok());

        match response.into_result("balance") {
            Err(TradeError::Status { status, msg, .. }) => {
                assert_eq!(status, 6005);
                assert_eq!(msg.as_deref(), Some("api key error"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    // Decoding must only need `DeserializeOwned`, the bound the client uses.
    fn decode<T: serde::de::DeserializeOwned>(json: &str) -> ApiResponse<T> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_status_only_envelope_decodes() {
        let response: ApiResponse<OpenOrder> = decode(r#"{"status": 3008}"#);
        assert_eq!(response.status, 3008);
        assert!(response.msg.is_none());
        assert!(response.data.is_none());

        let response: ApiResponse<bool> = decode(r#"{"status": 0, "data": true}"#);
        assert!(response.into_result("cancel order").unwrap());

        let response: ApiResponse<String> = decode(r#"{"status": 0}"#);
        assert!(matches!(
            response.into_result("create order"),
            Err(TradeError::MissingData("create order"))
        ));
    }

    #[test]
    fn test_malformed_balance_is_not_zero() {
        let record = BalanceRecord {
            currency: "ft".to_string(),
            available: "12.5x".to_string(),
            frozen: "0".to_string(),
            balance: "12.5".to_string(),
        };

        assert!(matches!(
            record.available(),
            Err(TradeError::Parse { field: "available", .. })
        ));
        assert_eq!(record.total().unwrap(), dec!(12.5));
    }

    #[test]
    fn test_open_order_decoding() {
        let json = r#"{
            "id": "9d17a03b852e48c0b3920c7412867623",
            "symbol": "ftusdt",
            "type": "limit",
            "side": "buy",
            "price": "0.12000000",
            "amount": "10.00",
            "state": "partial_filled",
            "executed_value": "0.6",
            "fill_fees": "0.005",
            "filled_amount": "5.00",
            "created_at": 1531734510000,
            "source": "api"
        }"#;

        let order: OpenOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.state, OrderState::PartialFilled);
        assert!(order.state.is_open());
        assert_eq!(order.created_at, 1_531_734_510_000);
    }

    #[test]
    fn test_order_query_string_is_sorted() {
        let query = OrderQuery::new("ftusdt", OrderState::PartialFilled);
        assert_eq!(
            query.to_query_string(),
            "limit=10&states=partial_filled&symbol=ftusdt"
        );
    }

    #[test]
    fn test_new_order_params() {
        let order = NewOrder::limit(
            "ftusdt",
            OrderSide::Sell,
            "0.12000000".to_string(),
            "10.00".to_string(),
        );
        let joined = order
            .params()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        assert_eq!(
            joined,
            "amount=10.00&price=0.12000000&side=sell&symbol=ftusdt&type=limit"
        );
        assert_eq!(
            serde_json::to_value(&order).unwrap()["type"],
            serde_json::json!("limit")
        );
    }
}
