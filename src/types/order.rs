//! REST request and response bodies.
//!
//! The exchange's REST routes take a flat JSON body authenticated by the
//! username plus either the API key (buildup) or the session token issued by
//! the buildup call (everything else).

use serde::{Deserialize, Serialize};

use super::{Price, Quantity, Side};

/// Body of the `/buildup` authentication handshake
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildupRequest {
    /// Account username
    pub username: String,
    /// Account API key
    pub api_key: String,
}

/// Reply of the `/buildup` handshake
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildupResponse {
    /// Session token used by every other call
    pub session_token: Option<String>,
    /// JSON-encoded map of ticker -> [`BookSnapshot`](super::BookSnapshot)
    pub order_book_data: String,
}

/// Body of calls that only need the session (`/remove_all`, `/get_details`)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    /// Account username
    pub username: String,
    /// Session token from buildup
    pub session_token: String,
}

/// A limit order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitOrderRequest {
    /// Instrument ticker
    pub ticker: String,
    /// Order size
    pub volume: Quantity,
    /// Limit price
    pub price: Price,
    /// Bid (buy) or ask (sell)
    pub side: Side,
}

impl LimitOrderRequest {
    /// Create a new limit order request
    pub fn new(ticker: impl Into<String>, side: Side, volume: Quantity, price: Price) -> Self {
        Self {
            ticker: ticker.into(),
            volume,
            price,
            side,
        }
    }
}

/// A market order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketOrderRequest {
    /// Instrument ticker
    pub ticker: String,
    /// Order size
    pub volume: Quantity,
    /// Bid (buy) or ask (sell)
    pub side: Side,
}

impl MarketOrderRequest {
    /// Create a new market order request
    pub fn new(ticker: impl Into<String>, side: Side, volume: Quantity) -> Self {
        Self {
            ticker: ticker.into(),
            volume,
            side,
        }
    }
}

/// Wire body of `/limit_order`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LimitOrderBody<'a> {
    pub username: &'a str,
    pub session_token: &'a str,
    pub ticker: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Quantity,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Price,
    pub is_bid: bool,
}

/// Wire body of `/market_order`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MarketOrderBody<'a> {
    pub username: &'a str,
    pub session_token: &'a str,
    pub ticker: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Quantity,
    pub is_bid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_buildup_request_field_names() {
        let req = BuildupRequest {
            username: "trader".to_string(),
            api_key: "secret".to_string(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["username"], "trader");
        assert_eq!(json["apiKey"], "secret");
    }

    #[test]
    fn test_buildup_response() {
        let json = r#"{"sessionToken": "tok", "orderBookData": "{}"}"#;
        let resp: BuildupResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.session_token.as_deref(), Some("tok"));
        assert_eq!(resp.order_book_data, "{}");
    }

    #[test]
    fn test_limit_order_body() {
        let order = LimitOrderRequest::new("BTC-PERP", Side::Bid, dec!(2), dec!(100.5));
        let body = LimitOrderBody {
            username: "trader",
            session_token: "tok",
            ticker: &order.ticker,
            volume: order.volume,
            price: order.price,
            is_bid: order.side.is_bid(),
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["sessionToken"], "tok");
        assert_eq!(json["ticker"], "BTC-PERP");
        assert_eq!(json["volume"], 2.0);
        assert_eq!(json["price"], 100.5);
        assert_eq!(json["isBid"], true);
    }

    #[test]
    fn test_market_order_body() {
        let order = MarketOrderRequest::new("BTC-PERP", Side::Ask, dec!(1));
        let body = MarketOrderBody {
            username: "trader",
            session_token: "tok",
            ticker: &order.ticker,
            volume: order.volume,
            is_bid: order.side.is_bid(),
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["isBid"], false);
        assert!(json.get("price").is_none());
    }
}
