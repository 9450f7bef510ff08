//! Streaming message types.
//!
//! This module contains the commands sent to the exchange's streaming
//! endpoint, the messages received from it, and the decoded orderbook records
//! (snapshots and incremental updates) that the sync engine consumes.

use serde::{Deserialize, Serialize};

use super::{Price, PriceLevel, Quantity, Side};

/// Command sent to the streaming server
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to book updates for a ticker
    Subscribe {
        /// Instrument ticker
        ticker: String,
    },
    /// Unsubscribe from a ticker
    Unsubscribe {
        /// Instrument ticker
        ticker: String,
    },
}

/// Message received from the streaming server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Subscription confirmed
    Subscribed(SubscriptionMsg),
    /// Unsubscription confirmed
    Unsubscribed(SubscriptionMsg),
    /// Incremental book update
    Update(UpdateMsg),
    /// Error response
    Error(ErrorMsg),
    /// Keep-alive
    Heartbeat,
}

/// Subscription acknowledgement
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionMsg {
    /// Instrument ticker
    pub ticker: String,
}

/// Incremental book update as it appears on the wire
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMsg {
    /// Instrument ticker
    pub ticker: String,
    /// Side that changed
    pub side: Side,
    /// Price level that changed
    pub price: Price,
    /// New absolute quantity at that price (0 removes the level)
    pub quantity: Quantity,
    /// Feed sequence number
    pub sequence: u64,
}

/// Error message
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMsg {
    /// Error code (if provided)
    #[serde(default)]
    pub code: Option<u32>,
    /// Error message
    pub message: String,
    /// Whether the server has rejected the session for good
    /// (auth revoked, subscription refused)
    #[serde(default)]
    pub fatal: bool,
}

/// A decoded incremental update, ready to be applied to an orderbook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookUpdate {
    /// Side that changed
    pub side: Side,
    /// Price level that changed
    pub price: Price,
    /// New absolute quantity at that price
    pub quantity: Quantity,
    /// Feed sequence number
    pub sequence: u64,
}

impl BookUpdate {
    /// Create a new update
    pub const fn new(side: Side, price: Price, quantity: Quantity, sequence: u64) -> Self {
        Self {
            side,
            price,
            quantity,
            sequence,
        }
    }
}

impl From<&UpdateMsg> for BookUpdate {
    fn from(msg: &UpdateMsg) -> Self {
        Self::new(msg.side, msg.price, msg.quantity, msg.sequence)
    }
}

/// Full point-in-time dump of both sides of a book plus its sequence marker
///
/// Price levels are represented as `[price, quantity]` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Bid levels, any order
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    /// Ask levels, any order
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
    /// Sequence number the snapshot is consistent with
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_subscribe_command_serialization() {
        let cmd = WsCommand::Subscribe {
            ticker: "BTC-PERP".to_string(),
        };

        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"type":"subscribe","ticker":"BTC-PERP"}"#);
    }

    #[test]
    fn test_update_deserialization() {
        let json = r#"{
            "type": "update",
            "ticker": "BTC-PERP",
            "side": "ask",
            "price": "101.25",
            "quantity": 5,
            "sequence": 42
        }"#;

        let msg: WsMessage = serde_json::from_str(json).unwrap();
        match msg {
            WsMessage::Update(update) => {
                assert_eq!(update.ticker, "BTC-PERP");
                let update = BookUpdate::from(&update);
                assert_eq!(
                    update,
                    BookUpdate::new(Side::Ask, dec!(101.25), dec!(5), 42)
                );
            }
            _ => panic!("Expected Update"),
        }
    }

    #[test]
    fn test_error_defaults_to_non_fatal() {
        let msg: WsMessage =
            serde_json::from_str(r#"{"type":"error","message":"slow down"}"#).unwrap();
        match msg {
            WsMessage::Error(err) => {
                assert!(!err.fatal);
                assert_eq!(err.code, None);
            }
            _ => panic!("Expected Error"),
        }
    }

    #[test]
    fn test_heartbeat() {
        let msg: WsMessage = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert!(matches!(msg, WsMessage::Heartbeat));
    }

    #[test]
    fn test_snapshot_deserialization() {
        let json = r#"{"bids": [[100, 5], [99, 2]], "asks": [["101", "3"]], "sequence": 10}"#;
        let snapshot: BookSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.sequence, 10);
        assert_eq!(snapshot.bids.len(), 2);
        assert_eq!(snapshot.asks[0], PriceLevel::new(dec!(101), dec!(3)));
    }
}
