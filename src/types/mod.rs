//! Shared types for the exchange client.
//!
//! This module contains the primitive market types used across the crate and
//! the JSON bodies exchanged with the exchange.
//!
//! - [`order`] - REST request bodies (buildup, limit/market orders, session calls)
//! - [`messages`] - Streaming commands, server messages and decoded book records

pub mod messages;
pub mod order;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use messages::{BookSnapshot, BookUpdate, WsMessage};
pub use order::{LimitOrderRequest, MarketOrderRequest};

/// Price of a level
///
/// Exchange prices are decimals; using `Decimal` instead of floating point for:
/// - Exact arithmetic (no floating point errors)
/// - Total ordering, so prices can key a `BTreeMap`
pub type Price = Decimal;

/// Resting quantity at a price level
pub type Quantity = Decimal;

/// Side of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy interest, best price is the highest
    Bid,
    /// Sell interest, best price is the lowest
    Ask,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Whether this is the bid side (the `isBid` flag of the REST API)
    pub fn is_bid(self) -> bool {
        matches!(self, Side::Bid)
    }
}

/// A single price level: `[price, quantity]` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Price, Quantity)", into = "(Price, Quantity)")]
pub struct PriceLevel {
    /// Level price
    pub price: Price,
    /// Resting quantity
    pub quantity: Quantity,
}

impl PriceLevel {
    /// Create a new price level
    pub const fn new(price: Price, quantity: Quantity) -> Self {
        Self { price, quantity }
    }
}

impl From<(Price, Quantity)> for PriceLevel {
    fn from((price, quantity): (Price, Quantity)) -> Self {
        Self { price, quantity }
    }
}

impl From<PriceLevel> for (Price, Quantity) {
    fn from(level: PriceLevel) -> Self {
        (level.price, level.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
        assert!(Side::Bid.is_bid());
        assert!(!Side::Ask.is_bid());
    }

    #[test]
    fn test_serde_side() {
        let json = serde_json::to_string(&Side::Bid).unwrap();
        assert_eq!(json, "\"bid\"");

        let side: Side = serde_json::from_str("\"ask\"").unwrap();
        assert_eq!(side, Side::Ask);
    }

    #[test]
    fn test_price_level_accepts_numbers_and_strings() {
        let level: PriceLevel = serde_json::from_str("[100.5, 3]").unwrap();
        assert_eq!(level, PriceLevel::new(dec!(100.5), dec!(3)));

        let level: PriceLevel = serde_json::from_str(r#"["0.06824", "12.5"]"#).unwrap();
        assert_eq!(level, PriceLevel::new(dec!(0.06824), dec!(12.5)));
    }
}
