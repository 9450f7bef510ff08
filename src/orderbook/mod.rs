//! Orderbook implementation.
//!
//! This module provides the orderbook data structure and its concurrent read
//! surface:
//!
//! - [`PriceLevelMap`] - one side of a book, best price first
//! - [`OrderBook`] - both sides plus sequence tracking, never crossed
//! - [`BookPublisher`] / [`BookReader`] - lock-free publication of immutable
//!   versions from the single writer to any number of readers
//!
//! # Example
//!
//! ```rust
//! use exchange_client::orderbook::OrderBook;
//! use exchange_client::types::{PriceLevel, Side};
//! use rust_decimal::Decimal;
//!
//! let mut book = OrderBook::new("BTC-PERP");
//! book.load_snapshot(
//!     &[PriceLevel::new(Decimal::from(100), Decimal::from(5))],
//!     &[PriceLevel::new(Decimal::from(101), Decimal::from(3))],
//!     10,
//! )?;
//!
//! // Apply the next update in sequence
//! book.apply_update(Side::Bid, Decimal::from(100), Decimal::ZERO, 11)?;
//! assert_eq!(book.best_bid(), None);
//! # Ok::<(), exchange_client::Error>(())
//! ```

pub mod book;
pub mod level;
pub mod shared;

pub use book::{BookError, OrderBook};
pub use level::PriceLevelMap;
pub use shared::{BookPublisher, BookReader, TopOfBook};
