//! Core orderbook data structure.
//!
//! This implementation uses one [`PriceLevelMap`] (a `BTreeMap`) per side,
//! providing:
//!
//! - O(log n) insertion, deletion, and lookup
//! - O(log n) access to best bid/ask (via `first_key_value` / `last_key_value`)
//! - Ordered iteration for depth-of-book queries

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::error::Error;
use crate::types::{BookSnapshot, BookUpdate, Price, PriceLevel, Quantity, Side};

use super::level::PriceLevelMap;

/// Why an incremental update was refused.
///
/// Every variant leaves the book exactly as it was before the call; the
/// caller is expected to resynchronize from a fresh snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BookError {
    /// The update is not the next one in sequence (missing, reordered, or duplicated)
    #[error("sequence gap: expected {expected}, got {got}")]
    Gap {
        /// Sequence number the book was waiting for
        expected: u64,
        /// Sequence number of the refused update
        got: u64,
    },

    /// No snapshot has been loaded, so no update can be sequenced
    #[error("no snapshot loaded, refusing update {got}")]
    Unsynced {
        /// Sequence number of the refused update
        got: u64,
    },

    /// The update would have left best bid >= best ask
    #[error("crossed book: best bid {bid} >= best ask {ask}")]
    Crossed {
        /// Best bid the update would have produced
        bid: Price,
        /// Best ask the update would have produced
        ask: Price,
    },
}

/// Orderbook for a single instrument.
///
/// # Design Decisions
///
/// 1. **Decimal prices**: prices and quantities are `rust_decimal::Decimal`,
///    giving exact comparisons and a total order for map keys.
///
/// 2. **Strict sequencing**: every update must carry `last_sequence + 1`.
///    Anything else (including a replay of an already applied update) is a
///    gap, and the book is left untouched.
///
/// 3. **Never crossed**: an update that would make best bid >= best ask is
///    rolled back before returning.
///
/// 4. **All-or-nothing snapshots**: [`load_snapshot`](Self::load_snapshot)
///    builds both sides before swapping them in.
///
/// # Thread Safety
///
/// This struct is not internally synchronized. The sync engine owns the only
/// mutable copy and publishes immutable versions through
/// [`BookPublisher`](super::BookPublisher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBook {
    /// Instrument ticker
    instrument: String,

    /// Bid levels, best (highest) first
    bids: PriceLevelMap,

    /// Ask levels, best (lowest) first
    asks: PriceLevelMap,

    /// Sequence of the last applied snapshot or update
    last_sequence: Option<u64>,
}

impl OrderBook {
    /// Create a new empty orderbook for the given instrument
    #[must_use]
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            bids: PriceLevelMap::new(Side::Bid),
            asks: PriceLevelMap::new(Side::Ask),
            last_sequence: None,
        }
    }

    /// Build an orderbook from a bootstrap snapshot
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedSnapshot`] if the snapshot fails validation.
    pub fn from_snapshot(
        instrument: impl Into<String>,
        snapshot: &BookSnapshot,
    ) -> Result<Self, Error> {
        let mut book = Self::new(instrument);
        book.load_snapshot(&snapshot.bids, &snapshot.asks, snapshot.sequence)?;
        Ok(book)
    }

    /// Get the instrument ticker
    #[must_use]
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Sequence of the last applied snapshot or update (`None` before any snapshot)
    #[must_use]
    pub const fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Replace both sides of the book with a snapshot
    ///
    /// Levels may come in any order; zero-quantity levels are skipped. The
    /// book is either fully replaced or, on error, left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedSnapshot`] if a quantity is negative, a
    /// price appears twice on one side, or the snapshot is crossed.
    pub fn load_snapshot(
        &mut self,
        bids: &[PriceLevel],
        asks: &[PriceLevel],
        sequence: u64,
    ) -> Result<(), Error> {
        let new_bids = build_side(Side::Bid, bids)?;
        let new_asks = build_side(Side::Ask, asks)?;

        if let (Some(bid), Some(ask)) = (new_bids.best(), new_asks.best()) {
            if bid.price >= ask.price {
                return Err(Error::MalformedSnapshot(format!(
                    "crossed snapshot: best bid {} >= best ask {}",
                    bid.price, ask.price
                )));
            }
        }

        self.bids = new_bids;
        self.asks = new_asks;
        self.last_sequence = Some(sequence);
        Ok(())
    }

    /// Apply an incremental update
    ///
    /// `quantity` is the new absolute quantity at `price`; zero removes the
    /// level. A negative quantity is treated as a removal and logged.
    ///
    /// # Errors
    ///
    /// - [`BookError::Unsynced`] if no snapshot has been loaded
    /// - [`BookError::Gap`] if `sequence != last_sequence + 1`, or if
    ///   `last_sequence` is already `u64::MAX`
    /// - [`BookError::Crossed`] if the change would cross the book (the change
    ///   is rolled back)
    ///
    /// On error the book, including `last_sequence`, is unchanged.
    pub fn apply_update(
        &mut self,
        side: Side,
        price: Price,
        quantity: Quantity,
        sequence: u64,
    ) -> Result<(), BookError> {
        let Some(last) = self.last_sequence else {
            return Err(BookError::Unsynced { got: sequence });
        };
        // Nothing can follow u64::MAX, so every update after it is a gap.
        let Some(expected) = last.checked_add(1) else {
            return Err(BookError::Gap {
                expected: last,
                got: sequence,
            });
        };
        if sequence != expected {
            return Err(BookError::Gap {
                expected,
                got: sequence,
            });
        }

        let quantity = if quantity < Quantity::ZERO {
            warn!(
                instrument = %self.instrument,
                ?side,
                %price,
                %quantity,
                sequence,
                "negative level quantity, removing level"
            );
            Quantity::ZERO
        } else {
            quantity
        };

        let levels = self.side_mut(side);
        let previous = levels.set(price, quantity);

        if let (Some(bid), Some(ask)) = (self.bids.best(), self.asks.best()) {
            if bid.price >= ask.price {
                self.side_mut(side).restore(price, previous);
                return Err(BookError::Crossed {
                    bid: bid.price,
                    ask: ask.price,
                });
            }
        }

        self.last_sequence = Some(sequence);
        Ok(())
    }

    /// Apply a decoded stream update
    ///
    /// See [`apply_update`](Self::apply_update).
    pub fn apply(&mut self, update: &BookUpdate) -> Result<(), BookError> {
        self.apply_update(update.side, update.price, update.quantity, update.sequence)
    }

    fn side_mut(&mut self, side: Side) -> &mut PriceLevelMap {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn side(&self, side: Side) -> &PriceLevelMap {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Get the best bid (highest bid)
    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.best()
    }

    /// Get the best ask (lowest ask)
    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.best()
    }

    /// Get the top `levels` levels of one side, best first
    #[must_use]
    pub fn depth(&self, side: Side, levels: usize) -> Vec<PriceLevel> {
        self.side(side).top(levels)
    }

    /// Get the mid price
    ///
    /// Returns the average of best bid and best ask, or `None` if either is missing.
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Price::TWO),
            _ => None,
        }
    }

    /// Get the spread (best ask - best bid)
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Check if the book is crossed (best bid >= best ask)
    ///
    /// Never true for a book mutated only through `load_snapshot` and
    /// `apply_update`.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    /// Get all bid levels, sorted by price descending (best first)
    pub fn bids(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.bids.iter()
    }

    /// Get all ask levels, sorted by price ascending (best first)
    pub fn asks(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.asks.iter()
    }

    /// Get total resting quantity of one side
    #[must_use]
    pub fn total_quantity(&self, side: Side) -> Quantity {
        self.side(side).total_quantity()
    }

    /// Get the number of price levels as `(bids, asks)`
    #[must_use]
    pub fn num_levels(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// Check if the orderbook is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Clear the orderbook and forget its sequence
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_sequence = None;
    }

    /// Produce an immutable point-in-time copy for long-lived readers
    #[must_use]
    pub fn snapshot_view(&self) -> Arc<OrderBook> {
        Arc::new(self.clone())
    }
}

fn build_side(side: Side, levels: &[PriceLevel]) -> Result<PriceLevelMap, Error> {
    let mut map = PriceLevelMap::new(side);
    for level in levels {
        if level.quantity < Quantity::ZERO {
            return Err(Error::MalformedSnapshot(format!(
                "negative quantity {} at {:?} {}",
                level.quantity, side, level.price
            )));
        }
        if map.get(&level.price).is_some() {
            return Err(Error::MalformedSnapshot(format!(
                "duplicate {:?} level at {}",
                side, level.price
            )));
        }
        map.set(level.price, level.quantity);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Price, quantity: Quantity) -> PriceLevel {
        PriceLevel::new(price, quantity)
    }

    fn seeded() -> OrderBook {
        let mut book = OrderBook::new("TEST");
        book.load_snapshot(&[level(dec!(100), dec!(5))], &[level(dec!(101), dec!(3))], 10)
            .unwrap();
        book
    }

    #[test]
    fn test_new_orderbook() {
        let book = OrderBook::new("BTC-PERP");
        assert_eq!(book.instrument(), "BTC-PERP");
        assert!(book.is_empty());
        assert_eq!(book.last_sequence(), None);
    }

    #[test]
    fn test_update_before_snapshot_is_refused() {
        let mut book = OrderBook::new("TEST");
        let err = book
            .apply_update(Side::Bid, dec!(100), dec!(1), 1)
            .unwrap_err();
        assert_eq!(err, BookError::Unsynced { got: 1 });
        assert!(book.is_empty());
    }

    #[test]
    fn test_scenario_updates_then_gap() {
        let mut book = seeded();

        book.apply_update(Side::Bid, dec!(100), dec!(0), 11).unwrap();
        assert_eq!(book.best_bid(), None);

        book.apply_update(Side::Ask, dec!(101), dec!(5), 12).unwrap();
        assert_eq!(book.best_ask(), Some(level(dec!(101), dec!(5))));

        let before = book.clone();
        let err = book
            .apply_update(Side::Bid, dec!(102), dec!(1), 14)
            .unwrap_err();
        assert_eq!(err, BookError::Gap { expected: 13, got: 14 });
        assert_eq!(book, before);
    }

    #[test]
    fn test_duplicate_sequence_is_a_gap() {
        let mut book = seeded();
        book.apply_update(Side::Bid, dec!(99), dec!(1), 11).unwrap();

        let err = book
            .apply_update(Side::Bid, dec!(99), dec!(1), 11)
            .unwrap_err();
        assert_eq!(err, BookError::Gap { expected: 12, got: 11 });
        assert_eq!(book.last_sequence(), Some(11));
    }

    #[test]
    fn test_update_after_max_sequence_is_a_gap() {
        let mut book = OrderBook::new("TEST");
        book.load_snapshot(
            &[level(dec!(100), dec!(5))],
            &[level(dec!(101), dec!(3))],
            u64::MAX,
        )
        .unwrap();

        let err = book
            .apply_update(Side::Bid, dec!(99), dec!(1), u64::MAX)
            .unwrap_err();
        assert_eq!(
            err,
            BookError::Gap {
                expected: u64::MAX,
                got: u64::MAX
            }
        );
        assert_eq!(book.last_sequence(), Some(u64::MAX));
        assert_eq!(book.num_levels(), (1, 1));
        assert_eq!(book.best_bid(), Some(level(dec!(100), dec!(5))));
    }

    #[test]
    fn test_crossing_update_is_rolled_back() {
        let mut book = seeded();
        let before = book.clone();

        let err = book
            .apply_update(Side::Bid, dec!(101), dec!(2), 11)
            .unwrap_err();
        assert_eq!(
            err,
            BookError::Crossed {
                bid: dec!(101),
                ask: dec!(101)
            }
        );
        assert_eq!(book, before);
        assert_eq!(book.last_sequence(), Some(10));

        // Replacing an existing level is rolled back to its old quantity
        book.apply_update(Side::Ask, dec!(102), dec!(4), 11).unwrap();
        let err = book
            .apply_update(Side::Ask, dec!(99), dec!(1), 12)
            .unwrap_err();
        assert!(matches!(err, BookError::Crossed { .. }));
        assert_eq!(book.depth(Side::Ask, 5).len(), 2);
        assert_eq!(book.best_ask(), Some(level(dec!(101), dec!(3))));
    }

    #[test]
    fn test_negative_quantity_removes_level() {
        let mut book = seeded();
        book.apply_update(Side::Ask, dec!(101), dec!(-2), 11).unwrap();
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.last_sequence(), Some(11));
    }

    #[test]
    fn test_snapshot_then_depth() {
        let mut book = OrderBook::new("TEST");
        let bids = [
            level(dec!(98), dec!(3)),
            level(dec!(100), dec!(1)),
            level(dec!(99), dec!(2)),
        ];
        let asks = [
            level(dec!(103), dec!(6)),
            level(dec!(101), dec!(4)),
            level(dec!(102), dec!(5)),
        ];
        book.load_snapshot(&bids, &asks, 7).unwrap();

        assert_eq!(
            book.depth(Side::Bid, 2),
            vec![level(dec!(100), dec!(1)), level(dec!(99), dec!(2))]
        );
        assert_eq!(
            book.depth(Side::Ask, 2),
            vec![level(dec!(101), dec!(4)), level(dec!(102), dec!(5))]
        );
        assert_eq!(book.depth(Side::Ask, 10).len(), 3);
        assert_eq!(book.last_sequence(), Some(7));
    }

    #[test]
    fn test_snapshot_skips_zero_levels() {
        let mut book = OrderBook::new("TEST");
        book.load_snapshot(&[level(dec!(100), dec!(0))], &[level(dec!(101), dec!(1))], 1)
            .unwrap();
        assert_eq!(book.num_levels(), (0, 1));
    }

    #[test]
    fn test_malformed_snapshot_leaves_book_unchanged() {
        let mut book = seeded();
        let before = book.clone();

        let crossed = book.load_snapshot(
            &[level(dec!(105), dec!(1))],
            &[level(dec!(104), dec!(1))],
            50,
        );
        assert!(matches!(crossed, Err(Error::MalformedSnapshot(_))));

        let negative = book.load_snapshot(&[level(dec!(99), dec!(-1))], &[], 50);
        assert!(matches!(negative, Err(Error::MalformedSnapshot(_))));

        let duplicate = book.load_snapshot(
            &[level(dec!(99), dec!(1)), level(dec!(99), dec!(2))],
            &[],
            50,
        );
        assert!(matches!(duplicate, Err(Error::MalformedSnapshot(_))));

        assert_eq!(book, before);
    }

    #[test]
    fn test_mid_price_and_spread() {
        let book = seeded();
        assert_eq!(book.mid_price(), Some(dec!(100.5)));
        assert_eq!(book.spread(), Some(dec!(1)));
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_snapshot_view_is_independent() {
        let mut book = seeded();
        let view = book.snapshot_view();

        book.apply_update(Side::Bid, dec!(100), dec!(0), 11).unwrap();

        assert_eq!(view.best_bid(), Some(level(dec!(100), dec!(5))));
        assert_eq!(view.last_sequence(), Some(10));
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn test_clear() {
        let mut book = seeded();
        assert!(!book.is_empty());

        book.clear();

        assert!(book.is_empty());
        assert_eq!(book.last_sequence(), None);
    }

    #[test]
    fn test_never_crossed_under_random_walk() {
        use rand::{Rng, SeedableRng};

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut book = seeded();
        let mut sequence = 10;

        for _ in 0..5_000 {
            let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
            let price = Price::from(rng.gen_range(95..=106));
            let quantity = Quantity::from(rng.gen_range(0..=4));
            match book.apply_update(side, price, quantity, sequence + 1) {
                Ok(()) => sequence += 1,
                Err(BookError::Crossed { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
            assert!(!book.is_crossed());
            assert_eq!(book.last_sequence(), Some(sequence));
        }
    }
}
