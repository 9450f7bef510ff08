//! One side of an orderbook.
//!
//! Levels are kept in a `BTreeMap` keyed by price, so the best price is
//! always at one end of the map:
//!
//! - bids: best = highest = `last_key_value()`
//! - asks: best = lowest = `first_key_value()`

use std::collections::BTreeMap;

use crate::types::{Price, PriceLevel, Quantity, Side};

/// Ordered price -> quantity mapping for one side of a book.
///
/// A level with quantity 0 is never stored: setting a quantity of zero
/// removes the level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevelMap {
    side: Side,
    levels: BTreeMap<Price, Quantity>,
}

impl PriceLevelMap {
    /// Create an empty map for the given side
    #[must_use]
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Which side of the book this map holds
    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Set the quantity at a price
    ///
    /// Quantity > 0 upserts the level, quantity <= 0 removes it. Returns the
    /// quantity previously resting at that price, so the change can be undone
    /// with another `set`.
    pub fn set(&mut self, price: Price, quantity: Quantity) -> Option<Quantity> {
        if quantity > Quantity::ZERO {
            self.levels.insert(price, quantity)
        } else {
            self.levels.remove(&price)
        }
    }

    /// Restore a level to a quantity returned by [`set`](Self::set)
    pub fn restore(&mut self, price: Price, previous: Option<Quantity>) {
        match previous {
            Some(quantity) => {
                self.levels.insert(price, quantity);
            }
            None => {
                self.levels.remove(&price);
            }
        }
    }

    /// Quantity resting at a price
    #[must_use]
    pub fn get(&self, price: &Price) -> Option<Quantity> {
        self.levels.get(price).copied()
    }

    /// The best level of this side
    #[must_use]
    pub fn best(&self) -> Option<PriceLevel> {
        let entry = match self.side {
            Side::Bid => self.levels.last_key_value(),
            Side::Ask => self.levels.first_key_value(),
        };
        entry.map(|(&price, &quantity)| PriceLevel::new(price, quantity))
    }

    /// Iterate levels best-first
    pub fn iter(&self) -> Box<dyn Iterator<Item = PriceLevel> + '_> {
        let levels = self
            .levels
            .iter()
            .map(|(&price, &quantity)| PriceLevel::new(price, quantity));
        match self.side {
            Side::Bid => Box::new(levels.rev()),
            Side::Ask => Box::new(levels),
        }
    }

    /// The top `n` levels, best-first
    #[must_use]
    pub fn top(&self, n: usize) -> Vec<PriceLevel> {
        let mut out = Vec::with_capacity(n.min(self.levels.len()));
        out.extend(self.iter().take(n));
        out
    }

    /// Sum of all resting quantity
    #[must_use]
    pub fn total_quantity(&self) -> Quantity {
        self.levels.values().sum()
    }

    /// Number of price levels
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether this side has no levels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Remove every level
    pub fn clear(&mut self) {
        self.levels.clear();
    }
}
