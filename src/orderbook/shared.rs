//! Single-writer / many-reader publication of an orderbook.
//!
//! The sync engine owns the only mutable [`OrderBook`]. After each applied
//! snapshot or update it publishes an immutable copy through a
//! [`BookPublisher`]; any number of [`BookReader`]s load the latest version
//! lock-free via `arc_swap`.
//!
//! A reader always sees a complete version: both sides and the sequence come
//! from the same `Arc<OrderBook>`. Queries that need several values from one
//! version should use [`BookReader::top_of_book`] or
//! [`BookReader::snapshot_view`] rather than calling `best_bid` and
//! `best_ask` separately.
//!
//! While the engine is resynchronizing or reconnecting nothing is published,
//! and readers report the book as unavailable (`None` / empty depth).

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::types::{Price, PriceLevel, Side};

use super::OrderBook;

/// Best bid and ask taken from one published version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopOfBook {
    /// Best bid, if any
    pub bid: Option<PriceLevel>,
    /// Best ask, if any
    pub ask: Option<PriceLevel>,
    /// Sequence of the version both were read from
    pub sequence: Option<u64>,
}

/// Write half. Owned by the sync engine; not `Clone`.
#[derive(Debug, Default)]
pub struct BookPublisher {
    slot: Arc<ArcSwapOption<OrderBook>>,
}

impl BookPublisher {
    /// Create a publisher with nothing published yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a read handle onto this publisher's book
    #[must_use]
    pub fn reader(&self) -> BookReader {
        BookReader {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Publish a copy of `book` as the current version
    pub fn publish(&self, book: &OrderBook) {
        self.slot.store(Some(book.snapshot_view()));
    }

    /// Mark the book unavailable (resync, disconnect, stop)
    pub fn withdraw(&self) {
        self.slot.store(None);
    }
}

/// Read half. Cheap to clone, lock-free to query, never errors.
#[derive(Debug, Clone)]
pub struct BookReader {
    slot: Arc<ArcSwapOption<OrderBook>>,
}

impl BookReader {
    fn with_book<T>(&self, f: impl FnOnce(&OrderBook) -> T) -> Option<T> {
        let guard = self.slot.load();
        guard.as_deref().map(f)
    }

    /// Whether a synchronized book is currently published
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.slot.load().is_some()
    }

    /// The current version, for long-lived consumers
    ///
    /// The returned book never changes; later updates publish new versions.
    #[must_use]
    pub fn snapshot_view(&self) -> Option<Arc<OrderBook>> {
        self.slot.load_full()
    }

    /// Best bid of the current version
    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.with_book(OrderBook::best_bid).flatten()
    }

    /// Best ask of the current version
    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.with_book(OrderBook::best_ask).flatten()
    }

    /// Best bid and ask from the same version
    #[must_use]
    pub fn top_of_book(&self) -> Option<TopOfBook> {
        self.with_book(|book| TopOfBook {
            bid: book.best_bid(),
            ask: book.best_ask(),
            sequence: book.last_sequence(),
        })
    }

    /// Top `levels` levels of one side, best first (empty when unavailable)
    #[must_use]
    pub fn depth(&self, side: Side, levels: usize) -> Vec<PriceLevel> {
        self.with_book(|book| book.depth(side, levels)).unwrap_or_default()
    }

    /// Mid price of the current version
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        self.with_book(OrderBook::mid_price).flatten()
    }

    /// Spread of the current version
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        self.with_book(OrderBook::spread).flatten()
    }

    /// Sequence of the current version
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.with_book(OrderBook::last_sequence).flatten()
    }
}
