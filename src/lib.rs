//! # exchange-client
//!
//! An async Rust client for a REST + WebSocket trading exchange, built around
//! a live orderbook that stays consistent with the exchange's feed.
//!
//! ## Features
//!
//! - **Orderbook sync** - snapshot bootstrap, strictly sequenced incremental
//!   updates, automatic resync on gaps and reconnect on connection loss
//! - **Lock-free reads** - trading logic reads immutable published books and
//!   is never blocked by the writer
//! - **REST client** - session handshake, limit/market orders, cancel-all,
//!   account details
//! - **Async/Await** - built on Tokio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exchange_client::types::{LimitOrderRequest, Side};
//! use exchange_client::{Config, TradingClient};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), exchange_client::Error> {
//!     let config = Config::new(
//!         "https://exchange.example.com",
//!         "wss://exchange.example.com/ws",
//!         "trader",
//!         "api-key",
//!     )?;
//!     let client = TradingClient::connect(config).await?;
//!
//!     // Keep a live book for a ticker
//!     let book = client.subscribe("BTC-PERP").await?;
//!     if let Some(top) = book.top_of_book() {
//!         println!("bid {:?} / ask {:?}", top.bid, top.ask);
//!     }
//!
//!     // Rest a bid at 100
//!     let order = LimitOrderRequest::new("BTC-PERP", Side::Bid, Decimal::ONE, Decimal::from(100));
//!     let reply = client.place_limit(&order).await?;
//!     println!("{reply}");
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Consistency
//!
//! Each book has exactly one writer (its [`SyncEngine`](sync::SyncEngine)
//! task). Readers see either the latest complete version or, while the
//! engine is resynchronizing or reconnecting, nothing at all. They never see
//! a partially applied update or a crossed book.
//!
//! ## Architecture
//!
//! - [`client`] - REST and WebSocket clients for API communication
//! - [`types`] - Prices, sides, levels and the JSON bodies of the API
//! - [`orderbook`] - Orderbook data structure and its lock-free read surface
//! - [`sync`] - The engine keeping a book in sync with the feed
//! - [`config`] - Configuration and credentials management
//! - [`error`] - Error types for the crate

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod orderbook;
pub mod sync;
pub mod types;

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{info, warn};

// Re-export main types at crate root for convenience
pub use config::Config;
pub use error::Error;

use client::{RestClient, WsConnector};
use orderbook::BookReader;
use sync::{ConnectionStatus, SyncEngine};
use types::{LimitOrderRequest, MarketOrderRequest};

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// The main trading client
///
/// Authenticates on [`connect`](Self::connect), places orders through the
/// REST API and keeps one live orderbook per subscribed ticker.
#[derive(Debug)]
pub struct TradingClient {
    config: Config,
    rest: Arc<RestClient>,
    connector: WsConnector,
    engines: RwLock<FxHashMap<String, Arc<SyncEngine>>>,
    /// Serializes subscribe/unsubscribe so a ticker never gets two engines
    lifecycle: tokio::sync::Mutex<()>,
}

impl TradingClient {
    /// Create a client and establish a session
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized or the
    /// buildup handshake fails.
    pub async fn connect(config: Config) -> Result<Self> {
        let rest = Arc::new(RestClient::new(&config)?);
        rest.buildup().await?;
        let connector = WsConnector::new(&config);

        Ok(Self {
            config,
            rest,
            connector,
            engines: RwLock::new(FxHashMap::default()),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    /// Get a reference to the REST client
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Place a limit order
    pub async fn place_limit(&self, order: &LimitOrderRequest) -> Result<Value> {
        self.rest.place_limit(order).await
    }

    /// Place a market order
    pub async fn place_market(&self, order: &MarketOrderRequest) -> Result<Value> {
        self.rest.place_market(order).await
    }

    /// Cancel all resting orders
    pub async fn remove_all(&self) -> Result<Value> {
        self.rest.remove_all().await
    }

    /// Get account details
    pub async fn get_details(&self) -> Result<Value> {
        self.rest.get_details().await
    }

    /// Start keeping a live book for `ticker`
    ///
    /// Returns once the book is synchronized. Subscribing to a ticker that
    /// already has a running engine returns its reader; an engine that has
    /// closed is replaced.
    ///
    /// # Errors
    ///
    /// Returns the engine's start error (see [`SyncEngine::start`]).
    pub async fn subscribe(&self, ticker: &str) -> Result<BookReader> {
        let _guard = self.lifecycle.lock().await;

        if let Some(engine) = self.engine(ticker) {
            if !engine.status().is_closed() {
                return Ok(engine.reader());
            }
        }

        let engine = SyncEngine::start(
            ticker,
            self.connector.clone(),
            Arc::clone(&self.rest),
            self.config.reconnect().clone(),
        )
        .await?;
        let reader = engine.reader();
        self.engines
            .write()
            .insert(ticker.to_string(), Arc::new(engine));

        info!(ticker = %ticker, "subscribed");
        Ok(reader)
    }

    /// Stop the live book for `ticker`
    ///
    /// Does nothing if the ticker is not subscribed.
    ///
    /// # Errors
    ///
    /// Returns the fatal error the engine closed on, if it closed itself.
    pub async fn unsubscribe(&self, ticker: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let engine = self.engines.write().remove(ticker);
        match engine {
            Some(engine) => {
                info!(ticker = %ticker, "unsubscribing");
                engine.stop().await
            }
            None => Ok(()),
        }
    }

    /// Read handle onto `ticker`'s live book, if subscribed
    pub fn book(&self, ticker: &str) -> Option<BookReader> {
        self.engine(ticker).map(|engine| engine.reader())
    }

    /// Connection status of `ticker`'s engine, if subscribed
    pub fn status(&self, ticker: &str) -> Option<ConnectionStatus> {
        self.engine(ticker).map(|engine| engine.status())
    }

    /// Tickers with an engine
    pub fn subscriptions(&self) -> Vec<String> {
        self.engines.read().keys().cloned().collect()
    }

    /// Stop every engine
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;

        let engines: Vec<_> = self.engines.write().drain().collect();
        for (ticker, engine) in engines {
            if let Err(e) = engine.stop().await {
                warn!(ticker = %ticker, error = %e, "engine had closed with an error");
            }
        }
    }

    fn engine(&self, ticker: &str) -> Option<Arc<SyncEngine>> {
        self.engines.read().get(ticker).cloned()
    }
}
