//! API clients for communicating with the exchange.
//!
//! This module contains:
//!
//! - [`rest`] - HTTP client for the REST routes, and the snapshot source
//!   the sync engine bootstraps from
//! - [`websocket`] - streaming client and the connector the sync engine uses

pub mod rest;
pub mod websocket;

pub use rest::RestClient;
pub use websocket::{WebSocketClient, WsConnector};
