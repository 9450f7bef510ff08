//! Collaborators consumed by the sync engine.
//!
//! The engine never touches HTTP or wire bytes itself. It needs two things:
//!
//! - a [`SnapshotSource`] that fetches a full book for an instrument (the
//!   REST bootstrap), called on start and on every resync/reconnect;
//! - a [`StreamConnector`] that opens a subscribed stream of already-decoded
//!   [`StreamEvent`]s for an instrument.
//!
//! [`RestClient`](crate::client::RestClient) and
//! [`WsConnector`](crate::client::WsConnector) are the network
//! implementations; tests plug in in-memory ones.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::types::{BookSnapshot, BookUpdate};

/// Something the stream delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental book update
    Update(BookUpdate),
    /// The server confirmed the subscription
    Subscribed,
    /// The server refused the subscription or revoked the session
    Rejected(String),
}

/// Fetches bootstrap snapshots
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch a full snapshot of `instrument`'s book
    async fn fetch_snapshot(&self, instrument: &str) -> Result<BookSnapshot, Error>;
}

#[async_trait]
impl<S: SnapshotSource + ?Sized> SnapshotSource for Arc<S> {
    async fn fetch_snapshot(&self, instrument: &str) -> Result<BookSnapshot, Error> {
        (**self).fetch_snapshot(instrument).await
    }
}

/// One open, subscribed stream connection
#[async_trait]
pub trait UpdateStream: Send {
    /// Wait for the next event
    ///
    /// Returns `None` once the connection is closed. Transport failures are
    /// returned as `Some(Err(_))`; the engine treats them as a connection loss.
    async fn next_event(&mut self) -> Option<Result<StreamEvent, Error>>;

    /// Unsubscribe (best effort) and close the connection
    async fn close(&mut self) -> Result<(), Error>;
}

/// Opens stream connections
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// The connection type produced
    type Stream: UpdateStream + 'static;

    /// Connect and subscribe to `instrument`
    async fn connect(&self, instrument: &str) -> Result<Self::Stream, Error>;
}
