//! Keeping a local orderbook in sync with the exchange.
//!
//! - [`engine`] - the [`SyncEngine`] state machine (snapshot, stream, resync, reconnect)
//! - [`state`] - observable connection status
//! - [`transport`] - the snapshot/stream collaborators the engine is driven by

pub mod engine;
pub mod state;
pub mod transport;

pub use engine::SyncEngine;
pub use state::{ConnectionStatus, StreamConnection};
pub use transport::{SnapshotSource, StreamConnector, StreamEvent, UpdateStream};
