//! Connection state of a sync engine.

use std::fmt;

/// Lifecycle status of the stream connection
///
/// ```text
/// Disconnected -> Connecting -> Synced -> Streaming <-> Resyncing -> Closed
///                     ^                      |             |
///                     +---- Disconnected <---+-------------+   (connection loss)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// No connection; a reconnect may be pending
    Disconnected,
    /// Opening the stream and fetching the bootstrap snapshot
    Connecting,
    /// Snapshot loaded, about to stream
    Synced,
    /// Applying incremental updates
    Streaming,
    /// Rebuilding the book from a fresh snapshot after a gap or crossed book
    Resyncing,
    /// Stopped for good (by `stop()` or a fatal error)
    Closed,
}

impl ConnectionStatus {
    /// Whether the published book is usable in this status
    pub fn is_live(self) -> bool {
        matches!(self, ConnectionStatus::Synced | ConnectionStatus::Streaming)
    }

    /// Whether the engine has terminated
    pub fn is_closed(self) -> bool {
        matches!(self, ConnectionStatus::Closed)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Synced => "synced",
            ConnectionStatus::Streaming => "streaming",
            ConnectionStatus::Resyncing => "resyncing",
            ConnectionStatus::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Observable state of the engine's connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConnection {
    /// Current status
    pub status: ConnectionStatus,
    /// Consecutive failed connection attempts
    pub retry_count: u32,
    /// Most recent error, if any
    pub last_error: Option<String>,
    /// Number of resyncs performed since start
    pub resync_count: u64,
}

impl Default for StreamConnection {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            retry_count: 0,
            last_error: None,
            resync_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(ConnectionStatus::Streaming.is_live());
        assert!(ConnectionStatus::Synced.is_live());
        assert!(!ConnectionStatus::Resyncing.is_live());
        assert!(ConnectionStatus::Closed.is_closed());
        assert_eq!(ConnectionStatus::Resyncing.to_string(), "resyncing");
    }

    #[test]
    fn test_default_connection() {
        let conn = StreamConnection::default();
        assert_eq!(conn.status, ConnectionStatus::Disconnected);
        assert_eq!(conn.retry_count, 0);
        assert!(conn.last_error.is_none());
    }
}
