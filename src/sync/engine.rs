//! The orderbook sync engine.
//!
//! A [`SyncEngine`] keeps one instrument's [`OrderBook`] in sync with the
//! exchange. It owns a background task that is the only writer of the book:
//!
//! 1. connect and subscribe to the stream (`Connecting`)
//! 2. fetch a bootstrap snapshot and load it (`Synced`)
//! 3. apply incremental updates strictly in arrival order (`Streaming`)
//! 4. on a sequence gap or a crossed book, drop the book and reload it from a
//!    fresh snapshot (`Resyncing`)
//! 5. on connection loss, back off and go back to step 1 (`Disconnected`),
//!    never resuming mid-sequence
//! 6. on `stop()` or a fatal error, close the connection (`Closed`)
//!
//! Readers get a [`BookReader`] and are never blocked by the writer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ReconnectConfig;
use crate::error::Error;
use crate::orderbook::{BookPublisher, BookReader, OrderBook};
use crate::types::BookUpdate;

use super::state::{ConnectionStatus, StreamConnection};
use super::transport::{SnapshotSource, StreamConnector, StreamEvent, UpdateStream};

/// Upper bound on a graceful close of a connection being abandoned
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Backoff exponent for the delay after `failures` failed attempts. After a
/// connection loss the delay before the first attempt already used 0.
fn backoff_attempt(failures: u32, after_loss: bool) -> u32 {
    if after_loss {
        failures
    } else {
        failures.saturating_sub(1)
    }
}

/// Keeps one instrument's orderbook in sync with the exchange.
///
/// Dropping the engine cancels its task; call [`stop`](Self::stop) to also
/// wait for the connection to be closed and collect a terminal error.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use exchange_client::client::{RestClient, WsConnector};
/// use exchange_client::config::ReconnectConfig;
/// use exchange_client::sync::SyncEngine;
/// use exchange_client::types::Side;
/// use exchange_client::Config;
///
/// # async fn example() -> exchange_client::Result<()> {
/// let config = Config::new("https://x.example", "wss://x.example/ws", "user", "key")?;
/// let rest = Arc::new(RestClient::new(&config)?);
/// let connector = WsConnector::new(&config);
///
/// let engine = SyncEngine::start("BTC-PERP", connector, rest, ReconnectConfig::default()).await?;
/// let book = engine.reader();
/// println!("best bid: {:?}", book.best_bid());
/// println!("top 5 asks: {:?}", book.depth(Side::Ask, 5));
///
/// engine.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SyncEngine {
    instrument: String,
    reader: BookReader,
    state: Arc<watch::Sender<StreamConnection>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<Result<(), Error>>>>,
}

impl SyncEngine {
    /// Connect, load the bootstrap snapshot and start streaming updates
    ///
    /// Returns once the book is published and the engine is `Streaming`.
    /// Transient failures are retried per `reconnect` before returning.
    ///
    /// # Errors
    ///
    /// Fatal errors (authentication, rejected subscription, malformed
    /// snapshot) and exhausted retries are returned, and the engine is left
    /// `Closed`.
    pub async fn start<C, S>(
        instrument: impl Into<String>,
        connector: C,
        source: S,
        reconnect: ReconnectConfig,
    ) -> Result<Self, Error>
    where
        C: StreamConnector + 'static,
        S: SnapshotSource + 'static,
    {
        let instrument = instrument.into();
        let (state, _) = watch::channel(StreamConnection::default());
        let state = Arc::new(state);
        let cancel = CancellationToken::new();
        let publisher = BookPublisher::new();
        let reader = publisher.reader();

        let mut worker = Worker {
            book: OrderBook::new(&instrument),
            instrument: instrument.clone(),
            connector,
            source,
            reconnect,
            publisher,
            state: Arc::clone(&state),
            cancel: cancel.clone(),
            fresh_snapshot: false,
            skipped_stale: 0,
        };

        info!(instrument = %instrument, "starting orderbook sync");
        let established = worker.establish(false).await;
        let err = match established {
            Ok(Some(stream)) => {
                worker.set_status(ConnectionStatus::Streaming);
                let task = tokio::spawn(worker.run(stream));
                return Ok(Self {
                    instrument,
                    reader,
                    state,
                    cancel,
                    task: Mutex::new(Some(task)),
                });
            }
            Ok(None) => Error::ConnectionClosed,
            Err(e) => e,
        };
        worker.finish(Err(err))
    }

    /// The instrument being tracked
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// A read handle onto the live book
    pub fn reader(&self) -> BookReader {
        self.reader.clone()
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    /// Current connection state, including retry count and last error
    pub fn connection(&self) -> StreamConnection {
        self.state.borrow().clone()
    }

    /// Subscribe to connection state changes
    pub fn watch_status(&self) -> watch::Receiver<StreamConnection> {
        self.state.subscribe()
    }

    /// Wait until the engine reaches `status`
    ///
    /// Returns immediately if it is already there.
    pub async fn wait_for_status(&self, status: ConnectionStatus) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|conn| conn.status == status).await;
    }

    /// Stop syncing and close the connection
    ///
    /// Cancels any in-flight connect, receive, snapshot fetch or backoff
    /// delay; no update is applied afterwards. Idempotent.
    ///
    /// # Errors
    ///
    /// If the engine had already closed itself on a fatal error, that error
    /// is returned by the first call.
    pub async fn stop(&self) -> Result<(), Error> {
        self.cancel.cancel();
        let task = self.task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };

        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(e.to_string())),
        };
        self.state.send_modify(|conn| conn.status = ConnectionStatus::Closed);
        info!(instrument = %self.instrument, "orderbook sync stopped");
        result
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State owned by the background task
struct Worker<C, S> {
    instrument: String,
    connector: C,
    source: S,
    reconnect: ReconnectConfig,
    book: OrderBook,
    publisher: BookPublisher,
    state: Arc<watch::Sender<StreamConnection>>,
    cancel: CancellationToken,
    /// Set by a snapshot load, cleared by the first applied update. While
    /// set, frames already covered by the snapshot are skipped.
    fresh_snapshot: bool,
    /// Frames skipped since the last snapshot load
    skipped_stale: u64,
}

impl<C, S> Worker<C, S>
where
    C: StreamConnector,
    S: SnapshotSource,
{
    fn set_status(&self, status: ConnectionStatus) {
        debug!(instrument = %self.instrument, %status, "sync status");
        self.state.send_modify(|conn| conn.status = status);
    }

    /// Drop the book: readers see it as unavailable and the next update
    /// cannot be sequenced until a snapshot is loaded.
    fn discard_book(&mut self) {
        self.publisher.withdraw();
        self.book.clear();
    }

    /// Connect and load a snapshot, retrying transient failures
    ///
    /// `Ok(None)` means cancellation was observed.
    async fn establish(&mut self, after_loss: bool) -> Result<Option<C::Stream>, Error> {
        let cancel = self.cancel.clone();
        let mut failures: u32 = 0;

        if after_loss {
            let delay = self.reconnect.jittered_delay(0);
            info!(
                instrument = %self.instrument,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        loop {
            self.set_status(ConnectionStatus::Connecting);
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                opened = self.open_session() => opened,
            };

            let err = match opened {
                Ok(stream) => {
                    self.state.send_modify(|conn| conn.retry_count = 0);
                    return Ok(Some(stream));
                }
                Err(e) => e,
            };

            self.discard_book();
            if err.is_fatal() {
                return Err(err);
            }

            failures = failures.saturating_add(1);
            self.state.send_modify(|conn| {
                conn.status = ConnectionStatus::Disconnected;
                conn.retry_count = failures;
                conn.last_error = Some(err.to_string());
            });

            if !self.reconnect.allows_retry(failures) {
                error!(
                    instrument = %self.instrument,
                    attempts = failures,
                    error = %err,
                    "giving up on stream connection"
                );
                return Err(err);
            }

            let delay = self
                .reconnect
                .jittered_delay(backoff_attempt(failures, after_loss));
            warn!(
                instrument = %self.instrument,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "stream connect failed, retrying"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Open the stream, then bootstrap the book from a snapshot
    async fn open_session(&mut self) -> Result<C::Stream, Error> {
        let mut stream = self.connector.connect(&self.instrument).await?;
        debug!(instrument = %self.instrument, "stream connected");

        if let Err(e) = self.load_fresh_snapshot().await {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, stream.close()).await;
            return Err(e);
        }
        Ok(stream)
    }

    async fn load_fresh_snapshot(&mut self) -> Result<(), Error> {
        self.report_skipped();
        let snapshot = self.source.fetch_snapshot(&self.instrument).await?;
        self.book
            .load_snapshot(&snapshot.bids, &snapshot.asks, snapshot.sequence)?;
        self.fresh_snapshot = true;
        self.set_status(ConnectionStatus::Synced);
        self.publisher.publish(&self.book);

        let (bids, asks) = self.book.num_levels();
        info!(
            instrument = %self.instrument,
            sequence = snapshot.sequence,
            bids,
            asks,
            "orderbook snapshot loaded"
        );
        Ok(())
    }

    /// Stream updates until stopped or a fatal error
    async fn run(mut self, mut stream: C::Stream) -> Result<(), Error> {
        let cancel = self.cancel.clone();

        let outcome = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                event = stream.next_event() => event,
            };

            let lost = match event {
                Some(Ok(StreamEvent::Update(update))) => match self.on_message(update).await {
                    Ok(()) => continue,
                    Err(e) if e.is_fatal() => break Err(e),
                    Err(e) => e,
                },
                Some(Ok(StreamEvent::Subscribed)) => {
                    debug!(instrument = %self.instrument, "subscription confirmed");
                    continue;
                }
                Some(Ok(StreamEvent::Rejected(reason))) => {
                    break Err(Error::FatalSubscription(reason));
                }
                Some(Err(e)) if e.is_fatal() => break Err(e),
                Some(Err(e)) => e,
                None => Error::ConnectionClosed,
            };

            match self.reconnect(&mut stream, lost).await {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        let _ = tokio::time::timeout(CLOSE_TIMEOUT, stream.close()).await;
        self.finish(outcome)
    }

    /// Apply one update; the only path that mutates the book while streaming
    async fn on_message(&mut self, update: BookUpdate) -> Result<(), Error> {
        // Only between a snapshot load and the first applied update: the
        // stream may still deliver frames the snapshot already includes.
        if self.fresh_snapshot {
            if let Some(last) = self.book.last_sequence() {
                if update.sequence <= last {
                    self.skipped_stale += 1;
                    return Ok(());
                }
            }
        }

        match self.book.apply(&update) {
            Ok(()) => {
                if self.fresh_snapshot {
                    self.report_skipped();
                    self.fresh_snapshot = false;
                }
                self.publisher.publish(&self.book);
                Ok(())
            }
            Err(err) => {
                warn!(
                    instrument = %self.instrument,
                    error = %err,
                    "orderbook out of sync, resynchronizing"
                );
                self.resync().await
            }
        }
    }

    fn report_skipped(&mut self) {
        if self.skipped_stale > 0 {
            debug!(
                instrument = %self.instrument,
                skipped = self.skipped_stale,
                "skipped updates already covered by snapshot"
            );
            self.skipped_stale = 0;
        }
    }

    /// Rebuild the book from a fresh snapshot on the same connection
    async fn resync(&mut self) -> Result<(), Error> {
        let cancel = self.cancel.clone();
        self.discard_book();
        self.state.send_modify(|conn| {
            conn.status = ConnectionStatus::Resyncing;
            conn.resync_count += 1;
        });

        let loaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            loaded = self.load_fresh_snapshot() => loaded,
        };
        loaded?;
        self.set_status(ConnectionStatus::Streaming);
        Ok(())
    }

    /// Replace a lost connection with a new one and a fresh snapshot
    ///
    /// `Ok(false)` means cancellation was observed.
    async fn reconnect(&mut self, stream: &mut C::Stream, cause: Error) -> Result<bool, Error> {
        warn!(
            instrument = %self.instrument,
            error = %cause,
            "stream connection lost"
        );
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, stream.close()).await;
        self.discard_book();
        self.state.send_modify(|conn| {
            conn.status = ConnectionStatus::Disconnected;
            conn.last_error = Some(cause.to_string());
        });

        match self.establish(true).await? {
            Some(new_stream) => {
                *stream = new_stream;
                self.set_status(ConnectionStatus::Streaming);
                info!(instrument = %self.instrument, "stream reconnected");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Unpublish the book and record the terminal state
    fn finish<T>(&mut self, outcome: Result<T, Error>) -> Result<T, Error> {
        self.publisher.withdraw();
        match &outcome {
            Ok(_) => info!(instrument = %self.instrument, "orderbook sync task finished"),
            Err(e) => error!(instrument = %self.instrument, error = %e, "orderbook sync closed"),
        }
        self.state.send_modify(|conn| {
            conn.status = ConnectionStatus::Closed;
            if let Err(e) = &outcome {
                conn.last_error = Some(e.to_string());
            }
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_from_first_retry_after_loss() {
        let reconnect = ReconnectConfig {
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
            ..ReconnectConfig::default()
        };

        let before_first = reconnect.delay_for_attempt(0);
        let after_first_failure = reconnect.delay_for_attempt(backoff_attempt(1, true));
        let after_second_failure = reconnect.delay_for_attempt(backoff_attempt(2, true));
        assert_eq!(before_first, Duration::from_millis(100));
        assert_eq!(after_first_failure, Duration::from_millis(200));
        assert_eq!(after_second_failure, Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_starts_at_initial_delay_on_start() {
        assert_eq!(backoff_attempt(1, false), 0);
        assert_eq!(backoff_attempt(2, false), 1);
        assert_eq!(backoff_attempt(0, false), 0);
    }
}
