//! WebSocket client for streaming orderbook updates.
//!
//! A [`WebSocketClient`] is one connection subscribed to one ticker. It
//! decodes server frames into [`StreamEvent`]s for the sync engine:
//!
//! - `update` frames for the subscribed ticker become [`StreamEvent::Update`]
//! - `subscribed` becomes [`StreamEvent::Subscribed`]
//! - a fatal `error` becomes [`StreamEvent::Rejected`]
//! - heartbeats and pings are handled internally
//!
//! [`WsConnector`] opens such connections on demand and is what the engine
//! is given.
//!
//! # Example
//!
//! ```rust,no_run
//! use exchange_client::client::WebSocketClient;
//! use exchange_client::sync::{StreamEvent, UpdateStream};
//!
//! # async fn example() -> exchange_client::Result<()> {
//! let url = url::Url::parse("wss://exchange.example.com/ws").unwrap();
//! let mut ws = WebSocketClient::connect(&url, "BTC-PERP").await?;
//!
//! while let Some(event) = ws.next_event().await {
//!     if let StreamEvent::Update(update) = event? {
//!         println!("{:?} {} @ {}", update.side, update.quantity, update.price);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::Error;
use crate::sync::{StreamConnector, StreamEvent, UpdateStream};
use crate::types::messages::{WsCommand, WsMessage};
use crate::types::BookUpdate;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One streaming connection subscribed to a single ticker
///
/// # Thread Safety
///
/// This client is NOT thread-safe. It is owned by the sync engine's task.
#[derive(Debug)]
pub struct WebSocketClient {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    ticker: String,
    closed: bool,
}

impl WebSocketClient {
    /// Connect to the streaming endpoint and subscribe to `ticker`
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or the subscribe command fails.
    pub async fn connect(url: &Url, ticker: &str) -> Result<Self, Error> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (write, read) = ws_stream.split();

        let mut client = Self {
            write,
            read,
            ticker: ticker.to_string(),
            closed: false,
        };
        client
            .send_command(WsCommand::Subscribe {
                ticker: ticker.to_string(),
            })
            .await?;
        debug!(ticker = %ticker, url = %url, "subscribe sent");

        Ok(client)
    }

    /// The subscribed ticker
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Send a command to the WebSocket server
    async fn send_command(&mut self, cmd: WsCommand) -> Result<(), Error> {
        let json = serde_json::to_string(&cmd)?;
        self.write.send(Message::Text(json)).await?;
        Ok(())
    }

    /// Turn a decoded server message into an engine event, if it is one
    fn decode_event(&self, msg: WsMessage) -> Option<Result<StreamEvent, Error>> {
        match msg {
            WsMessage::Update(update) if update.ticker == self.ticker => {
                Some(Ok(StreamEvent::Update(BookUpdate::from(&update))))
            }
            WsMessage::Update(update) => {
                debug!(ticker = %update.ticker, "ignoring update for another ticker");
                None
            }
            WsMessage::Subscribed(ack) if ack.ticker == self.ticker => {
                Some(Ok(StreamEvent::Subscribed))
            }
            WsMessage::Subscribed(_) | WsMessage::Heartbeat => None,
            WsMessage::Unsubscribed(ack) if ack.ticker == self.ticker => {
                Some(Err(Error::ConnectionClosed))
            }
            WsMessage::Unsubscribed(_) => None,
            WsMessage::Error(err) if err.fatal => Some(Ok(StreamEvent::Rejected(err.message))),
            WsMessage::Error(err) => {
                warn!(ticker = %self.ticker, code = ?err.code, message = %err.message, "stream error");
                None
            }
        }
    }
}

#[async_trait]
impl UpdateStream for WebSocketClient {
    async fn next_event(&mut self) -> Option<Result<StreamEvent, Error>> {
        if self.closed {
            return None;
        }
        loop {
            match self.read.next().await? {
                Ok(Message::Text(text)) => match serde_json::from_str::<WsMessage>(&text) {
                    Ok(msg) => {
                        if let Some(event) = self.decode_event(msg) {
                            return Some(event);
                        }
                    }
                    // A dropped update surfaces as a sequence gap on the next one.
                    Err(e) => warn!(ticker = %self.ticker, error = %e, "undecodable frame"),
                },
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.write.send(Message::Pong(data)).await {
                        return Some(Err(e.into()));
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(ticker = %self.ticker, ?frame, "server closed stream");
                    self.closed = true;
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        if !self.closed {
            let unsubscribe = WsCommand::Unsubscribe {
                ticker: self.ticker.clone(),
            };
            if let Err(e) = self.send_command(unsubscribe).await {
                debug!(ticker = %self.ticker, error = %e, "unsubscribe failed");
            }
            self.closed = true;
        }
        self.write.close().await?;
        Ok(())
    }
}

/// Opens [`WebSocketClient`] connections for the sync engine
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    /// Create a connector for the configured streaming endpoint
    pub fn new(config: &Config) -> Self {
        Self {
            url: config.ws_endpoint().clone(),
        }
    }

    /// The streaming endpoint
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    type Stream = WebSocketClient;

    async fn connect(&self, instrument: &str) -> Result<Self::Stream, Error> {
        WebSocketClient::connect(&self.url, instrument).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_uses_configured_endpoint() {
        let config = Config::new("https://x.example", "wss://x.example/ws", "u", "k").unwrap();
        let connector = WsConnector::new(&config);
        assert_eq!(connector.url().as_str(), "wss://x.example/ws");
    }

    #[test]
    fn test_subscribe_command_shape() {
        let cmd = WsCommand::Subscribe {
            ticker: "BTC-PERP".to_string(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "subscribe");
        assert_eq!(json["ticker"], "BTC-PERP");
    }
}
