//! HTTP REST client for the exchange API.
//!
//! This module provides the [`RestClient`] for the exchange's REST routes.
//! Every route is a `POST` with a flat JSON body. `/buildup` trades the
//! username and API key for a session token (and a dump of every book); all
//! other routes are authenticated by that token.
//!
//! # Example
//!
//! ```rust,no_run
//! use exchange_client::client::RestClient;
//! use exchange_client::types::{LimitOrderRequest, Side};
//! use exchange_client::Config;
//! use rust_decimal::Decimal;
//!
//! # async fn example() -> exchange_client::Result<()> {
//! let config = Config::new("https://x.example", "wss://x.example/ws", "user", "key")?;
//! let rest = RestClient::new(&config)?;
//! rest.buildup().await?;
//!
//! let order = LimitOrderRequest::new("BTC-PERP", Side::Bid, Decimal::ONE, Decimal::from(100));
//! let reply = rest.place_limit(&order).await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ApiError, Error};
use crate::sync::SnapshotSource;
use crate::types::order::{
    BuildupRequest, BuildupResponse, LimitOrderBody, MarketOrderBody, SessionRequest,
};
use crate::types::{BookSnapshot, LimitOrderRequest, MarketOrderRequest};

/// Route names, relative to the REST endpoint
mod routes {
    pub const BUILDUP: &str = "buildup";
    pub const LIMIT_ORDER: &str = "limit_order";
    pub const MARKET_ORDER: &str = "market_order";
    pub const REMOVE_ALL: &str = "remove_all";
    pub const GET_DETAILS: &str = "get_details";
}

/// HTTP client for the exchange REST API
#[derive(Debug)]
pub struct RestClient {
    client: Client,
    config: Config,
    session_token: RwLock<Option<String>>,
}

impl RestClient {
    /// Create a new REST client
    ///
    /// No request is made until [`buildup`](Self::buildup) is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            config: config.clone(),
            session_token: RwLock::new(None),
        })
    }

    /// Whether a session token is held
    pub fn is_authenticated(&self) -> bool {
        self.session_token.read().is_some()
    }

    /// Authenticate and fetch every book the exchange knows about
    ///
    /// Stores the returned session token for later calls, replacing any
    /// previous one.
    ///
    /// # Errors
    ///
    /// - [`Error::Authentication`] if the credentials are refused or no token
    ///   is returned
    /// - [`Error::MalformedSnapshot`] if the book dump cannot be decoded
    pub async fn buildup(&self) -> Result<HashMap<String, BookSnapshot>, Error> {
        let body = BuildupRequest {
            username: self.config.username().to_string(),
            api_key: self.config.api_key().to_string(),
        };
        let response: BuildupResponse = self.post(routes::BUILDUP, &body).await?;

        let token = response.session_token.ok_or_else(|| {
            Error::Authentication("buildup reply carried no session token".to_string())
        })?;
        *self.session_token.write() = Some(token);

        let books = parse_book_data(&response.order_book_data)?;
        info!(
            username = %self.config.username(),
            books = books.len(),
            "session established"
        );
        Ok(books)
    }

    /// Place a limit order
    pub async fn place_limit(&self, order: &LimitOrderRequest) -> Result<Value, Error> {
        let token = self.session()?;
        let body = LimitOrderBody {
            username: self.config.username(),
            session_token: &token,
            ticker: &order.ticker,
            volume: order.volume,
            price: order.price,
            is_bid: order.side.is_bid(),
        };
        debug!(ticker = %order.ticker, side = ?order.side, price = %order.price, "placing limit order");
        self.post(routes::LIMIT_ORDER, &body).await
    }

    /// Place a market order
    pub async fn place_market(&self, order: &MarketOrderRequest) -> Result<Value, Error> {
        let token = self.session()?;
        let body = MarketOrderBody {
            username: self.config.username(),
            session_token: &token,
            ticker: &order.ticker,
            volume: order.volume,
            is_bid: order.side.is_bid(),
        };
        debug!(ticker = %order.ticker, side = ?order.side, "placing market order");
        self.post(routes::MARKET_ORDER, &body).await
    }

    /// Cancel all resting orders
    pub async fn remove_all(&self) -> Result<Value, Error> {
        let body = self.session_request()?;
        self.post(routes::REMOVE_ALL, &body).await
    }

    /// Get account details (balances, positions, open orders)
    pub async fn get_details(&self) -> Result<Value, Error> {
        let body = self.session_request()?;
        self.post(routes::GET_DETAILS, &body).await
    }

    fn session(&self) -> Result<String, Error> {
        self.session_token
            .read()
            .clone()
            .ok_or(Error::NotAuthenticated)
    }

    fn session_request(&self) -> Result<SessionRequest, Error> {
        Ok(SessionRequest {
            username: self.config.username().to_string(),
            session_token: self.session()?,
        })
    }

    /// Make a POST request to a route
    async fn post<T, B>(&self, route: &str, body: &B) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.config.route_url(route);
        let response = self.client.post(&url).json(body).send().await?;

        self.handle_response(response).await
    }

    /// Handle the HTTP response, checking for errors
    async fn handle_response<T>(&self, response: reqwest::Response) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);

            if matches!(status.as_u16(), 401 | 403) {
                return Err(Error::Authentication(message));
            }
            return Err(Error::Api(ApiError::new(status.as_u16(), message)));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(Error::from)
    }

    /// Get the REST endpoint
    pub fn base_url(&self) -> &str {
        self.config.http_endpoint().as_str()
    }
}

#[async_trait]
impl SnapshotSource for RestClient {
    /// Bootstraps through `/buildup`, which also renews the session token
    async fn fetch_snapshot(&self, instrument: &str) -> Result<BookSnapshot, Error> {
        let mut books = self.buildup().await?;
        books
            .remove(instrument)
            .ok_or_else(|| Error::InvalidTicker(instrument.to_string()))
    }
}

/// Pull a readable message out of an error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Decode buildup's `orderBookData`, a JSON string of ticker -> snapshot
fn parse_book_data(data: &str) -> Result<HashMap<String, BookSnapshot>, Error> {
    serde_json::from_str(data).map_err(|e| Error::MalformedSnapshot(format!("orderBookData: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn client() -> RestClient {
        let config =
            Config::new("https://exchange.example.com", "wss://exchange.example.com/ws", "u", "k")
                .unwrap();
        RestClient::new(&config).unwrap()
    }

    #[test]
    fn test_parse_book_data() {
        let data = r#"{
            "BTC-PERP": {"bids": [[100, 5]], "asks": [["101", "3"]], "sequence": 10},
            "ETH-PERP": {"sequence": 4}
        }"#;
        let books = parse_book_data(data).unwrap();
        assert_eq!(books.len(), 2);

        let btc = &books["BTC-PERP"];
        assert_eq!(btc.sequence, 10);
        assert_eq!(btc.bids[0].price, dec!(100));
        assert_eq!(btc.asks[0].quantity, dec!(3));

        assert!(books["ETH-PERP"].bids.is_empty());
    }

    #[test]
    fn test_parse_book_data_rejects_garbage() {
        assert!(matches!(
            parse_book_data("not json"),
            Err(Error::MalformedSnapshot(_))
        ));
        assert!(matches!(
            parse_book_data(r#"{"BTC-PERP": {"bids": []}}"#),
            Err(Error::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"message": "bad ticker"}"#), "bad ticker");
        assert_eq!(error_message(r#"{"error": "nope"}"#), "nope");
        assert_eq!(error_message("plain text"), "plain text");
    }

    #[tokio::test]
    async fn test_session_calls_require_buildup() {
        let rest = client();
        assert!(!rest.is_authenticated());

        let order = LimitOrderRequest::new("BTC-PERP", crate::types::Side::Bid, dec!(1), dec!(100));
        assert!(matches!(
            rest.place_limit(&order).await,
            Err(Error::NotAuthenticated)
        ));
        assert!(matches!(rest.remove_all().await, Err(Error::NotAuthenticated)));
        assert!(matches!(rest.get_details().await, Err(Error::NotAuthenticated)));
    }

    #[test]
    fn test_base_url() {
        assert_eq!(client().base_url(), "https://exchange.example.com/");
    }
}
