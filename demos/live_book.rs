//! Live orderbook - keeps a book in sync and prints its top every second
//!
//! Usage:
//!   EXCHANGE_HTTP_URL=https://... EXCHANGE_WS_URL=wss://... \
//!   EXCHANGE_USERNAME=xxx EXCHANGE_API_KEY=xxx EXCHANGE_TICKER=BTC-PERP \
//!   cargo run --example live_book
//!
//! Stop with Ctrl-C.

use std::time::Duration;

use exchange_client::config::ReconnectConfig;
use exchange_client::types::Side;
use exchange_client::{Config, TradingClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("exchange_client=info".parse()?),
        )
        .init();

    let http = std::env::var("EXCHANGE_HTTP_URL").expect("Set EXCHANGE_HTTP_URL");
    let ws = std::env::var("EXCHANGE_WS_URL").expect("Set EXCHANGE_WS_URL");
    let username = std::env::var("EXCHANGE_USERNAME").expect("Set EXCHANGE_USERNAME");
    let api_key = std::env::var("EXCHANGE_API_KEY").expect("Set EXCHANGE_API_KEY");
    let ticker = std::env::var("EXCHANGE_TICKER").expect("Set EXCHANGE_TICKER");

    println!("=== Live Orderbook: {ticker} ===\n");

    let config = Config::new(&http, &ws, username, api_key)?.with_reconnect(
        ReconnectConfig::new()
            .max_retries(0)
            .max_delay_ms(10_000)
            .jitter_factor(0.2),
    );
    let client = TradingClient::connect(config).await?;
    let book = client.subscribe(&ticker).await?;

    let mut ticker_interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker_interval.tick() => {}
        }

        let status = client
            .status(&ticker)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unsubscribed".to_string());

        let Some(view) = book.snapshot_view() else {
            println!("[{status}] book unavailable");
            continue;
        };

        println!(
            "[{status}] seq {:?}  spread {:?}  mid {:?}",
            view.last_sequence(),
            view.spread(),
            view.mid_price()
        );
        for level in view.depth(Side::Ask, 5).iter().rev() {
            println!("    ask {:>12} x {}", level.price, level.quantity);
        }
        for level in view.depth(Side::Bid, 5) {
            println!("    bid {:>12} x {}", level.price, level.quantity);
        }
        println!();
    }

    println!("Shutting down...");
    client.shutdown().await;
    Ok(())
}
