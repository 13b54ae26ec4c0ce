//! Streams a subscription to stdout.
//!
//! Usage: cargo run --example ticker -- <url> <subscription>

use anyhow::{Context, Result};
use futures_util::StreamExt;
use graphql_live::{Request, SubscriptionTransport, TransportConfig};
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graphql_live=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let url = args.next().context("usage: ticker <url> <subscription>")?;
    let query = args.next().context("usage: ticker <url> <subscription>")?;
    let url = Url::parse(&url).context("invalid url")?;

    let transport = SubscriptionTransport::graphql_ws(url, TransportConfig::default());
    transport.connect().await?;

    let mut results = transport.subscribe(Request::new(query)).await?;
    while let Some(result) = results.next().await {
        match result {
            Ok(result) => println!("{}", serde_json::to_string(&result)?),
            Err(e) => {
                eprintln!("subscription failed: {e}");
                break;
            }
        }
    }

    transport.close().await;
    Ok(())
}
