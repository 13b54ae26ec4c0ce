//! Connection adapters.
//!
//! An adapter owns one physical connection and exposes it as raw string
//! frames. The transport core is the only component that touches it: the
//! receive loop is the sole reader, and writes are serialized on the sink.
//! [`WsConnection`] is the shipped WebSocket implementation; multipart-HTTP
//! or in-memory adapters implement the same trait.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// ============================================================================
// ConnectionAdapter
// ============================================================================

/// Capability interface over one physical connection.
///
/// Lifetime is bounded by one connect/close cycle. The transport guarantees
/// that `receive` is only ever called from its receive loop; `send` may be
/// called from any task and must serialize internally.
#[async_trait]
pub trait ConnectionAdapter: Send + Sync + 'static {
    /// Opens the underlying connection.
    async fn connect(&self) -> Result<()>;

    /// Closes the underlying connection.
    async fn close(&self) -> Result<()>;

    /// Sends one raw string frame.
    async fn send(&self, message: String) -> Result<()>;

    /// Receives the next raw string frame.
    async fn receive(&self) -> Result<String>;

    /// The endpoint this adapter targets, if it has one.
    fn url(&self) -> Option<&Url> {
        None
    }

    /// Response headers recorded during connection setup, if any.
    fn response_headers(&self) -> Option<HeaderMap> {
        None
    }
}

// ============================================================================
// WsConnection
// ============================================================================

/// WebSocket adapter over `tokio-tungstenite`.
///
/// Text frames pass through as-is; Ping/Pong/Binary are skipped. A Close
/// frame, stream end, or socket error surfaces as [`Error::Connection`],
/// which the transport treats as fatal.
pub struct WsConnection {
    /// Endpoint URL (`ws://` or `wss://`).
    url: Url,
    /// Subprotocols offered in the `Sec-WebSocket-Protocol` header.
    subprotocols: Vec<String>,
    /// Write half, shared by all sending tasks.
    write: Mutex<Option<WsSink>>,
    /// Read half, owned by the receive loop.
    read: Mutex<Option<WsSource>>,
    /// Headers from the upgrade response.
    response_headers: parking_lot::Mutex<Option<HeaderMap>>,
}

impl WsConnection {
    /// Creates an adapter for the given endpoint.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            subprotocols: Vec::new(),
            write: Mutex::new(None),
            read: Mutex::new(None),
            response_headers: parking_lot::Mutex::new(None),
        }
    }

    /// Adds a WebSocket subprotocol to offer during the upgrade.
    #[must_use]
    pub fn subprotocol(mut self, name: impl Into<String>) -> Self {
        self.subprotocols.push(name.into());
        self
    }
}

#[async_trait]
impl ConnectionAdapter for WsConnection {
    async fn connect(&self) -> Result<()> {
        let mut write = self.write.lock().await;
        let mut read = self.read.lock().await;
        if write.is_some() {
            return Err(Error::AlreadyConnected);
        }
        // close() leaves the read half in place so it can keep waking a
        // parked reader; by the time a reconnect happens it is stale.
        *read = None;

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::connection(format!("Invalid WebSocket request: {e}")))?;

        if !self.subprotocols.is_empty() {
            let joined = self.subprotocols.join(", ");
            let value = HeaderValue::from_str(&joined)
                .map_err(|e| Error::connection(format!("Invalid subprotocol header: {e}")))?;
            request
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", value);
        }

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::connection(e.to_string()))?;

        *self.response_headers.lock() = Some(response.headers().clone());

        let (sink, source) = stream.split();
        *write = Some(sink);
        *read = Some(source);

        debug!(url = %self.url, "WebSocket connected");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Only the write half is touched here: the receive loop may still be
        // parked on the read half, and closing the sink is what wakes it.
        let mut write = self.write.lock().await;
        if let Some(mut sink) = write.take() {
            sink.close()
                .await
                .map_err(|e| Error::connection(e.to_string()))?;
            debug!("WebSocket closed");
        }
        Ok(())
    }

    async fn send(&self, message: String) -> Result<()> {
        let mut write = self.write.lock().await;
        let sink = write.as_mut().ok_or(Error::NotConnected)?;

        trace!(frame = %message, "frame sent");
        sink.send(Message::Text(message.into()))
            .await
            .map_err(|e| Error::connection(e.to_string()))
    }

    async fn receive(&self) -> Result<String> {
        let mut read = self.read.lock().await;
        let source = read.as_mut().ok_or(Error::NotConnected)?;

        loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Close(_))) => {
                    return Err(Error::connection("WebSocket closed by remote"));
                }
                // Ignore Ping, Pong, Binary, raw frames
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::connection(e.to_string())),
                None => return Err(Error::connection("WebSocket stream ended")),
            }
        }
    }

    fn url(&self) -> Option<&Url> {
        Some(&self.url)
    }

    fn response_headers(&self) -> Option<HeaderMap> {
        self.response_headers.lock().clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
