//! The subscription transport state machine.
//!
//! One [`SubscriptionTransport`] owns one physical connection and
//! multiplexes any number of concurrent subscriptions over it. The moving
//! parts per connected session:
//!
//! - exactly one receive loop task, the sole reader of the adapter;
//! - at most one keep-alive supervisor task;
//! - N consumer tasks, each iterating its own [`Subscription`].
//!
//! # Lifecycle
//!
//! ```text
//! IDLE ──connect()──► CONNECTING ──► CONNECTED ──fail()──► CLOSING ──► IDLE
//! ```
//!
//! `CONNECTING` and `CLOSING` are transient, guarded by flags so a
//! concurrent double-connect or double-close is rejected or ignored.
//! The close choreography runs as an independent spawned task: once
//! started it always runs to completion, no matter what happens to the
//! task that triggered it.
//!
//! # Failure scope
//!
//! Transport-wide errors (connection failure, protocol violation, server
//! error, missed keep-alive) close the whole transport and are fanned out
//! to every active subscription. Per-query errors reach only the
//! subscription they are tagged with; everything else keeps streaming.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::QueryId;
use crate::protocol::{
    AnswerType, ExecutionResult, GRAPHQL_WS_SUBPROTOCOL, GraphQlWs, ParsedAnswer, ProtocolHandler,
    Request,
};

use super::adapter::{ConnectionAdapter, WsConnection};
use super::listener::ListenerQueue;
use super::subscription::{ListenerRegistry, Subscription};

// ============================================================================
// TransportConfig
// ============================================================================

/// Timeouts for the network-facing awaits of the transport.
///
/// `None` means wait forever.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on opening the underlying connection.
    pub connect_timeout: Option<Duration>,
    /// Bound on the protocol initialization handshake.
    pub ack_timeout: Option<Duration>,
    /// Bound on the clean-close wait and on `close()` itself.
    pub close_timeout: Option<Duration>,
    /// Window within which a keep-alive frame must arrive.
    ///
    /// `None` disables keep-alive supervision entirely.
    pub keep_alive_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            ack_timeout: Some(Duration::from_secs(10)),
            close_timeout: Some(Duration::from_secs(10)),
            keep_alive_timeout: None,
        }
    }
}

impl TransportConfig {
    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the initialization handshake timeout.
    #[inline]
    #[must_use]
    pub fn ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Sets the close timeout.
    #[inline]
    #[must_use]
    pub fn close_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Sets the keep-alive window.
    #[inline]
    #[must_use]
    pub fn keep_alive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.keep_alive_timeout = timeout;
        self
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Awaits `future`, bounded by `limit` when one is set.
async fn bounded<F: Future>(limit: Option<Duration>, future: F) -> std::result::Result<F::Output, ()> {
    match limit {
        Some(duration) => timeout(duration, future).await.map_err(|_| ()),
        None => Ok(future.await),
    }
}

fn millis(limit: Option<Duration>) -> u64 {
    limit.map(|d| d.as_millis() as u64).unwrap_or_default()
}

// ============================================================================
// Core State
// ============================================================================

/// Mutable transport state, guarded by one mutex.
///
/// The lock is never held across an await.
struct CoreState {
    connecting: bool,
    connected: bool,
    closing: bool,
    next_query_id: u64,
    listeners: FxHashMap<QueryId, ListenerQueue>,
    /// Last fatal reason; retained after close so late callers get the
    /// original failure instead of a generic message.
    close_reason: Option<Error>,
    receive_task: Option<JoinHandle<()>>,
    keep_alive_task: Option<JoinHandle<()>>,
    close_task: Option<JoinHandle<()>>,
}

impl CoreState {
    fn new() -> Self {
        Self {
            connecting: false,
            connected: false,
            closing: false,
            next_query_id: 1,
            listeners: FxHashMap::default(),
            close_reason: None,
            receive_task: None,
            keep_alive_task: None,
            close_task: None,
        }
    }

    /// Fails unless the transport is open for traffic.
    fn check_open(&self) -> Result<()> {
        if self.connected && !self.closing {
            Ok(())
        } else if let Some(reason) = &self.close_reason {
            Err(Error::closed(reason.clone()))
        } else {
            Err(Error::NotConnected)
        }
    }
}

// ============================================================================
// Inner
// ============================================================================

/// Shared body of the transport, referenced by every background task.
struct Inner<P> {
    adapter: Arc<dyn ConnectionAdapter>,
    protocol: P,
    config: TransportConfig,
    state: Mutex<CoreState>,
    /// Pulsed by the receive loop on every keep-alive frame.
    liveness: Notify,
    /// `true` while no subscription is in flight.
    idle_tx: watch::Sender<bool>,
    /// `true` while the transport is torn down. Starts set.
    closed_tx: watch::Sender<bool>,
}

impl<P: ProtocolHandler> Inner<P> {
    /// Allocates a query id, registers its listener, and sends the start
    /// frame.
    ///
    /// The listener is registered before the frame goes out so the receive
    /// loop can never observe an answer for an unregistered id.
    async fn send_query(
        &self,
        request: &Request,
    ) -> Result<(QueryId, tokio::sync::mpsc::UnboundedReceiver<super::listener::ListenerItem>)>
    {
        let (query_id, rx) = {
            let mut st = self.state.lock();
            st.check_open()?;

            let query_id = QueryId::new(st.next_query_id);
            st.next_query_id += 1;

            let (listener, rx) = ListenerQueue::new(query_id);
            st.listeners.insert(query_id, listener);
            // Signalled under the lock so the map and the idle flag can
            // never be observed out of step. send_replace also stores the
            // value while no receiver is subscribed; send would not.
            self.idle_tx.send_replace(false);
            (query_id, rx)
        };

        let frame = match self.protocol.subscribe_frame(query_id, request) {
            Ok(frame) => frame,
            Err(e) => {
                self.unregister(query_id);
                return Err(e);
            }
        };

        if let Err(e) = self.adapter.send(frame).await {
            self.unregister(query_id);
            return Err(e);
        }

        trace!(%query_id, "query sent");
        Ok((query_id, rx))
    }

    /// Clears the stop obligation for one query.
    fn clear_send_stop(&self, query_id: QueryId) {
        let mut st = self.state.lock();
        if let Some(listener) = st.listeners.get_mut(&query_id) {
            listener.send_stop = false;
        }
    }

    /// Routes one parsed answer to its destination.
    fn route(&self, answer: ParsedAnswer) {
        match answer.answer_type {
            AnswerType::KeepAlive => {
                trace!("keep-alive received");
                self.liveness.notify_one();
            }
            AnswerType::ConnectionAck => {
                trace!("connection_ack outside handshake ignored");
            }
            AnswerType::Data | AnswerType::Complete => {
                let Some(query_id) = answer.query_id else {
                    warn!(answer_type = ?answer.answer_type, "answer without query id dropped");
                    return;
                };

                let mut st = self.state.lock();
                match st.listeners.get_mut(&query_id) {
                    Some(listener) => listener.put(answer.answer_type, answer.result),
                    // Listener already gone (consumer cancelled); late
                    // frames for it are dropped silently.
                    None => trace!(%query_id, "answer for unknown query id dropped"),
                }
            }
        }
    }

    /// Delivers a per-query error to the one listener it is tagged with.
    fn deliver_query_error(&self, error: Error) {
        let Some(query_id) = error.query_id() else {
            warn!(%error, "query error without query id dropped");
            return;
        };

        let mut st = self.state.lock();
        match st.listeners.get_mut(&query_id) {
            Some(listener) => listener.set_exception(error),
            None => trace!(%query_id, "query error for unknown query id dropped"),
        }
    }

    /// Single background reader of the adapter.
    async fn receive_loop(self: Arc<Self>) {
        debug!("receive loop started");

        loop {
            let frame = match self.adapter.receive().await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(error = %e, "receive failed");
                    self.fail(e, false);
                    break;
                }
            };

            trace!(frame = %frame, "frame received");

            match self.protocol.parse_answer(&frame) {
                Ok(answer) => self.route(answer),
                // A query-scoped failure poisons one listener, not the
                // transport.
                Err(e) if e.is_query_error() => self.deliver_query_error(e),
                Err(e) => {
                    warn!(error = %e, "fatal answer parse failure");
                    self.fail(e, false);
                    break;
                }
            }
        }

        debug!("receive loop terminated");
    }

    /// Watches for keep-alive frames; closes the transport when the
    /// server goes quiet for longer than the configured window.
    async fn keep_alive_loop(self: Arc<Self>, window: Duration) {
        debug!(?window, "keep-alive supervisor started");

        loop {
            match timeout(window, self.liveness.notified()).await {
                Ok(()) => continue,
                Err(_) => {
                    let close_in_progress = {
                        let st = self.state.lock();
                        st.closing || !st.connected
                    };
                    if !close_in_progress {
                        warn!(?window, "no keep-alive received within window");
                        self.fail(
                            Error::server(
                                "No keep-alive message has been received within the expected interval",
                            ),
                            false,
                        );
                    }
                    break;
                }
            }
        }
    }

    /// Single entry point into the close choreography. Idempotent: a close
    /// already in progress (or finished) is detected and ignored.
    ///
    /// The choreography itself is spawned as an independent task so that
    /// it runs to completion regardless of what happens to the caller.
    fn fail(self: &Arc<Self>, reason: Error, clean_close: bool) {
        let mut st = self.state.lock();

        if st.closing {
            debug!(superseded_by = %reason, "close already in progress");
            return;
        }
        if !st.connected {
            debug!(error = %reason, "transport already closed");
            return;
        }

        debug!(%reason, clean_close, "closing transport");
        st.closing = true;
        st.close_reason = Some(reason);

        let inner = Arc::clone(self);
        st.close_task = Some(tokio::spawn(async move {
            inner.run_close(clean_close).await;
        }));
    }

    /// The close choreography. Every step is best-effort; the final
    /// teardown runs no matter what the earlier steps encountered.
    async fn run_close(self: Arc<Self>, clean_close: bool) {
        let reason = {
            let st = self.state.lock();
            st.close_reason.clone().unwrap_or(Error::ClosedByUser)
        };

        // Stop the keep-alive supervisor first so it cannot observe the
        // teardown as a missed liveness window.
        let keep_alive = self.state.lock().keep_alive_task.take();
        if let Some(handle) = keep_alive {
            handle.abort();
            let _ = handle.await;
        }

        self.protocol.on_close().await;

        if clean_close {
            self.clean_close().await;
        }

        if let Some(frame) = self.protocol.terminate_frame() {
            if let Err(e) = self.adapter.send(frame).await {
                debug!(error = %e, "terminate frame not sent");
            }
        }

        // Unblock every consumer still awaiting an answer.
        {
            let mut st = self.state.lock();
            for listener in st.listeners.values_mut() {
                listener.set_exception(reason.clone());
            }
        }

        if let Err(e) = self.adapter.close().await {
            debug!(error = %e, "adapter close failed");
        }

        // The receive loop may still be parked on a dead socket.
        let receive = self.state.lock().receive_task.take();
        if let Some(handle) = receive {
            handle.abort();
        }

        {
            let mut st = self.state.lock();
            st.connected = false;
            st.closing = false;
            st.close_task = None;
            self.closed_tx.send_replace(true);
        }

        info!(%reason, "transport closed");
    }

    /// Clean-close half of the choreography: cancel every outstanding
    /// subscription on the server and give it a bounded chance to
    /// acknowledge them all.
    async fn clean_close(&self) {
        let owed: Vec<QueryId> = {
            let mut st = self.state.lock();
            st.listeners
                .values_mut()
                .filter(|l| l.send_stop)
                .map(|l| {
                    l.send_stop = false;
                    l.query_id()
                })
                .collect()
        };

        for query_id in owed {
            let frame = match self.protocol.stop_frame(query_id) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(%query_id, error = %e, "could not build stop frame");
                    continue;
                }
            };
            if let Err(e) = self.adapter.send(frame).await {
                warn!(%query_id, error = %e, "stop frame not sent during clean close");
            }
        }

        let mut idle_rx = self.idle_tx.subscribe();
        let all_done = async move {
            let _ = idle_rx.wait_for(|idle| *idle).await;
        };
        if bounded(self.config.close_timeout, all_done).await.is_err() {
            warn!(
                timeout_ms = millis(self.config.close_timeout),
                "timed out waiting for subscriptions to finish during clean close"
            );
        }
    }
}

#[async_trait]
impl<P: ProtocolHandler> ListenerRegistry for Inner<P> {
    fn unregister(&self, query_id: QueryId) -> bool {
        let owed = {
            let mut st = self.state.lock();
            let owed = st
                .listeners
                .remove(&query_id)
                .map(|l| l.send_stop)
                .unwrap_or(false);
            if st.listeners.is_empty() {
                self.idle_tx.send_replace(true);
            }
            owed
        };

        trace!(%query_id, owed_stop = owed, "listener removed");
        owed
    }

    async fn send_stop(&self, query_id: QueryId) {
        let frame = match self.protocol.stop_frame(query_id) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%query_id, error = %e, "could not build stop frame");
                return;
            }
        };

        match self.adapter.send(frame).await {
            Ok(()) => debug!(%query_id, "stop frame sent"),
            Err(e) => warn!(%query_id, error = %e, "failed to send stop frame"),
        }
    }
}

// ============================================================================
// SubscriptionTransport
// ============================================================================

/// A stateful GraphQL transport multiplexing subscriptions over one
/// connection.
///
/// # Example
///
/// ```ignore
/// use futures_util::StreamExt;
/// use graphql_live::{Request, SubscriptionTransport, TransportConfig};
/// use url::Url;
///
/// let url = Url::parse("wss://example.com/graphql")?;
/// let transport = SubscriptionTransport::graphql_ws(url, TransportConfig::default());
/// transport.connect().await?;
///
/// let mut ticks = transport
///     .subscribe(Request::new("subscription { tick }"))
///     .await?;
/// while let Some(result) = ticks.next().await {
///     println!("{:?}", result?.data);
/// }
///
/// transport.close().await;
/// ```
pub struct SubscriptionTransport<P: ProtocolHandler> {
    inner: Arc<Inner<P>>,
}

impl<P: ProtocolHandler> Clone for SubscriptionTransport<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SubscriptionTransport<GraphQlWs> {
    /// Creates a transport speaking the `graphql-ws` protocol over a
    /// WebSocket connection to `url`.
    #[must_use]
    pub fn graphql_ws(url: Url, config: TransportConfig) -> Self {
        let adapter = WsConnection::new(url).subprotocol(GRAPHQL_WS_SUBPROTOCOL);
        Self::new(adapter, GraphQlWs::new(), config)
    }
}

impl<P: ProtocolHandler> SubscriptionTransport<P> {
    /// Creates a transport from an adapter and a protocol handler.
    #[must_use]
    pub fn new(adapter: impl ConnectionAdapter, protocol: P, config: TransportConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                adapter: Arc::new(adapter),
                protocol,
                config,
                state: Mutex::new(CoreState::new()),
                liveness: Notify::new(),
                idle_tx: watch::channel(true).0,
                closed_tx: watch::channel(true).0,
            }),
        }
    }

    /// Opens the connection and runs the protocol handshake.
    ///
    /// On success exactly one receive loop (and, when a keep-alive window
    /// is configured, one supervisor task) is running.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyConnected`] if connected or connecting
    /// - [`Error::ConnectTimeout`] if the adapter cannot connect in time
    /// - the initialization error if the handshake fails; the transport is
    ///   torn down uncleanly first
    pub async fn connect(&self) -> Result<()> {
        {
            let mut st = self.inner.state.lock();
            if st.connected || st.connecting {
                return Err(Error::AlreadyConnected);
            }
            st.connecting = true;
        }

        debug!("connecting");
        let connected = match bounded(self.inner.config.connect_timeout, self.inner.adapter.connect())
            .await
        {
            Ok(result) => result,
            Err(()) => Err(Error::connect_timeout(millis(self.inner.config.connect_timeout))),
        };

        // The connecting flag is cleared on every path, success or not.
        {
            let mut st = self.inner.state.lock();
            st.connecting = false;
            if connected.is_ok() {
                st.connected = true;
                st.next_query_id = 1;
                st.close_reason = None;
                st.close_task = None;
                // Stale listeners from a previous session are all closed;
                // their consumers already hold a terminal item.
                st.listeners.clear();
                self.inner.closed_tx.send_replace(false);
                self.inner.idle_tx.send_replace(true);
            }
        }
        connected?;

        if let Err(e) = self
            .inner
            .protocol
            .after_connect(self.inner.adapter.as_ref())
            .await
        {
            self.inner.fail(e.clone(), false);
            return Err(e);
        }

        let init = match bounded(
            self.inner.config.ack_timeout,
            self.inner.protocol.initialize(self.inner.adapter.as_ref()),
        )
        .await
        {
            Ok(result) => result,
            Err(()) => Err(Error::timeout(
                "connection initialization",
                millis(self.inner.config.ack_timeout),
            )),
        };
        if let Err(e) = init {
            self.inner.fail(e.clone(), false);
            return Err(e);
        }

        if let Err(e) = self.inner.protocol.after_initialize().await {
            self.inner.fail(e.clone(), false);
            return Err(e);
        }

        {
            let mut st = self.inner.state.lock();
            if let Some(window) = self.inner.config.keep_alive_timeout {
                st.keep_alive_task =
                    Some(tokio::spawn(Arc::clone(&self.inner).keep_alive_loop(window)));
            }
            st.receive_task = Some(tokio::spawn(Arc::clone(&self.inner).receive_loop()));
        }

        info!("transport connected");
        Ok(())
    }

    /// Starts a subscription and returns its result stream.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] before `connect()`
    /// - [`Error::Closed`] after teardown, carrying the close reason
    /// - [`Error::Connection`] if the start frame cannot be sent
    pub async fn subscribe(&self, request: Request) -> Result<Subscription> {
        let (query_id, rx) = self.inner.send_query(&request).await?;
        debug!(%query_id, "subscription started");

        Ok(Subscription::new(
            query_id,
            rx,
            Arc::clone(&self.inner) as Arc<dyn ListenerRegistry>,
        ))
    }

    /// Executes a single operation over the subscription transport.
    ///
    /// Takes the first result of a one-shot subscription. No stop frame is
    /// sent: exactly one answer is expected, so there is nothing to cancel.
    ///
    /// # Errors
    ///
    /// Everything `subscribe` can raise, plus [`Error::Query`] when the
    /// stream ends without producing a result.
    pub async fn execute(&self, request: Request) -> Result<ExecutionResult> {
        let mut subscription = self.subscribe(request).await?;
        let query_id = subscription.query_id();
        self.inner.clear_send_stop(query_id);

        let first = subscription.next().await;
        subscription.stop().await;

        match first {
            Some(result) => result,
            None => Err(Error::query_message(
                query_id,
                "Subscription ended without a result",
            )),
        }
    }

    /// Closes the transport cleanly.
    ///
    /// Outstanding subscriptions are cancelled on the server, and the
    /// server gets a bounded chance to acknowledge them before the socket
    /// is torn down. Idempotent: closing twice (or a transport that never
    /// connected) is a no-op.
    pub async fn close(&self) {
        self.inner.fail(Error::ClosedByUser, true);

        let mut closed_rx = self.inner.closed_tx.subscribe();
        let closed = async move {
            let _ = closed_rx.wait_for(|closed| *closed).await;
        };
        if bounded(self.inner.config.close_timeout, closed).await.is_err() {
            warn!(
                timeout_ms = millis(self.inner.config.close_timeout),
                "timed out waiting for the transport to close"
            );
        }
    }

    /// Waits until the transport is fully torn down.
    pub async fn wait_closed(&self) {
        let mut closed_rx = self.inner.closed_tx.subscribe();
        let _ = closed_rx.wait_for(|closed| *closed).await;
    }

    /// Returns `true` while connected and not closing.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        let st = self.inner.state.lock();
        st.connected && !st.closing
    }

    /// Number of subscriptions currently registered.
    #[inline]
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.inner.state.lock().listeners.len()
    }

    /// The recorded close reason, if the transport has failed or closed.
    #[must_use]
    pub fn close_reason(&self) -> Option<Error> {
        self.inner.state.lock().close_reason.clone()
    }

    /// Response headers recorded by the adapter during connection setup.
    #[must_use]
    pub fn response_headers(&self) -> Option<tokio_tungstenite::tungstenite::http::HeaderMap> {
        self.inner.adapter.response_headers()
    }
}

// ============================================================================
// Tests
// ============================================================================
