//! Core hub client: owns the transport lifecycle, the reconnect timer and
//! the connection state.
//!
//! # Event loop
//!
//! Transport tasks and timer tasks never touch client state.  They post
//! [`Event`]s into one channel that a single driver task consumes in
//! order, so open/message/error/close handling and timer fires are strictly
//! serialized.  [`connect`](HubClient::connect),
//! [`send`](HubClient::send) and [`disconnect`](HubClient::disconnect) only
//! take the state lock briefly and never await.
//!
//! Every transport and every timer carries an id.  Events whose id does not
//! match the live handle come from a discarded transport or a cancelled
//! timer and are dropped, which is what makes cancellation race-free.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gm_protocol::{decode, encode, goodbye_content, handshake_content, Envelope};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{HubError, Result, TransportError};
use crate::transport::{Connector, FrameStream, Link, WsConnector};

/// How long a gracefully closing transport keeps delivering inbound frames
/// while waiting for the peer to finish the close.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long [`HubClient::run_until`] waits for the transport to close after
/// disconnecting.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Connection state.  Exactly one is active per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectScheduled,
}

enum Outbound {
    Frame(String),
    Close,
}

enum Event {
    Opened { link: u64 },
    Frame { link: u64, text: String },
    Error { link: u64, error: TransportError },
    Closed { link: u64 },
    TimerFired { timer: u64 },
}

/// The live transport.  Dropping it aborts the transport task, which drops
/// the connection without a close handshake.
struct LinkHandle {
    id: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The pending reconnect.  Dropping it cancels the timer.
struct ReconnectTimer {
    id: u64,
    task: JoinHandle<()>,
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Inner {
    state: ConnectionState,
    reconnect_count: u32,
    link: Option<LinkHandle>,
    timer: Option<ReconnectTimer>,
    /// Set by `disconnect()`, cleared by `connect()`.  A close observed
    /// while set never schedules a reconnect.
    manual_shutdown: bool,
    next_id: u64,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_current(&self, link: u64) -> bool {
        self.link.as_ref().is_some_and(|l| l.id == link)
    }
}

struct Shared {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    runtime: Handle,
    events: mpsc::UnboundedSender<Event>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
    link_closed: Notify,
}

impl Shared {
    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state != state {
            tracing::debug!(from = ?inner.state, to = ?state, "hub connection state");
        }
        inner.state = state;
        self.state_tx.send_replace(state);
    }
}

/// Handle to a hub connection.  Cheap to clone; all clones drive the same
/// connection.  Dropping the last clone tears down the transport, the
/// timer and the driver task.
///
/// Callbacks receive a `&HubClient`; capturing a clone inside a callback
/// keeps the client alive for as long as its own configuration exists.
#[derive(Clone)]
pub struct HubClient {
    shared: Arc<Shared>,
}

impl HubClient {
    /// Create a client over any [`Connector`].  Must be called from within
    /// a Tokio runtime; the client spawns its tasks onto that runtime.
    pub fn new(config: ClientConfig, connector: impl Connector) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            HubError::Config("HubClient must be created inside a Tokio runtime".into())
        })?;

        let (events, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let shared = Arc::new(Shared {
            config,
            connector: Arc::new(connector),
            runtime: runtime.clone(),
            events,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                reconnect_count: 0,
                link: None,
                timer: None,
                manual_shutdown: false,
                next_id: 0,
            }),
            state_tx,
            link_closed: Notify::new(),
        });

        runtime.spawn(drive(Arc::downgrade(&shared), events_rx));
        Ok(Self { shared })
    }

    /// Create a client over the WebSocket transport.
    pub fn websocket(config: ClientConfig) -> Result<Self> {
        Self::new(config, WsConnector)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn app_name(&self) -> &str {
        &self.shared.config.app_name
    }

    pub fn url(&self) -> &str {
        &self.shared.config.url
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Automatic attempts scheduled since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.inner.lock().reconnect_count
    }

    /// Observe state changes.  Intermediate states may be skipped if they
    /// change faster than the receiver polls.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub async fn wait_for_state(&self, target: ConnectionState) {
        let mut rx = self.watch_state();
        let _ = rx.wait_for(|s| *s == target).await;
    }

    /// Open a new transport, abortively discarding any existing one and
    /// cancelling any pending reconnect.  Returns immediately; the outcome
    /// arrives through the callbacks.
    pub fn connect(&self) {
        let mut inner = self.shared.inner.lock();
        self.connect_locked(&mut inner);
    }

    fn connect_locked(&self, inner: &mut Inner) {
        inner.manual_shutdown = false;
        if inner.timer.take().is_some() {
            tracing::debug!("pending reconnect cancelled by connect");
        }
        if let Some(old) = inner.link.take() {
            tracing::debug!(link = old.id, "discarding previous transport");
        }

        let id = inner.next_id();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = self.shared.runtime.spawn(run_link(
            id,
            self.shared.connector.clone(),
            self.shared.config.url.clone(),
            outbound_rx,
            self.shared.events.clone(),
        ));
        inner.link = Some(LinkHandle { id, outbound, task });
        self.shared.set_state(inner, ConnectionState::Connecting);

        tracing::info!(
            url = %self.shared.config.url,
            app = %self.shared.config.app_name,
            link = id,
            "connecting to hub"
        );
    }

    /// Cancel any pending reconnect, send a best-effort goodbye if
    /// connected, and close the transport gracefully.  No automatic
    /// reconnect follows until [`connect`](Self::connect) is called again.
    pub fn disconnect(&self) {
        let mut inner = self.shared.inner.lock();
        inner.manual_shutdown = true;
        if inner.timer.take().is_some() {
            tracing::debug!("pending reconnect cancelled by disconnect");
        }

        let was_connected = inner.state == ConnectionState::Connected;
        if let Some(link) = &inner.link {
            if was_connected {
                let goodbye = Envelope::new(
                    self.shared.config.app_name.clone(),
                    goodbye_content(&self.shared.config.app_name),
                );
                match encode(goodbye) {
                    Ok(frame) => {
                        let _ = link.outbound.send(Outbound::Frame(frame));
                    }
                    Err(e) => tracing::debug!(error = %e, "goodbye not encoded"),
                }
            }
            let _ = link.outbound.send(Outbound::Close);
        }
        self.shared.set_state(&mut inner, ConnectionState::Disconnected);

        tracing::info!(app = %self.shared.config.app_name, "disconnecting from hub");
    }

    /// Send `content` wrapped in an envelope.
    #[must_use = "send reports failure only through its return value"]
    pub fn send(&self, content: impl Into<String>) -> Result<()> {
        self.send_with(content, &())
    }

    /// Send `content` with `extra` merged into the envelope.  `extra` must
    /// serialize to a JSON object; its keys override `app`, `content` and
    /// `timestamp`.
    ///
    /// Fails with [`HubError::NotConnected`] without writing anything unless
    /// the client is connected.  Encode and write failures are also passed
    /// to the error callback.
    #[must_use = "send reports failure only through its return value"]
    pub fn send_with<T: Serialize + ?Sized>(
        &self,
        content: impl Into<String>,
        extra: &T,
    ) -> Result<()> {
        let outbound = {
            let inner = self.shared.inner.lock();
            match (&inner.state, &inner.link) {
                (ConnectionState::Connected, Some(link)) => link.outbound.clone(),
                _ => return Err(HubError::NotConnected),
            }
        };

        let content = content.into();
        let result = Envelope::new(self.shared.config.app_name.clone(), content.as_str())
            .with_extra(extra)
            .and_then(encode)
            .map_err(HubError::from)
            .and_then(|frame| {
                outbound
                    .send(Outbound::Frame(frame))
                    .map_err(|_| HubError::WriteFailed)
            });

        match result {
            Ok(()) => {
                tracing::debug!(content = %content, "sent message");
                Ok(())
            }
            Err(e) => {
                tracing::debug!(error = %e, "send failed");
                self.shared.config.dispatcher.error(self, &e);
                Err(e)
            }
        }
    }

    /// Resolves once no transport is live.
    pub async fn closed(&self) {
        loop {
            let notified = self.shared.link_closed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let idle = self.shared.inner.lock().link.is_none();
            if idle {
                return;
            }
            notified.await;
        }
    }

    /// Connect, keep the connection alive until `shutdown` resolves, then
    /// disconnect and give the transport a short grace period to close.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.connect();
        shutdown.await;
        tracing::info!(app = %self.shared.config.app_name, "shutdown requested");
        self.disconnect();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.closed())
            .await
            .is_err()
        {
            tracing::warn!("transport did not close within the grace period");
        }
    }

    // ── Event handling (driver task only) ────────────────────────────

    fn handle_event(&self, event: Event) {
        match event {
            Event::Opened { link } => self.on_open(link),
            Event::Frame { link, text } => self.on_frame(link, text),
            Event::Error { link, error } => self.on_transport_error(link, error),
            Event::Closed { link } => self.on_close(link),
            Event::TimerFired { timer } => self.on_timer(timer),
        }
    }

    fn on_open(&self, link: u64) {
        {
            let mut inner = self.shared.inner.lock();
            if !inner.is_current(link) {
                return;
            }
            if inner.manual_shutdown {
                tracing::debug!(link, "transport opened after disconnect, ignoring");
                return;
            }
            inner.reconnect_count = 0;
            self.shared.set_state(&mut inner, ConnectionState::Connected);
        }

        tracing::info!(
            url = %self.shared.config.url,
            app = %self.shared.config.app_name,
            link,
            "connected to hub"
        );

        if let Err(e) = self.send(handshake_content(&self.shared.config.app_name)) {
            tracing::warn!(error = %e, "handshake not sent");
        }
        self.shared.config.dispatcher.connected(self);
    }

    fn on_frame(&self, link: u64, text: String) {
        if !self.shared.inner.lock().is_current(link) {
            return;
        }
        tracing::trace!(bytes = text.len(), "received frame");
        self.shared.config.dispatcher.message(self, decode(&text));
    }

    fn on_transport_error(&self, link: u64, error: TransportError) {
        if !self.shared.inner.lock().is_current(link) {
            return;
        }
        tracing::warn!(link, error = %error, "hub transport error");
        self.shared
            .config
            .dispatcher
            .error(self, &HubError::Transport(error));
    }

    fn on_close(&self, link: u64) {
        let exhausted = {
            let mut inner = self.shared.inner.lock();
            if !inner.is_current(link) {
                return;
            }
            inner.link = None;
            inner.timer = None;
            self.shared
                .set_state(&mut inner, ConnectionState::Disconnected);

            let policy = &self.shared.config.reconnect;
            if inner.manual_shutdown {
                tracing::info!(link, "hub connection closed");
                None
            } else if policy.should_give_up(inner.reconnect_count) {
                Some(inner.reconnect_count)
            } else {
                inner.reconnect_count += 1;
                let attempt = inner.reconnect_count;
                let delay = policy.delay_for_attempt(attempt);
                self.schedule_reconnect(&mut inner, delay);
                tracing::warn!(
                    link,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "hub connection lost, reconnect scheduled"
                );
                None
            }
        };

        self.shared.link_closed.notify_waiters();

        if let Some(attempts) = exhausted {
            tracing::error!(attempts, "max reconnect attempts exhausted");
            self.shared
                .config
                .dispatcher
                .error(self, &HubError::ReconnectExhausted(attempts));
        }
        self.shared.config.dispatcher.closed(self);
    }

    fn schedule_reconnect(&self, inner: &mut Inner, delay: Duration) {
        let id = inner.next_id();
        let events = self.shared.events.clone();
        let task = self.shared.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::TimerFired { timer: id });
        });
        inner.timer = Some(ReconnectTimer { id, task });
        self.shared
            .set_state(inner, ConnectionState::ReconnectScheduled);
    }

    fn on_timer(&self, timer: u64) {
        let mut inner = self.shared.inner.lock();
        if !inner.timer.as_ref().is_some_and(|t| t.id == timer) {
            return;
        }
        inner.timer = None;
        tracing::info!(attempt = inner.reconnect_count, "reconnecting to hub");
        self.connect_locked(&mut inner);
    }
}

/// Driver task: the client's event loop.
async fn drive(shared: Weak<Shared>, mut events: mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        HubClient { shared }.handle_event(event);
    }
    tracing::trace!("hub client driver stopped");
}

/// Transport task: open, then pump frames both ways until either side
/// closes.  Always ends with `Closed` unless aborted.
async fn run_link(
    id: u64,
    connector: Arc<dyn Connector>,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<Event>,
) {
    let Link {
        mut sink,
        mut stream,
    } = match connector.open(&url).await {
        Ok(link) => link,
        Err(error) => {
            let _ = events.send(Event::Error { link: id, error });
            let _ = events.send(Event::Closed { link: id });
            return;
        }
    };
    let _ = events.send(Event::Opened { link: id });

    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Frame(text)) => {
                    if let Err(error) = sink.send(text).await {
                        let _ = events.send(Event::Error { link: id, error });
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(error) = sink.close().await {
                        tracing::debug!(link = id, error = %error, "close handshake failed");
                    }
                    drain(id, &mut stream, &events).await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(text)) => {
                    let _ = events.send(Event::Frame { link: id, text });
                }
                Some(Err(error)) => {
                    let _ = events.send(Event::Error { link: id, error });
                    break;
                }
                None => break,
            },
        }
    }

    let _ = events.send(Event::Closed { link: id });
}

/// Keep delivering inbound frames while the peer finishes closing.
async fn drain(id: u64, stream: &mut FrameStream, events: &mpsc::UnboundedSender<Event>) {
    let drained = tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, async {
        while let Some(Ok(text)) = stream.next().await {
            let _ = events.send(Event::Frame { link: id, text });
        }
    })
    .await;
    if drained.is_err() {
        tracing::debug!(link = id, "peer did not finish closing in time");
    }
}
