//! Conduit connection to the relay server.
//!
//! One socket at a time, registered under the desktop's user id. Frames from
//! the relay surface as [`TunnelEvent`]s on a channel. An unexpected close
//! schedules a single reconnect attempt after a fixed delay; an intentional
//! [`TunnelClient::disconnect`] suppresses it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rift_common::{ConduitFrame, PairingId, ServerToConduit, WireFrame};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{BridgeError, Result};

const OUTBOUND_CAPACITY: usize = 256;

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the relay told us, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TunnelEvent {
    Open,
    NewConnection(PairingId),
    Message(PairingId, Value),
    ConnectionClosed(PairingId),
    /// The socket closed or a connection attempt failed.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Connected,
}

struct TunnelState {
    phase: Phase,
    /// Bumped by every `connect()`; a socket task only touches state while
    /// its generation is current.
    generation: u64,
    intentional: bool,
    outbound: Option<mpsc::Sender<Message>>,
    closer: Option<Arc<Notify>>,
    reconnect: Option<JoinHandle<()>>,
}

struct TunnelInner {
    relay_url: String,
    user_id: String,
    reconnect_delay: Duration,
    events: mpsc::UnboundedSender<TunnelEvent>,
    state: Mutex<TunnelState>,
}

/// Handle to the conduit connection. Cheap to clone.
#[derive(Clone)]
pub struct TunnelClient {
    inner: Arc<TunnelInner>,
}

impl TunnelClient {
    pub fn new(
        relay_url: &str,
        user_id: &str,
        reconnect_delay: Duration,
        events: mpsc::UnboundedSender<TunnelEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(TunnelInner {
                relay_url: normalize_relay_url(relay_url),
                user_id: user_id.to_string(),
                reconnect_delay,
                events,
                state: Mutex::new(TunnelState {
                    phase: Phase::Idle,
                    generation: 0,
                    intentional: false,
                    outbound: None,
                    closer: None,
                    reconnect: None,
                }),
            }),
        }
    }

    /// `{relay}/conduit?userId=<id>`.
    pub fn conduit_url(&self) -> Result<String> {
        self.inner.conduit_url()
    }

    /// Start connecting. Returns immediately; the outcome arrives as
    /// [`TunnelEvent::Open`] or [`TunnelEvent::Closed`]. A no-op while
    /// connected or while an attempt is in flight.
    pub fn connect(&self) -> Result<()> {
        self.inner.connect()
    }

    /// Send `["reply", uuid, payload]`. Dropped with an error log when the
    /// tunnel is down.
    pub fn send_to_peer(&self, pairing: &PairingId, payload: Value) -> bool {
        let state = self.inner.state();
        let Some(tx) = state.outbound.as_ref().filter(|_| state.phase == Phase::Connected) else {
            tracing::error!(peer = %pairing, "Cannot send message, not connected");
            return false;
        };

        let frame = ConduitFrame::Reply {
            pairing: Some(pairing.clone()),
            payload,
        };
        match tx.try_send(Message::Text(frame.encode())) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(peer = %pairing, error = %e, "Dropping message to peer");
                false
            }
        }
    }

    /// Close the socket and cancel any pending reconnect.
    pub fn disconnect(&self) {
        let mut state = self.inner.state();
        state.intentional = true;
        if let Some(timer) = state.reconnect.take() {
            timer.abort();
        }
        if let Some(closer) = state.closer.take() {
            closer.notify_one();
        }
        state.outbound = None;
        state.phase = Phase::Idle;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state().phase == Phase::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.inner.state().phase == Phase::Connecting
    }
}

impl TunnelInner {
    fn state(&self) -> MutexGuard<'_, TunnelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TunnelEvent) {
        let _ = self.events.send(event);
    }

    fn conduit_url(&self) -> Result<String> {
        if !self.relay_url.starts_with("ws://") && !self.relay_url.starts_with("wss://") {
            return Err(BridgeError::Transport(format!(
                "relay url must use ws:// or wss://: {}",
                self.relay_url
            )));
        }
        let url = format!(
            "{}/conduit?userId={}",
            self.relay_url,
            urlencoding::encode(&self.user_id)
        );
        url.as_str().into_client_request()?;
        Ok(url)
    }

    fn connect(self: &Arc<Self>) -> Result<()> {
        let url = self.conduit_url()?;

        let generation = {
            let mut state = self.state();
            if state.phase != Phase::Idle {
                return Ok(());
            }
            state.phase = Phase::Connecting;
            state.intentional = false;
            state.generation += 1;
            state.generation
        };

        tracing::info!(url = %url, "Connecting to relay...");
        tokio::spawn(run_socket(Arc::clone(self), url, generation));
        Ok(())
    }

    /// Mark the socket of `generation` live. False if it was superseded or
    /// disconnected while the handshake ran.
    fn attach(&self, generation: u64, tx: mpsc::Sender<Message>, closer: Arc<Notify>) -> bool {
        let mut state = self.state();
        if state.generation != generation || state.intentional {
            return false;
        }
        state.phase = Phase::Connected;
        state.outbound = Some(tx);
        state.closer = Some(closer);
        true
    }

    fn finish(self: &Arc<Self>, generation: u64) {
        let reconnect = {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.phase = Phase::Idle;
            state.outbound = None;
            state.closer = None;
            !state.intentional
        };

        tracing::info!("Disconnected from relay");
        self.emit(TunnelEvent::Closed);
        if reconnect {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let mut state = self.state();
        if state.intentional {
            return;
        }
        if let Some(old) = state.reconnect.take() {
            old.abort();
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let delay = self.reconnect_delay;
        state.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let state = inner.state();
                if state.phase != Phase::Idle || state.intentional {
                    return;
                }
            }
            tracing::info!("Attempting to reconnect...");
            if let Err(e) = inner.connect() {
                tracing::error!(error = %e, "Reconnect failed");
            }
        }));
    }

    fn dispatch(&self, text: &str) {
        let event = match ServerToConduit::decode(text) {
            Ok(ServerToConduit::Open(id)) => {
                tracing::info!(peer = %id, "New mobile connection");
                TunnelEvent::NewConnection(id)
            }
            Ok(ServerToConduit::Message { pairing, payload }) => {
                TunnelEvent::Message(pairing, payload)
            }
            Ok(ServerToConduit::Close(id)) => {
                tracing::info!(peer = %id, "Mobile connection closed");
                TunnelEvent::ConnectionClosed(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error parsing relay message");
                return;
            }
        };
        self.emit(event);
    }
}

async fn run_socket(inner: Arc<TunnelInner>, url: String, generation: u64) {
    match connect_async(url.as_str()).await {
        Ok((ws, _)) => {
            let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
            let closer = Arc::new(Notify::new());
            if inner.attach(generation, tx, Arc::clone(&closer)) {
                tracing::info!("Connected to relay");
                inner.emit(TunnelEvent::Open);
                pump(ws, rx, &closer, &inner).await;
            } else {
                tracing::debug!("Dropping superseded relay socket");
                let mut ws = ws;
                let _ = ws.close(None).await;
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to connect to relay"),
    }

    inner.finish(generation);
}

async fn pump(
    ws: RelaySocket,
    mut rx: mpsc::Receiver<Message>,
    closer: &Notify,
    inner: &TunnelInner,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            biased;

            Some(msg) = rx.recv() => {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }

            _ = closer.notified() => break,

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => inner.dispatch(&text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Relay socket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sink.close().await;
}

/// Accept `http(s)://` relay addresses and pin `localhost` to IPv4.
pub fn normalize_relay_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let url = if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    };
    url.replacen("localhost", "127.0.0.1", 1)
}
