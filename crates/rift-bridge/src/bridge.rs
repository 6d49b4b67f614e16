//! Bridge orchestrator.
//!
//! Ties the tunnel, the local control plane, and per-peer session handlers
//! together:
//! - tunnel events create, feed, and release sessions
//! - discovery events attach and detach the control plane
//! - any change recomputes [`BridgeStatus`], publishes it on a watch channel,
//!   and sends it to every peer whose secure channel is ready

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use rift_common::PairingId;
use rift_config::BridgeConfig;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::control_plane::ControlPlane;
use crate::discovery::{Discovery, DiscoveryEvent, LocalCandidate};
use crate::error::{BridgeError, Result};
use crate::keys::PublicKeySource;
use crate::mobile::{self, BridgeStatus, ControlResponse};
use crate::session::{SessionContext, SessionFactory, SessionHandler};
use crate::tunnel::{TunnelClient, TunnelEvent};

/// Delay before re-broadcasting status after a connection is approved.
pub const APPROVAL_BROADCAST_DELAY: Duration = Duration::from_millis(100);

/// The desktop bridge. Owns its state; no globals.
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

pub(crate) struct BridgeInner {
    control: Arc<dyn ControlPlane>,
    discovery: Arc<dyn Discovery>,
    factory: Arc<dyn SessionFactory>,
    keys: Arc<dyn PublicKeySource>,
    status_tx: watch::Sender<BridgeStatus>,
    state: Mutex<BridgeState>,
}

#[derive(Default)]
struct BridgeState {
    tunnel: Option<TunnelClient>,
    tunnel_task: Option<JoinHandle<()>>,
    watch_task: Option<JoinHandle<()>>,
    tunnel_connected: bool,
    local_connected: bool,
    /// Identity of the last candidate that failed to attach.
    last_failed: Option<u16>,
    sessions: HashMap<PairingId, SessionEntry>,
}

struct SessionEntry {
    handler: Arc<dyn SessionHandler>,
    queue: mpsc::UnboundedSender<Value>,
    worker: JoinHandle<()>,
    subscriptions: HashMap<String, JoinHandle<()>>,
}

impl SessionEntry {
    fn release(self) {
        self.worker.abort();
        for (_, task) in self.subscriptions {
            task.abort();
        }
        self.handler.cleanup();
    }
}

impl Bridge {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        discovery: Arc<dyn Discovery>,
        factory: Arc<dyn SessionFactory>,
        keys: Arc<dyn PublicKeySource>,
    ) -> Self {
        let (status_tx, _) = watch::channel(BridgeStatus::default());
        Self {
            inner: Arc::new(BridgeInner {
                control,
                discovery,
                factory,
                keys,
                status_tx,
                state: Mutex::new(BridgeState::default()),
            }),
        }
    }

    /// Start watching for the control plane and open the tunnel. Does
    /// nothing while the tunnel is already connected.
    pub fn initialize(&self, config: &BridgeConfig) -> Result<()> {
        if self.is_tunnel_connected() {
            tracing::info!("Already connected, skipping initialization");
            return Ok(());
        }
        self.inner.start_watch();
        self.inner.connect_tunnel(config)
    }

    /// Tear everything down: discovery, control plane, tunnel, sessions.
    pub fn disconnect(&self) {
        self.inner.shutdown();
    }

    pub fn status(&self) -> BridgeStatus {
        self.inner.status()
    }

    /// Receives every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<BridgeStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn is_tunnel_connected(&self) -> bool {
        self.inner
            .state()
            .tunnel
            .as_ref()
            .is_some_and(TunnelClient::is_connected)
    }

    pub fn session_count(&self) -> usize {
        self.inner.state().sessions.len()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl BridgeInner {
    fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn status(&self) -> BridgeStatus {
        let state = self.state();
        BridgeStatus {
            tunnel_connected: state.tunnel_connected,
            local_connected: state.local_connected,
            peer_connected: !state.sessions.is_empty(),
        }
    }

    fn send_to_peer(&self, pairing: &PairingId, payload: Value) {
        let tunnel = self.state().tunnel.clone();
        match tunnel {
            Some(tunnel) => {
                tunnel.send_to_peer(pairing, payload);
            }
            None => tracing::error!(peer = %pairing, "Cannot send message, no tunnel"),
        }
    }

    // -- tunnel ---------------------------------------------------------------

    fn connect_tunnel(self: &Arc<Self>, config: &BridgeConfig) -> Result<()> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let tunnel = TunnelClient::new(
            &config.relay_url,
            &config.user_id,
            Duration::from_millis(config.reconnect_delay_ms),
            events_tx,
        );

        {
            let mut state = self.state();
            if let Some(old) = state.tunnel.take() {
                tracing::info!("Disconnecting existing tunnel");
                old.disconnect();
            }
            if let Some(task) = state.tunnel_task.take() {
                task.abort();
            }
            state.tunnel_connected = false;
            state.tunnel = Some(tunnel.clone());
            state.tunnel_task = Some(tokio::spawn(pump_tunnel_events(
                Arc::downgrade(self),
                events_rx,
            )));
        }

        tracing::info!(user = %config.user_id, "Connecting tunnel");
        tunnel.connect()
    }

    fn on_tunnel_event(self: &Arc<Self>, event: TunnelEvent) {
        match event {
            TunnelEvent::Open => {
                self.state().tunnel_connected = true;
                self.notify_status();
            }
            TunnelEvent::Closed => {
                self.state().tunnel_connected = false;
                self.notify_status();
            }
            TunnelEvent::NewConnection(pairing) => {
                self.open_session(&pairing);
                match self.keys.export_public_key() {
                    Ok(key) => self.send_to_peer(&pairing, mobile::pubkey_frame(&key)),
                    Err(e) => tracing::error!(peer = %pairing, error = %e, "Failed to send public key"),
                }
                self.notify_status();
            }
            TunnelEvent::Message(pairing, envelope) => {
                let state = self.state();
                match state.sessions.get(&pairing) {
                    Some(entry) => {
                        let _ = entry.queue.send(envelope);
                    }
                    None => tracing::warn!(peer = %pairing, "No handler for mobile connection"),
                }
            }
            TunnelEvent::ConnectionClosed(pairing) => {
                self.close_session(&pairing);
                self.notify_status();
            }
        }
    }

    // -- sessions -------------------------------------------------------------

    fn open_session(self: &Arc<Self>, pairing: &PairingId) {
        let ctx = SessionContext::new(pairing.clone(), Arc::downgrade(self));
        let handler = self.factory.create(pairing, ctx);

        let (queue, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(session_worker(
            Arc::downgrade(self),
            pairing.clone(),
            Arc::clone(&handler),
            rx,
        ));

        let entry = SessionEntry {
            handler,
            queue,
            worker,
            subscriptions: HashMap::new(),
        };
        let replaced = self.state().sessions.insert(pairing.clone(), entry);
        if let Some(old) = replaced {
            old.release();
        }
        tracing::info!(peer = %pairing, "Session opened");
    }

    fn close_session(&self, pairing: &PairingId) {
        let entry = self.state().sessions.remove(pairing);
        match entry {
            Some(entry) => {
                entry.release();
                tracing::info!(peer = %pairing, "Session closed");
            }
            None => tracing::debug!(peer = %pairing, "Close for unknown session"),
        }
    }

    async fn process_message(
        &self,
        pairing: &PairingId,
        handler: &dyn SessionHandler,
        envelope: Value,
    ) -> Result<()> {
        let Some(result) = handler.handle_message(envelope).await? else {
            return Ok(());
        };

        if let Some(frame) = mobile::pass_through(&result) {
            tracing::debug!(peer = %pairing, "Passing handler output through");
            self.send_to_peer(pairing, frame);
            return Ok(());
        }

        let Some(response) = handler.handle_decrypted_message(&result).await? else {
            return Ok(());
        };
        let encrypted = handler.encrypt_message(response).await?;
        self.send_to_peer(pairing, encrypted);
        Ok(())
    }

    // -- subscriptions ----------------------------------------------------------

    pub(crate) fn subscribe(self: &Arc<Self>, pairing: &PairingId, path: &str) {
        let mut events = self.control.observe(path);
        let weak = Arc::downgrade(self);
        let peer = pairing.clone();
        let observed = path.to_string();

        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.forward_update(&peer, &observed, &event.data).await;
            }
        });

        let mut state = self.state();
        match state.sessions.get_mut(pairing) {
            Some(entry) => {
                tracing::debug!(peer = %pairing, path, "Subscribed");
                if let Some(old) = entry.subscriptions.insert(path.to_string(), task) {
                    old.abort();
                }
            }
            None => task.abort(),
        }
    }

    pub(crate) fn unsubscribe(&self, pairing: &PairingId, path: &str) {
        let mut state = self.state();
        let task = state
            .sessions
            .get_mut(pairing)
            .and_then(|entry| entry.subscriptions.remove(path));
        if let Some(task) = task {
            tracing::debug!(peer = %pairing, path, "Unsubscribed");
            task.abort();
        }
    }

    async fn forward_update(&self, pairing: &PairingId, path: &str, data: &Value) {
        let handler = self
            .state()
            .sessions
            .get(pairing)
            .map(|entry| Arc::clone(&entry.handler));
        let Some(handler) = handler else {
            return;
        };
        if !handler.matches_observed_path(path) {
            return;
        }
        match handler.encrypt_message(mobile::update_frame(path, data)).await {
            Ok(encrypted) => self.send_to_peer(pairing, encrypted),
            Err(e) => tracing::error!(peer = %pairing, error = %e, "Failed to encrypt update"),
        }
    }

    // -- control plane ----------------------------------------------------------

    fn start_watch(self: &Arc<Self>) {
        let mut state = self.state();
        if state.watch_task.is_some() {
            return;
        }
        tracing::info!("Starting control plane watch");
        let events = self.discovery.watch();
        state.watch_task = Some(tokio::spawn(pump_discovery_events(
            Arc::downgrade(self),
            events,
        )));
    }

    async fn on_discovery_event(self: &Arc<Self>, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Found(candidate) => self.attach(candidate).await,
            DiscoveryEvent::Lost => {
                tracing::info!("Control plane gone");
                {
                    let mut state = self.state();
                    state.local_connected = false;
                    state.last_failed = None;
                }
                self.control.detach();
                self.notify_status();
            }
        }
    }

    async fn attach(self: &Arc<Self>, candidate: LocalCandidate) {
        let identity = candidate.identity();
        if self.state().last_failed == Some(identity) {
            return;
        }

        tracing::info!(port = identity, "Control plane found");
        match self.control.attach(&candidate).await {
            Ok(()) => {
                let mut state = self.state();
                state.local_connected = true;
                state.last_failed = None;
                tracing::info!(port = identity, "Control plane verified and attached");
            }
            Err(e) => {
                tracing::info!(port = identity, error = %e, "Control plane attach failed (stale lockfile?)");
                {
                    let mut state = self.state();
                    state.local_connected = false;
                    state.last_failed = Some(identity);
                }
                self.control.detach();
            }
        }
        self.notify_status();
    }

    pub(crate) async fn control_request(
        &self,
        path: &str,
        method: &str,
        body: Option<Value>,
    ) -> ControlResponse {
        match self.control.request(path, method, body).await {
            Ok(content) => ControlResponse::ok(content),
            Err(e) => {
                tracing::error!(path, method, error = %e, "Control plane request failed");
                match e {
                    BridgeError::ControlPlane { status, message } => {
                        ControlResponse::error(status, message)
                    }
                    other => ControlResponse::error(other.status(), other.to_string()),
                }
            }
        }
    }

    // -- status -----------------------------------------------------------------

    /// Publish the current status, then send it to every ready peer. Each
    /// peer's encrypt and send runs on its own task.
    pub(crate) fn notify_status(self: &Arc<Self>) {
        let status = self.status();
        self.status_tx.send_replace(status);

        let ready: Vec<(PairingId, Arc<dyn SessionHandler>)> = self
            .state()
            .sessions
            .iter()
            .filter(|(_, entry)| entry.handler.is_ready())
            .map(|(id, entry)| (id.clone(), Arc::clone(&entry.handler)))
            .collect();

        for (pairing, handler) in ready {
            let weak = Arc::downgrade(self);
            let frame = mobile::status_frame(&status);
            tokio::spawn(async move {
                match handler.encrypt_message(frame).await {
                    Ok(encrypted) => {
                        if let Some(inner) = weak.upgrade() {
                            inner.send_to_peer(&pairing, encrypted);
                        }
                    }
                    Err(e) => {
                        tracing::error!(peer = %pairing, error = %e, "Failed to broadcast status to mobile")
                    }
                }
            });
        }
    }

    pub(crate) fn schedule_status_broadcast(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(APPROVAL_BROADCAST_DELAY).await;
            if let Some(inner) = weak.upgrade() {
                inner.notify_status();
            }
        });
    }

    fn shutdown(&self) {
        let (tunnel, sessions) = {
            let mut state = self.state();
            if let Some(task) = state.watch_task.take() {
                task.abort();
            }
            if let Some(task) = state.tunnel_task.take() {
                task.abort();
            }
            state.tunnel_connected = false;
            state.local_connected = false;
            state.last_failed = None;
            let sessions: Vec<SessionEntry> = state.sessions.drain().map(|(_, e)| e).collect();
            (state.tunnel.take(), sessions)
        };

        self.control.detach();
        if let Some(tunnel) = tunnel {
            tunnel.disconnect();
        }
        for entry in sessions {
            entry.release();
        }
        self.status_tx.send_replace(BridgeStatus::default());
    }
}

async fn pump_tunnel_events(
    bridge: Weak<BridgeInner>,
    mut events: mpsc::UnboundedReceiver<TunnelEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = bridge.upgrade() else {
            break;
        };
        inner.on_tunnel_event(event);
    }
}

async fn pump_discovery_events(
    bridge: Weak<BridgeInner>,
    mut events: mpsc::Receiver<DiscoveryEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = bridge.upgrade() else {
            break;
        };
        inner.on_discovery_event(event).await;
    }
}

async fn session_worker(
    bridge: Weak<BridgeInner>,
    pairing: PairingId,
    handler: Arc<dyn SessionHandler>,
    mut queue: mpsc::UnboundedReceiver<Value>,
) {
    while let Some(envelope) = queue.recv().await {
        let Some(inner) = bridge.upgrade() else {
            break;
        };
        if let Err(e) = inner.process_message(&pairing, handler.as_ref(), envelope).await {
            tracing::error!(peer = %pairing, error = %e, "Error handling mobile message");
        }
    }
}
