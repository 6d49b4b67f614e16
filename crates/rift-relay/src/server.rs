//! HTTP front door: WebSocket upgrade routing plus the small status API.
//!
//! Uses hyper http1 with upgrades enabled so `/conduit` and `/mobile`
//! share one listener with `GET /` and `GET /status/:userId`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::connection::{handle_connection, Role};
use crate::error::{RelayError, Result};
use crate::heartbeat::spawn_heartbeat;
use crate::hub::RelayHub;

pub const CONDUIT_PATH: &str = "/conduit";
pub const MOBILE_PATH: &str = "/mobile";

/// Relay server: an explicit context object owning the hub.
pub struct RelayServer {
    hub: RelayHub,
    heartbeat_interval: Duration,
}

impl RelayServer {
    pub fn new(hub: RelayHub, heartbeat_interval: Duration) -> Self {
        Self {
            hub,
            heartbeat_interval,
        }
    }

    pub fn hub(&self) -> &RelayHub {
        &self.hub
    }

    /// Accept connections until the listener fails.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let heartbeat = spawn_heartbeat(self.hub.clone(), self.heartbeat_interval);
        let result = accept_loop(listener, self.hub).await;
        heartbeat.abort();
        result
    }
}

async fn accept_loop(listener: TcpListener, hub: RelayHub) -> Result<()> {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
                continue;
            }
        };

        let hub = hub.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| handle_request(req, hub.clone(), addr));
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service)
                .with_upgrades()
                .await
            {
                tracing::debug!(peer = %addr, error = %e, "HTTP connection ended with error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    hub: RelayHub,
    addr: SocketAddr,
) -> Result<Response<Full<Bytes>>> {
    let path = req.uri().path().to_string();

    if hyper_tungstenite::is_upgrade_request(&req) {
        return match path.as_str() {
            CONDUIT_PATH => upgrade_conduit(req, hub, addr),
            MOBILE_PATH => upgrade(req, Role::Peer, hub, addr),
            _ => {
                // Returning an error makes hyper drop the connection without
                // writing a response.
                tracing::info!(peer = %addr, path = %path, "Upgrade request for invalid URL");
                Err(RelayError::UnknownUpgradePath(path))
            }
        };
    }

    match (req.method(), path.as_str(), status_user_segment(&path)) {
        (&Method::GET, "/", _) => text_response(StatusCode::OK, "Rift server is running."),
        (&Method::GET, _, Some(user)) => status_response(&hub, user).await,
        (_, CONDUIT_PATH | MOBILE_PATH, _) => {
            text_response(StatusCode::BAD_REQUEST, "WebSocket upgrade required")
        }
        _ => text_response(StatusCode::NOT_FOUND, "Not found"),
    }
}

fn upgrade_conduit(
    req: Request<Incoming>,
    hub: RelayHub,
    addr: SocketAddr,
) -> Result<Response<Full<Bytes>>> {
    let params: HashMap<String, String> = req
        .uri()
        .query()
        .and_then(|q| serde_urlencoded::from_str(q).ok())
        .unwrap_or_default();

    match RelayHub::validate_conduit_user(params.get("userId").map(String::as_str)) {
        Ok(user_id) => {
            tracing::info!(peer = %addr, user = %user_id, "Conduit client verified");
            upgrade(req, Role::Conduit { user_id }, hub, addr)
        }
        Err(e) => {
            tracing::info!(peer = %addr, error = %e, "Conduit connection rejected");
            text_response(StatusCode::UNAUTHORIZED, "Missing userId")
        }
    }
}

fn upgrade(
    mut req: Request<Incoming>,
    role: Role,
    hub: RelayHub,
    addr: SocketAddr,
) -> Result<Response<Full<Bytes>>> {
    let (response, websocket) = match hyper_tungstenite::upgrade(&mut req, None) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(peer = %addr, error = %e, "WebSocket upgrade error");
            return text_response(StatusCode::BAD_REQUEST, "Invalid WebSocket upgrade");
        }
    };

    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => handle_connection(ws, role, hub).await,
            Err(e) => tracing::warn!(peer = %addr, error = %e, "WS handshake failed"),
        }
    });

    Ok(response)
}

async fn status_response(hub: &RelayHub, raw_user: &str) -> Result<Response<Full<Bytes>>> {
    let user_id = urlencoding::decode(raw_user)
        .map(|s| s.into_owned())
        .unwrap_or_default();

    if user_id.is_empty() {
        let body = serde_json::json!({ "ok": false, "error": "Missing user ID." });
        return json_response(StatusCode::BAD_REQUEST, &body);
    }

    let online = hub.is_user_online(&user_id).await;
    let body = serde_json::json!({
        "ok": true,
        "userId": user_id,
        "desktopOnline": online,
    });
    json_response(StatusCode::OK, &body)
}

/// The raw `:userId` of `/status/:userId`. A nested path is not a match.
fn status_user_segment(path: &str) -> Option<&str> {
    path.strip_prefix("/status/").filter(|rest| !rest.contains('/'))
}

fn text_response(status: StatusCode, body: &'static str) -> Result<Response<Full<Bytes>>> {
    Ok(Response::builder()
        .status(status)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from_static(body.as_bytes())))?)
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Result<Response<Full<Bytes>>> {
    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .header("access-control-allow-origin", "*")
        .body(Full::new(Bytes::from(body.to_string())))?)
}
