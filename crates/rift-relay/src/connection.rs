//! Per-connection task: register with the hub, then pump frames both ways
//! until either side closes.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::Result;
use crate::hub::RelayHub;
use crate::link::{Link, Outbound};

/// Which pool an accepted socket belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Desktop side, registered under a user id.
    Conduit { user_id: String },
    /// Mobile side.
    Peer,
}

/// Drive one upgraded WebSocket for its whole lifetime.
pub async fn handle_connection<S>(ws: WebSocketStream<S>, role: Role, hub: RelayHub)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let (link, mut rx, closer) = Link::new();

    match &role {
        Role::Conduit { user_id } => hub.accept_conduit(user_id, link.clone()).await,
        Role::Peer => hub.accept_peer(link.clone()).await,
    }

    loop {
        tokio::select! {
            biased;

            // Queued frames go out before a pending close is honoured.
            Some(out) = rx.recv() => {
                let msg = match out {
                    Outbound::Text(text) => Message::Text(text.into()),
                    Outbound::Ping => Message::Ping(Vec::new()),
                };
                if sink.send(msg).await.is_err() {
                    break;
                }
            }

            _ = closer.notified() => {
                tracing::debug!(conn = %link.id(), "Closing socket on request");
                break;
            }

            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(conn = %link.id(), error = %e, "Binary frame is not UTF-8");
                            break;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(conn = %link.id(), error = %e, "WS error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                };

                if let Err(e) = dispatch(&hub, &role, &link, &text).await {
                    tracing::warn!(conn = %link.id(), role = ?role, error = %e, "Closing socket");
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
    drop(rx);

    match role {
        Role::Conduit { .. } => hub.conduit_closed(link.id()).await,
        Role::Peer => hub.peer_closed(link.id()).await,
    }
}

async fn dispatch(hub: &RelayHub, role: &Role, link: &Link, text: &str) -> Result<()> {
    match role {
        Role::Conduit { .. } => hub.on_conduit_frame(link, text).await,
        Role::Peer => hub.on_peer_frame(link, text).await,
    }
}
