//! End-to-end relay scenarios over real sockets.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rift_relay::{RelayHub, RelayServer};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(2);

async fn start() -> (SocketAddr, RelayHub) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = RelayHub::new();
    let server = RelayServer::new(hub.clone(), Duration::from_secs(10));
    tokio::spawn(server.serve(listener));
    (addr, hub)
}

async fn conduit(addr: SocketAddr, hub: &RelayHub, user: &str) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}/conduit?userId={user}"))
        .await
        .unwrap();
    wait_until(|| async { hub.is_user_online(user).await }).await;
    ws
}

async fn mobile(addr: SocketAddr) -> Ws {
    connect_async(format!("ws://{addr}/mobile")).await.unwrap().0
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(WAIT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn send(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next JSON frame, skipping control frames.
async fn recv(ws: &mut Ws) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    })
    .await
    .expect("no frame in time")
}

/// True if nothing but control frames arrive within a short window.
async fn quiet(ws: &mut Ws) -> bool {
    let res = tokio::time::timeout(Duration::from_millis(150), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => return other,
            }
        }
    })
    .await;
    res.is_err()
}

/// Wait for the server to close the socket.
async fn closed(ws: &mut Ws) -> bool {
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .unwrap_or(false)
}

async fn pair(addr: SocketAddr, conduit: &mut Ws, user: &str) -> (Ws, String) {
    let mut peer = mobile(addr).await;
    send(&mut peer, json!(["connect", user])).await;
    assert_eq!(recv(&mut peer).await, json!(["connect-result", true]));
    let open = recv(conduit).await;
    assert_eq!(open[0], "open");
    (peer, open[1].as_str().unwrap().to_string())
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn pairing_and_forwarding_scenario() {
    let (addr, hub) = start().await;
    let mut c = conduit(addr, &hub, "u1").await;
    let (mut peer, uuid1) = pair(addr, &mut c, "u1").await;

    send(&mut peer, json!(["send", {"path": "/x"}])).await;
    assert_eq!(recv(&mut c).await, json!(["message", uuid1, {"path": "/x"}]));

    send(&mut c, json!(["reply", uuid1, {"status": 200}])).await;
    assert_eq!(recv(&mut peer).await, json!(["receive", {"status": 200}]));
}

#[tokio::test]
async fn connect_to_offline_user_fails_without_contacting_conduits() {
    let (addr, hub) = start().await;
    let mut c = conduit(addr, &hub, "u1").await;
    let mut peer = mobile(addr).await;

    send(&mut peer, json!(["connect", "ghost"])).await;
    assert_eq!(recv(&mut peer).await, json!(["connect-result", false]));
    assert!(quiet(&mut c).await);

    // Still unpaired: a later connect to a live user works.
    send(&mut peer, json!(["connect", "u1"])).await;
    assert_eq!(recv(&mut peer).await, json!(["connect-result", true]));
}

#[tokio::test]
async fn each_pairing_gets_a_distinct_uuid() {
    let (addr, hub) = start().await;
    let mut c = conduit(addr, &hub, "u1").await;
    let mut ids = std::collections::HashSet::new();
    let mut peers = Vec::new();
    for _ in 0..5 {
        let (peer, id) = pair(addr, &mut c, "u1").await;
        ids.insert(id);
        peers.push(peer);
    }
    assert_eq!(ids.len(), 5);
    assert_eq!(hub.peer_count("u1").await, 5);
}

#[tokio::test]
async fn stale_reply_keeps_conduit_open() {
    let (addr, hub) = start().await;
    let mut c = conduit(addr, &hub, "u1").await;

    send(&mut c, json!(["reply", "no-such-peer", {"status": 200}])).await;
    let (mut peer, id) = pair(addr, &mut c, "u1").await;
    send(&mut c, json!(["reply", 123, {}])).await;
    send(&mut c, json!(["reply", id, "still here"])).await;
    assert_eq!(recv(&mut peer).await, json!(["receive", "still here"]));
}

#[tokio::test]
async fn conduit_close_closes_every_peer() {
    let (addr, hub) = start().await;
    let mut c = conduit(addr, &hub, "u1").await;
    let mut peers = Vec::new();
    for _ in 0..3 {
        peers.push(pair(addr, &mut c, "u1").await);
    }

    c.close(None).await.unwrap();
    for (peer, id) in &mut peers {
        assert_eq!(recv(peer).await, json!(["close", id]));
        assert!(closed(peer).await);
    }
    wait_until(|| async { !hub.is_user_online("u1").await }).await;
    assert_eq!(hub.peer_count("u1").await, 0);
}

#[tokio::test]
async fn second_conduit_replaces_the_first() {
    let (addr, hub) = start().await;
    let mut first = conduit(addr, &hub, "u1").await;
    let (mut peer, id) = pair(addr, &mut first, "u1").await;

    let mut second = connect_async(format!("ws://{addr}/conduit?userId=u1"))
        .await
        .unwrap()
        .0;
    assert!(closed(&mut first).await);
    assert_eq!(recv(&mut peer).await, json!(["close", id]));
    assert!(closed(&mut peer).await);

    let (_peer2, _id2) = pair(addr, &mut second, "u1").await;
    assert!(hub.is_user_online("u1").await);
}

#[tokio::test]
async fn peer_close_notifies_conduit() {
    let (addr, hub) = start().await;
    let mut c = conduit(addr, &hub, "u1").await;
    let (mut peer, id) = pair(addr, &mut c, "u1").await;

    peer.close(None).await.unwrap();
    assert_eq!(recv(&mut c).await, json!(["close", id]));
}

#[tokio::test]
async fn protocol_violations_close_the_offender() {
    let (addr, hub) = start().await;
    let mut c = conduit(addr, &hub, "u1").await;

    let mut unpaired = mobile(addr).await;
    send(&mut unpaired, json!(["send", {"path": "/x"}])).await;
    assert!(closed(&mut unpaired).await);

    let mut garbage = mobile(addr).await;
    garbage
        .send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();
    assert!(closed(&mut garbage).await);

    let (mut twice, _id) = pair(addr, &mut c, "u1").await;
    send(&mut twice, json!(["connect", "u1"])).await;
    assert!(closed(&mut twice).await);

    send(&mut c, json!(["open", "x"])).await;
    assert!(closed(&mut c).await);
}

#[tokio::test]
async fn conduit_without_user_id_is_rejected() {
    let (addr, _hub) = start().await;
    let err = connect_async(format!("ws://{addr}/conduit")).await.unwrap_err();
    match err {
        tungstenite::Error::Http(resp) => assert_eq!(resp.status().as_u16(), 401),
        other => panic!("expected HTTP 401, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_upgrade_path_is_dropped() {
    let (addr, _hub) = start().await;
    assert!(connect_async(format!("ws://{addr}/elsewhere")).await.is_err());
}

#[tokio::test]
async fn http_status_endpoints() {
    let (addr, hub) = start().await;

    let root = http_get(addr, "/").await;
    assert!(root.starts_with("HTTP/1.1 200"));
    assert!(root.ends_with("Rift server is running."));

    let offline = http_get(addr, "/status/u1").await;
    assert!(offline.contains(r#""desktopOnline":false"#));

    let _c = conduit(addr, &hub, "u1").await;
    let online = http_get(addr, "/status/u1").await;
    assert!(online.starts_with("HTTP/1.1 200"));
    assert!(online.contains(r#""ok":true"#));
    assert!(online.contains(r#""userId":"u1""#));
    assert!(online.contains(r#""desktopOnline":true"#));

    let missing = http_get(addr, "/status/").await;
    assert!(missing.starts_with("HTTP/1.1 400"));

    let nested = http_get(addr, "/status/u1/extra").await;
    assert!(nested.starts_with("HTTP/1.1 404"));

    let plain = http_get(addr, "/mobile").await;
    assert!(plain.starts_with("HTTP/1.1 400"));

    let nothing = http_get(addr, "/nope").await;
    assert!(nothing.starts_with("HTTP/1.1 404"));
}

#[tokio::test]
async fn client_ping_gets_exactly_one_pong() {
    let (addr, _hub) = start().await;
    let mut peer = mobile(addr).await;
    peer.send(Message::Ping(b"beat".to_vec())).await.unwrap();

    let mut pongs = 0;
    let _ = tokio::time::timeout(Duration::from_millis(300), async {
        while let Some(Ok(msg)) = peer.next().await {
            if let Message::Pong(data) = msg {
                assert_eq!(data, b"beat".to_vec());
                pongs += 1;
            }
        }
    })
    .await;
    assert_eq!(pongs, 1);
}
