//! Integration tests: a real relay on an ephemeral loopback port, driven by
//! plain WebSocket clients.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use dotchat_server::{Heartbeat, RelayServer, ServerError};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const WAIT: Duration = Duration::from_secs(5);

async fn start() -> (RelayServer, u16) {
    let server = RelayServer::new(LOOPBACK);
    let (port, _) = server.start(0).await.unwrap();
    (server, port)
}

async fn connect(server: &RelayServer, port: u16) -> Ws {
    let before = server.session_count().await;
    let (ws, _) = connect_async(format!("ws://127.0.0.1:{}/ws", port))
        .await
        .unwrap();
    wait_for_sessions(server, before + 1).await;
    ws
}

async fn wait_for_sessions(server: &RelayServer, n: usize) {
    timeout(WAIT, async {
        while server.session_count().await != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

async fn send(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn next_text(ws: &mut Ws) -> String {
    timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {:?}", other),
            }
        }
    })
    .await
    .unwrap()
}

async fn next_json(ws: &mut Ws) -> Value {
    serde_json::from_str(&next_text(ws).await).unwrap()
}

#[tokio::test]
async fn join_is_announced_to_existing_clients() {
    let (server, port) = start().await;
    let mut a = connect(&server, port).await;
    let mut b = connect(&server, port).await;

    send(&mut b, json!({"type": "presence:join", "name": "Bob"})).await;
    assert_eq!(
        next_json(&mut a).await,
        json!({"type": "system", "event": "join", "name": "Bob"})
    );

    // The joiner does not hear its own join; the next thing it sees is A's.
    send(&mut a, json!({"type": "presence:join", "name": "Ana"})).await;
    assert_eq!(
        next_json(&mut b).await,
        json!({"type": "system", "event": "join", "name": "Ana"})
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn application_frames_echo_to_sender_unmodified() {
    let (server, port) = start().await;
    let mut a = connect(&server, port).await;
    let mut b = connect(&server, port).await;

    let raw = r#"{"type":"message:e2e","name":"Ana","from":"KEY","payload":{"nonce":"bg==","cipher":"Yw=="}}"#;
    a.send(Message::Text(raw.into())).await.unwrap();

    assert_eq!(next_text(&mut a).await, raw);
    assert_eq!(next_text(&mut b).await, raw);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn opaque_text_is_forwarded() {
    let (server, port) = start().await;
    let mut a = connect(&server, port).await;
    let mut b = connect(&server, port).await;

    a.send(Message::Text("just words".into())).await.unwrap();
    assert_eq!(next_text(&mut b).await, "just words");
    assert_eq!(next_text(&mut a).await, "just words");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn utf8_binary_frames_are_handled_as_text() {
    let (server, port) = start().await;
    let mut a = connect(&server, port).await;
    let mut b = connect(&server, port).await;

    let join = json!({"type": "presence:join", "name": "Bin"}).to_string();
    b.send(Message::Binary(join.into_bytes().into())).await.unwrap();
    assert_eq!(next_json(&mut a).await["name"], "Bin");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn non_utf8_binary_is_dropped_and_session_survives() {
    let (server, port) = start().await;
    let mut a = connect(&server, port).await;
    let mut b = connect(&server, port).await;

    a.send(Message::Binary(vec![0xff, 0xfe].into())).await.unwrap();
    a.send(Message::Text("still here".into())).await.unwrap();

    // Frames are handled in order, so the first thing B sees is the text.
    assert_eq!(next_text(&mut b).await, "still here");
    assert_eq!(next_text(&mut a).await, "still here");
    assert_eq!(server.session_count().await, 2);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn silent_client_is_dropped_after_missed_pongs() {
    let server = RelayServer::new(LOOPBACK).with_heartbeat(Heartbeat {
        interval: Duration::from_millis(200),
        max_missed: 2,
    });
    let (port, _) = server.start(0).await.unwrap();
    let mut observer = connect(&server, port).await;

    // Never read again, so pings are never answered.
    let mut silent = connect(&server, port).await;
    send(&mut silent, json!({"type": "presence:join", "name": "Quiet"})).await;
    assert_eq!(next_json(&mut observer).await["event"], "join");

    // The observer keeps reading, which answers its own pings.
    assert_eq!(
        next_json(&mut observer).await,
        json!({"type": "system", "event": "leave", "name": "Quiet"})
    );
    wait_for_sessions(&server, 1).await;

    observer.send(Message::Text("alive".into())).await.unwrap();
    assert_eq!(next_text(&mut observer).await, "alive");

    drop(silent);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn leave_follows_disconnect_of_joined_client() {
    let (server, port) = start().await;
    let mut a = connect(&server, port).await;
    let unnamed = connect(&server, port).await;
    let mut b = connect(&server, port).await;

    send(&mut b, json!({"type": "presence:join", "name": "Bob"})).await;
    assert_eq!(next_json(&mut a).await["event"], "join");

    drop(unnamed);
    wait_for_sessions(&server, 2).await;

    b.close(None).await.unwrap();
    assert_eq!(
        next_json(&mut a).await,
        json!({"type": "system", "event": "leave", "name": "Bob"})
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn stop_closes_sessions_and_releases_port() {
    let (server, port) = start().await;
    let mut a = connect(&server, port).await;

    server.stop().await.unwrap();
    assert!(!server.is_running().await);

    let ended = timeout(WAIT, async {
        loop {
            match a.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "client was not disconnected by stop");

    // Idempotent.
    server.stop().await.unwrap();

    // The port is free again.
    let (again, _) = server.start(port).await.unwrap();
    assert_eq!(again, port);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn start_on_taken_port_fails_cleanly() {
    let blocker = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = blocker.local_addr().unwrap().port();

    let server = RelayServer::new(LOOPBACK);
    let err = server.start(port).await.unwrap_err();
    assert!(matches!(err, ServerError::Startup { port: p, .. } if p == port));
    assert!(!server.is_running().await);

    let reply = server.start_reply(port).await;
    assert!(!reply.ok);
    assert!(reply.error.unwrap().contains(&port.to_string()));
}

#[tokio::test]
async fn start_while_running_restarts() {
    let (server, first) = start().await;
    let (second, endpoints) = server.start(0).await.unwrap();

    assert_eq!(server.port().await, Some(second));
    assert_eq!(endpoints.localhost, vec![format!("ws://localhost:{}/ws", second)]);
    if first != second {
        assert!(TcpStream::connect((Ipv4Addr::LOCALHOST, first)).await.is_err());
    }

    let reply = server.stop_reply().await;
    assert!(reply.ok);
}

#[tokio::test]
async fn independent_servers_do_not_share_sessions() {
    let (one, one_port) = start().await;
    let (two, two_port) = start().await;

    let mut a = connect(&one, one_port).await;
    let _b = connect(&two, two_port).await;
    assert_eq!(one.session_count().await, 1);
    assert_eq!(two.session_count().await, 1);

    let mut c = connect(&one, one_port).await;
    send(&mut c, json!({"type": "presence:join", "name": "Cy"})).await;
    assert_eq!(next_json(&mut a).await["name"], "Cy");

    one.stop().await.unwrap();
    two.stop().await.unwrap();
}

#[tokio::test]
async fn health_probe_over_tcp() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (server, port) = start().await;
    let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    timeout(WAIT, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with(r#"{"ok":true}"#));

    server.stop().await.unwrap();
}
