//! Full-transport test: gateway, WebSocket upgrade, handshake auth, frame
//! codec, dispatch, and fan-out, all in-process on an ephemeral port.

mod common;

use chatter_proto::{decode_client_frame, ServerEvent, ServerFrame, UserProfile};
use chatterd::auth::Claims;
use chatterd::config::ServerConfig;
use chatterd::network::Gateway;
use chatterd::store::Store;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const SECRET: &str = "integration-test-secret";

fn token(email: &str) -> String {
    encode(
        &Header::default(),
        &Claims {
            email: email.to_string(),
            exp: chrono::Utc::now().timestamp() + 600,
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn spawn_server() -> (common::Harness, std::net::SocketAddr) {
    let harness = common::Harness::new().await;
    for (email, name) in [("alice@x", "Alice"), ("bob@x", "Bob")] {
        harness
            .store
            .put_user(&UserProfile {
                email: email.into(),
                full_name: name.into(),
                phone: None,
                avatar: None,
            })
            .await
            .unwrap();
    }

    let config = ServerConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        tls: None,
        metrics_port: 0,
    };
    let gateway = Gateway::bind(&config, SECRET.to_string(), Arc::clone(&harness.engine))
        .await
        .expect("bind gateway");
    let addr = gateway.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = gateway.run().await;
    });
    (harness, addr)
}

async fn connect(
    addr: std::net::SocketAddr,
    email: &str,
) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
    let url = format!("ws://{addr}/ws?token={}", token(email));
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("websocket connect");
    ws
}

async fn next_frame<S>(ws: &mut tokio_tungstenite::WebSocketStream<S>) -> ServerFrame
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read error");
        if let WsMessage::Text(raw) = message {
            return serde_json::from_str(&raw).expect("valid server frame");
        }
    }
}

#[tokio::test]
async fn direct_message_flows_end_to_end() {
    let (_harness, addr) = spawn_server().await;

    let mut alice = connect(addr, "alice@x").await;
    let mut bob = connect(addr, "bob@x").await;

    alice
        .send(WsMessage::Text(
            r#"{"seq":5,"event":"sendDirectMessage","data":{"to":"bob@x","content":"over the wire"}}"#
                .to_string(),
        ))
        .await
        .unwrap();

    // Alice gets the ack with her correlation id and the created message.
    let ack = next_frame(&mut alice).await;
    assert_eq!(ack.seq, Some(5));
    match ack.event {
        ServerEvent::Ack(body) => {
            assert!(body.ok);
            let data = body.data.unwrap();
            assert_eq!(data["content"], "over the wire");
            assert_eq!(data["status"], "delivered");
        }
        other => panic!("expected ack, got {other:?}"),
    }

    // Bob receives the broadcast event.
    match next_frame(&mut bob).await.event {
        ServerEvent::DirectMessage { message } => {
            assert_eq!(message.sender, "alice@x");
            assert_eq!(message.content, "over the wire");
        }
        other => panic!("expected directMessage, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_frames_get_a_failure_ack_not_a_disconnect() {
    let (_harness, addr) = spawn_server().await;
    let mut alice = connect(addr, "alice@x").await;

    alice
        .send(WsMessage::Text(r#"{"event":"noSuchIntent"}"#.to_string()))
        .await
        .unwrap();
    match next_frame(&mut alice).await.event {
        ServerEvent::Ack(body) => {
            assert!(!body.ok);
            assert_eq!(body.code.as_deref(), Some("invalid"));
        }
        other => panic!("expected failure ack, got {other:?}"),
    }

    // The connection survived; a valid intent still works.
    alice
        .send(WsMessage::Text(
            r#"{"event":"typingStart","data":{"to":"bob@x"}}"#.to_string(),
        ))
        .await
        .unwrap();
    match next_frame(&mut alice).await.event {
        ServerEvent::Ack(body) => assert!(body.ok),
        other => panic!("expected ack, got {other:?}"),
    }
}

#[tokio::test]
async fn handshake_without_valid_token_is_rejected() {
    let (_harness, addr) = spawn_server().await;

    // No token at all.
    let bare = format!("ws://{addr}/ws");
    assert!(tokio_tungstenite::connect_async(bare).await.is_err());

    // Garbage token.
    let garbage = format!("ws://{addr}/ws?token=garbage");
    assert!(tokio_tungstenite::connect_async(garbage).await.is_err());

    // Wrong-secret token.
    let forged = encode(
        &Header::default(),
        &Claims {
            email: "alice@x".into(),
            exp: chrono::Utc::now().timestamp() + 600,
        },
        &EncodingKey::from_secret(b"other-secret"),
    )
    .unwrap();
    let url = format!("ws://{addr}/ws?token={forged}");
    assert!(tokio_tungstenite::connect_async(url).await.is_err());
}

#[tokio::test]
async fn client_frames_round_trip_the_shared_codec() {
    // The same codec the server uses accepts what the tests send.
    let frame =
        decode_client_frame(r#"{"event":"sendDirectMessage","data":{"to":"b@x","content":"x"}}"#)
            .unwrap();
    assert_eq!(frame.intent.name(), "sendDirectMessage");
}
