//! Integration test common infrastructure.
//!
//! Drives the engine in-process: test connections are registered straight
//! into the session registry with plain channels standing in for sockets,
//! so every fan-out is observable without a network in the way.

// Each test binary uses a different slice of this module.
#![allow(dead_code)]

use chatter_proto::{AckBody, ClientFrame, ClientIntent, ServerEvent, ServerFrame, UserProfile};
use chatterd::config::{LimitsConfig, PolicyConfig};
use chatterd::engine::Engine;
use chatterd::state::{ConnectionId, RoomRegistry, SessionRegistry};
use chatterd::store::{SqliteStore, Store};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// In-process engine plus direct store access for seeding and inspection.
pub struct Harness {
    pub engine: Arc<Engine>,
    pub store: Arc<SqliteStore>,
}

/// One fake client connection: its registry id and the receiving end of its
/// outbound event queue.
pub struct TestConnection {
    pub id: ConnectionId,
    pub rx: mpsc::Receiver<Arc<ServerFrame>>,
}

impl TestConnection {
    /// Pop the next already-delivered event, if any.
    pub fn try_event(&mut self) -> Option<ServerEvent> {
        self.rx.try_recv().ok().map(|frame| frame.event.clone())
    }

    /// Await the next event, failing the test after a short timeout.
    pub async fn recv_event(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
            .event
            .clone()
    }

    /// Discard everything queued so far.
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_policy(PolicyConfig::default()).await
    }

    pub async fn with_policy(policy: PolicyConfig) -> Self {
        let store = Arc::new(SqliteStore::open(":memory:").await.expect("open store"));
        let registry = Arc::new(SessionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let engine = Arc::new(Engine::new(
            registry,
            rooms,
            store.clone() as Arc<dyn Store>,
            policy,
            LimitsConfig::default(),
        ));
        Self { engine, store }
    }

    pub async fn seed_user(&self, email: &str, full_name: &str) {
        self.store
            .put_user(&UserProfile {
                email: email.to_string(),
                full_name: full_name.to_string(),
                phone: None,
                avatar: None,
            })
            .await
            .expect("seed user");
    }

    /// Open a live connection for `email`, running the full registration
    /// path (presence announcements included).
    pub async fn connect(&self, email: &str) -> TestConnection {
        let (tx, rx) = mpsc::channel(64);
        let id = Uuid::new_v4();
        self.engine
            .connection_opened(email, id, Utc::now(), tx)
            .await;
        TestConnection { id, rx }
    }

    pub async fn disconnect(&self, email: &str, connection: &TestConnection) {
        self.engine.connection_closed(email, connection.id).await;
    }

    /// Dispatch one intent and return its ack body.
    pub async fn intent(
        &self,
        actor: &str,
        connection: &TestConnection,
        intent: ClientIntent,
    ) -> AckBody {
        let ack = self
            .engine
            .dispatch(
                actor,
                connection.id,
                ClientFrame {
                    seq: Some(1),
                    intent,
                },
            )
            .await;
        match ack.event {
            ServerEvent::Ack(body) => body,
            other => panic!("dispatch returned a non-ack frame: {other:?}"),
        }
    }

    /// Dispatch and require success, returning the ack data payload.
    pub async fn expect_ok(
        &self,
        actor: &str,
        connection: &TestConnection,
        intent: ClientIntent,
    ) -> Option<serde_json::Value> {
        let ack = self.intent(actor, connection, intent).await;
        assert!(ack.ok, "intent failed: {:?} {:?}", ack.code, ack.message);
        ack.data
    }

    /// Dispatch and require failure with the given error code.
    pub async fn expect_err(
        &self,
        actor: &str,
        connection: &TestConnection,
        intent: ClientIntent,
        code: &str,
    ) {
        let ack = self.intent(actor, connection, intent).await;
        assert!(!ack.ok, "intent unexpectedly succeeded");
        assert_eq!(ack.code.as_deref(), Some(code), "message: {:?}", ack.message);
    }
}

/// Message id out of an ack's data payload.
pub fn message_id(data: &serde_json::Value) -> String {
    data["messageId"]
        .as_str()
        .expect("ack data has messageId")
        .to_string()
}

/// Group id out of an ack's data payload.
pub fn group_id(data: &serde_json::Value) -> String {
    data["groupId"]
        .as_str()
        .expect("ack data has groupId")
        .to_string()
}
