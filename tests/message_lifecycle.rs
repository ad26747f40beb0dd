//! Direct message state machine: status, recall, reactions, delete, forward.

mod common;

use chatter_proto::{ClientIntent, ScopeRef, ServerEvent};
use chatterd::config::PolicyConfig;
use chatterd::store::Store;
use common::{message_id, Harness};

async fn two_users() -> Harness {
    let harness = Harness::new().await;
    harness.seed_user("alice@x", "Alice").await;
    harness.seed_user("bob@x", "Bob").await;
    harness
}

fn send(to: &str, content: &str) -> ClientIntent {
    ClientIntent::SendDirectMessage {
        to: to.into(),
        content: content.into(),
        kind: Default::default(),
        file: None,
    }
}

#[tokio::test]
async fn send_sets_delivered_when_receiver_is_online() {
    let harness = two_users().await;
    let alice = harness.connect("alice@x").await;
    let _bob = harness.connect("bob@x").await;

    let data = harness
        .expect_ok("alice@x", &alice, send("bob@x", "hi"))
        .await
        .unwrap();
    assert_eq!(data["status"], "delivered");

    // Unknown receiver is rejected before any state is touched.
    harness
        .expect_err("alice@x", &alice, send("nobody@x", "hi"), "not_found")
        .await;
}

#[tokio::test]
async fn mark_read_is_receiver_only_and_notifies_sender() {
    let harness = two_users().await;
    let mut alice = harness.connect("alice@x").await;
    let bob = harness.connect("bob@x").await;

    let data = harness
        .expect_ok("alice@x", &alice, send("bob@x", "hi"))
        .await
        .unwrap();
    let id = message_id(&data);

    // The sender cannot mark their own message read.
    harness
        .expect_err(
            "alice@x",
            &alice,
            ClientIntent::MarkRead {
                peer: "bob@x".into(),
                message_id: id.clone(),
            },
            "permission",
        )
        .await;

    harness
        .expect_ok(
            "bob@x",
            &bob,
            ClientIntent::MarkRead {
                peer: "alice@x".into(),
                message_id: id.clone(),
            },
        )
        .await;

    match alice.recv_event().await {
        ServerEvent::MessageRead { message_id, reader } => {
            assert_eq!(message_id, id);
            assert_eq!(reader, "bob@x");
        }
        other => panic!("expected messageRead, got {other:?}"),
    }
}

#[tokio::test]
async fn recall_inside_window_succeeds_and_is_terminal() {
    let harness = two_users().await;
    let alice = harness.connect("alice@x").await;
    let mut bob = harness.connect("bob@x").await;

    let data = harness
        .expect_ok("alice@x", &alice, send("bob@x", "oops"))
        .await
        .unwrap();
    let id = message_id(&data);
    bob.drain();

    // Only the sender may recall.
    harness
        .expect_err(
            "bob@x",
            &bob,
            ClientIntent::RecallDirectMessage {
                peer: "alice@x".into(),
                message_id: id.clone(),
            },
            "permission",
        )
        .await;

    harness
        .expect_ok(
            "alice@x",
            &alice,
            ClientIntent::RecallDirectMessage {
                peer: "bob@x".into(),
                message_id: id.clone(),
            },
        )
        .await;
    assert!(matches!(
        bob.recv_event().await,
        ServerEvent::MessageRecalled { .. }
    ));

    // Recalled is terminal: no reads, no reactions, no second recall.
    harness
        .expect_err(
            "bob@x",
            &bob,
            ClientIntent::MarkRead {
                peer: "alice@x".into(),
                message_id: id.clone(),
            },
            "policy",
        )
        .await;
    harness
        .expect_err(
            "bob@x",
            &bob,
            ClientIntent::ReactDirectMessage {
                peer: "alice@x".into(),
                message_id: id.clone(),
                value: "👍".into(),
            },
            "policy",
        )
        .await;
    harness
        .expect_err(
            "alice@x",
            &alice,
            ClientIntent::RecallDirectMessage {
                peer: "bob@x".into(),
                message_id: id,
            },
            "policy",
        )
        .await;

    // The stored content is the placeholder, not the original.
    let conversation = harness
        .store
        .get_conversation("alice@x_bob@x")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        conversation.messages[0].content,
        chatter_proto::RECALL_PLACEHOLDER
    );
}

#[tokio::test]
async fn recall_outside_window_is_rejected() {
    // A zero-second window makes every recall arrive too late.
    let harness = Harness::with_policy(PolicyConfig {
        recall_window_secs: 0,
        ..PolicyConfig::default()
    })
    .await;
    harness.seed_user("alice@x", "Alice").await;
    harness.seed_user("bob@x", "Bob").await;
    let alice = harness.connect("alice@x").await;

    let data = harness
        .expect_ok("alice@x", &alice, send("bob@x", "too late"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    harness
        .expect_err(
            "alice@x",
            &alice,
            ClientIntent::RecallDirectMessage {
                peer: "bob@x".into(),
                message_id: message_id(&data),
            },
            "policy",
        )
        .await;
}

#[tokio::test]
async fn direct_reactions_replace_never_toggle() {
    let harness = two_users().await;
    let alice = harness.connect("alice@x").await;

    let data = harness
        .expect_ok("alice@x", &alice, send("bob@x", "react to me"))
        .await
        .unwrap();
    let id = message_id(&data);

    let react = |value: &str| ClientIntent::ReactDirectMessage {
        peer: "bob@x".into(),
        message_id: id.clone(),
        value: value.into(),
    };

    // Same value twice: still exactly one reaction from alice.
    harness.expect_ok("alice@x", &alice, react("👍")).await;
    let reactions = harness
        .expect_ok("alice@x", &alice, react("👍"))
        .await
        .unwrap();
    assert_eq!(reactions["alice@x"]["value"], "👍");

    // A different value replaces, never stacks.
    let reactions = harness
        .expect_ok("alice@x", &alice, react("❤️"))
        .await
        .unwrap();
    assert_eq!(reactions["alice@x"]["value"], "❤️");
    assert_eq!(reactions.as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn direct_delete_removes_message_from_conversation() {
    let harness = two_users().await;
    let alice = harness.connect("alice@x").await;
    let bob = harness.connect("bob@x").await;

    let keep = harness
        .expect_ok("alice@x", &alice, send("bob@x", "keep"))
        .await
        .unwrap();
    let drop = harness
        .expect_ok("alice@x", &alice, send("bob@x", "drop"))
        .await
        .unwrap();

    // Only the sender may delete.
    harness
        .expect_err(
            "bob@x",
            &bob,
            ClientIntent::DeleteDirectMessage {
                peer: "alice@x".into(),
                message_id: message_id(&drop),
            },
            "permission",
        )
        .await;

    harness
        .expect_ok(
            "alice@x",
            &alice,
            ClientIntent::DeleteDirectMessage {
                peer: "bob@x".into(),
                message_id: message_id(&drop),
            },
        )
        .await;

    let conversation = harness
        .store
        .get_conversation("alice@x_bob@x")
        .await
        .unwrap()
        .unwrap();
    let ids: Vec<_> = conversation
        .messages
        .iter()
        .map(|m| m.message_id.as_str())
        .collect();
    assert_eq!(ids, vec![message_id(&keep)]);
}

#[tokio::test]
async fn forwarded_message_is_independent_of_the_original() {
    let harness = two_users().await;
    harness.seed_user("carol@x", "Carol").await;
    let alice = harness.connect("alice@x").await;

    let original = harness
        .expect_ok("alice@x", &alice, send("bob@x", "original"))
        .await
        .unwrap();
    let original_id = message_id(&original);

    let forwarded = harness
        .expect_ok(
            "alice@x",
            &alice,
            ClientIntent::ForwardMessage {
                source: ScopeRef::Direct { peer: "bob@x".into() },
                target: ScopeRef::Direct {
                    peer: "carol@x".into(),
                },
                message_id: original_id.clone(),
            },
        )
        .await
        .unwrap();

    let forwarded_id = message_id(&forwarded);
    assert_ne!(forwarded_id, original_id);
    assert_eq!(forwarded["isForwarded"], true);
    assert_eq!(forwarded["forwardedFrom"]["originalMessageId"], original_id);
    assert_eq!(
        forwarded["forwardedFrom"]["originalScopeId"],
        "alice@x_bob@x"
    );

    // Deleting the copy leaves the original untouched.
    harness
        .expect_ok(
            "alice@x",
            &alice,
            ClientIntent::DeleteDirectMessage {
                peer: "carol@x".into(),
                message_id: forwarded_id,
            },
        )
        .await;
    let source = harness
        .store
        .get_conversation("alice@x_bob@x")
        .await
        .unwrap()
        .unwrap();
    assert!(source.message(&original_id).is_some());
    assert_eq!(source.message(&original_id).unwrap().content, "original");
}

#[tokio::test]
async fn forwarding_a_recalled_message_is_rejected() {
    let harness = two_users().await;
    harness.seed_user("carol@x", "Carol").await;
    let alice = harness.connect("alice@x").await;

    let data = harness
        .expect_ok("alice@x", &alice, send("bob@x", "gone soon"))
        .await
        .unwrap();
    let id = message_id(&data);
    harness
        .expect_ok(
            "alice@x",
            &alice,
            ClientIntent::RecallDirectMessage {
                peer: "bob@x".into(),
                message_id: id.clone(),
            },
        )
        .await;

    harness
        .expect_err(
            "alice@x",
            &alice,
            ClientIntent::ForwardMessage {
                source: ScopeRef::Direct { peer: "bob@x".into() },
                target: ScopeRef::Direct {
                    peer: "carol@x".into(),
                },
                message_id: id,
            },
            "policy",
        )
        .await;
}

#[tokio::test]
async fn history_is_ordered_and_scoped_to_the_conversation() {
    let harness = two_users().await;
    harness.seed_user("carol@x", "Carol").await;
    let mut alice = harness.connect("alice@x").await;

    harness
        .expect_ok("alice@x", &alice, send("bob@x", "first"))
        .await;
    harness
        .expect_ok("alice@x", &alice, send("bob@x", "second"))
        .await;
    harness
        .expect_ok("alice@x", &alice, send("carol@x", "other thread"))
        .await;

    harness
        .expect_ok(
            "alice@x",
            &alice,
            ClientIntent::FetchDirectHistory { with: "bob@x".into() },
        )
        .await;

    match alice.recv_event().await {
        ServerEvent::ConversationHistory { with, messages } => {
            assert_eq!(with, "bob@x");
            let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
            assert_eq!(contents, vec!["first", "second"]);
        }
        other => panic!("expected conversationHistory, got {other:?}"),
    }
}
