//! Direct conversation operations: send, read, react, recall, delete,
//! history, typing.

use super::Engine;
use crate::error::{EngineError, EngineResult};
use crate::state::ConnectionId;
use crate::store::with_retry;
use chatter_proto::{
    conversation_key, Conversation, DeletePolicy, FileMeta, Message, MessageKind, MessageStatus,
    ScopeRef, ServerEvent,
};
use chrono::Duration;
use tracing::info;

impl Engine {
    pub(crate) async fn send_direct(
        &self,
        actor: &str,
        to: &str,
        content: String,
        kind: MessageKind,
        file: Option<FileMeta>,
    ) -> EngineResult<Option<serde_json::Value>> {
        if to == actor {
            return Err(EngineError::Invalid("cannot message yourself".into()));
        }
        // Both endpoints must exist before a conversation is materialized.
        self.load_user(actor).await?;
        self.load_user(to).await?;

        let now = self.now();
        let mut message = Message::direct(actor, to, content, kind, file, now);
        // Delivered immediately if the receiver has a live connection,
        // plain sent otherwise (receiver will mark read later).
        if self.registry().is_online(to) {
            message.advance_status(MessageStatus::Delivered, now);
        }

        let key = conversation_key(actor, to);
        let mut conversation = with_retry("get_conversation", || self.store().get_conversation(&key))
            .await?
            .unwrap_or_else(|| Conversation::new(actor, to));
        conversation.messages.push(message.clone());
        with_retry("put_conversation", || {
            self.store().put_conversation(&conversation)
        })
        .await?;

        self.fan_to_identity(
            to,
            ServerEvent::DirectMessage {
                message: message.clone(),
            },
        )
        .await;

        Ok(Some(serde_json::to_value(message).unwrap_or_default()))
    }

    pub(crate) async fn fetch_direct_history(
        &self,
        actor: &str,
        connection_id: ConnectionId,
        with: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let key = conversation_key(actor, with);
        let conversation = with_retry("get_conversation", || self.store().get_conversation(&key))
            .await?
            .unwrap_or_else(|| Conversation::new(actor, with));

        let mut messages = conversation.messages;
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        self.send_to_connection(
            connection_id,
            ServerEvent::ConversationHistory {
                with: with.to_string(),
                messages,
            },
        )
        .await;
        Ok(None)
    }

    pub(crate) async fn mark_read(
        &self,
        actor: &str,
        peer: &str,
        message_id: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut conversation = self.load_conversation(actor, peer).await?;
        let now = self.now();

        let message = conversation
            .message_mut(message_id)
            .ok_or(EngineError::NotFound("message"))?;
        if message.receiver.as_deref() != Some(actor) {
            return Err(EngineError::Permission(
                "only the receiver can mark a message read".into(),
            ));
        }
        let sender = message.sender.clone();
        if message.status == MessageStatus::Read {
            // Already read; nothing to persist or broadcast.
            return Ok(None);
        }
        if !message.advance_status(MessageStatus::Read, now) {
            return Err(EngineError::Policy(format!(
                "message in status {:?} cannot become read",
                message.status
            )));
        }

        with_retry("put_conversation", || {
            self.store().put_conversation(&conversation)
        })
        .await?;

        self.fan_to_identity(
            &sender,
            ServerEvent::MessageRead {
                message_id: message_id.to_string(),
                reader: actor.to_string(),
            },
        )
        .await;
        Ok(None)
    }

    pub(crate) async fn typing(
        &self,
        actor: &str,
        to: &str,
        active: bool,
    ) -> EngineResult<Option<serde_json::Value>> {
        // Ephemeral: no validation against the store, no persistence.
        self.fan_to_identity(
            to,
            ServerEvent::Typing {
                from: actor.to_string(),
                active,
            },
        )
        .await;
        Ok(None)
    }

    pub(crate) async fn react_direct(
        &self,
        actor: &str,
        peer: &str,
        message_id: &str,
        value: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        if value.is_empty() {
            return Err(EngineError::Invalid("empty reaction".into()));
        }
        let mut conversation = self.load_conversation(actor, peer).await?;
        if !conversation.is_participant(actor) {
            return Err(EngineError::Permission(
                "not a participant of this conversation".into(),
            ));
        }
        let now = self.now();
        let policy = self.policy().reaction_direct;

        let message = conversation
            .message_mut(message_id)
            .ok_or(EngineError::NotFound("message"))?;
        if message.status == MessageStatus::Recalled {
            return Err(EngineError::Policy("cannot react to a recalled message".into()));
        }
        message.apply_reaction(actor, value, policy, now);
        let reactions = message.reactions.clone();

        with_retry("put_conversation", || {
            self.store().put_conversation(&conversation)
        })
        .await?;

        let event = ServerEvent::ReactionUpdated {
            scope: ScopeRef::Direct {
                peer: actor.to_string(),
            },
            message_id: message_id.to_string(),
            reactions: reactions.clone(),
        };
        // The peer sees the actor as counterpart; the actor's other devices
        // see the peer. Two tailored events, one per identity.
        self.fan_to_identity(peer, event).await;
        self.fan_to_identity(
            actor,
            ServerEvent::ReactionUpdated {
                scope: ScopeRef::Direct {
                    peer: peer.to_string(),
                },
                message_id: message_id.to_string(),
                reactions: reactions.clone(),
            },
        )
        .await;

        Ok(Some(serde_json::to_value(reactions).unwrap_or_default()))
    }

    pub(crate) async fn recall_direct(
        &self,
        actor: &str,
        peer: &str,
        message_id: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut conversation = self.load_conversation(actor, peer).await?;
        let now = self.now();
        let window = Duration::seconds(self.policy().recall_window_secs as i64);

        let message = conversation
            .message_mut(message_id)
            .ok_or(EngineError::NotFound("message"))?;
        if message.sender != actor {
            return Err(EngineError::Permission(
                "only the sender can recall a message".into(),
            ));
        }
        if message.status == MessageStatus::Recalled {
            return Err(EngineError::Policy("message already recalled".into()));
        }
        if now - message.created_at > window {
            return Err(EngineError::Policy(format!(
                "recall window of {}s exceeded",
                window.num_seconds()
            )));
        }
        message.recall(now);

        with_retry("put_conversation", || {
            self.store().put_conversation(&conversation)
        })
        .await?;
        info!(actor, message_id, "direct message recalled");

        self.fan_to_identity(
            peer,
            ServerEvent::MessageRecalled {
                scope: ScopeRef::Direct {
                    peer: actor.to_string(),
                },
                message_id: message_id.to_string(),
            },
        )
        .await;
        self.fan_to_identity(
            actor,
            ServerEvent::MessageRecalled {
                scope: ScopeRef::Direct {
                    peer: peer.to_string(),
                },
                message_id: message_id.to_string(),
            },
        )
        .await;
        Ok(None)
    }

    pub(crate) async fn delete_direct(
        &self,
        actor: &str,
        peer: &str,
        message_id: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut conversation = self.load_conversation(actor, peer).await?;
        let now = self.now();

        let message = conversation
            .message(message_id)
            .ok_or(EngineError::NotFound("message"))?;
        if message.sender != actor {
            return Err(EngineError::Permission(
                "only the sender can delete a message".into(),
            ));
        }

        match self.policy().delete_direct {
            DeletePolicy::Hard => {
                conversation.messages.retain(|m| m.message_id != message_id);
            }
            DeletePolicy::Soft => {
                if let Some(message) = conversation.message_mut(message_id) {
                    message.is_deleted = true;
                    message.updated_at = now;
                }
            }
        }

        with_retry("put_conversation", || {
            self.store().put_conversation(&conversation)
        })
        .await?;
        info!(actor, message_id, "direct message deleted");
        // Deliberately ack-only: no removal broadcast for deletes.
        Ok(None)
    }
}
