//! Cross-scope message forwarding.
//!
//! A forward creates a brand-new message in the target scope carrying
//! provenance back to the original. The copy's lifecycle is independent:
//! deleting or recalling it never touches the original, and vice versa.

use super::Engine;
use crate::error::{EngineError, EngineResult};
use crate::store::with_retry;
use chatter_proto::{
    conversation_key, Conversation, Message, MessageStatus, ScopeRef, ServerEvent,
};

impl Engine {
    pub(crate) async fn forward_message(
        &self,
        actor: &str,
        source: ScopeRef,
        target: ScopeRef,
        message_id: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        // The actor must belong to both scopes; each check re-fetches.
        let original = self.load_source_message(actor, &source, message_id).await?;
        if original.status == MessageStatus::Recalled {
            return Err(EngineError::Policy("cannot forward a recalled message".into()));
        }
        if original.is_deleted {
            return Err(EngineError::Policy("cannot forward a deleted message".into()));
        }

        let now = self.now();
        let forwarded = match target {
            ScopeRef::Direct { ref peer } => {
                if peer == actor {
                    return Err(EngineError::Invalid("cannot forward to yourself".into()));
                }
                self.load_user(peer).await?;
                let key = conversation_key(actor, peer);
                let mut conversation =
                    with_retry("get_conversation", || self.store().get_conversation(&key))
                        .await?
                        .unwrap_or_else(|| Conversation::new(actor, peer));

                let mut copy = original.forward_copy(actor, &key, Some(peer), now);
                if self.registry().is_online(peer) {
                    copy.advance_status(MessageStatus::Delivered, now);
                }
                conversation.messages.push(copy.clone());
                with_retry("put_conversation", || {
                    self.store().put_conversation(&conversation)
                })
                .await?;

                self.fan_to_identity(
                    peer,
                    ServerEvent::DirectMessage {
                        message: copy.clone(),
                    },
                )
                .await;
                copy
            }
            ScopeRef::Group { ref group_id } => {
                let mut group = self.load_group(group_id).await?;
                if !group.is_member(actor) {
                    return Err(EngineError::Permission(
                        "not a member of the target group".into(),
                    ));
                }
                let copy = original.forward_copy(actor, group_id, None, now);
                group.messages.push(copy.clone());
                group.updated_at = now;
                with_retry("put_group", || self.store().put_group(&group)).await?;

                self.fan_to_room(
                    group_id,
                    ServerEvent::GroupMessage {
                        group_id: group_id.clone(),
                        message: copy.clone(),
                    },
                )
                .await;
                copy
            }
        };

        Ok(Some(serde_json::to_value(forwarded).unwrap_or_default()))
    }

    /// Fetch the message being forwarded, checking the actor belongs to the
    /// source scope.
    async fn load_source_message(
        &self,
        actor: &str,
        source: &ScopeRef,
        message_id: &str,
    ) -> EngineResult<Message> {
        match source {
            ScopeRef::Direct { peer } => {
                let conversation = self.load_conversation(actor, peer).await?;
                if !conversation.is_participant(actor) {
                    return Err(EngineError::Permission(
                        "not a participant of the source conversation".into(),
                    ));
                }
                conversation
                    .message(message_id)
                    .cloned()
                    .ok_or(EngineError::NotFound("message"))
            }
            ScopeRef::Group { group_id } => {
                let group = self.load_group(group_id).await?;
                if !group.is_member(actor) {
                    return Err(EngineError::Permission(
                        "not a member of the source group".into(),
                    ));
                }
                group
                    .message(message_id)
                    .cloned()
                    .ok_or(EngineError::NotFound("message"))
            }
        }
    }
}
