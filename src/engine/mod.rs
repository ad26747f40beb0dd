//! Event distribution engine.
//!
//! Every client intent flows through [`Engine::dispatch`]: validate against
//! authoritative state (re-fetched, never cached), apply the mutation,
//! persist, and only then fan out — an intent that fails persistence never
//! broadcasts and always returns a failure ack to its originator.
//!
//! The intent set is a closed union, so the `match` below is exhaustive by
//! construction: a new intent variant that lacks a handler arm is a compile
//! error.

mod forward;
mod friends;
mod groups;
mod messages;
mod presence;

use crate::config::{LimitsConfig, PolicyConfig};
use crate::error::{success_ack, EngineResult};
use crate::metrics;
use crate::state::{ConnectionId, RoomRegistry, SessionRegistry};
use crate::store::{with_retry, Store};
use chatter_proto::{
    ClientFrame, ClientIntent, Conversation, Group, ServerEvent, ServerFrame, UserProfile,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// The engine composes the registries, the store and the policy knobs.
pub struct Engine {
    registry: Arc<SessionRegistry>,
    rooms: Arc<RoomRegistry>,
    store: Arc<dyn Store>,
    policy: PolicyConfig,
    limits: LimitsConfig,
}

impl Engine {
    pub fn new(
        registry: Arc<SessionRegistry>,
        rooms: Arc<RoomRegistry>,
        store: Arc<dyn Store>,
        policy: PolicyConfig,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            registry,
            rooms,
            store,
            policy,
            limits,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub(crate) fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Process one intent from `actor` and return the ack for it.
    pub async fn dispatch(
        &self,
        actor: &str,
        connection_id: ConnectionId,
        frame: ClientFrame,
    ) -> ServerFrame {
        let name = frame.intent.name();
        metrics::intent_received(name);
        debug!(actor, intent = name, "dispatching intent");

        let result = self.apply(actor, connection_id, frame.intent).await;
        match result {
            Ok(data) => success_ack(frame.seq, data),
            Err(error) => {
                metrics::intent_failed(name, error.code());
                debug!(actor, intent = name, code = error.code(), %error, "intent rejected");
                error.to_ack(frame.seq)
            }
        }
    }

    async fn apply(
        &self,
        actor: &str,
        connection_id: ConnectionId,
        intent: ClientIntent,
    ) -> EngineResult<Option<serde_json::Value>> {
        use ClientIntent::*;
        match intent {
            SendDirectMessage {
                to,
                content,
                kind,
                file,
            } => self.send_direct(actor, &to, content, kind, file).await,
            FetchDirectHistory { with } => {
                self.fetch_direct_history(actor, connection_id, &with).await
            }
            MarkRead { peer, message_id } => self.mark_read(actor, &peer, &message_id).await,
            TypingStart { to } => self.typing(actor, &to, true).await,
            TypingStop { to } => self.typing(actor, &to, false).await,
            ReactDirectMessage {
                peer,
                message_id,
                value,
            } => self.react_direct(actor, &peer, &message_id, &value).await,
            RecallDirectMessage { peer, message_id } => {
                self.recall_direct(actor, &peer, &message_id).await
            }
            DeleteDirectMessage { peer, message_id } => {
                self.delete_direct(actor, &peer, &message_id).await
            }

            ForwardMessage {
                source,
                target,
                message_id,
            } => self.forward_message(actor, source, target, &message_id).await,

            SendGroupMessage {
                group_id,
                content,
                kind,
                file,
            } => {
                self.send_group_message(actor, &group_id, content, kind, file)
                    .await
            }
            FetchGroupHistory { group_id } => {
                self.fetch_group_history(actor, connection_id, &group_id).await
            }
            ReactGroupMessage {
                group_id,
                message_id,
                value,
            } => {
                self.react_group_message(actor, &group_id, &message_id, &value)
                    .await
            }
            RecallGroupMessage {
                group_id,
                message_id,
            } => self.recall_group_message(actor, &group_id, &message_id).await,
            DeleteGroupMessage {
                group_id,
                message_id,
            } => self.delete_group_message(actor, &group_id, &message_id).await,

            CreateGroup {
                name,
                description,
                avatar,
                members,
            } => {
                self.create_group(actor, name, description, avatar, members)
                    .await
            }
            UpdateGroup {
                group_id,
                name,
                description,
                avatar,
            } => {
                self.update_group(actor, &group_id, name, description, avatar)
                    .await
            }
            DeleteGroup { group_id } => self.delete_group(actor, &group_id).await,
            AddMember { group_id, member } => self.add_member(actor, &group_id, &member).await,
            RemoveMember { group_id, member } => {
                self.remove_member(actor, &group_id, &member).await
            }
            AddAdmin { group_id, admin } => self.add_admin(actor, &group_id, &admin).await,
            RemoveAdmin { group_id, admin } => self.remove_admin(actor, &group_id, &admin).await,
            ListGroups => self.list_groups(actor, connection_id).await,

            JoinGroup { group_id } => self.join_group(actor, connection_id, &group_id).await,
            LeaveGroup { group_id } => self.leave_group(connection_id, &group_id).await,

            FriendRequest { to } => self.friend_request(actor, &to).await,
            FriendRespond { from, accept } => self.friend_respond(actor, &from, accept).await,
            FriendWithdraw { to } => self.friend_withdraw(actor, &to).await,
            FetchFriends => self.fetch_friends(actor, connection_id).await,
        }
    }

    // ------------------------------------------------------------------
    // Fan-out primitives
    // ------------------------------------------------------------------

    /// Deliver an event to every live connection of one identity.
    pub(crate) async fn fan_to_identity(&self, identity: &str, event: ServerEvent) -> usize {
        let frame = Arc::new(ServerFrame::broadcast(event));
        let delivered = self.registry.send_to_identity(identity, frame).await;
        metrics::events_fanned_out(delivered);
        delivered
    }

    /// Deliver an event to every connection subscribed to a group room.
    pub(crate) async fn fan_to_room(&self, group_id: &str, event: ServerEvent) -> usize {
        let members = self.rooms.members_of(group_id);
        let frame = Arc::new(ServerFrame::broadcast(event));
        let delivered = self.registry.send_to_connections(&members, frame).await;
        metrics::events_fanned_out(delivered);
        delivered
    }

    /// Deliver an event to a single connection (query responses).
    pub(crate) async fn send_to_connection(&self, connection_id: ConnectionId, event: ServerEvent) {
        let frame = Arc::new(ServerFrame::broadcast(event));
        let delivered = self
            .registry
            .send_to_connections(&[connection_id], frame)
            .await;
        metrics::events_fanned_out(delivered);
    }

    // ------------------------------------------------------------------
    // Re-fetch helpers: authoritative state, loaded immediately before
    // the permission check. Stale reads are never used to authorize.
    // ------------------------------------------------------------------

    pub(crate) async fn load_user(&self, email: &str) -> EngineResult<UserProfile> {
        with_retry("get_user", || self.store.get_user(email))
            .await?
            .ok_or(crate::error::EngineError::NotFound("user"))
    }

    pub(crate) async fn load_group(&self, group_id: &str) -> EngineResult<Group> {
        with_retry("get_group", || self.store.get_group(group_id))
            .await?
            .ok_or(crate::error::EngineError::NotFound("group"))
    }

    pub(crate) async fn load_conversation(
        &self,
        actor: &str,
        peer: &str,
    ) -> EngineResult<Conversation> {
        let key = chatter_proto::conversation_key(actor, peer);
        with_retry("get_conversation", || self.store.get_conversation(&key))
            .await?
            .ok_or(crate::error::EngineError::NotFound("conversation"))
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
