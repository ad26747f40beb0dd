//! Server-to-client events.

use crate::intent::ScopeRef;
use crate::types::{FriendLists, Group, Message, Reaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outbound frame envelope; `seq` echoes the client correlation id on acks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub event: ServerEvent,
}

impl ServerFrame {
    /// Broadcast frame with no correlation id.
    pub fn broadcast(event: ServerEvent) -> Self {
        Self { seq: None, event }
    }

    pub fn event_name(&self) -> &'static str {
        self.event.name()
    }
}

/// Per-intent acknowledgment body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckBody {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Group document without its message log, for list/update events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub group_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub creator_id: String,
    pub members: Vec<String>,
    pub admins: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Group> for GroupSummary {
    fn from(group: &Group) -> Self {
        Self {
            group_id: group.group_id.clone(),
            name: group.name.clone(),
            description: group.description.clone(),
            avatar: group.avatar.clone(),
            creator_id: group.creator_id.clone(),
            members: group.members.clone(),
            admins: group.admins.clone(),
            created_at: group.created_at,
            updated_at: group.updated_at,
        }
    }
}

/// Minimal identity card attached to friend events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub email: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// What happened to a pending friend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestKind {
    New,
    Withdrawn,
    Accepted,
    Rejected,
}

/// The closed set of server events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Ack(AckBody),
    DirectMessage {
        message: Message,
    },
    GroupMessage {
        group_id: String,
        message: Message,
    },
    MessageRead {
        message_id: String,
        reader: String,
    },
    Typing {
        from: String,
        active: bool,
    },
    ReactionUpdated {
        scope: ScopeRef,
        message_id: String,
        reactions: BTreeMap<String, Reaction>,
    },
    MessageRecalled {
        scope: ScopeRef,
        message_id: String,
    },
    ConversationHistory {
        with: String,
        messages: Vec<Message>,
    },
    GroupHistory {
        group_id: String,
        messages: Vec<Message>,
    },
    FriendRequestUpdate {
        kind: FriendRequestKind,
        peer: UserSummary,
    },
    FriendListUpdate {
        lists: FriendLists,
    },
    FriendStatusUpdate {
        email: String,
        online: bool,
    },
    GroupList {
        groups: Vec<GroupSummary>,
    },
    GroupCreated {
        group: GroupSummary,
    },
    GroupJoined {
        group: GroupSummary,
    },
    GroupUpdated {
        group: GroupSummary,
    },
    GroupMembersUpdated {
        group_id: String,
        members: Vec<String>,
        admins: Vec<String>,
    },
    GroupDeleted {
        group_id: String,
    },
}

impl ServerEvent {
    /// Stable wire name, used for logging and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ack(_) => "ack",
            Self::DirectMessage { .. } => "directMessage",
            Self::GroupMessage { .. } => "groupMessage",
            Self::MessageRead { .. } => "messageRead",
            Self::Typing { .. } => "typing",
            Self::ReactionUpdated { .. } => "reactionUpdated",
            Self::MessageRecalled { .. } => "messageRecalled",
            Self::ConversationHistory { .. } => "conversationHistory",
            Self::GroupHistory { .. } => "groupHistory",
            Self::FriendRequestUpdate { .. } => "friendRequestUpdate",
            Self::FriendListUpdate { .. } => "friendListUpdate",
            Self::FriendStatusUpdate { .. } => "friendStatusUpdate",
            Self::GroupList { .. } => "groupList",
            Self::GroupCreated { .. } => "groupCreated",
            Self::GroupJoined { .. } => "groupJoined",
            Self::GroupUpdated { .. } => "groupUpdated",
            Self::GroupMembersUpdated { .. } => "groupMembersUpdated",
            Self::GroupDeleted { .. } => "groupDeleted",
        }
    }
}
