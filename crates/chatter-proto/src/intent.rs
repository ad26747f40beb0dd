//! Client-to-server intents.
//!
//! Every event a client may emit is a variant of [`ClientIntent`]; the server
//! dispatches with an exhaustive `match`, so adding a variant without a
//! handler is a compile error rather than a silently ignored string key.

use crate::types::{FileMeta, MessageKind};
use serde::{Deserialize, Serialize};

/// Addresses a message scope: a two-party conversation or a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ScopeRef {
    /// The direct conversation between the acting identity and `peer`.
    Direct { peer: String },
    Group { group_id: String },
}

/// Inbound frame envelope: the intent plus an optional client correlation id
/// echoed back in the matching ack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub intent: ClientIntent,
}

/// The closed set of client intents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientIntent {
    // -- direct conversations ------------------------------------------------
    SendDirectMessage {
        to: String,
        content: String,
        #[serde(default)]
        kind: MessageKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<FileMeta>,
    },
    FetchDirectHistory {
        with: String,
    },
    MarkRead {
        peer: String,
        message_id: String,
    },
    TypingStart {
        to: String,
    },
    TypingStop {
        to: String,
    },
    ReactDirectMessage {
        peer: String,
        message_id: String,
        value: String,
    },
    RecallDirectMessage {
        peer: String,
        message_id: String,
    },
    DeleteDirectMessage {
        peer: String,
        message_id: String,
    },

    // -- forwarding ----------------------------------------------------------
    ForwardMessage {
        source: ScopeRef,
        target: ScopeRef,
        message_id: String,
    },

    // -- group messages ------------------------------------------------------
    SendGroupMessage {
        group_id: String,
        content: String,
        #[serde(default)]
        kind: MessageKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<FileMeta>,
    },
    FetchGroupHistory {
        group_id: String,
    },
    ReactGroupMessage {
        group_id: String,
        message_id: String,
        value: String,
    },
    RecallGroupMessage {
        group_id: String,
        message_id: String,
    },
    DeleteGroupMessage {
        group_id: String,
        message_id: String,
    },

    // -- group lifecycle -----------------------------------------------------
    CreateGroup {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        avatar: Option<String>,
        #[serde(default)]
        members: Vec<String>,
    },
    UpdateGroup {
        group_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        avatar: Option<String>,
    },
    DeleteGroup {
        group_id: String,
    },
    AddMember {
        group_id: String,
        member: String,
    },
    RemoveMember {
        group_id: String,
        member: String,
    },
    AddAdmin {
        group_id: String,
        admin: String,
    },
    RemoveAdmin {
        group_id: String,
        admin: String,
    },
    ListGroups,

    // -- room subscription ---------------------------------------------------
    JoinGroup {
        group_id: String,
    },
    LeaveGroup {
        group_id: String,
    },

    // -- friend edges --------------------------------------------------------
    FriendRequest {
        to: String,
    },
    FriendRespond {
        from: String,
        accept: bool,
    },
    FriendWithdraw {
        to: String,
    },
    FetchFriends,
}

impl ClientIntent {
    /// Stable wire name of the intent, used for logging and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendDirectMessage { .. } => "sendDirectMessage",
            Self::FetchDirectHistory { .. } => "fetchDirectHistory",
            Self::MarkRead { .. } => "markRead",
            Self::TypingStart { .. } => "typingStart",
            Self::TypingStop { .. } => "typingStop",
            Self::ReactDirectMessage { .. } => "reactDirectMessage",
            Self::RecallDirectMessage { .. } => "recallDirectMessage",
            Self::DeleteDirectMessage { .. } => "deleteDirectMessage",
            Self::ForwardMessage { .. } => "forwardMessage",
            Self::SendGroupMessage { .. } => "sendGroupMessage",
            Self::FetchGroupHistory { .. } => "fetchGroupHistory",
            Self::ReactGroupMessage { .. } => "reactGroupMessage",
            Self::RecallGroupMessage { .. } => "recallGroupMessage",
            Self::DeleteGroupMessage { .. } => "deleteGroupMessage",
            Self::CreateGroup { .. } => "createGroup",
            Self::UpdateGroup { .. } => "updateGroup",
            Self::DeleteGroup { .. } => "deleteGroup",
            Self::AddMember { .. } => "addMember",
            Self::RemoveMember { .. } => "removeMember",
            Self::AddAdmin { .. } => "addAdmin",
            Self::RemoveAdmin { .. } => "removeAdmin",
            Self::ListGroups => "listGroups",
            Self::JoinGroup { .. } => "joinGroup",
            Self::LeaveGroup { .. } => "leaveGroup",
            Self::FriendRequest { .. } => "friendRequest",
            Self::FriendRespond { .. } => "friendRespond",
            Self::FriendWithdraw { .. } => "friendWithdraw",
            Self::FetchFriends => "fetchFriends",
        }
    }
}
