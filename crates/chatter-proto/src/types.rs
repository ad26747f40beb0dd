//! Domain documents shared by the server and the wire protocol.
//!
//! These are the shapes persisted in the document store and echoed to
//! clients. Field names serialize in camelCase to match the stored JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Content every recalled message is replaced with.
pub const RECALL_PLACEHOLDER: &str = "This message has been recalled";

/// Message content kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    File,
    Image,
    Emoji,
}

/// Delivery status of a message.
///
/// Transitions move forward only: `sent -> delivered -> read` (skipping
/// `delivered` is allowed), and `recalled` is reachable from any live status
/// but terminal once entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
    Recalled,
}

impl MessageStatus {
    /// Whether a transition from `self` to `next` is legal.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        match (self, next) {
            (Recalled, _) => false,
            (_, Recalled) => true,
            (Sent, Delivered) | (Sent, Read) | (Delivered, Read) => true,
            _ => false,
        }
    }
}

/// Metadata for file/image attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

/// One identity's reaction to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub value: String,
    pub at: DateTime<Utc>,
}

/// Provenance carried by a forwarded message copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub original_message_id: String,
    /// Conversation key or group id the original lives in.
    pub original_scope_id: String,
}

/// How a repeated reaction from the same identity is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionPolicy {
    /// A repeated identical value keeps exactly one reaction.
    Replace,
    /// A repeated identical value removes the reaction.
    Toggle,
}

/// What applying a reaction did to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    Set,
    Removed,
}

/// Whether delete physically removes a message or soft-flags it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    Hard,
    Soft,
}

/// A chat message, shared shape for direct and group scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    /// Conversation key (direct) or group id (group).
    pub scope_id: String,
    pub sender: String,
    /// Set for direct messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileMeta>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub is_deleted: bool,
    /// Reactor email -> reaction. At most one per identity.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, Reaction>,
    #[serde(default)]
    pub is_forwarded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarded_from: Option<Provenance>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Create a direct message addressed to `receiver`.
    pub fn direct(
        sender: &str,
        receiver: &str,
        content: String,
        kind: MessageKind,
        file: Option<FileMeta>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            scope_id: conversation_key(sender, receiver),
            sender: sender.to_string(),
            receiver: Some(receiver.to_string()),
            content,
            kind,
            file,
            status: MessageStatus::Sent,
            is_deleted: false,
            reactions: BTreeMap::new(),
            is_forwarded: false,
            forwarded_from: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a group message in `group_id`.
    pub fn group(
        sender: &str,
        group_id: &str,
        content: String,
        kind: MessageKind,
        file: Option<FileMeta>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            scope_id: group_id.to_string(),
            sender: sender.to_string(),
            receiver: None,
            content,
            kind,
            file,
            status: MessageStatus::Sent,
            is_deleted: false,
            reactions: BTreeMap::new(),
            is_forwarded: false,
            forwarded_from: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the status machine. Returns false (and leaves the message
    /// untouched) if the transition is illegal.
    pub fn advance_status(&mut self, next: MessageStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = now;
        true
    }

    /// Recall: terminal status, content replaced by the placeholder.
    pub fn recall(&mut self, now: DateTime<Utc>) {
        self.status = MessageStatus::Recalled;
        self.content = RECALL_PLACEHOLDER.to_string();
        self.file = None;
        self.updated_at = now;
    }

    /// Apply `reactor`'s reaction under the given policy.
    pub fn apply_reaction(
        &mut self,
        reactor: &str,
        value: &str,
        policy: ReactionPolicy,
        now: DateTime<Utc>,
    ) -> ReactionOutcome {
        let same = self
            .reactions
            .get(reactor)
            .is_some_and(|r| r.value == value);
        self.updated_at = now;
        if same && policy == ReactionPolicy::Toggle {
            self.reactions.remove(reactor);
            return ReactionOutcome::Removed;
        }
        self.reactions.insert(
            reactor.to_string(),
            Reaction {
                value: value.to_string(),
                at: now,
            },
        );
        ReactionOutcome::Set
    }

    /// Build the forwarded copy of this message for `target_scope`.
    ///
    /// The copy gets a fresh id and timestamps, carries provenance, and
    /// starts a fully independent lifecycle (no reactions, not deleted).
    pub fn forward_copy(
        &self,
        sender: &str,
        target_scope: &str,
        receiver: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            scope_id: target_scope.to_string(),
            sender: sender.to_string(),
            receiver: receiver.map(str::to_string),
            content: self.content.clone(),
            kind: self.kind,
            file: self.file.clone(),
            status: MessageStatus::Sent,
            is_deleted: false,
            reactions: BTreeMap::new(),
            is_forwarded: true,
            forwarded_from: Some(Provenance {
                original_message_id: self.message_id.clone(),
                original_scope_id: self.scope_id.clone(),
            }),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Deterministic conversation key for a two-party thread.
///
/// Both directions resolve to the same key: the participant emails are
/// sorted before joining.
pub fn conversation_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}

/// A direct two-party conversation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conversation_id: String,
    pub participants: [String; 2],
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            conversation_id: conversation_key(a, b),
            participants: [first.to_string(), second.to_string()],
            messages: Vec::new(),
        }
    }

    pub fn is_participant(&self, email: &str) -> bool {
        self.participants.iter().any(|p| p == email)
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.message_id == message_id)
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.message_id == message_id)
    }
}

/// A group chat document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub creator_id: String,
    pub members: Vec<String>,
    pub admins: Vec<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn new(
        name: String,
        description: String,
        avatar: Option<String>,
        creator: &str,
        members: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut group = Self {
            group_id: Uuid::new_v4().to_string(),
            name,
            description,
            avatar,
            creator_id: creator.to_string(),
            members,
            admins: vec![creator.to_string()],
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        group.ensure_creator();
        group
    }

    /// Restore the structural invariant: creator is always a member and an
    /// admin, and every admin is a member.
    pub fn ensure_creator(&mut self) {
        if !self.members.iter().any(|m| m == &self.creator_id) {
            self.members.push(self.creator_id.clone());
        }
        if !self.admins.iter().any(|a| a == &self.creator_id) {
            self.admins.push(self.creator_id.clone());
        }
        let members = &self.members;
        self.admins.retain(|a| members.iter().any(|m| m == a));
    }

    pub fn is_member(&self, email: &str) -> bool {
        self.members.iter().any(|m| m == email)
    }

    pub fn is_admin(&self, email: &str) -> bool {
        self.admins.iter().any(|a| a == email)
    }

    pub fn add_member(&mut self, email: &str, now: DateTime<Utc>) -> bool {
        if self.is_member(email) {
            return false;
        }
        self.members.push(email.to_string());
        self.updated_at = now;
        true
    }

    /// Remove a member (and any admin seat they held). The creator is never
    /// removable; callers enforce that before calling.
    pub fn remove_member(&mut self, email: &str, now: DateTime<Utc>) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != email);
        self.admins.retain(|a| a != email);
        if self.members.len() != before {
            self.updated_at = now;
            true
        } else {
            false
        }
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.message_id == message_id)
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.message_id == message_id)
    }
}

/// Public profile of an identity, as stored and as echoed to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A pending friend request edge endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub email: String,
    pub at: DateTime<Utc>,
}

/// One identity's friend state: mirrored friend entries plus the two
/// pending-request lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendLists {
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default)]
    pub requests_sent: Vec<FriendRequest>,
    #[serde(default)]
    pub requests_received: Vec<FriendRequest>,
}

impl FriendLists {
    pub fn is_friend(&self, email: &str) -> bool {
        self.friends.iter().any(|f| f == email)
    }

    pub fn has_sent(&self, email: &str) -> bool {
        self.requests_sent.iter().any(|r| r.email == email)
    }

    pub fn has_received(&self, email: &str) -> bool {
        self.requests_received.iter().any(|r| r.email == email)
    }

    pub fn add_friend(&mut self, email: &str) {
        if !self.is_friend(email) {
            self.friends.push(email.to_string());
        }
    }

    pub fn clear_edge(&mut self, email: &str) {
        self.requests_sent.retain(|r| r.email != email);
        self.requests_received.retain(|r| r.email != email);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn conversation_key_is_direction_independent() {
        assert_eq!(
            conversation_key("alice@x", "bob@x"),
            conversation_key("bob@x", "alice@x")
        );
        assert_eq!(conversation_key("alice@x", "bob@x"), "alice@x_bob@x");
    }

    #[test]
    fn status_machine_is_forward_only_and_recall_is_terminal() {
        use MessageStatus::*;
        assert!(Sent.can_advance_to(Delivered));
        assert!(Sent.can_advance_to(Read));
        assert!(Delivered.can_advance_to(Read));
        assert!(Read.can_advance_to(Recalled));
        assert!(!Read.can_advance_to(Delivered));
        assert!(!Delivered.can_advance_to(Sent));
        assert!(!Recalled.can_advance_to(Read));
        assert!(!Recalled.can_advance_to(Sent));
    }

    #[test]
    fn recall_replaces_content_and_blocks_further_transitions() {
        let t = now();
        let mut msg = Message::direct("a@x", "b@x", "secret".into(), MessageKind::Text, None, t);
        msg.recall(t);
        assert_eq!(msg.status, MessageStatus::Recalled);
        assert_eq!(msg.content, RECALL_PLACEHOLDER);
        assert!(!msg.advance_status(MessageStatus::Read, t));
        assert_eq!(msg.status, MessageStatus::Recalled);
    }

    #[test]
    fn reaction_replace_keeps_exactly_one() {
        let t = now();
        let mut msg = Message::direct("a@x", "b@x", "hi".into(), MessageKind::Text, None, t);
        msg.apply_reaction("a@x", "👍", ReactionPolicy::Replace, t);
        msg.apply_reaction("a@x", "👍", ReactionPolicy::Replace, t);
        assert_eq!(msg.reactions.len(), 1);
        assert_eq!(msg.reactions["a@x"].value, "👍");
        msg.apply_reaction("a@x", "❤️", ReactionPolicy::Replace, t);
        assert_eq!(msg.reactions.len(), 1);
        assert_eq!(msg.reactions["a@x"].value, "❤️");
    }

    #[test]
    fn reaction_toggle_removes_on_repeat() {
        let t = now();
        let mut msg = Message::group("a@x", "g1", "hi".into(), MessageKind::Text, None, t);
        let first = msg.apply_reaction("a@x", "👍", ReactionPolicy::Toggle, t);
        assert_eq!(first, ReactionOutcome::Set);
        let second = msg.apply_reaction("a@x", "👍", ReactionPolicy::Toggle, t);
        assert_eq!(second, ReactionOutcome::Removed);
        assert!(msg.reactions.is_empty());
        // A different value after removal sets again.
        msg.apply_reaction("a@x", "❤️", ReactionPolicy::Toggle, t);
        assert_eq!(msg.reactions["a@x"].value, "❤️");
    }

    #[test]
    fn forward_copy_has_fresh_id_and_provenance() {
        let t = now();
        let original = Message::group("a@x", "g1", "news".into(), MessageKind::Text, None, t);
        let copy = original.forward_copy("b@x", "g2", None, t);
        assert_ne!(copy.message_id, original.message_id);
        assert!(copy.is_forwarded);
        let prov = copy.forwarded_from.as_ref().unwrap();
        assert_eq!(prov.original_message_id, original.message_id);
        assert_eq!(prov.original_scope_id, "g1");
        assert!(copy.reactions.is_empty());
        assert!(!copy.is_deleted);
        assert_eq!(copy.status, MessageStatus::Sent);
    }

    #[test]
    fn group_invariant_keeps_creator_seated() {
        let t = now();
        let mut group = Group::new(
            "team".into(),
            String::new(),
            None,
            "creator@x",
            vec!["m1@x".into()],
            t,
        );
        assert!(group.is_member("creator@x"));
        assert!(group.is_admin("creator@x"));

        // Admins must stay a subset of members.
        group.admins.push("ghost@x".into());
        group.ensure_creator();
        assert!(!group.is_admin("ghost@x"));

        // Removing a member drops their admin seat too.
        group.add_member("m2@x", t);
        group.admins.push("m2@x".into());
        group.remove_member("m2@x", t);
        assert!(!group.is_member("m2@x"));
        assert!(!group.is_admin("m2@x"));
    }
}
