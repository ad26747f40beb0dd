//! Group lifecycle and group message operations.
//!
//! Permission model: members speak, admins moderate and manage membership,
//! the creator manages admins and owns deletion. The creator can never be
//! removed from members or admins by anyone.

use super::Engine;
use crate::error::{EngineError, EngineResult};
use crate::state::ConnectionId;
use crate::store::with_retry;
use chatter_proto::{
    DeletePolicy, FileMeta, Group, GroupSummary, Message, MessageKind, MessageStatus, ScopeRef,
    ServerEvent,
};
use chrono::Duration;
use tracing::info;

fn require_member(group: &Group, actor: &str) -> EngineResult<()> {
    if group.is_member(actor) {
        Ok(())
    } else {
        Err(EngineError::Permission(format!(
            "{actor} is not a member of group {}",
            group.group_id
        )))
    }
}

fn require_admin(group: &Group, actor: &str) -> EngineResult<()> {
    if group.is_admin(actor) {
        Ok(())
    } else {
        Err(EngineError::Permission(format!(
            "{actor} is not an admin of group {}",
            group.group_id
        )))
    }
}

fn require_creator(group: &Group, actor: &str) -> EngineResult<()> {
    if group.creator_id == actor {
        Ok(())
    } else {
        Err(EngineError::Permission(format!(
            "only the creator may do this in group {}",
            group.group_id
        )))
    }
}

impl Engine {
    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub(crate) async fn create_group(
        &self,
        actor: &str,
        name: String,
        description: String,
        avatar: Option<String>,
        members: Vec<String>,
    ) -> EngineResult<Option<serde_json::Value>> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::Invalid("group name is required".into()));
        }
        if members.len() > self.limits().max_group_members {
            return Err(EngineError::Invalid(format!(
                "more than {} members",
                self.limits().max_group_members
            )));
        }

        // Unknown invitees are skipped rather than failing the whole create.
        let mut resolved = Vec::new();
        for email in members {
            if email == actor || resolved.contains(&email) {
                continue;
            }
            if with_retry("get_user", || self.store().get_user(&email))
                .await?
                .is_some()
            {
                resolved.push(email);
            }
        }

        let now = self.now();
        let group = Group::new(name, description, avatar, actor, resolved, now);
        with_retry("put_group", || self.store().put_group(&group)).await?;
        info!(actor, group_id = %group.group_id, members = group.members.len(), "group created");

        let summary = GroupSummary::from(&group);
        for member in &group.members {
            self.fan_to_identity(
                member,
                ServerEvent::GroupCreated {
                    group: summary.clone(),
                },
            )
            .await;
        }
        Ok(Some(serde_json::to_value(summary).unwrap_or_default()))
    }

    pub(crate) async fn update_group(
        &self,
        actor: &str,
        group_id: &str,
        name: Option<String>,
        description: Option<String>,
        avatar: Option<String>,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut group = self.load_group(group_id).await?;
        require_admin(&group, actor)?;

        if let Some(name) = name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(EngineError::Invalid("group name cannot be empty".into()));
            }
            group.name = name;
        }
        if let Some(description) = description {
            group.description = description;
        }
        if let Some(avatar) = avatar {
            group.avatar = Some(avatar);
        }
        group.updated_at = self.now();

        with_retry("put_group", || self.store().put_group(&group)).await?;

        let summary = GroupSummary::from(&group);
        self.fan_to_room(group_id, ServerEvent::GroupUpdated { group: summary })
            .await;
        Ok(None)
    }

    pub(crate) async fn delete_group(
        &self,
        actor: &str,
        group_id: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let group = self.load_group(group_id).await?;
        require_creator(&group, actor)?;

        with_retry("delete_group", || self.store().delete_group(group_id)).await?;
        info!(actor, group_id, "group deleted");

        self.fan_to_room(
            group_id,
            ServerEvent::GroupDeleted {
                group_id: group_id.to_string(),
            },
        )
        .await;
        self.rooms().remove_room(group_id);
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    pub(crate) async fn add_member(
        &self,
        actor: &str,
        group_id: &str,
        member: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut group = self.load_group(group_id).await?;
        require_admin(&group, actor)?;
        self.load_user(member).await?;

        let now = self.now();
        if !group.add_member(member, now) {
            return Err(EngineError::Policy(format!(
                "{member} is already a member"
            )));
        }
        with_retry("put_group", || self.store().put_group(&group)).await?;

        self.broadcast_membership(&group).await;
        // The new member is not in the room yet; tell their devices directly.
        self.fan_to_identity(
            member,
            ServerEvent::GroupJoined {
                group: GroupSummary::from(&group),
            },
        )
        .await;
        Ok(None)
    }

    pub(crate) async fn remove_member(
        &self,
        actor: &str,
        group_id: &str,
        member: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut group = self.load_group(group_id).await?;
        require_admin(&group, actor)?;
        if member == group.creator_id {
            return Err(EngineError::Policy(
                "the group creator cannot be removed".into(),
            ));
        }

        let now = self.now();
        if !group.remove_member(member, now) {
            return Err(EngineError::NotFound("member"));
        }
        with_retry("put_group", || self.store().put_group(&group)).await?;
        info!(actor, group_id, member, "member removed");

        // Evict the removed member's connections from the room before the
        // broadcast so they do not receive further group events.
        for connection_id in self.registry().connections_of(member) {
            self.rooms().leave(group_id, connection_id);
        }
        self.broadcast_membership(&group).await;
        self.fan_to_identity(
            member,
            ServerEvent::GroupDeleted {
                group_id: group_id.to_string(),
            },
        )
        .await;
        Ok(None)
    }

    pub(crate) async fn add_admin(
        &self,
        actor: &str,
        group_id: &str,
        admin: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut group = self.load_group(group_id).await?;
        require_creator(&group, actor)?;
        require_member(&group, admin)?;
        if group.is_admin(admin) {
            return Err(EngineError::Policy(format!("{admin} is already an admin")));
        }

        group.admins.push(admin.to_string());
        group.updated_at = self.now();
        with_retry("put_group", || self.store().put_group(&group)).await?;

        self.broadcast_membership(&group).await;
        Ok(None)
    }

    pub(crate) async fn remove_admin(
        &self,
        actor: &str,
        group_id: &str,
        admin: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut group = self.load_group(group_id).await?;
        require_creator(&group, actor)?;
        if admin == group.creator_id {
            return Err(EngineError::Policy(
                "the creator's admin seat cannot be removed".into(),
            ));
        }
        if !group.is_admin(admin) {
            return Err(EngineError::NotFound("admin"));
        }

        group.admins.retain(|a| a != admin);
        group.updated_at = self.now();
        with_retry("put_group", || self.store().put_group(&group)).await?;

        self.broadcast_membership(&group).await;
        Ok(None)
    }

    pub(crate) async fn list_groups(
        &self,
        actor: &str,
        connection_id: ConnectionId,
    ) -> EngineResult<Option<serde_json::Value>> {
        let groups = with_retry("groups_of_member", || self.store().groups_of_member(actor))
            .await?;
        let summaries: Vec<GroupSummary> = groups.iter().map(GroupSummary::from).collect();
        self.send_to_connection(connection_id, ServerEvent::GroupList { groups: summaries })
            .await;
        Ok(None)
    }

    async fn broadcast_membership(&self, group: &Group) {
        self.fan_to_room(
            &group.group_id,
            ServerEvent::GroupMembersUpdated {
                group_id: group.group_id.clone(),
                members: group.members.clone(),
                admins: group.admins.clone(),
            },
        )
        .await;
    }

    // ------------------------------------------------------------------
    // Room subscription
    // ------------------------------------------------------------------

    pub(crate) async fn join_group(
        &self,
        actor: &str,
        connection_id: ConnectionId,
        group_id: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        // Persisted membership is validated here, not in the room layer.
        let group = self.load_group(group_id).await?;
        require_member(&group, actor)?;

        self.rooms().join(group_id, connection_id);
        self.send_to_connection(
            connection_id,
            ServerEvent::GroupJoined {
                group: GroupSummary::from(&group),
            },
        )
        .await;
        Ok(None)
    }

    pub(crate) async fn leave_group(
        &self,
        connection_id: ConnectionId,
        group_id: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        self.rooms().leave(group_id, connection_id);
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Group messages
    // ------------------------------------------------------------------

    pub(crate) async fn send_group_message(
        &self,
        actor: &str,
        group_id: &str,
        content: String,
        kind: MessageKind,
        file: Option<FileMeta>,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut group = self.load_group(group_id).await?;
        require_member(&group, actor)?;

        let now = self.now();
        let message = Message::group(actor, group_id, content, kind, file, now);
        group.messages.push(message.clone());
        group.updated_at = now;
        with_retry("put_group", || self.store().put_group(&group)).await?;

        self.fan_to_room(
            group_id,
            ServerEvent::GroupMessage {
                group_id: group_id.to_string(),
                message: message.clone(),
            },
        )
        .await;
        Ok(Some(serde_json::to_value(message).unwrap_or_default()))
    }

    pub(crate) async fn fetch_group_history(
        &self,
        actor: &str,
        connection_id: ConnectionId,
        group_id: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let group = self.load_group(group_id).await?;
        require_member(&group, actor)?;

        let mut messages = group.messages;
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        self.send_to_connection(
            connection_id,
            ServerEvent::GroupHistory {
                group_id: group_id.to_string(),
                messages,
            },
        )
        .await;
        Ok(None)
    }

    pub(crate) async fn react_group_message(
        &self,
        actor: &str,
        group_id: &str,
        message_id: &str,
        value: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        if value.is_empty() {
            return Err(EngineError::Invalid("empty reaction".into()));
        }
        let mut group = self.load_group(group_id).await?;
        require_member(&group, actor)?;

        let now = self.now();
        let policy = self.policy().reaction_group;
        let message = group
            .message_mut(message_id)
            .ok_or(EngineError::NotFound("message"))?;
        if message.status == MessageStatus::Recalled {
            return Err(EngineError::Policy("cannot react to a recalled message".into()));
        }
        message.apply_reaction(actor, value, policy, now);
        let reactions = message.reactions.clone();
        group.updated_at = now;

        with_retry("put_group", || self.store().put_group(&group)).await?;

        self.fan_to_room(
            group_id,
            ServerEvent::ReactionUpdated {
                scope: ScopeRef::Group {
                    group_id: group_id.to_string(),
                },
                message_id: message_id.to_string(),
                reactions: reactions.clone(),
            },
        )
        .await;
        Ok(Some(serde_json::to_value(reactions).unwrap_or_default()))
    }

    pub(crate) async fn recall_group_message(
        &self,
        actor: &str,
        group_id: &str,
        message_id: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut group = self.load_group(group_id).await?;
        require_member(&group, actor)?;

        let now = self.now();
        let window = Duration::seconds(self.policy().recall_window_secs as i64);
        let is_admin = group.is_admin(actor);
        let message = group
            .message_mut(message_id)
            .ok_or(EngineError::NotFound("message"))?;

        if message.status == MessageStatus::Recalled {
            return Err(EngineError::Policy("message already recalled".into()));
        }
        // Admins may recall anyone's message at any time; the sender only
        // within the window.
        if !is_admin {
            if message.sender != actor {
                return Err(EngineError::Permission(
                    "only the sender or an admin can recall this message".into(),
                ));
            }
            if now - message.created_at > window {
                return Err(EngineError::Policy(format!(
                    "recall window of {}s exceeded",
                    window.num_seconds()
                )));
            }
        }
        message.recall(now);
        group.updated_at = now;

        with_retry("put_group", || self.store().put_group(&group)).await?;
        info!(actor, group_id, message_id, "group message recalled");

        self.fan_to_room(
            group_id,
            ServerEvent::MessageRecalled {
                scope: ScopeRef::Group {
                    group_id: group_id.to_string(),
                },
                message_id: message_id.to_string(),
            },
        )
        .await;
        Ok(None)
    }

    pub(crate) async fn delete_group_message(
        &self,
        actor: &str,
        group_id: &str,
        message_id: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut group = self.load_group(group_id).await?;
        require_member(&group, actor)?;

        let now = self.now();
        let is_admin = group.is_admin(actor);
        let message = group
            .message(message_id)
            .ok_or(EngineError::NotFound("message"))?;
        if message.sender != actor && !is_admin {
            return Err(EngineError::Permission(
                "only the sender or an admin can delete this message".into(),
            ));
        }

        match self.policy().delete_group {
            DeletePolicy::Soft => {
                if let Some(message) = group.message_mut(message_id) {
                    message.is_deleted = true;
                    message.updated_at = now;
                }
            }
            DeletePolicy::Hard => {
                group.messages.retain(|m| m.message_id != message_id);
            }
        }
        group.updated_at = now;

        with_retry("put_group", || self.store().put_group(&group)).await?;
        info!(actor, group_id, message_id, "group message deleted");
        // Ack-only, same as direct deletes.
        Ok(None)
    }
}
