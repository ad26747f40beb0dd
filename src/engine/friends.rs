//! Friend-edge consistency manager.
//!
//! A friend edge is materialized twice (once per identity) plus two pending
//! lists, and the store has no multi-key transaction. Writes follow
//! apply-then-verify: the counterpart's document first, then the actor's,
//! each with bounded retry. A second-side failure surfaces as
//! `partial_consistency`, and every read runs a repair pass that drops
//! half-written pendings and mirrors half-written friend entries outward.

use super::Engine;
use crate::error::{EngineError, EngineResult};
use crate::state::ConnectionId;
use crate::store::with_retry;
use chatter_proto::{FriendLists, FriendRequest, ServerEvent, UserSummary};
use chatter_proto::{FriendRequestKind as Kind, ServerEvent::FriendRequestUpdate};
use tracing::{error, info, warn};

impl Engine {
    async fn lists_of(&self, email: &str) -> EngineResult<FriendLists> {
        Ok(
            with_retry("get_friend_lists", || self.store().get_friend_lists(email))
                .await?
                .unwrap_or_default(),
        )
    }

    async fn put_lists(&self, email: &str, lists: &FriendLists) -> EngineResult<()> {
        with_retry("put_friend_lists", || {
            self.store().put_friend_lists(email, lists)
        })
        .await?;
        Ok(())
    }

    async fn summary_of(&self, email: &str) -> EngineResult<UserSummary> {
        let user = self.load_user(email).await?;
        Ok(UserSummary {
            email: user.email,
            full_name: user.full_name,
            avatar: user.avatar,
        })
    }

    /// Load `actor`'s lists and heal any half-written edges against the
    /// mirrors actually present on the counterpart documents.
    pub(crate) async fn repaired_lists_of(&self, actor: &str) -> EngineResult<FriendLists> {
        let mut lists = self.lists_of(actor).await?;
        let mut dirty = false;

        // A friend entry whose mirror is missing is completed outward: the
        // accept already happened on this side, so finish the other side.
        for friend in lists.friends.clone() {
            let mut peer_lists = self.lists_of(&friend).await?;
            if !peer_lists.is_friend(actor) {
                warn!(actor, peer = %friend, "repairing one-sided friend edge");
                peer_lists.add_friend(actor);
                peer_lists.clear_edge(actor);
                self.put_lists(&friend, &peer_lists).await?;
            }
        }

        // A pending entry whose mirror is missing is dropped: the edge was
        // never fully sent (or was withdrawn mid-write).
        let sent = lists.requests_sent.clone();
        for request in sent {
            let peer_lists = self.lists_of(&request.email).await?;
            if !peer_lists.has_received(actor) && !peer_lists.is_friend(actor) {
                warn!(actor, peer = %request.email, "dropping half-written outgoing request");
                lists.requests_sent.retain(|r| r.email != request.email);
                dirty = true;
            }
        }
        let received = lists.requests_received.clone();
        for request in received {
            let peer_lists = self.lists_of(&request.email).await?;
            if !peer_lists.has_sent(actor) && !peer_lists.is_friend(actor) {
                warn!(actor, peer = %request.email, "dropping half-written incoming request");
                lists
                    .requests_received
                    .retain(|r| r.email != request.email);
                dirty = true;
            }
        }

        if dirty {
            self.put_lists(actor, &lists).await?;
        }
        Ok(lists)
    }

    pub(crate) async fn friend_request(
        &self,
        actor: &str,
        to: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        if to == actor {
            return Err(EngineError::Invalid("cannot befriend yourself".into()));
        }
        self.load_user(to).await?;

        let mut mine = self.lists_of(actor).await?;
        let mut theirs = self.lists_of(to).await?;
        if mine.is_friend(to) {
            return Err(EngineError::Policy("already friends".into()));
        }
        if mine.has_sent(to) {
            return Err(EngineError::Policy("request already pending".into()));
        }
        if mine.has_received(to) {
            return Err(EngineError::Policy(
                "counterpart already sent you a request".into(),
            ));
        }

        let now = self.now();
        theirs.requests_received.push(FriendRequest {
            email: actor.to_string(),
            at: now,
        });
        mine.requests_sent.push(FriendRequest {
            email: to.to_string(),
            at: now,
        });

        // Counterpart first: an orphaned incoming entry is repairable, an
        // orphaned outgoing one would claim a request the peer never saw.
        self.put_lists(to, &theirs).await?;
        if let Err(e) = self.put_lists(actor, &mine).await {
            error!(actor, to, %e, "friend request second-side write failed");
            return Err(EngineError::PartialConsistency(format!(
                "request recorded for {to} but not for {actor}"
            )));
        }
        info!(actor, to, "friend request sent");

        let sender = self.summary_of(actor).await?;
        self.fan_to_identity(
            to,
            FriendRequestUpdate {
                kind: Kind::New,
                peer: sender,
            },
        )
        .await;
        Ok(None)
    }

    pub(crate) async fn friend_respond(
        &self,
        actor: &str,
        from: &str,
        accept: bool,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut mine = self.lists_of(actor).await?;
        if !mine.has_received(from) {
            return Err(EngineError::NotFound("friend request"));
        }
        let mut theirs = self.lists_of(from).await?;

        mine.clear_edge(from);
        theirs.clear_edge(actor);
        if accept {
            mine.add_friend(from);
            theirs.add_friend(actor);
        }

        self.put_lists(actor, &mine).await?;
        if let Err(e) = self.put_lists(from, &theirs).await {
            error!(actor, from, %e, "friend response second-side write failed");
            return Err(EngineError::PartialConsistency(format!(
                "response recorded for {actor} but not for {from}"
            )));
        }
        info!(actor, from, accept, "friend request answered");

        let responder = self.summary_of(actor).await?;
        self.fan_to_identity(
            from,
            FriendRequestUpdate {
                kind: if accept { Kind::Accepted } else { Kind::Rejected },
                peer: responder,
            },
        )
        .await;
        if accept {
            self.fan_to_identity(actor, ServerEvent::FriendListUpdate { lists: mine }).await;
            self.fan_to_identity(from, ServerEvent::FriendListUpdate { lists: theirs })
                .await;
        }
        Ok(None)
    }

    pub(crate) async fn friend_withdraw(
        &self,
        actor: &str,
        to: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        let mut mine = self.lists_of(actor).await?;
        if !mine.has_sent(to) {
            return Err(EngineError::NotFound("friend request"));
        }
        let mut theirs = self.lists_of(to).await?;

        mine.clear_edge(to);
        theirs.clear_edge(actor);

        self.put_lists(to, &theirs).await?;
        if let Err(e) = self.put_lists(actor, &mine).await {
            error!(actor, to, %e, "friend withdraw second-side write failed");
            return Err(EngineError::PartialConsistency(format!(
                "withdraw recorded for {to} but not for {actor}"
            )));
        }

        let sender = self.summary_of(actor).await?;
        self.fan_to_identity(
            to,
            FriendRequestUpdate {
                kind: Kind::Withdrawn,
                peer: sender,
            },
        )
        .await;
        Ok(None)
    }

    pub(crate) async fn fetch_friends(
        &self,
        actor: &str,
        connection_id: ConnectionId,
    ) -> EngineResult<Option<serde_json::Value>> {
        let lists = self.repaired_lists_of(actor).await?;
        self.send_to_connection(connection_id, ServerEvent::FriendListUpdate { lists })
            .await;
        Ok(None)
    }
}
