//! Connection lifecycle and presence.
//!
//! First connection of an identity announces it online to its friends; last
//! disconnection announces it offline. Disconnect also tears down every room
//! subscription the connection held, so in-flight broadcasts that complete
//! afterwards no-op harmlessly.

use super::Engine;
use crate::metrics;
use crate::state::{ConnectionId, RegisterOutcome, UnregisterOutcome};
use chatter_proto::{ServerEvent, ServerFrame};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

impl Engine {
    /// Register an authenticated connection and fan out presence.
    pub async fn connection_opened(
        &self,
        identity: &str,
        connection_id: ConnectionId,
        authenticated_at: DateTime<Utc>,
        sender: mpsc::Sender<Arc<ServerFrame>>,
    ) {
        let outcome = self
            .registry()
            .register(identity, connection_id, authenticated_at, sender);
        metrics::connection_opened(self.registry().connection_count());
        info!(identity, %connection_id, ?outcome, "connection registered");

        if outcome == RegisterOutcome::FirstConnection {
            self.announce_presence(identity, true).await;
        }
    }

    /// Drop a connection from rooms and the registry, announcing offline if
    /// it was the identity's last.
    pub async fn connection_closed(&self, identity: &str, connection_id: ConnectionId) {
        let left_rooms = self.rooms().drop_connection(connection_id);
        let outcome = self.registry().unregister(identity, connection_id);
        metrics::connection_closed(self.registry().connection_count());
        info!(
            identity,
            %connection_id,
            rooms = left_rooms.len(),
            ?outcome,
            "connection closed"
        );

        if outcome == UnregisterOutcome::IdentityOffline {
            self.announce_presence(identity, false).await;
        }
    }

    /// Tell every friend's live connections that `identity` changed state.
    /// Presence is best-effort: a store failure here is logged, never fatal
    /// to the connection.
    async fn announce_presence(&self, identity: &str, online: bool) {
        let lists = match self.repaired_lists_of(identity).await {
            Ok(lists) => lists,
            Err(error) => {
                warn!(identity, %error, "presence announcement skipped");
                return;
            }
        };
        for friend in &lists.friends {
            self.fan_to_identity(
                friend,
                ServerEvent::FriendStatusUpdate {
                    email: identity.to_string(),
                    online,
                },
            )
            .await;
        }
    }
}
