//! Session registry: connection-to-identity bookkeeping and identity fan-out.
//!
//! One identity may hold many live connections (multi-device). The registry
//! owns every connection between handshake and transport close; nothing here
//! is persisted.
//!
//! # Atomicity
//!
//! The per-identity connection set is mutated only inside a DashMap entry
//! guard, so "remove connection, and drop the identity entry if the set
//! became empty" is one atomic step. A reconnect racing that cleanup either
//! lands before it (set not empty, entry survives) or after it (fresh entry)
//! and is never lost. No guard is ever held across an `.await`.

use crate::state::DashMapExt;
use chatter_proto::ServerFrame;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique id of one live transport session.
pub type ConnectionId = Uuid;

/// Bookkeeping for one registered connection.
#[derive(Debug, Clone)]
struct ConnectionInfo {
    authenticated_at: DateTime<Utc>,
}

/// Result of registering a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// First live connection for this identity (came online).
    FirstConnection,
    /// Identity already had at least one live connection.
    AdditionalConnection,
}

/// Result of unregistering a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnregisterOutcome {
    /// Connections remain for this identity.
    Remaining(usize),
    /// That was the last connection; the identity entry was removed.
    IdentityOffline,
    /// The connection was not registered under this identity.
    UnknownConnection,
}

/// Connection-to-identity registry with per-identity fan-out.
pub struct SessionRegistry {
    /// Identity key -> live connections.
    identities: DashMap<String, HashMap<ConnectionId, ConnectionInfo>>,
    /// Connection id -> outbound event channel. Authoritative for delivery:
    /// a connection absent here is skipped harmlessly during fan-out.
    senders: DashMap<ConnectionId, mpsc::Sender<Arc<ServerFrame>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            identities: DashMap::new(),
            senders: DashMap::new(),
        }
    }

    /// Register a connection for an identity. Idempotent per connection id:
    /// re-registering the same id replaces its channel without duplicating
    /// the membership.
    pub fn register(
        &self,
        identity: &str,
        connection_id: ConnectionId,
        authenticated_at: DateTime<Utc>,
        sender: mpsc::Sender<Arc<ServerFrame>>,
    ) -> RegisterOutcome {
        self.senders.insert(connection_id, sender);

        let mut entry = self.identities.entry(identity.to_string()).or_default();
        let was_offline = entry.is_empty();
        entry.insert(connection_id, ConnectionInfo { authenticated_at });

        if was_offline {
            RegisterOutcome::FirstConnection
        } else {
            RegisterOutcome::AdditionalConnection
        }
    }

    /// Remove a connection; if the identity's set becomes empty the identity
    /// entry is removed in the same critical section.
    pub fn unregister(&self, identity: &str, connection_id: ConnectionId) -> UnregisterOutcome {
        self.senders.remove(&connection_id);

        match self.identities.entry(identity.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get_mut().remove(&connection_id).is_none() {
                    return UnregisterOutcome::UnknownConnection;
                }
                let remaining = occupied.get().len();
                if remaining == 0 {
                    occupied.remove();
                    UnregisterOutcome::IdentityOffline
                } else {
                    UnregisterOutcome::Remaining(remaining)
                }
            }
            Entry::Vacant(_) => UnregisterOutcome::UnknownConnection,
        }
    }

    /// Live connection ids for an identity (cloned; guard dropped).
    pub fn connections_of(&self, identity: &str) -> Vec<ConnectionId> {
        self.identities
            .get(identity)
            .map(|e| e.value().keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.identities
            .get(identity)
            .is_some_and(|e| !e.value().is_empty())
    }

    /// Number of identities currently online.
    pub fn online_identities(&self) -> usize {
        self.identities.len()
    }

    /// Total live connections.
    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }

    /// Deliver a frame to every live connection of `identity`. Returns how
    /// many connections accepted it; connections mid-disconnect are skipped.
    pub async fn send_to_identity(&self, identity: &str, frame: Arc<ServerFrame>) -> usize {
        let connections = self.connections_of(identity);
        self.send_to_connections(&connections, frame).await
    }

    /// Deliver a frame to a specific set of connections.
    pub async fn send_to_connections(
        &self,
        connections: &[ConnectionId],
        frame: Arc<ServerFrame>,
    ) -> usize {
        let mut delivered = 0;
        for connection_id in connections {
            // Clone the sender so the shard guard drops before the await.
            let Some(sender) = self.senders.get_cloned(connection_id) else {
                continue;
            };
            if sender.send(Arc::clone(&frame)).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
