//! Connection registry
//!
//! A concurrent lookup index from user id to that user's live connections.
//! Registration and lookup happen from independent connection tasks, so the
//! index sits behind a `tokio::sync::RwLock`. The registry makes no ordering
//! or delivery guarantees of its own.

use crate::auth::Identity;
use crate::protocol::ServerEnvelope;
use crate::storage::UserId;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Connection identifier
pub type ConnectionId = Uuid;

/// Sending half of one live connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Connection id
    pub id: ConnectionId,
    /// Identity established when the channel opened
    pub identity: Identity,
    sender: mpsc::UnboundedSender<ServerEnvelope>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the socket task drains
    pub fn new(identity: Identity) -> (Self, mpsc::UnboundedReceiver<ServerEnvelope>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                identity,
                sender,
            },
            receiver,
        )
    }

    /// Owning user
    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    /// Queue an envelope; `false` if the connection is already gone
    pub fn send(&self, envelope: ServerEnvelope) -> bool {
        self.sender.send(envelope).is_ok()
    }

    /// Whether the receiving side has been dropped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Default)]
struct Index {
    by_user: HashMap<UserId, HashMap<ConnectionId, ConnectionHandle>>,
    owners: HashMap<ConnectionId, UserId>,
    admins: HashMap<ConnectionId, ConnectionHandle>,
}

/// User → connections index
#[derive(Default)]
pub struct ConnectionRegistry {
    index: RwLock<Index>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live connection
    pub async fn register(&self, handle: ConnectionHandle) {
        let mut index = self.index.write().await;
        let user = handle.user_id();
        debug!("Registering connection {} for user {}", handle.id, user);

        index.owners.insert(handle.id, user);
        if handle.identity.is_admin() {
            index.admins.insert(handle.id, handle.clone());
        }
        index
            .by_user
            .entry(user)
            .or_default()
            .insert(handle.id, handle);
    }

    /// Remove a connection; returns its handle if it was registered
    pub async fn unregister(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        let mut index = self.index.write().await;
        let user = index.owners.remove(&id)?;
        index.admins.remove(&id);

        let handle = match index.by_user.get_mut(&user) {
            Some(connections) => {
                let handle = connections.remove(&id);
                if connections.is_empty() {
                    index.by_user.remove(&user);
                }
                handle
            }
            None => None,
        };

        debug!("Unregistered connection {} for user {}", id, user);
        handle
    }

    /// Every live connection of one user
    pub async fn connections_for(&self, user: UserId) -> Vec<ConnectionHandle> {
        let index = self.index.read().await;
        index
            .by_user
            .get(&user)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every live admin connection
    pub async fn admin_connections(&self) -> Vec<ConnectionHandle> {
        let index = self.index.read().await;
        index.admins.values().cloned().collect()
    }

    /// Whether the user has at least one live connection
    pub async fn is_online(&self, user: UserId) -> bool {
        let index = self.index.read().await;
        index.by_user.contains_key(&user)
    }

    /// Total live connections
    pub async fn connection_count(&self) -> usize {
        let index = self.index.read().await;
        index.owners.len()
    }

    /// Users with at least one live connection
    pub async fn user_count(&self) -> usize {
        let index = self.index.read().await;
        index.by_user.len()
    }
}
