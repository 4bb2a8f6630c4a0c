//! Registry of live connections and their assigned identities
//!
//! The registry is the only mutable state shared between connection tasks.
//! Every operation takes the internal lock for the duration of a map
//! operation and nothing more; callers receive owned snapshots and do their
//! network I/O after the lock is released.

use crate::connection::{Connection, ConnectionKey};
use chat_shared::ClientId;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A registered connection and the identity handed to it
#[derive(Debug)]
struct Entry {
    connection: Arc<Connection>,
    client_id: ClientId,
}

#[derive(Debug)]
struct Clients {
    /// Live connections indexed by connection identity
    entries: HashMap<ConnectionKey, Entry>,
    /// Next number handed out; never reused within the process
    next_client_number: u64,
}

/// Shared mapping from connection to `ClientId`
///
/// Identities are assigned from a counter that starts at 1, so registration
/// order and identity order agree. That order is only used for display.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: Mutex<Clients>,
}

impl ClientRegistry {
    /// Empty registry; the first registration gets `Client 1`.
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Clients {
                entries: HashMap::new(),
                next_client_number: 1,
            }),
        }
    }

    /// Assigns a fresh identity to `connection` and inserts it.
    pub async fn register(&self, connection: Arc<Connection>) -> ClientId {
        let mut clients = self.clients.lock().await;

        let client_id = ClientId::new(clients.next_client_number);
        clients.next_client_number += 1;

        let peer = connection.peer();
        clients.entries.insert(
            connection.key(),
            Entry {
                connection,
                client_id,
            },
        );

        info!(
            "{} registered from {:?} ({} connected)",
            client_id,
            peer,
            clients.entries.len()
        );
        client_id
    }

    /// Removes the connection and returns the identity it held.
    ///
    /// Returns `None` when the connection is already gone. Only the caller
    /// that receives `Some` may announce the departure.
    pub async fn unregister(&self, key: ConnectionKey) -> Option<ClientId> {
        let mut clients = self.clients.lock().await;
        match clients.entries.remove(&key) {
            Some(entry) => {
                info!(
                    "{} unregistered ({} connected)",
                    entry.client_id,
                    clients.entries.len()
                );
                Some(entry.client_id)
            }
            None => {
                debug!("Connection {:?} was already unregistered", key);
                None
            }
        }
    }

    /// Point-in-time copy of every entry, in registration order.
    pub async fn snapshot(&self) -> Vec<(Arc<Connection>, ClientId)> {
        let mut snapshot: Vec<(Arc<Connection>, ClientId)> = {
            let clients = self.clients.lock().await;
            clients
                .entries
                .values()
                .map(|entry| (Arc::clone(&entry.connection), entry.client_id))
                .collect()
        };
        snapshot.sort_by_key(|(_, client_id)| *client_id);
        snapshot
    }

    /// Identities of everyone currently connected, in registration order.
    pub async fn roster(&self) -> Vec<ClientId> {
        let mut roster: Vec<ClientId> = {
            let clients = self.clients.lock().await;
            clients.entries.values().map(|entry| entry.client_id).collect()
        };
        roster.sort();
        roster
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.clients.lock().await.entries.len()
    }

    /// True when no client is connected.
    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.entries.is_empty()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
