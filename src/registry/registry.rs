use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::client::Client;
use crate::error::{RegistryError, Result};

use super::stats::{AggregateStats, PublishedStats, RegistryStats};

/// A tracked entry in the registry
struct RegisteredClient {
    client: Arc<dyn Client>,
    registered_at: DateTime<Utc>,
}

/// Owned view of one session, cloned out under the read lock
#[derive(Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub clients: Vec<Arc<dyn Client>>,
}

/// Tracks all live clients, grouped by session.
///
/// A single reader-writer lock guards the nested maps. Lock scope is
/// minimal: mutations hold the write lock only while touching the maps,
/// and no client capability (teardown, bandwidth sampling) is ever
/// invoked while either lock is held. Session keys are never
/// garbage-collected; a session drained of clients stays registered
/// with an empty inner map.
pub struct SessionRegistry {
    /// session_id -> client_id -> entry
    sessions: RwLock<HashMap<String, HashMap<String, RegisteredClient>>>,
    published: PublishedStats,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            published: PublishedStats::new(),
        }
    }

    /// Register a client under its (session id, client id) key.
    ///
    /// Identity is validated before any mutation: a client whose session
    /// or client id is empty cannot be keyed and is rejected outright.
    /// Registering over an existing key replaces the entry; the displaced
    /// client is NOT closed (only the remove-and-close path tears clients
    /// down).
    pub async fn add_client(&self, client: Arc<dyn Client>) -> Result<()> {
        let session_id = client.session_id().to_string();
        let client_id = client.client_id().to_string();

        if session_id.is_empty() || client_id.is_empty() {
            return Err(RegistryError::InvalidClient(format!(
                "empty identity (session_id: {:?}, client_id: {:?})",
                session_id, client_id
            )));
        }

        let replaced = {
            let mut sessions = self.sessions.write().await;
            sessions
                .entry(session_id.clone())
                .or_default()
                .insert(
                    client_id.clone(),
                    RegisteredClient {
                        client,
                        registered_at: Utc::now(),
                    },
                )
                .is_some()
        };

        if replaced {
            tracing::debug!(
                session_id = %session_id,
                client_id = %client_id,
                "Replaced existing entry for client key"
            );
        }
        tracing::info!(session_id = %session_id, client_id = %client_id, "Client registered");

        Ok(())
    }

    /// Remove a client and tear down the connection the registry held.
    ///
    /// Teardown runs after the write lock is released, so a slow or
    /// blocking close never stalls other registry operations. Removal is
    /// idempotent: a missing client within a known session is an Ok no-op
    /// and closes nothing.
    pub async fn remove_client_and_close(&self, client: &dyn Client) -> Result<()> {
        let removed = self.take_entry(client).await?;

        if let Some(entry) = removed {
            if let Err(e) = entry.client.close().await {
                tracing::warn!(
                    session_id = %client.session_id(),
                    client_id = %client.client_id(),
                    error = %e,
                    "Client close failed"
                );
            }
            tracing::info!(
                session_id = %client.session_id(),
                client_id = %client.client_id(),
                "Client removed and closed"
            );
        }

        Ok(())
    }

    /// Remove a client without touching its connection, for callers that
    /// manage the client's lifecycle themselves.
    pub async fn remove_client(&self, client: &dyn Client) -> Result<()> {
        let removed = self.take_entry(client).await?;

        if removed.is_some() {
            tracing::info!(
                session_id = %client.session_id(),
                client_id = %client.client_id(),
                "Client removed"
            );
        }

        Ok(())
    }

    /// Detach the entry at the client's key under the write lock.
    ///
    /// Fails only when the session id has never been seen. The inner map
    /// stays in place even when this removal empties it.
    async fn take_entry(&self, client: &dyn Client) -> Result<Option<RegisteredClient>> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(client.session_id())
            .ok_or_else(|| RegistryError::UnknownSession(client.session_id().to_string()))?;
        Ok(session.remove(client.client_id()))
    }

    /// Owned snapshot of every session and its clients.
    ///
    /// The read lock is held only while the handles are cloned out;
    /// callers can sample or close them freely afterwards.
    pub async fn snapshot(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(session_id, clients)| SessionSnapshot {
                session_id: session_id.clone(),
                clients: clients.values().map(|e| e.client.clone()).collect(),
            })
            .collect()
    }

    /// Current shape of the registry
    pub async fn registry_stats(&self) -> RegistryStats {
        let sessions = self.sessions.read().await;
        let mut per_session = HashMap::new();
        for (session_id, clients) in sessions.iter() {
            per_session.insert(session_id.clone(), clients.len());
        }

        RegistryStats {
            total_clients: per_session.values().sum(),
            total_sessions: per_session.len(),
            sessions: per_session,
        }
    }

    /// How long ago a tracked client was registered, if present
    pub async fn registered_at(&self, client: &dyn Client) -> Option<DateTime<Utc>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(client.session_id())
            .and_then(|s| s.get(client.client_id()))
            .map(|e| e.registered_at)
    }

    /// Last aggregate published by the stats task; zeros until the first
    /// cycle completes
    pub fn current_stats(&self) -> AggregateStats {
        self.published.load()
    }

    pub(crate) fn publish_stats(&self, stats: &AggregateStats) {
        self.published.publish(stats);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
