//! Keeps track of the live cart sessions, one per user.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{sync::Mutex, time::Instant};
use tracing::info;

use super::{CartError, RemoteConnector, SessionHandle, UserId};

struct Entry {
    handle: SessionHandle,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct SessionRegistry {
    connector: Arc<dyn RemoteConnector>,
    sessions: Arc<Mutex<HashMap<UserId, Entry>>>,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn RemoteConnector>) -> Self {
        Self {
            connector,
            sessions: Arc::default(),
        }
    }

    /// Starts a session for `user_id` hydrated from the server cart. A session that is
    /// already running is returned as is.
    pub async fn start(&self, user_id: &UserId) -> Result<SessionHandle, CartError> {
        if let Some(handle) = self.get(user_id).await {
            return Ok(handle);
        }

        let handle = SessionHandle::start(user_id.clone(), self.connector.connect(user_id)).await?;

        let mut sessions = self.sessions.lock().await;
        // Two starts for the same user may race on the fetch; the first one in wins.
        let entry = sessions.entry(user_id.clone()).or_insert(Entry {
            handle,
            last_seen: Instant::now(),
        });
        entry.last_seen = Instant::now();
        Ok(entry.handle.clone())
    }

    /// Looks up a running session and marks it as active.
    pub async fn get(&self, user_id: &UserId) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(user_id).map(|entry| {
            entry.last_seen = Instant::now();
            entry.handle.clone()
        })
    }

    /// Ends a session. Requests still being served finish against the old session.
    pub async fn end(&self, user_id: &UserId) -> bool {
        let removed = self.sessions.lock().await.remove(user_id).is_some();
        if removed {
            info!("Ended cart session for user {user_id}.");
        }
        removed
    }

    /// Ends every session that has not been used for longer than `idle_timeout`.
    pub async fn reap_idle(&self, idle_timeout: Duration) -> Vec<UserId> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let idle: Vec<UserId> = sessions
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_seen) > idle_timeout)
            .map(|(user_id, _)| user_id.clone())
            .collect();
        for user_id in &idle {
            sessions.remove(user_id);
            info!("Reaped idle cart session for user {user_id}.");
        }
        idle
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}

//-------------------------- Tests -------------------------------
