use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::dedup::Credentials;

/// Opaque token identifying a user session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn generate() -> Self {
        SessionToken(format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Tokens are secrets, only log a prefix.
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "{}...", prefix)
    }
}

#[derive(Debug, Clone)]
struct SessionEntry {
    credentials: Credentials,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

/// In-memory session store, session token to the credentials handed over at login.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionToken, SessionEntry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionToken, SessionEntry>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionToken, SessionEntry>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self, credentials: Credentials) -> SessionToken {
        let now = Utc::now();
        let mut sessions = self.write();
        let mut token = SessionToken::generate();
        while sessions.contains_key(&token) {
            token = SessionToken::generate();
        }
        sessions.insert(
            token.clone(),
            SessionEntry {
                credentials,
                created_at: now,
                last_seen: now,
            },
        );
        debug!("Created session {}", token);
        token
    }

    /// Credentials of a session, refreshing its last seen time.
    pub fn get(&self, token: &SessionToken) -> Option<Credentials> {
        let mut sessions = self.write();
        let entry = sessions.get_mut(token)?;
        entry.last_seen = Utc::now();
        Some(entry.credentials.clone())
    }

    /// Returns true if the session existed.
    pub fn remove(&self, token: &SessionToken) -> bool {
        let removed = self.write().remove(token);
        if let Some(entry) = &removed {
            debug!("Removed session {} created at {}", token, entry.created_at);
        }
        removed.is_some()
    }

    /// Remove sessions not seen for longer than `ttl`, returning their tokens.
    pub fn prune_expired(&self, ttl: ChronoDuration) -> Vec<SessionToken> {
        let cutoff = Utc::now() - ttl;
        let mut sessions = self.write();
        let expired: Vec<SessionToken> = sessions
            .iter()
            .filter(|(_, entry)| entry.last_seen < cutoff)
            .map(|(token, _)| token.clone())
            .collect();
        for token in &expired {
            sessions.remove(token);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
