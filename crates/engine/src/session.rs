//! In-memory student sessions.
//!
//! A session carries a student's profile and conversation across requests.
//! Sessions expire after a period of inactivity; expired sessions are
//! dropped lazily on access and in bulk by [`SessionStore::purge_expired`].

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use tutorlink_config::{MAX_SESSION_TIMEOUT_MINUTES, SessionConfig};
use tutorlink_core::message::Message;
use tutorlink_core::personalization::StudentProfile;

/// One orchestrated request, as remembered by the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInteraction {
    pub request_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub profile: StudentProfile,
    /// Oldest first, capped at the store's `max_history`
    pub history: Vec<Message>,
    /// Oldest first, capped like `history`
    pub interactions: Vec<ToolInteraction>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_active >= timeout
    }
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    timeout: Duration,
    max_history: usize,
}

impl SessionStore {
    pub fn new(timeout: Duration, max_history: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timeout,
            max_history: max_history.max(1),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        // Validated configs are in range; the clamp keeps an unvalidated one
        // from overflowing the duration.
        let minutes = config.timeout_minutes.clamp(1, MAX_SESSION_TIMEOUT_MINUTES);
        Self::new(Duration::minutes(minutes as i64), config.max_history)
    }

    pub async fn create(&self, user_id: Option<String>, profile: StudentProfile) -> Session {
        self.create_at(user_id, profile, Utc::now()).await
    }

    async fn create_at(&self, user_id: Option<String>, profile: StudentProfile, now: DateTime<Utc>) -> Session {
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            profile,
            history: Vec::new(),
            interactions: Vec::new(),
            created_at: now,
            last_active: now,
        };
        info!(session_id = %session.id, "Session created");
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        session
    }

    /// A live session. An expired one is removed and reported as absent.
    pub async fn get(&self, id: &str) -> Option<Session> {
        self.get_at(id, Utc::now()).await
    }

    async fn get_at(&self, id: &str, now: DateTime<Utc>) -> Option<Session> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(id) {
                None => return None,
                Some(s) if !s.is_expired(now, self.timeout) => return Some(s.clone()),
                Some(_) => {}
            }
        }
        // Activity may have landed between the two locks.
        let mut sessions = self.sessions.write().await;
        match sessions.get(id) {
            Some(s) if !s.is_expired(now, self.timeout) => Some(s.clone()),
            Some(_) => {
                debug!(session_id = id, "Session expired");
                sessions.remove(id);
                None
            }
            None => None,
        }
    }

    /// Append turns, dropping the oldest beyond `max_history`. Returns the
    /// new history length, or `None` when the session is gone.
    pub async fn append_turns(&self, id: &str, turns: Vec<Message>) -> Option<usize> {
        self.append_turns_at(id, turns, Utc::now()).await
    }

    async fn append_turns_at(&self, id: &str, turns: Vec<Message>, now: DateTime<Utc>) -> Option<usize> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).filter(|s| !s.is_expired(now, self.timeout))?;
        session.history.extend(turns);
        let excess = session.history.len().saturating_sub(self.max_history);
        session.history.drain(..excess);
        session.last_active = now;
        Some(session.history.len())
    }

    /// Returns `false` when the session is gone.
    pub async fn record_interaction(&self, id: &str, interaction: ToolInteraction) -> bool {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id).filter(|s| !s.is_expired(now, self.timeout)) {
            Some(session) => {
                session.interactions.push(interaction);
                let excess = session.interactions.len().saturating_sub(self.max_history);
                session.interactions.drain(..excess);
                session.last_active = now;
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Live sessions, most recently active first.
    pub async fn list(&self) -> Vec<Session> {
        let now = Utc::now();
        let sessions = self.sessions.read().await;
        let mut live: Vec<Session> = sessions
            .values()
            .filter(|s| !s.is_expired(now, self.timeout))
            .cloned()
            .collect();
        live.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        live
    }

    /// Drop every expired session. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now()).await
    }

    async fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now, self.timeout));
        let purged = before - sessions.len();
        if purged > 0 {
            info!(purged, remaining = sessions.len(), "Purged expired sessions");
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
