//! Session and page state
//!
//! A client is either unauthenticated or bound to a username. Authenticated
//! clients pick one of two views. Sessions live in memory and are addressed
//! by a random bearer token; restarting the process logs everyone out.
//! Sessions expire a fixed time after login.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

/// Seconds between opportunistic sweeps of expired sessions
const CLEANUP_INTERVAL_SECS: i64 = 300;

/// Page selected by an authenticated client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    #[serde(rename = "predict")]
    Predicting,
    Admin,
}

/// Authenticated identity for a sequence of page actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub username: String,
    pub view: View,
    pub created_at: DateTime<Utc>,
    /// Set by `SessionStore::insert`
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            view: View::default(),
            created_at: Utc::now(),
            expires_at: DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoginSucceeded(String),
    Logout,
    SelectView(View),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated { username: String, view: View },
}

impl SessionState {
    /// Apply an event; view selection is ignored while unauthenticated
    pub fn transition(self, event: SessionEvent) -> Self {
        match (self, event) {
            (_, SessionEvent::LoginSucceeded(username)) => Self::Authenticated {
                username,
                view: View::default(),
            },
            (_, SessionEvent::Logout) => Self::Unauthenticated,
            (Self::Authenticated { username, .. }, SessionEvent::SelectView(view)) => {
                Self::Authenticated { username, view }
            }
            (Self::Unauthenticated, SessionEvent::SelectView(_)) => Self::Unauthenticated,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Authenticated { username, .. } => Some(username),
            Self::Unauthenticated => None,
        }
    }
}

impl From<&Session> for SessionState {
    fn from(session: &Session) -> Self {
        Self::Authenticated {
            username: session.username.clone(),
            view: session.view,
        }
    }
}

/// Token → session map
///
/// Expired sessions are invisible to lookups and are swept out every few
/// minutes as new sessions open.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
    /// Unix seconds of the last sweep
    last_cleanup: AtomicI64,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            last_cleanup: AtomicI64::new(Utc::now().timestamp()),
        }
    }

    /// Out-of-range values saturate to the longest representable TTL
    pub fn with_ttl_secs(secs: u64) -> Self {
        let ttl = i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self::new(ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a session and return its bearer token
    ///
    /// The session expires `ttl` after its creation time.
    pub fn insert(&self, mut session: Session) -> String {
        session.expires_at = session
            .created_at
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let token = Uuid::new_v4().to_string();
        debug!(username = %session.username, expires_at = %session.expires_at, "Session opened");
        self.sessions.insert(token.clone(), session);

        self.maybe_cleanup();
        token
    }

    /// Live session behind `token`; an expired one is removed
    pub fn get(&self, token: &str) -> Option<Session> {
        let session = self.sessions.get(token).map(|s| s.value().clone())?;
        if session.is_expired() {
            self.sessions.remove_if(token, |_, s| s.is_expired());
            debug!(username = %session.username, "Session expired");
            return None;
        }
        Some(session)
    }

    /// Current state for a token; unknown or expired tokens are unauthenticated
    pub fn state(&self, token: Option<&str>) -> SessionState {
        token
            .and_then(|t| self.get(t))
            .map(|s| SessionState::from(&s))
            .unwrap_or_default()
    }

    /// Apply an event to the session behind `token`
    ///
    /// `Logout` removes the session. Returns the resulting state.
    pub fn apply(&self, token: &str, event: SessionEvent) -> SessionState {
        let current = self.state(Some(token));
        let next = current.transition(event);

        match &next {
            SessionState::Unauthenticated => {
                if let Some((_, session)) = self.sessions.remove(token) {
                    debug!(username = %session.username, "Session closed");
                }
            }
            SessionState::Authenticated { view, .. } => {
                if let Some(mut session) = self.sessions.get_mut(token) {
                    session.view = *view;
                }
            }
        }
        next
    }

    fn maybe_cleanup(&self) {
        let now = Utc::now().timestamp();
        let last = self.last_cleanup.load(Ordering::Relaxed);
        if now - last < CLEANUP_INTERVAL_SECS {
            return;
        }

        if self
            .last_cleanup
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            self.cleanup();
        }
    }

    /// Drop every expired session, returning how many went
    pub fn cleanup(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired());
        let removed = before.saturating_sub(self.sessions.len());

        if removed > 0 {
            info!("Cleaned up {} expired sessions", removed);
        }
        removed
    }

    /// Number of stored sessions, expired ones not yet swept included
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}
