use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::ErrorInfo;
use crate::models::UserProfile;

/// Opaque bearer credential. Replaced wholesale on login, never edited.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    value: String,
    issued_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            issued_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.issued_at
    }

    pub fn is_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > max_age
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    /// A resume or login attempt is in flight.
    Authenticating,
    Authenticated { user: UserProfile, token: Token },
    Unauthenticated,
}

/// Snapshot of the one session a client process holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    phase: SessionPhase,
    error: Option<ErrorInfo>,
}

impl Session {
    pub(crate) fn authenticating() -> Self {
        Self {
            phase: SessionPhase::Authenticating,
            error: None,
        }
    }

    pub(crate) fn authenticated(user: UserProfile, token: Token) -> Self {
        Self {
            phase: SessionPhase::Authenticated { user, token },
            error: None,
        }
    }

    pub(crate) fn unauthenticated(error: Option<ErrorInfo>) -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            error,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self.phase {
            SessionPhase::Authenticated { ref user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<&Token> {
        match self.phase {
            SessionPhase::Authenticated { ref token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.phase, SessionPhase::Authenticated { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, SessionPhase::Authenticating)
    }

    /// Why the last login attempt failed, if it did.
    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }
}

/// What gets written to durable storage between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub token: Token,
    pub user: UserProfile,
}

impl PersistedSession {
    /// Structural check done before trusting a stored session; no network involved.
    pub fn is_usable(&self, max_age: Option<Duration>, now: DateTime<Utc>) -> bool {
        if self.token.is_blank() {
            return false;
        }
        match max_age {
            Some(max_age) => !self.token.is_older_than(max_age, now),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    CredentialRejected,
    /// A new login started while this session was active.
    Replaced,
    Teardown,
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogoutReason::UserRequested => f.write_str("user requested"),
            LogoutReason::CredentialRejected => f.write_str("credential rejected"),
            LogoutReason::Replaced => f.write_str("replaced by a new login"),
            LogoutReason::Teardown => f.write_str("teardown"),
        }
    }
}

/// Session transitions broadcast to interested consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Resumed { user: UserProfile },
    LoggedIn { user: UserProfile },
    LoggedOut { reason: LogoutReason },
}
