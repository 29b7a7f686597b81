use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, OnceCell};
use tracing::{debug, error, info};

use super::context::SessionContext;
use super::session::{LogoutReason, Session, SessionEvent, Token};
use crate::api::{ApiError, RequestGateway};
use crate::models::UserProfile;

/// Authentication endpoint, relative to the API base address
pub const LOGIN_PATH: &str = "/auth/login";

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(alias = "access_token", alias = "accessToken")]
    token: String,
    user: UserProfile,
}

/// Login, logout and resume on top of the shared [`SessionContext`].
pub struct SessionStore {
    context: Arc<SessionContext>,
    gateway: Arc<RequestGateway>,
    resumed: OnceCell<()>,
    max_age: Option<Duration>,
}

impl SessionStore {
    /// `max_age` bounds how old a persisted credential may be and still be resumed.
    pub fn new(
        context: Arc<SessionContext>,
        gateway: Arc<RequestGateway>,
        max_age: Option<Duration>,
    ) -> Self {
        Self {
            context,
            gateway,
            resumed: OnceCell::new(),
            max_age,
        }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    pub fn session(&self) -> Session {
        self.context.snapshot()
    }

    pub fn is_authenticated(&self) -> bool {
        self.context.is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.context.is_loading()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.context.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.context.events()
    }

    /// Exchange credentials for a session.
    ///
    /// User and token are installed together or not at all. On failure the
    /// session is left unauthenticated with the error recorded.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<Session, ApiError> {
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            return Err(ApiError::InvalidRequest(
                "Email and password required".to_string(),
            ));
        }

        let epoch = self.context.begin_login();
        debug!(email = %credentials.email, "Logging in");

        let result = self
            .gateway
            .post::<LoginResponse, _>(LOGIN_PATH, credentials)
            .await
            .and_then(|response| {
                if response.token.trim().is_empty() {
                    Err(ApiError::InvalidResponse(
                        "Login response did not include a token".to_string(),
                    ))
                } else {
                    Ok(response)
                }
            });

        match result {
            Ok(response) => {
                let token = Token::new(response.token, self.context.clock().now());
                self.context
                    .establish(epoch, response.user, token)
                    .ok_or_else(|| {
                        info!("Login finished after a newer session change, discarding it");
                        ApiError::Unauthorized("Login was superseded".to_string())
                    })
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                if self.context.settle_unauthenticated(epoch, Some(e.info())).is_some() {
                    // A session saved before this attempt must not resume next run
                    self.context.discard_persisted();
                }
                Err(e)
            }
        }
    }

    /// Recover the session persisted by an earlier run.
    ///
    /// Runs its core logic at most once per store. Callers that arrive while
    /// it is running wait for it. Every caller gets the session as it is when
    /// the call returns, so a later call after logout reports the logout.
    pub async fn resume_session(&self) -> Session {
        self.resumed
            .get_or_init(|| async {
                let epoch = self.context.begin_resume();
                let now = self.context.clock().now();
                match self.context.load_persisted() {
                    Some(persisted) if persisted.is_usable(self.max_age, now) => {
                        if self.context.restore(epoch, persisted).is_none() {
                            debug!("Session changed during resume, keeping the newer one");
                        }
                    }
                    Some(_) => {
                        info!("Persisted session is no longer usable, discarding it");
                        self.context.discard_persisted();
                        self.context.settle_unauthenticated(epoch, None);
                    }
                    None => {
                        debug!("No persisted session");
                        self.context.settle_unauthenticated(epoch, None);
                    }
                }
            })
            .await;
        self.context.snapshot()
    }

    /// End the session. Calling this while logged out is a no-op.
    pub fn logout(&self, reason: LogoutReason) -> Session {
        self.context.clear(reason);
        self.context.snapshot()
    }
}
