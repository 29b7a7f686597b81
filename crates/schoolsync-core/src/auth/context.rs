//! The single authoritative session of a client process.
//!
//! `SessionContext` owns the current [`Session`] and is the only thing that
//! changes it. The store, the gateway and the bootstrap all hold an `Arc` to
//! the same context and request transitions through its methods.
//!
//! Every transition that starts or replaces a session bumps an epoch.
//! Transitions computed from an older epoch (a login that finished after a
//! logout, a resume that finished after a login) are dropped instead of
//! overwriting newer state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::session::{LogoutReason, PersistedSession, Session, SessionEvent, SessionPhase, Token};
use super::storage::SessionStorage;
use crate::api::ErrorInfo;
use crate::clock::Clock;
use crate::models::UserProfile;

/// Buffer size for the session event channel.
/// Slow receivers lag rather than block; events are advisory.
const EVENT_BUFFER_SIZE: usize = 16;

const INITIAL_EPOCH: u64 = 0;

pub struct SessionContext {
    state: watch::Sender<Session>,
    events: broadcast::Sender<SessionEvent>,
    epoch: AtomicU64,
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
}

impl SessionContext {
    /// Create the context in the `Authenticating` state, waiting for bootstrap.
    pub fn create(storage: Arc<dyn SessionStorage>, clock: Arc<dyn Clock>) -> Arc<Self> {
        let (state, _) = watch::channel(Session::authenticating());
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Arc::new(Self {
            state,
            events,
            epoch: AtomicU64::new(INITIAL_EPOCH),
            storage,
            clock,
        })
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// The credential to attach to a request sent right now.
    pub fn token(&self) -> Option<Token> {
        self.state.borrow().token().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Replace the session if nothing newer happened since `epoch` was read.
    fn apply(&self, epoch: u64, next: Session) -> Option<Session> {
        let mut applied = None;
        self.state.send_if_modified(|session| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            *session = next.clone();
            applied = Some(next.clone());
            true
        });
        applied
    }

    /// Enter `Authenticating` for a login attempt. The returned epoch must be
    /// handed back when the attempt settles.
    ///
    /// An active session is ended first, persisted copy included, so a failed
    /// attempt cannot leave the old credential behind for the next run.
    pub(crate) fn begin_login(&self) -> u64 {
        let mut epoch = 0;
        let mut replaced = false;
        self.state.send_modify(|session| {
            replaced = session.is_authenticated();
            epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            *session = Session::authenticating();
        });

        if replaced {
            self.discard_persisted();
            info!(reason = %LogoutReason::Replaced, "Session ended");
            self.emit(SessionEvent::LoggedOut {
                reason: LogoutReason::Replaced,
            });
        }
        epoch
    }

    /// Epoch for a resume attempt. A resume only applies to a context that
    /// nothing else has touched yet, so it never overrides a login or logout.
    pub(crate) fn begin_resume(&self) -> u64 {
        INITIAL_EPOCH
    }

    /// Install a freshly issued credential and persist it.
    pub(crate) fn establish(&self, epoch: u64, user: UserProfile, token: Token) -> Option<Session> {
        let persisted = PersistedSession {
            token: token.clone(),
            user: user.clone(),
        };
        let session = self.apply(epoch, Session::authenticated(user.clone(), token))?;

        if let Err(e) = self.storage.save(&persisted) {
            warn!(error = %e, "Failed to persist session");
        }
        info!(user = %user.display_name(), "Session established");
        self.emit(SessionEvent::LoggedIn { user });
        Some(session)
    }

    /// Install a session recovered from storage. Nothing is written back.
    pub(crate) fn restore(&self, epoch: u64, persisted: PersistedSession) -> Option<Session> {
        let user = persisted.user.clone();
        let session = self.apply(epoch, Session::authenticated(persisted.user, persisted.token))?;
        info!(user = %user.display_name(), "Session resumed");
        self.emit(SessionEvent::Resumed { user });
        Some(session)
    }

    /// Settle an attempt as unauthenticated, optionally recording why.
    pub(crate) fn settle_unauthenticated(
        &self,
        epoch: u64,
        error: Option<ErrorInfo>,
    ) -> Option<Session> {
        self.apply(epoch, Session::unauthenticated(error))
    }

    pub(crate) fn load_persisted(&self) -> Option<PersistedSession> {
        match self.storage.load() {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session, ignoring it");
                None
            }
        }
    }

    pub(crate) fn discard_persisted(&self) {
        if let Err(e) = self.storage.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
    }

    /// Drop the session, if any. Returns whether an authenticated session was ended.
    ///
    /// Safe to call repeatedly: once unauthenticated, further calls change nothing
    /// and emit no events.
    pub fn clear(&self, reason: LogoutReason) -> bool {
        let ended = self.end_session(reason, |_| true);
        self.discard_persisted();
        ended
    }

    /// React to the server rejecting `rejected`. Only ends the session if that
    /// credential is still the current one; a stale rejection of an older token
    /// leaves a newer session alone.
    pub fn invalidate(&self, rejected: &Token) -> bool {
        let ended = self.end_session(LogoutReason::CredentialRejected, |session| {
            session.token() == Some(rejected)
        });
        if ended {
            self.discard_persisted();
        } else {
            debug!("Ignoring rejection of a credential that is no longer current");
        }
        ended
    }

    /// Forget the in-memory session at shutdown. Durable storage is kept so the
    /// next process can resume.
    pub fn teardown(&self) {
        self.end_session(LogoutReason::Teardown, |_| true);
    }

    fn end_session(&self, reason: LogoutReason, should_end: impl Fn(&Session) -> bool) -> bool {
        let mut ended = false;
        self.state.send_if_modified(|session| {
            if matches!(session.phase(), SessionPhase::Unauthenticated) || !should_end(session) {
                return false;
            }
            ended = session.is_authenticated();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *session = Session::unauthenticated(None);
            true
        });

        if ended {
            info!(%reason, "Session ended");
            self.emit(SessionEvent::LoggedOut { reason });
        }
        ended
    }
}
