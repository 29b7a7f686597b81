use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::session::Session;
use super::store::SessionStore;

/// One-time startup step that tries to resume the previous session.
///
/// Until `run` has finished once, consumers should treat the session as
/// `Authenticating` (which is what the session itself reports).
pub struct Bootstrap {
    store: Arc<SessionStore>,
    initialized: AtomicBool,
}

impl Bootstrap {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Resume the previous session the first time; afterwards just report the
    /// current session. Success and failure both count as initialized.
    pub async fn run(&self) -> Session {
        if self.is_initialized() {
            debug!("Bootstrap already ran");
            return self.store.session();
        }

        let session = self.store.resume_session().await;
        self.initialized.store(true, Ordering::Release);
        debug!(authenticated = session.is_authenticated(), "Bootstrap finished");
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedTransport;
    use crate::api::RequestGateway;
    use crate::auth::storage::{MemorySessionStorage, SessionStorage};
    use crate::auth::{LogoutReason, PersistedSession, SessionContext, Token};
    use crate::clock::SystemClock;
    use crate::models::{RecordId, UserProfile};
    use chrono::Utc;
    use serde_json::Map;
    use std::sync::atomic::AtomicUsize;

    struct CountingStorage {
        inner: MemorySessionStorage,
        loads: AtomicUsize,
    }

    impl SessionStorage for CountingStorage {
        fn load(&self) -> anyhow::Result<Option<PersistedSession>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load()
        }

        fn save(&self, session: &PersistedSession) -> anyhow::Result<()> {
            self.inner.save(session)
        }

        fn clear(&self) -> anyhow::Result<()> {
            self.inner.clear()
        }
    }

    fn bootstrap(with_session: bool) -> (Arc<Bootstrap>, Arc<CountingStorage>, Arc<SessionStore>) {
        let inner = if with_session {
            MemorySessionStorage::with_session(PersistedSession {
                token: Token::new("stored", Utc::now()),
                user: UserProfile {
                    id: RecordId::Number(1),
                    email: None,
                    name: Some("Principal".to_string()),
                    role: None,
                    extra: Map::new(),
                },
            })
        } else {
            MemorySessionStorage::new()
        };
        let storage = Arc::new(CountingStorage {
            inner,
            loads: AtomicUsize::new(0),
        });
        let context = SessionContext::create(storage.clone(), Arc::new(SystemClock));
        let gateway = Arc::new(RequestGateway::new(
            "https://api.school.test",
            Arc::new(ScriptedTransport::new()),
            context.clone(),
        ));
        let store = Arc::new(SessionStore::new(context, gateway, None));
        (Arc::new(Bootstrap::new(store.clone())), storage, store)
    }

    #[tokio::test]
    async fn test_run_marks_initialized_on_success() {
        let (bootstrap, _, _) = bootstrap(true);
        assert!(!bootstrap.is_initialized());

        let session = bootstrap.run().await;
        assert!(bootstrap.is_initialized());
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_run_marks_initialized_without_session() {
        let (bootstrap, _, _) = bootstrap(false);
        let session = bootstrap.run().await;
        assert!(bootstrap.is_initialized());
        assert!(!session.is_authenticated());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_rerun_does_not_resume_again() {
        let (bootstrap, storage, store) = bootstrap(true);
        bootstrap.run().await;
        store.logout(LogoutReason::UserRequested);

        // Second run reports the current state instead of resurrecting the session
        let session = bootstrap.run().await;
        assert!(!session.is_authenticated());
        assert_eq!(storage.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_runs_resume_once() {
        let (bootstrap, storage, _) = bootstrap(true);

        let sessions = futures::future::join_all((0..5).map(|_| bootstrap.run())).await;

        assert_eq!(storage.loads.load(Ordering::SeqCst), 1);
        assert!(sessions.iter().all(|s| s.is_authenticated()));
        assert!(sessions.iter().all(|s| s == &sessions[0]));
    }
}
