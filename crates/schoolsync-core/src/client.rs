use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::api::{ApiError, HttpTransport, RequestGateway, ReqwestTransport};
use crate::auth::{
    Bootstrap, FileSessionStorage, LoginRequest, LogoutReason, MemorySessionStorage, Session,
    SessionContext, SessionEvent, SessionStorage, SessionStore,
};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::resources::Resources;

/// Everything a front end needs, wired from one `Config`: the session, the
/// gateway, and one resource atom per collection.
pub struct SchoolClient {
    gateway: Arc<RequestGateway>,
    store: Arc<SessionStore>,
    bootstrap: Bootstrap,
    resources: Resources,
}

impl SchoolClient {
    /// Production wiring: reqwest transport, system clock, and a session file
    /// in the cache directory unless persistence is switched off.
    pub fn new(config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())
            .context("Failed to build HTTP transport")?;
        let storage: Arc<dyn SessionStorage> = if config.persist_session {
            Arc::new(FileSessionStorage::in_dir(&config.cache_dir()?))
        } else {
            Arc::new(MemorySessionStorage::new())
        };
        info!(base_url = %config.api_base_url, "Creating client");
        Ok(Self::with_parts(
            config,
            Arc::new(transport),
            storage,
            Arc::new(SystemClock),
        ))
    }

    pub fn with_parts(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        storage: Arc<dyn SessionStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let context = SessionContext::create(storage, clock.clone());
        let gateway = Arc::new(RequestGateway::new(
            config.api_base_url.clone(),
            transport,
            context.clone(),
        ));
        let store = Arc::new(SessionStore::new(
            context,
            gateway.clone(),
            config.session_max_age(),
        ));
        let bootstrap = Bootstrap::new(store.clone());
        let resources = Resources::new(gateway.clone(), clock, config.reference_ttl());

        Self {
            gateway,
            store,
            bootstrap,
            resources,
        }
    }

    /// Resume the previous session. Safe to call more than once.
    pub async fn start(&self) -> Session {
        self.bootstrap.run().await
    }

    pub fn is_initialized(&self) -> bool {
        self.bootstrap.is_initialized()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        self.store.login(&LoginRequest::new(email, password)).await
    }

    /// Sign out and forget all fetched data.
    pub fn logout(&self) -> Session {
        let session = self.store.logout(LogoutReason::UserRequested);
        self.resources.reset();
        debug!("Client data cleared");
        session
    }

    /// Stop using the client without touching the persisted session, so the
    /// next run can resume it.
    pub fn shutdown(&self) {
        self.store.context().teardown();
        self.resources.reset();
    }

    pub fn session(&self) -> Session {
        self.store.session()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.store.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.store.events()
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<RequestGateway> {
        &self.gateway
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }
}
