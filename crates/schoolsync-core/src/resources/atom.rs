use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::registry::Scope;
use super::state::ResourceState;
use crate::api::{ApiError, RequestGateway};
use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::models::RecordId;

/// One remote collection exposed as a watchable `ResourceState`.
///
/// List fetches are fenced: each takes a ticket from a counter, and a result
/// is written to the shared state only if no newer fetch has started since.
/// A superseded fetch still returns its own result to its caller.
///
/// Single-record reads and writes pass straight through to the gateway and
/// never touch `data`; callers refetch the list when they need it updated.
pub struct ResourceAtom<T> {
    path: String,
    gateway: Arc<RequestGateway>,
    state: watch::Sender<ResourceState<Vec<T>>>,
    issued: AtomicU64,
    cache: Option<TtlCache<String, Vec<T>>>,
}

impl<T> ResourceAtom<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(path: impl Into<String>, gateway: Arc<RequestGateway>) -> Self {
        let (state, _) = watch::channel(ResourceState::default());
        Self {
            path: path.into(),
            gateway,
            state,
            issued: AtomicU64::new(0),
            cache: None,
        }
    }

    /// An atom for semi-static data that serves lists from a TTL cache.
    pub fn cached(
        path: impl Into<String>,
        gateway: Arc<RequestGateway>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut atom = Self::new(path, gateway);
        atom.cache = Some(TtlCache::new(ttl, clock));
        atom
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    pub fn state(&self) -> ResourceState<Vec<T>> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState<Vec<T>>> {
        self.state.subscribe()
    }

    fn item_path(&self, id: &RecordId) -> String {
        format!("{}/{}", self.path, id)
    }

    /// Fetch the whole collection.
    pub async fn get_all(&self) -> Result<Vec<T>, ApiError> {
        self.fetch_list(self.path.clone()).await
    }

    /// Fetch the part of the collection that belongs to one parent record,
    /// e.g. `/enrollments/student/7`. The result replaces `data` like `get_all`.
    pub async fn get_all_in(&self, scope: Scope, id: &RecordId) -> Result<Vec<T>, ApiError> {
        self.fetch_list(format!("{}/{}/{}", self.path, scope, id)).await
    }

    async fn fetch_list(&self, path: String) -> Result<Vec<T>, ApiError> {
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(&path)) {
            debug!(path = %path, "Serving from cache");
            self.apply(ticket, |state| state.succeed(hit.clone()));
            return Ok(hit);
        }

        self.state.send_modify(|state| state.start());
        let result = self.gateway.get::<Vec<T>>(&path).await;

        if !self.is_current(ticket) {
            debug!(path = %path, ticket, "Discarding superseded response");
            return result;
        }

        match result {
            Ok(items) => {
                if let Some(ref cache) = self.cache {
                    cache.set(path, items.clone());
                }
                self.apply(ticket, |state| state.succeed(items.clone()));
                Ok(items)
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Fetch failed, keeping previous data");
                let info = e.info();
                self.apply(ticket, |state| state.fail(info));
                Err(e)
            }
        }
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket
    }

    fn apply(&self, ticket: u64, update: impl FnOnce(&mut ResourceState<Vec<T>>)) {
        self.state.send_if_modified(|state| {
            if !self.is_current(ticket) {
                return false;
            }
            update(state);
            true
        });
    }

    pub async fn get_by_id(&self, id: &RecordId) -> Result<T, ApiError> {
        self.gateway.get(&self.item_path(id)).await
    }

    pub async fn create<B>(&self, payload: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let result = self.gateway.post(&self.path, payload).await;
        self.record_write(result)
    }

    pub async fn update<B>(&self, id: &RecordId, payload: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let result = self.gateway.put(&self.item_path(id), payload).await;
        self.record_write(result)
    }

    pub async fn delete(&self, id: &RecordId) -> Result<(), ApiError> {
        let result = self.gateway.delete(&self.item_path(id)).await;
        self.record_write(result)
    }

    /// Writes surface their failure in the state and to the caller.
    fn record_write<R>(&self, result: Result<R, ApiError>) -> Result<R, ApiError> {
        if let Err(ref e) = result {
            warn!(path = %self.path, error = %e, "Write failed");
            let info = e.info();
            self.state.send_modify(|state| state.error = Some(info));
        }
        result
    }

    /// Drop cached lists so the next fetch goes to the network.
    pub fn invalidate(&self) {
        if let Some(ref cache) = self.cache {
            cache.clear();
        }
    }

    /// Back to "not yet loaded". Fetches still in flight will not write.
    pub fn reset(&self) {
        self.issued.fetch_add(1, Ordering::SeqCst);
        self.invalidate();
        self.state.send_replace(ResourceState::default());
    }
}
