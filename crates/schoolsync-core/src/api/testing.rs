//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use super::ApiError;

type Reply = Result<HttpResponse, ApiError>;

enum Scripted {
    Ready(Reply),
    Deferred(oneshot::Receiver<Reply>),
}

/// Answers requests in arrival order from a queue of scripted replies.
/// Deferred replies stay pending until the test sends them.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Scripted>>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, response: HttpResponse) {
        self.replies.lock().unwrap().push_back(Scripted::Ready(Ok(response)));
    }

    pub(crate) fn push_error(&self, error: ApiError) {
        self.replies.lock().unwrap().push_back(Scripted::Ready(Err(error)));
    }

    /// Queue a reply the test resolves later through the returned sender.
    pub(crate) fn defer(&self) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().unwrap().push_back(Scripted::Deferred(rx));
        tx
    }

    pub(crate) fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.sent.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Ready(reply)) => reply,
            Some(Scripted::Deferred(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(ApiError::Network("scripted reply dropped".to_string()))),
            None => Err(ApiError::Network("no scripted reply".to_string())),
        }
    }
}
