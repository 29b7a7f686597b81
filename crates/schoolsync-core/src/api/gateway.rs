//! The single chokepoint for calls to the portal API.
//!
//! The gateway snapshots the session credential at send time, attaches it
//! as a bearer header, and turns non-success responses into [`ApiError`]s.
//! A 401 invalidates the session as a side effect before the error is
//! handed back; nothing is retried.

use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::transport::{HttpRequest, HttpTransport, Method};
use super::ApiError;
use crate::auth::{SessionContext, Token};

/// Keys a response envelope may carry next to `data`.
const ENVELOPE_KEYS: [&str; 5] = ["data", "success", "message", "meta", "statusCode"];

pub struct RequestGateway {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionContext>,
}

impl RequestGateway {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        session: Arc<SessionContext>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            transport,
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn headers(token: Option<&Token>, with_body: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if with_body {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if let Some(token) = token {
            match HeaderValue::from_str(&format!("Bearer {}", token.value())) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(_) => warn!("Stored credential is not a valid header value, sending without it"),
            }
        }
        headers
    }

    /// Send one request and decode the payload of a successful response.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        // Later session changes must not affect what this request carries
        let token = self.session.token();
        let request = HttpRequest {
            method,
            url: url.clone(),
            headers: Self::headers(token.as_ref(), body.is_some()),
            body,
        };

        debug!(?method, url = %url, authenticated = token.is_some(), "Sending request");
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Request failed without a response");
                return Err(e);
            }
        };

        if response.is_success() {
            return Self::decode(&url, &response.body);
        }

        let error = ApiError::from_status(response.status, &response.body);
        match &error {
            ApiError::Unauthorized(_) => {
                warn!(url = %url, "Credential rejected by server");
                if let Some(ref token) = token {
                    self.session.invalidate(token);
                }
            }
            ApiError::Forbidden(message) => {
                warn!(url = %url, %message, "Access denied");
            }
            other => {
                debug!(url = %url, status = response.status, error = %other, "Request failed");
            }
        }
        Err(error)
    }

    fn decode<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, ApiError> {
        let value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(body)
                .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))?
        };
        let payload = Self::unwrap_envelope(url, value);
        serde_json::from_value(payload)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    /// Strip a `{ success, message, data }` wrapper if the body is one.
    fn unwrap_envelope(url: &str, value: Value) -> Value {
        match value {
            Value::Object(mut map)
                if map.contains_key("data")
                    && map.keys().all(|k| ENVELOPE_KEYS.contains(&k.as_str())) =>
            {
                let success = map.get("success").and_then(Value::as_bool);
                let message = map.get("message").and_then(Value::as_str);
                if success.is_some() || message.is_some() {
                    debug!(url = %url, ?success, ?message, "Server reported outcome");
                }
                map.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        }
    }

    fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
        serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode request body: {}", e)))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::Get, path, None).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::Post, path, Some(Self::encode(body)?)).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::Put, path, Some(Self::encode(body)?)).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::Patch, path, Some(Self::encode(body)?)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let _: Value = self.send(Method::Delete, path, None).await?;
        Ok(())
    }
}
