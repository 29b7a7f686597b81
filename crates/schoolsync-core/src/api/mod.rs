//! REST API access for the school portal.
//!
//! All remote calls go through [`RequestGateway`], which attaches the
//! session's bearer token and reacts to authorization failures. The
//! network itself sits behind the [`HttpTransport`] trait.

pub mod error;
pub mod gateway;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{normalize_message, ApiError, ErrorInfo, ErrorKind, FALLBACK_MESSAGE};
pub use gateway::RequestGateway;
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, DEFAULT_REQUEST_TIMEOUT_SECS,
};
