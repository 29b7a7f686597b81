//! Session management for the portal client.
//!
//! This module provides:
//! - `SessionContext`: the one shared session and its transitions
//! - `SessionStore`: login, logout and resume operations
//! - `Bootstrap`: the once-per-process resume at startup
//! - `SessionStorage`: durable persistence between runs
//! - `CredentialStore`: OS keychain storage for remembered passwords

pub mod bootstrap;
pub mod context;
pub mod credentials;
pub mod session;
pub mod storage;
pub mod store;

pub use bootstrap::Bootstrap;
pub use context::SessionContext;
pub use credentials::CredentialStore;
pub use session::{LogoutReason, PersistedSession, Session, SessionEvent, SessionPhase, Token};
pub use storage::{FileSessionStorage, MemorySessionStorage, SessionStorage, SESSION_FILE};
pub use store::{LoginRequest, SessionStore, LOGIN_PATH};
