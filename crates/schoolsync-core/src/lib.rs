//! Client-side session and data synchronization for the school portal.
//!
//! The pieces, bottom up:
//! - [`api`]: the request gateway every remote call goes through, and the
//!   error types it produces
//! - [`auth`]: the shared session, login/logout/resume, and startup bootstrap
//! - [`resources`]: one observable atom per portal collection
//! - [`cache`]: a TTL cache for reference data
//!
//! [`SchoolClient`] wires them together from a [`Config`].

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod models;
pub mod resources;

pub use api::{ApiError, ErrorInfo, ErrorKind};
pub use auth::{LogoutReason, Session, SessionEvent, SessionPhase};
pub use client::SchoolClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use models::{Record, RecordId, UserProfile};
pub use resources::{Collection, ResourceAtom, ResourceState, Resources, Scope};
