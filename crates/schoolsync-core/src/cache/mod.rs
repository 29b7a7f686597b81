//! Time-to-live caching for reference data that rarely changes.
//!
//! `TtlCache` keeps values in memory for a fixed lifetime measured with an
//! injected `Clock`. Resource atoms for semi-static collections consult it
//! before going to the network.

pub mod ttl;

pub use ttl::{CacheEntry, TtlCache, DEFAULT_REFERENCE_TTL_SECS};
