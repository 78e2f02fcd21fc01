//! Caching subsystem.
//!
//! - [`TtlCache`]: bounded store with per-entry expiry, checked lazily on
//!   read. The gateway owns one `TtlCache<Fingerprint, Response>`; a cache
//!   hit bypasses rate limiting, retries and provider dispatch entirely.
//!
//! - [`Fingerprint`]: deterministic request hash used as the cache key and
//!   as the single-flight key for de-duplicating identical in-flight calls.

pub mod fingerprint;
pub mod ttl;

pub use fingerprint::Fingerprint;
pub use ttl::{CacheConfig, CacheEntry, MAX_TTL, TtlCache};
