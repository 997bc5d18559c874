//! Storage contracts and built-in session stores for cached token records.
//!
//! Every backend stamps entries with an absolute eviction instant on `put`, independent of the
//! token's own lifetime, so abandoned sessions disappear even if nobody clears them.

pub mod cookie;
pub mod file;
pub mod memory;

pub use cookie::CookieStore;
pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenRecord},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Default lifetime of a storage entry.
pub const DEFAULT_SESSION_TTL: Duration = Duration::days(7);

/// Per-tenant persistence contract for token records.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Fetches the record for `tenant`, if present and not evicted.
	fn get<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Persists or replaces the record keyed by its tenant (last write wins).
	fn put(&self, record: TokenRecord) -> StoreFuture<'_, ()>;

	/// Removes the record and every auxiliary identifier stored with it.
	fn clear<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Storage entry: a record plus the instant the entry itself stops being served.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredSession {
	/// Cached token record.
	pub record: TokenRecord,
	/// Absolute eviction instant of the entry.
	pub evict_at: OffsetDateTime,
}
impl StoredSession {
	/// Wraps `record`, evicting it `ttl` after `now`.
	pub fn new(record: TokenRecord, now: OffsetDateTime, ttl: Duration) -> Self {
		Self { record, evict_at: now + ttl }
	}

	/// Returns `true` once the entry must no longer be served.
	pub fn is_evicted_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.evict_at
	}
}
