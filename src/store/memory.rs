//! Capped in-memory [`TokenStore`] for tests and single-node deployments.

// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenRecord},
	store::{DEFAULT_SESSION_TTL, StoreError, StoreFuture, StoredSession, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<TenantId, StoredSession>>>;

/// Thread-safe storage backend that keeps sessions in-process.
///
/// The map never holds more than `capacity` entries: evicted sessions are purged first, then the
/// session closest to its eviction instant makes room.
#[derive(Clone, Debug)]
pub struct MemoryStore {
	map: StoreMap,
	ttl: Duration,
	capacity: usize,
}
impl MemoryStore {
	/// Default maximum number of sessions.
	pub const DEFAULT_CAPACITY: usize = 10_000;

	/// Creates a store holding at most `capacity` sessions (at least one).
	pub fn with_capacity(capacity: usize) -> Self {
		Self { map: Default::default(), ttl: DEFAULT_SESSION_TTL, capacity: capacity.max(1) }
	}

	/// Overrides the entry lifetime applied on `put`.
	pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Number of entries currently held (including not yet purged evicted ones).
	pub fn len(&self) -> usize {
		self.map.read().len()
	}

	/// Returns `true` when no entries are held.
	pub fn is_empty(&self) -> bool {
		self.map.read().is_empty()
	}

	/// Drops every session.
	pub fn clear_all(&self) {
		self.map.write().clear();
	}

	fn get_now(map: &StoreMap, tenant: &TenantId, now: OffsetDateTime) -> Option<TokenRecord> {
		{
			let guard = map.read();

			match guard.get(tenant) {
				Some(entry) if !entry.is_evicted_at(now) => return Some(entry.record.clone()),
				Some(_) => {},
				None => return None,
			}
		}

		let mut guard = map.write();

		if guard.get(tenant).is_some_and(|entry| entry.is_evicted_at(now)) {
			guard.remove(tenant);
		}

		None
	}

	fn put_now(&self, record: TokenRecord, now: OffsetDateTime) -> Result<(), StoreError> {
		let tenant = record.tenant().clone();
		let mut guard = self.map.write();

		if !guard.contains_key(&tenant) && guard.len() >= self.capacity {
			guard.retain(|_, entry| !entry.is_evicted_at(now));

			if guard.len() >= self.capacity {
				let oldest = guard
					.iter()
					.min_by_key(|(_, entry)| entry.evict_at)
					.map(|(key, _)| key.clone());

				if let Some(key) = oldest {
					guard.remove(&key);
				}
			}
		}

		guard.insert(tenant, StoredSession::new(record, now, self.ttl));

		Ok(())
	}
}
impl Default for MemoryStore {
	fn default() -> Self {
		Self::with_capacity(Self::DEFAULT_CAPACITY)
	}
}
impl TokenStore for MemoryStore {
	fn get<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(Self::get_now(&self.map, tenant, OffsetDateTime::now_utc())) })
	}

	fn put(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.put_now(record, OffsetDateTime::now_utc()) })
	}

	fn clear<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.map.write().remove(tenant);

			Ok(())
		})
	}
}
