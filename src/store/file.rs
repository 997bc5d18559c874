//! Simple file-backed [`TokenStore`] for lightweight deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenRecord},
	store::{DEFAULT_SESSION_TTL, StoreError, StoreFuture, StoredSession, TokenStore},
};

type Snapshot = HashMap<TenantId, StoredSession>;

/// Persists sessions to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	ttl: Duration,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, ttl: DEFAULT_SESSION_TTL, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Overrides the entry lifetime applied on `put`.
	pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		let entries: Vec<(TenantId, StoredSession)> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;
		let now = OffsetDateTime::now_utc();

		Ok(entries.into_iter().filter(|(_, entry)| !entry.is_evicted_at(now)).collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	/// Persists `next` and only then makes it visible; a failed write leaves memory unchanged.
	fn commit_locked(&self, current: &mut Snapshot, next: Snapshot) -> Result<(), StoreError> {
		self.persist_locked(&next)?;

		*current = next;

		Ok(())
	}

	fn persist_locked(&self, contents: &Snapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let snapshot: Vec<_> = contents.iter().collect();
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl TokenStore for FileStore {
	fn get<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			Ok(self
				.inner
				.read()
				.get(tenant)
				.filter(|entry| !entry.is_evicted_at(now))
				.map(|entry| entry.record.clone()))
		})
	}

	fn put(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let mut guard = self.inner.write();
			let mut next = guard.clone();

			next.retain(|_, entry| !entry.is_evicted_at(now));
			next.insert(record.tenant().clone(), StoredSession::new(record, now, self.ttl));
			self.commit_locked(&mut guard, next)
		})
	}

	fn clear<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if !guard.contains_key(tenant) {
				return Ok(());
			}

			let mut next = guard.clone();

			next.remove(tenant);
			self.commit_locked(&mut guard, next)
		})
	}
}
