//! Per-request [`TokenStore`] backed by HMAC-signed cookies.
//!
//! Hosts build one [`CookieStore`] per inbound request from its `Cookie` header, hand it to
//! [`Broker::scoped`](crate::flows::Broker::scoped), and copy
//! [`take_set_cookies`](CookieStore::take_set_cookies) onto the response. Values are signed, not
//! encrypted; cookies are always `HttpOnly`.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenRecord},
	store::{DEFAULT_SESSION_TTL, StoreError, StoreFuture, StoredSession, TokenStore},
};

type HmacSha256 = Hmac<Sha256>;

const MAX_COOKIE_BYTES: usize = 4096;

/// Signed-cookie session jar for a single request.
pub struct CookieStore {
	key: Arc<[u8]>,
	prefix: String,
	ttl: Duration,
	secure: bool,
	incoming: RwLock<HashMap<String, String>>,
	outgoing: Mutex<Vec<String>>,
}
impl CookieStore {
	/// Cookie name prefix used unless overridden.
	pub const DEFAULT_PREFIX: &'static str = "crm_session";

	/// Creates an empty jar signing with `key`.
	pub fn new(key: impl Into<Arc<[u8]>>) -> Self {
		Self {
			key: key.into(),
			prefix: Self::DEFAULT_PREFIX.into(),
			ttl: DEFAULT_SESSION_TTL,
			secure: true,
			incoming: Default::default(),
			outgoing: Default::default(),
		}
	}

	/// Creates a jar seeded from a raw `Cookie` request header.
	pub fn from_cookie_header(key: impl Into<Arc<[u8]>>, header: &str) -> Self {
		let store = Self::new(key);

		{
			let mut incoming = store.incoming.write();

			for pair in header.split(';') {
				if let Some((name, value)) = pair.trim().split_once('=') {
					incoming.insert(name.trim().to_owned(), value.trim().to_owned());
				}
			}
		}

		store
	}

	/// Overrides the cookie name prefix.
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = prefix.into();

		self
	}

	/// Overrides the entry lifetime applied on `put`.
	pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Toggles the `Secure` attribute (disable only for plain-HTTP local development).
	pub fn with_secure(mut self, secure: bool) -> Self {
		self.secure = secure;

		self
	}

	/// Drains the `Set-Cookie` header values queued by `put` and `clear`.
	pub fn take_set_cookies(&self) -> Vec<String> {
		std::mem::take(&mut *self.outgoing.lock())
	}

	fn cookie_name(&self, tenant: &TenantId) -> String {
		format!("{}.{}", self.prefix, URL_SAFE_NO_PAD.encode(tenant.as_bytes()))
	}

	fn mac(&self) -> Result<HmacSha256, StoreError> {
		HmacSha256::new_from_slice(&self.key).map_err(|e| StoreError::Backend {
			message: format!("Failed to initialize cookie signer: {e}"),
		})
	}

	fn seal(&self, entry: &StoredSession) -> Result<String, StoreError> {
		let json = serde_json::to_vec(entry).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize session cookie: {e}"),
		})?;
		let payload = URL_SAFE_NO_PAD.encode(json);
		let mut mac = self.mac()?;

		mac.update(payload.as_bytes());

		let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

		Ok(format!("{payload}.{signature}"))
	}

	fn open(&self, value: &str) -> Option<StoredSession> {
		let (payload, signature) = value.rsplit_once('.')?;
		let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
		let mut mac = self.mac().ok()?;

		mac.update(payload.as_bytes());
		mac.verify_slice(&signature).ok()?;

		let json = URL_SAFE_NO_PAD.decode(payload).ok()?;

		serde_json::from_slice(&json).ok()
	}

	fn set_cookie(&self, name: &str, value: &str, max_age: i64) -> String {
		let mut header = format!("{name}={value}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax");

		if self.secure {
			header.push_str("; Secure");
		}

		header
	}
}
impl Debug for CookieStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CookieStore")
			.field("prefix", &self.prefix)
			.field("ttl", &self.ttl)
			.field("secure", &self.secure)
			.field("incoming", &self.incoming.read().len())
			.field("outgoing", &self.outgoing.lock().len())
			.finish()
	}
}
impl TokenStore for CookieStore {
	fn get<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move {
			let name = self.cookie_name(tenant);
			let now = OffsetDateTime::now_utc();
			let entry = self.incoming.read().get(&name).and_then(|value| self.open(value));

			Ok(entry
				.filter(|entry| !entry.is_evicted_at(now) && entry.record.tenant() == tenant)
				.map(|entry| entry.record))
		})
	}

	fn put(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let name = self.cookie_name(record.tenant());
			let entry = StoredSession::new(record, OffsetDateTime::now_utc(), self.ttl);
			let value = self.seal(&entry)?;
			let header = self.set_cookie(&name, &value, self.ttl.whole_seconds().max(0));

			if header.len() > MAX_COOKIE_BYTES {
				return Err(StoreError::Backend {
					message: format!("Session cookie `{name}` exceeds {MAX_COOKIE_BYTES} bytes"),
				});
			}

			self.incoming.write().insert(name, value);
			self.outgoing.lock().push(header);

			Ok(())
		})
	}

	fn clear<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let name = self.cookie_name(tenant);
			let header = self.set_cookie(&name, "", 0);

			self.incoming.write().remove(&name);
			self.outgoing.lock().push(header);

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::{CompanyId, SessionIdentity};

	const KEY: &[u8] = b"cookie-signing-key-for-tests";

	fn record(tenant: &TenantId) -> TokenRecord {
		TokenRecord::builder(
			SessionIdentity::new(tenant.clone())
				.with_company(CompanyId::new("co-1").expect("Company fixture should be valid.")),
		)
		.access_token("access-cookie")
		.refresh_token("refresh-cookie")
		.expires_in_secs(86_399)
		.build()
		.expect("Record fixture should build.")
	}

	fn header_from(set_cookies: &[String]) -> String {
		set_cookies
			.iter()
			.filter_map(|cookie| cookie.split(';').next())
			.collect::<Vec<_>>()
			.join("; ")
	}

	#[tokio::test]
	async fn signed_cookie_round_trips_across_requests() {
		let tenant = TenantId::new("loc-cookie").expect("Tenant fixture should be valid.");
		let first = CookieStore::new(KEY);

		first.put(record(&tenant)).await.expect("Put should succeed.");

		let set_cookies = first.take_set_cookies();

		assert_eq!(set_cookies.len(), 1);
		assert!(set_cookies[0].contains("HttpOnly"));
		assert!(set_cookies[0].contains("Secure"));
		assert!(set_cookies[0].contains(&format!("Max-Age={}", DEFAULT_SESSION_TTL.whole_seconds())));
		assert!(first.take_set_cookies().is_empty());

		let second = CookieStore::from_cookie_header(KEY, &header_from(&set_cookies));
		let fetched = second
			.get(&tenant)
			.await
			.expect("Get should succeed.")
			.expect("Signed cookie should decode.");

		assert_eq!(fetched.access_token.expose(), "access-cookie");
		assert_eq!(fetched.identity.company_id.as_deref(), Some("co-1"));
	}

	#[tokio::test]
	async fn tampered_or_foreign_cookies_read_as_absent() {
		let tenant = TenantId::new("loc-tamper").expect("Tenant fixture should be valid.");
		let writer = CookieStore::new(KEY);

		writer.put(record(&tenant)).await.expect("Put should succeed.");

		let header = header_from(&writer.take_set_cookies());
		let tampered = header.replacen("=eyJ", "=eyK", 1);

		assert_ne!(tampered, header);

		let tampered_store = CookieStore::from_cookie_header(KEY, &tampered);
		let foreign_store = CookieStore::from_cookie_header(&b"another-key"[..], &header);

		assert!(tampered_store.get(&tenant).await.expect("Get should succeed.").is_none());
		assert!(foreign_store.get(&tenant).await.expect("Get should succeed.").is_none());
	}

	#[tokio::test]
	async fn clear_expires_the_cookie_and_hides_the_record() {
		let tenant = TenantId::new("loc-clear").expect("Tenant fixture should be valid.");
		let store = CookieStore::new(KEY).with_secure(false);

		store.put(record(&tenant)).await.expect("Put should succeed.");
		store.clear(&tenant).await.expect("Clear should succeed.");

		let set_cookies = store.take_set_cookies();

		assert_eq!(set_cookies.len(), 2);
		assert!(set_cookies[1].contains("Max-Age=0"));
		assert!(!set_cookies[1].contains("Secure"));
		assert!(store.get(&tenant).await.expect("Get should succeed.").is_none());
	}
}
