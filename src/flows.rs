//! Session flows: authorization, credential lookup, and single-flight refresh.

pub mod authorize;
pub mod common;
pub mod credentials;
pub mod refresh;

pub use authorize::*;
pub use credentials::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	auth::TenantId,
	client::RetryPolicy,
	flows::refresh::RefreshLedger,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	provider::{ProviderDescriptor, ProviderStrategy},
	store::TokenStore,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

type FlowGuards = Arc<Mutex<HashMap<TenantId, Arc<AsyncMutex<()>>>>>;

/// Owns the token lifecycle for every tenant of one CRM app.
///
/// The broker pairs a [`TokenStore`] with the vendor descriptor, client credentials, and the
/// token transport. Refreshes are single-flighted per tenant through guards shared by every
/// clone and every [`scoped`](Self::scoped) view of the broker.
pub struct Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client used for token endpoint calls.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors.
	pub transport_mapper: Arc<M>,
	/// Session store.
	pub store: Arc<dyn TokenStore>,
	/// Vendor endpoints and quirks.
	pub descriptor: ProviderDescriptor,
	/// Vendor-specific request decoration and error classification.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: Option<String>,
	/// Tokens within this window of expiry are refreshed before use.
	pub safety_margin: Duration,
	/// Backoff applied to transient token endpoint failures.
	pub refresh_policy: RetryPolicy,
	/// Shared refresh counters.
	pub refresh_metrics: Arc<RefreshMetrics>,
	flow_guards: FlowGuards,
	refresh_ledger: Arc<RefreshLedger>,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Default staleness margin.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(60);

	/// Creates a broker that reuses the caller-provided transport and mapper.
	pub fn with_http_client(
		store: Arc<dyn TokenStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			descriptor,
			strategy,
			client_id: client_id.into(),
			client_secret: None,
			safety_margin: Self::DEFAULT_SAFETY_MARGIN,
			refresh_policy: RetryPolicy::default(),
			refresh_metrics: Default::default(),
			flow_guards: Default::default(),
			refresh_ledger: Default::default(),
		}
	}

	/// Sets or replaces the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the staleness margin; negative values are treated as zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Overrides the backoff used for transient refresh failures.
	pub fn with_refresh_policy(mut self, policy: RetryPolicy) -> Self {
		self.refresh_policy = policy;

		self
	}

	/// Returns a broker that reads and writes `store` while sharing guards, metrics, and
	/// published refresh outcomes.
	///
	/// Used with per-request stores such as [`CookieStore`](crate::store::CookieStore). A scoped
	/// view whose store still holds a refresh token another view already spent adopts the
	/// published result instead of exchanging the token again.
	pub fn scoped(&self, store: Arc<dyn TokenStore>) -> Self {
		let mut scoped = self.clone();

		scoped.store = store;

		scoped
	}

	/// Number of tenants with a live single-flight guard.
	pub fn active_guards(&self) -> usize {
		self.flow_guards.lock().len()
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with its own reqwest transport (no redirects, 30 second timeout).
	pub fn new(
		store: Arc<dyn TokenStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
	) -> Result<Self> {
		Ok(Self::with_http_client(
			store,
			descriptor,
			strategy,
			client_id,
			ReqwestHttpClient::new()?,
			ReqwestTransportErrorMapper,
		))
	}
}
impl<C, M> Clone for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			store: self.store.clone(),
			descriptor: self.descriptor.clone(),
			strategy: self.strategy.clone(),
			client_id: self.client_id.clone(),
			client_secret: self.client_secret.clone(),
			safety_margin: self.safety_margin,
			refresh_policy: self.refresh_policy,
			refresh_metrics: self.refresh_metrics.clone(),
			flow_guards: self.flow_guards.clone(),
			refresh_ledger: self.refresh_ledger.clone(),
		}
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("safety_margin", &self.safety_margin)
			.field("refresh_policy", &self.refresh_policy)
			.finish()
	}
}
