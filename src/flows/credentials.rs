//! Read-through credential lookup for outbound vendor calls.

// self
use crate::{
	_prelude::*,
	auth::{CompanyId, TenantId, TokenRecord, TokenSecret, UserId},
	flows::{Broker, RefreshRequest},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Boxed future returned by [`CredentialSource`] operations.
pub type CredentialFuture<'a> = Pin<Box<dyn Future<Output = Result<Credentials>> + 'a + Send>>;

/// Everything an outbound call needs to authenticate as a tenant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
	/// Bearer token for the `Authorization` header.
	pub access_token: TokenSecret,
	/// Tenant the token belongs to.
	pub tenant: TenantId,
	/// User who authorized the app, if known.
	pub user_id: Option<UserId>,
	/// Owning company, if known.
	pub company_id: Option<CompanyId>,
}
impl Credentials {
	/// `Authorization` header value.
	pub fn authorization_header(&self) -> String {
		self.access_token.bearer()
	}
}
impl From<&TokenRecord> for Credentials {
	fn from(record: &TokenRecord) -> Self {
		Self {
			access_token: record.access_token.clone(),
			tenant: record.identity.tenant.clone(),
			user_id: record.identity.user_id.clone(),
			company_id: record.identity.company_id.clone(),
		}
	}
}

/// Source of per-tenant credentials consumed by [`ResilientClient`](crate::client::ResilientClient).
pub trait CredentialSource: Send + Sync {
	/// Returns usable credentials, refreshing first when the cached token is stale.
	fn credentials<'a>(&'a self, tenant: &'a TenantId) -> CredentialFuture<'a>;

	/// Refreshes because the vendor rejected `rejected_access_token`, unless another caller
	/// already replaced it.
	fn force_refresh<'a>(
		&'a self,
		tenant: &'a TenantId,
		rejected_access_token: &'a str,
	) -> CredentialFuture<'a>;
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns credentials for `tenant`, refreshing a stale token first.
	///
	/// No session yields [`Error::Unauthenticated`].
	pub async fn credentials(&self, tenant: &TenantId) -> Result<Credentials> {
		const KIND: FlowKind = FlowKind::Credentials;

		let span = FlowSpan::new(KIND, "credentials");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let record = self.store.get(tenant).await?.ok_or_else(|| Error::Unauthenticated {
					reason: format!("no session for tenant `{tenant}`"),
				})?;
				let record = if record.is_stale_at(OffsetDateTime::now_utc(), self.safety_margin) {
					self.refresh(RefreshRequest::new(tenant.clone())).await?
				} else {
					record
				};

				Ok(Credentials::from(&record))
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Refreshes after the vendor rejected `rejected_access_token` and returns the new
	/// credentials.
	pub async fn force_refresh(
		&self,
		tenant: &TenantId,
		rejected_access_token: &str,
	) -> Result<Credentials> {
		let record =
			self.refresh(RefreshRequest::forced(tenant.clone(), rejected_access_token)).await?;

		Ok(Credentials::from(&record))
	}
}
impl<C, M> CredentialSource for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn credentials<'a>(&'a self, tenant: &'a TenantId) -> CredentialFuture<'a> {
		Box::pin(Broker::credentials(self, tenant))
	}

	fn force_refresh<'a>(
		&'a self,
		tenant: &'a TenantId,
		rejected_access_token: &'a str,
	) -> CredentialFuture<'a> {
		Box::pin(Broker::force_refresh(self, tenant, rejected_access_token))
	}
}
