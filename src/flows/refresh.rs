//! Single-flight refresh of a tenant's access token.
//!
//! [`Broker::refresh`] serializes callers per tenant behind an async guard. The first caller
//! performs the `grant_type=refresh_token` exchange and publishes the rotated record; everyone
//! queued behind it re-reads the store and returns that record without calling the vendor. A
//! rejected refresh token clears the session, so queued callers observe `Unauthenticated`.
//!
//! Callers whose store is private to them (one cookie jar per request) re-read a record that
//! may still carry the spent refresh token. Each outcome is therefore also published to a
//! broker-wide ledger keyed by the consumed token, and such callers adopt it into their own
//! store rather than exchanging the token a second time.

mod ledger;
mod metrics;

pub use metrics::RefreshMetrics;

pub(crate) use ledger::RefreshLedger;

// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenRecord},
	flows::{Broker, common, refresh::ledger::Published},
	http::TokenHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::GrantType,
};

/// Input to [`Broker::refresh`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshRequest {
	/// Tenant whose session is refreshed.
	pub tenant: TenantId,
	/// Access token the vendor just rejected, for forced refreshes.
	///
	/// When set, the refresh is skipped only if the stored token already differs from it.
	/// Otherwise it is skipped while the stored token is not stale.
	pub rejected_access_token: Option<String>,
}
impl RefreshRequest {
	/// Refresh only if the stored token is stale.
	pub fn new(tenant: TenantId) -> Self {
		Self { tenant, rejected_access_token: None }
	}

	/// Refresh because the vendor rejected `access_token`.
	pub fn forced(tenant: TenantId, access_token: impl Into<String>) -> Self {
		Self { tenant, rejected_access_token: Some(access_token.into()) }
	}
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Refreshes the tenant's session, coalescing concurrent callers into one vendor exchange.
	pub async fn refresh(&self, request: RefreshRequest) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				common::ensure_grant(self, GrantType::RefreshToken)?;
				self.refresh_metrics.record_attempt();

				let guard = common::flow_guard(self, &request.tenant);
				let result = {
					let _singleflight = guard.lock().await;

					self.refresh_locked(&request).await
				};

				common::release_guard(self, &request.tenant, guard);

				self.refresh_metrics.record_outcome(result.is_ok());

				result
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	async fn refresh_locked(&self, request: &RefreshRequest) -> Result<TokenRecord> {
		let tenant = &request.tenant;
		let mut current = self.store.get(tenant).await?.ok_or_else(|| Error::Unauthenticated {
			reason: format!("no session for tenant `{tenant}`"),
		})?;
		let now = OffsetDateTime::now_utc();

		match self.refresh_ledger.superseding(&current, now) {
			Some(Published::Rotated(published)) => {
				self.store.put(published.clone()).await?;

				current = published;
			},
			Some(Published::Rejected) => {
				self.store.clear(tenant).await?;

				return Err(Error::Unauthenticated {
					reason: format!("refresh token for tenant `{tenant}` was already rejected"),
				});
			},
			None => (),
		}

		let already_fresh = match &request.rejected_access_token {
			Some(rejected) => current.access_token.expose() != rejected,
			None => !current.is_stale_at(now, self.safety_margin),
		};

		if already_fresh {
			self.refresh_metrics.record_reuse();

			return Ok(current);
		}

		let Some(consumed) = current.refresh_token.as_ref().map(|secret| secret.expose().to_owned())
		else {
			return Err(Error::Unauthenticated {
				reason: format!("session for tenant `{tenant}` has no refresh token"),
			});
		};
		let facade = common::facade(self)?;
		let mut attempts = 0_u32;

		loop {
			self.refresh_metrics.record_exchange();

			match facade.refresh_token(self.strategy.as_ref(), &current).await {
				Ok(next) => {
					let now = OffsetDateTime::now_utc();

					self.refresh_ledger.publish_rotation(&consumed, &next, now);
					self.store.put(next.clone()).await?;

					return Ok(next);
				},
				Err(e @ Error::RefreshRejected { .. }) => {
					obs::refresh_rejected(tenant, &e);
					self.refresh_metrics.record_rejection();
					self.refresh_ledger.publish_rejection(
						tenant,
						&consumed,
						OffsetDateTime::now_utc(),
					);
					self.store.clear(tenant).await?;

					return Err(e);
				},
				Err(e) if e.is_retryable() => {
					attempts += 1;

					if !self.refresh_policy.allows_retry(attempts) {
						return Err(e);
					}

					let delay = self.refresh_policy.delay_with_hint(attempts - 1, e.retry_after());

					obs::record_retry(FlowKind::Refresh);
					obs::retry_scheduled(FlowKind::Refresh, attempts, delay, &e);

					tokio::time::sleep(delay).await;
				},
				Err(e) => return Err(e),
			}
		}
	}
}
