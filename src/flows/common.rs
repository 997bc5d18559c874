//! Helpers shared by flow implementations (facade construction, grant checks, guards).

// self
use crate::{
	_prelude::*,
	auth::TenantId,
	error::ConfigError,
	flows::Broker,
	http::TokenHttpClient,
	oauth::{BasicFacade, TransportErrorMapper},
	provider::GrantType,
};

/// Builds the token endpoint facade for `broker`.
pub(crate) fn facade<C, M>(broker: &Broker<C, M>) -> Result<BasicFacade<C, M>>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	BasicFacade::from_descriptor(
		&broker.descriptor,
		&broker.client_id,
		broker.client_secret.as_deref(),
		broker.http_client.clone(),
		broker.transport_mapper.clone(),
	)
}

/// Fails unless the descriptor enables `grant`.
pub(crate) fn ensure_grant<C, M>(broker: &Broker<C, M>, grant: GrantType) -> Result<()>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	if broker.descriptor.supports(grant) {
		Ok(())
	} else {
		Err(ConfigError::UnsupportedGrant {
			descriptor: broker.descriptor.id.to_string(),
			grant: grant.as_str(),
		}
		.into())
	}
}

/// Returns (and creates on demand) the single-flight guard for `tenant`.
pub(crate) fn flow_guard<C, M>(broker: &Broker<C, M>, tenant: &TenantId) -> Arc<AsyncMutex<()>>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	broker
		.flow_guards
		.lock()
		.entry(tenant.clone())
		.or_insert_with(|| Arc::new(AsyncMutex::new(())))
		.clone()
}

/// Drops the caller's handle and removes the guard once nobody else holds or awaits it.
///
/// Must be called after the async lock itself was released.
pub(crate) fn release_guard<C, M>(
	broker: &Broker<C, M>,
	tenant: &TenantId,
	guard: Arc<AsyncMutex<()>>,
) where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut guards = broker.flow_guards.lock();

	// One handle lives in the map, one is ours.
	if Arc::strong_count(&guard) <= 2 {
		guards.remove(tenant);
	}

	drop(guard);
}
