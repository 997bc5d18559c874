//! Shared fixtures for integration tests.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::MockServer;
use time::{Duration, OffsetDateTime};
// self
use crm_auth_broker::{
	auth::{ProviderId, SessionIdentity, TenantId, TokenRecord},
	flows::ReqwestBroker,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	provider::{DefaultProviderStrategy, GrantType, ProviderDescriptor, ProviderStrategy},
	reqwest::{self, Client as ReqwestClient},
	store::{MemoryStore, TokenStore},
	url::Url,
};

pub const CLIENT_ID: &str = "crm-client";
pub const CLIENT_SECRET: &str = "crm-secret";

/// Absolute HTTPS URL on the mock server.
pub fn mock_url(server: &MockServer, path: &str) -> Url {
	let mut url = Url::parse(&server.url(path)).expect("Mock server URL should parse.");

	url.set_scheme("https").expect("Mock server URL should accept the https scheme.");

	url
}

/// Descriptor pointing at the mock server, with both grants enabled.
pub fn build_descriptor(server: &MockServer) -> ProviderDescriptor {
	let provider_id = ProviderId::new("crm-mock").expect("Provider identifier should be valid.");

	ProviderDescriptor::builder(provider_id)
		.authorization_endpoint(mock_url(server, "/oauth/chooselocation"))
		.token_endpoint(mock_url(server, "/oauth/token"))
		.support_grants([GrantType::AuthorizationCode, GrantType::RefreshToken])
		.scopes(["contacts.readonly", "contacts.write"])
		.build()
		.expect("Mock provider descriptor should build.")
}

/// Reqwest client that accepts the self-signed certificate served by `httpmock`.
pub fn test_reqwest_http_client() -> ReqwestHttpClient {
	let client = ReqwestClient::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.redirect(reqwest::redirect::Policy::none())
		.build()
		.expect("Failed to build insecure reqwest client for tests.");

	ReqwestHttpClient::with_client(client)
}

/// Broker backed by a fresh in-memory store and the insecure test transport.
pub fn build_broker(descriptor: ProviderDescriptor) -> (ReqwestBroker, Arc<MemoryStore>) {
	let store_backend = Arc::new(MemoryStore::default());
	let store: Arc<dyn TokenStore> = store_backend.clone();
	let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
	let broker = ReqwestBroker::with_http_client(
		store,
		descriptor,
		strategy,
		CLIENT_ID,
		test_reqwest_http_client(),
		ReqwestTransportErrorMapper,
	)
	.with_client_secret(CLIENT_SECRET);

	(broker, store_backend)
}

pub fn tenant(id: &str) -> TenantId {
	TenantId::new(id).expect("Tenant fixture should be valid.")
}

/// Record for `tenant` issued `age` ago with a `lifetime` second lifetime.
pub fn record(
	tenant: &TenantId,
	access: &str,
	refresh: Option<&str>,
	age: Duration,
	lifetime: i64,
) -> TokenRecord {
	let mut builder = TokenRecord::builder(SessionIdentity::new(tenant.clone()))
		.access_token(access)
		.issued_at(OffsetDateTime::now_utc() - age)
		.expires_in_secs(lifetime);

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	builder.build().expect("Token record fixture should build.")
}

/// JSON body returned by the mock token endpoint.
pub fn token_body(access: &str, refresh: Option<&str>, location: &str) -> String {
	let mut body = serde_json::json!({
		"access_token": access,
		"token_type": "Bearer",
		"expires_in": 86_399,
		"scope": "contacts.readonly contacts.write",
		"userType": "Location",
		"locationId": location,
		"companyId": "company-1",
		"userId": "user-1",
	});

	if let Some(refresh) = refresh {
		body["refresh_token"] = refresh.into();
	}

	body.to_string()
}
