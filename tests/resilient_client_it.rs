#[cfg(feature = "reqwest")] mod support;

// std
use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use tokio::time::Instant;
// self
use crm_auth_broker::{
	auth::{TenantId, TokenSecret},
	client::{ClassifiedResult, ResilientClient, RetryPolicy},
	error::{Error, Result, TransportError},
	ext::VendorHeaders,
	flows::{CredentialFuture, CredentialSource, Credentials},
	http::{ApiRequest, ApiResponse, ApiTransport, TransportFuture},
	url::Url,
};

/// Transport replaying scripted outcomes and recording what was sent.
#[derive(Default)]
struct ScriptedTransport {
	script: Mutex<VecDeque<Result<ApiResponse>>>,
	sent: Mutex<Vec<(Instant, ApiRequest)>>,
}
impl ScriptedTransport {
	fn new(script: impl IntoIterator<Item = Result<ApiResponse>>) -> Arc<Self> {
		Arc::new(Self { script: Mutex::new(script.into_iter().collect()), sent: Default::default() })
	}

	fn sent(&self) -> Vec<(Instant, ApiRequest)> {
		self.sent.lock().clone()
	}

	fn gaps(&self) -> Vec<StdDuration> {
		self.sent().windows(2).map(|pair| pair[1].0 - pair[0].0).collect()
	}
}
impl ApiTransport for ScriptedTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_, ApiResponse> {
		self.sent.lock().push((Instant::now(), request));

		let next = self.script.lock().pop_front();

		Box::pin(async move { next.unwrap_or_else(|| Ok(ApiResponse::new(200, "{}"))) })
	}
}

/// Credential source that issues `token-N`, bumping N on every forced refresh.
#[derive(Default)]
struct RotatingCredentials {
	generation: AtomicU32,
	forced: AtomicU32,
}
impl RotatingCredentials {
	fn current(&self, tenant: &TenantId) -> Credentials {
		Credentials {
			access_token: TokenSecret::new(format!(
				"token-{}",
				self.generation.load(Ordering::SeqCst)
			)),
			tenant: tenant.clone(),
			user_id: None,
			company_id: None,
		}
	}
}
impl CredentialSource for RotatingCredentials {
	fn credentials<'a>(&'a self, tenant: &'a TenantId) -> CredentialFuture<'a> {
		Box::pin(async move { Ok(self.current(tenant)) })
	}

	fn force_refresh<'a>(
		&'a self,
		tenant: &'a TenantId,
		rejected_access_token: &'a str,
	) -> CredentialFuture<'a> {
		Box::pin(async move {
			assert_eq!(rejected_access_token, self.current(tenant).access_token.expose());

			self.forced.fetch_add(1, Ordering::SeqCst);
			self.generation.fetch_add(1, Ordering::SeqCst);

			Ok(self.current(tenant))
		})
	}
}

fn tenant() -> TenantId {
	TenantId::new("loc-api").expect("Tenant fixture should be valid.")
}

fn contacts_request() -> ApiRequest {
	ApiRequest::get(
		Url::parse("https://services.example.com/contacts/?locationId=loc-api")
			.expect("Request URL fixture should parse."),
	)
}

fn client(
	transport: Arc<ScriptedTransport>,
	credentials: Arc<RotatingCredentials>,
) -> ResilientClient {
	ResilientClient::new(transport, credentials)
}

#[tokio::test(start_paused = true)]
async fn throttled_calls_back_off_exponentially() {
	let transport = ScriptedTransport::new([
		Ok(ApiResponse::new(429, "slow down")),
		Ok(ApiResponse::new(429, "slow down")),
		Ok(ApiResponse::new(200, r#"{"contacts":[]}"#)),
	]);
	let client = client(transport.clone(), Arc::default());
	let result = client
		.execute(&tenant(), contacts_request())
		.await
		.expect("Throttled calls should eventually succeed.");

	assert!(matches!(result, ClassifiedResult::Success(ref response) if response.status == 200));

	let gaps = transport.gaps();

	assert_eq!(gaps.len(), 2);
	assert!(gaps[0] >= StdDuration::from_millis(1000), "First backoff was {:?}.", gaps[0]);
	assert!(gaps[1] >= StdDuration::from_millis(2000), "Second backoff was {:?}.", gaps[1]);
}

#[tokio::test(start_paused = true)]
async fn retry_after_hints_lengthen_the_backoff() {
	let transport = ScriptedTransport::new([
		Ok(ApiResponse::new(429, "").with_header("Retry-After", "5")),
		Ok(ApiResponse::new(200, "{}")),
	]);
	let client = client(transport.clone(), Arc::default());
	let result = client.execute(&tenant(), contacts_request()).await.expect("Call should succeed.");

	assert!(result.is_success());
	assert!(transport.gaps()[0] >= StdDuration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn oversized_retry_after_hints_are_capped() {
	let transport = ScriptedTransport::new(
		(0..3).map(|_| Ok(ApiResponse::new(429, "").with_header("Retry-After", "4000000000"))),
	);
	let client = client(transport.clone(), Arc::default());
	let started = Instant::now();
	let result =
		client.execute(&tenant(), contacts_request()).await.expect("Exhaustion is a result.");

	assert!(matches!(
		result,
		ClassifiedResult::RetryExhausted(ref failure) if failure.attempts == 3
	));

	for gap in transport.gaps() {
		assert_eq!(gap, RetryPolicy::DEFAULT_MAX_DELAY);
	}

	assert!(started.elapsed() <= RetryPolicy::DEFAULT_MAX_DELAY * 2);

	let transport = ScriptedTransport::new([
		Ok(ApiResponse::new(503, "").with_header("Retry-After", "120")),
		Ok(ApiResponse::new(200, "{}")),
	]);
	let policy = RetryPolicy::default().with_max_delay(StdDuration::from_secs(5));
	let client = self::client(transport.clone(), Arc::default());
	let result = client
		.execute_with_policy(&tenant(), contacts_request(), policy)
		.await
		.expect("Call should succeed.");

	assert!(result.is_success());
	assert_eq!(transport.gaps(), vec![StdDuration::from_secs(5)]);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_forces_one_refresh_without_spending_an_attempt() {
	let transport = ScriptedTransport::new([
		Ok(ApiResponse::new(401, "Invalid JWT")),
		Ok(ApiResponse::new(200, "{}")),
	]);
	let credentials = Arc::new(RotatingCredentials::default());
	let client = client(transport.clone(), credentials.clone());
	let result = client
		.execute_with_policy(&tenant(), contacts_request(), RetryPolicy::no_retry())
		.await
		.expect("A refreshed token should be accepted.");

	assert!(result.is_success());
	assert_eq!(credentials.forced.load(Ordering::SeqCst), 1);

	let sent = transport.sent();

	assert_eq!(sent.len(), 2);
	assert_eq!(sent[0].1.header("authorization"), Some("Bearer token-0"));
	assert_eq!(sent[1].1.header("authorization"), Some("Bearer token-1"));
	assert_eq!(sent[1].0 - sent[0].0, StdDuration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn second_unauthorized_is_unauthenticated() {
	let transport = ScriptedTransport::new([
		Ok(ApiResponse::new(401, "Invalid JWT")),
		Ok(ApiResponse::new(401, "Invalid JWT")),
	]);
	let credentials = Arc::new(RotatingCredentials::default());
	let client = client(transport.clone(), credentials.clone());
	let err = client
		.execute(&tenant(), contacts_request())
		.await
		.expect_err("A rejected refreshed token should fail.");

	assert!(matches!(err, Error::Unauthenticated { .. }), "Unexpected error: {err:?}.");
	assert_eq!(credentials.forced.load(Ordering::SeqCst), 1);
	assert_eq!(transport.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn not_found_is_returned_immediately() {
	let transport =
		ScriptedTransport::new([Ok(ApiResponse::new(404, r#"{"message":"Contact not found"}"#))]);
	let client = client(transport.clone(), Arc::default());
	let result = client.execute(&tenant(), contacts_request()).await.expect("404 is not an error.");

	assert_eq!(
		result,
		ClassifiedResult::ValidationFailure {
			status: 404,
			body: r#"{"message":"Contact not found"}"#.into(),
		}
	);
	assert_eq!(transport.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn provisioning_400s_retry_until_ready() {
	let transport = ScriptedTransport::new([
		Ok(ApiResponse::new(400, r#"{"message":"Custom values cannot be created yet"}"#)),
		Ok(ApiResponse::new(201, r#"{"id":"cv-1"}"#)),
	]);
	let client = client(transport.clone(), Arc::default());
	let result = client
		.execute(&tenant(), contacts_request())
		.await
		.expect("Provisioning errors should be retried.");

	assert!(result.is_success());
	assert_eq!(transport.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn server_errors_exhaust_the_budget() {
	let transport = ScriptedTransport::new((0..5).map(|_| Ok(ApiResponse::new(503, "down"))));
	let client = client(transport.clone(), Arc::default());
	let started = Instant::now();
	let result = client.execute(&tenant(), contacts_request()).await.expect("Exhaustion is a result.");

	match result {
		ClassifiedResult::RetryExhausted(failure) => {
			assert_eq!(failure.attempts, 3);
			assert_eq!(failure.status, Some(503));
		},
		other => panic!("Expected retry exhaustion, got {other:?}."),
	}

	assert_eq!(transport.sent().len(), 3);
	assert!(started.elapsed() >= StdDuration::from_millis(3000));

	let transport = ScriptedTransport::new([Ok(ApiResponse::new(503, "down"))]);
	let client = self::client(transport.clone(), Arc::default());
	let err = client
		.execute_with_policy(&tenant(), contacts_request(), RetryPolicy::no_retry())
		.await
		.expect("Exhaustion is a result.")
		.into_result()
		.expect_err("Non-idempotent calls should not be retried.");

	assert!(matches!(err, Error::RetryExhausted { attempts: 1, .. }));
	assert_eq!(transport.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn network_failures_are_retried() {
	let transport = ScriptedTransport::new([
		Err(TransportError::Timeout.into()),
		Ok(ApiResponse::new(200, r#"{"id":"c-1"}"#)),
	]);
	let client = client(transport.clone(), Arc::default());

	#[derive(serde::Deserialize)]
	struct Contact {
		id: String,
	}

	let contact = client
		.fetch_json::<Contact>(&tenant(), contacts_request())
		.await
		.expect("A timeout followed by success should decode.");

	assert_eq!(contact.id, "c-1");
	assert_eq!(transport.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn requests_carry_vendor_headers() {
	let transport = ScriptedTransport::new([Ok(ApiResponse::new(200, "{}"))]);
	let client = client(transport.clone(), Arc::default()).with_decorator(Arc::new(
		VendorHeaders::default().with_header("x-dashboard", "crm"),
	));
	let request = contacts_request().with_header("Version", "2021-04-15");

	client.execute(&tenant(), request).await.expect("Call should succeed.");

	let sent = transport.sent();
	let request = &sent[0].1;

	assert_eq!(request.header("version"), Some("2021-04-15"));
	assert_eq!(request.header("accept"), Some("application/json"));
	assert_eq!(request.header("x-dashboard"), Some("crm"));
	assert_eq!(request.header("authorization"), Some("Bearer token-0"));
}

#[cfg(feature = "reqwest")]
#[tokio::test]
async fn unauthorized_refreshes_through_the_broker() {
	// crates.io
	use httpmock::prelude::*;
	// self
	use support::{build_broker, build_descriptor, record, token_body};

	let server = MockServer::start_async().await;
	let (broker, store) = build_broker(build_descriptor(&server));
	let tenant = tenant();

	crm_auth_broker::store::TokenStore::put(
		store.as_ref(),
		record(&tenant, "access-old", Some("refresh-old"), time::Duration::seconds(60), 86_399),
	)
	.await
	.expect("Seeding the store should succeed.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "refresh-old");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-new", Some("refresh-new"), "loc-api"));
		})
		.await;
	let broker = Arc::new(broker);
	let transport = ScriptedTransport::new([
		Ok(ApiResponse::new(401, "Invalid JWT")),
		Ok(ApiResponse::new(200, r#"{"contacts":[]}"#)),
	]);
	let client = ResilientClient::new(transport.clone(), broker.clone());
	let result = client
		.execute(&tenant, contacts_request())
		.await
		.expect("The broker should refresh after a 401.");

	assert!(result.is_success());

	mock.assert_async().await;

	let sent = transport.sent();

	assert_eq!(sent.len(), 2);
	assert_eq!(sent[0].1.header("authorization"), Some("Bearer access-old"));
	assert_eq!(sent[1].1.header("authorization"), Some("Bearer access-new"));
	assert_eq!(broker.refresh_metrics.exchanges(), 1);
}
