//! Classification-aware execution of vendor API calls.
//!
//! [`ResilientClient::execute`] derives credentials for the tenant, decorates and sends the
//! request, classifies the response, and retries retryable outcomes with bounded exponential
//! backoff. A 401 forces one credential refresh and an immediate retry that does not count
//! against the attempt budget.

pub mod classify;
pub mod policy;

pub use classify::*;
pub use policy::RetryPolicy;

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TenantId,
	ext::{RequestDecorator, VendorHeaders},
	flows::CredentialSource,
	http::{ApiRequest, ApiResponse, ApiTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Final failure of a retryable call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptFailure {
	/// Attempts made, excluding the free retry after a 401.
	pub attempts: u32,
	/// Status of the last response, absent for network failures.
	pub status: Option<u16>,
	/// Description of the last failure.
	pub reason: String,
	/// `Retry-After` hint of the last response.
	pub retry_after: Option<Duration>,
}
impl Display for AttemptFailure {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} after {} attempt(s)", self.reason, self.attempts)
	}
}

/// Outcome of [`ResilientClient::execute`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassifiedResult {
	/// 2xx response.
	Success(ApiResponse),
	/// The vendor rejected the request; the body is suitable for surfacing to the caller.
	ValidationFailure {
		/// Vendor status code.
		status: u16,
		/// Raw vendor body.
		body: String,
	},
	/// Every attempt hit a retryable condition.
	RetryExhausted(AttemptFailure),
}
impl ClassifiedResult {
	/// Returns `true` for [`ClassifiedResult::Success`].
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success(_))
	}

	/// Maps the outcome onto the broker error taxonomy.
	pub fn into_result(self) -> Result<ApiResponse> {
		match self {
			Self::Success(response) => Ok(response),
			Self::ValidationFailure { status, body } => Err(Error::Validation { status, body }),
			Self::RetryExhausted(failure) =>
				Err(Error::RetryExhausted { attempts: failure.attempts, last_error: failure.reason }),
		}
	}
}

/// Executes vendor calls with classification, reauthentication, and backoff.
#[derive(Clone)]
pub struct ResilientClient {
	transport: Arc<dyn ApiTransport>,
	credentials: Arc<dyn CredentialSource>,
	policy: RetryPolicy,
	classifier: Arc<dyn ResponseClassifier>,
	decorator: Arc<dyn RequestDecorator>,
}
impl ResilientClient {
	/// Creates a client with the default policy, classifier, and vendor headers.
	pub fn new(transport: Arc<dyn ApiTransport>, credentials: Arc<dyn CredentialSource>) -> Self {
		Self {
			transport,
			credentials,
			policy: RetryPolicy::default(),
			classifier: Arc::new(DefaultResponseClassifier::default()),
			decorator: Arc::new(VendorHeaders::default()),
		}
	}

	/// Overrides the default retry policy.
	pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Overrides the response classifier.
	pub fn with_classifier(mut self, classifier: Arc<dyn ResponseClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Overrides the request decorator.
	pub fn with_decorator(mut self, decorator: Arc<dyn RequestDecorator>) -> Self {
		self.decorator = decorator;

		self
	}

	/// Retry policy applied by [`execute`](Self::execute).
	pub fn policy(&self) -> RetryPolicy {
		self.policy
	}

	/// Executes `request` for `tenant` under the client's policy.
	///
	/// `Err` is reserved for failures outside the decision table: no usable session, a rejected
	/// refresh token, a second 401, or local configuration problems.
	pub async fn execute(&self, tenant: &TenantId, request: ApiRequest) -> Result<ClassifiedResult> {
		self.execute_with_policy(tenant, request, self.policy).await
	}

	/// Executes `request` under a per-call policy (e.g. [`RetryPolicy::no_retry`] for creates).
	pub async fn execute_with_policy(
		&self,
		tenant: &TenantId,
		request: ApiRequest,
		policy: RetryPolicy,
	) -> Result<ClassifiedResult> {
		const KIND: FlowKind = FlowKind::ApiCall;

		let span = FlowSpan::new(KIND, "execute");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.run(tenant, request, policy)).await;
		let succeeded = matches!(result, Ok(ClassifiedResult::Success(_)));

		obs::record_flow_outcome(KIND, if succeeded { FlowOutcome::Success } else { FlowOutcome::Failure });

		result
	}

	/// Executes `request` and decodes a successful body as JSON.
	pub async fn fetch_json<T>(&self, tenant: &TenantId, request: ApiRequest) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.execute(tenant, request).await?.into_result()?.json()
	}

	async fn run(
		&self,
		tenant: &TenantId,
		request: ApiRequest,
		policy: RetryPolicy,
	) -> Result<ClassifiedResult> {
		let mut attempts = 0_u32;
		let mut reauthenticated = false;
		let mut rejected_token: Option<String> = None;

		loop {
			let credentials = match rejected_token.take() {
				Some(rejected) => self.credentials.force_refresh(tenant, &rejected).await?,
				None => self.credentials.credentials(tenant).await?,
			};
			let mut outgoing = request.clone();

			self.decorator.decorate(&mut outgoing, &credentials);

			let failure = match self.transport.send(outgoing).await {
				Ok(response) => match self.classifier.classify(&response) {
					Classification::Success => return Ok(ClassifiedResult::Success(response)),
					Classification::ValidationFailure =>
						return Ok(ClassifiedResult::ValidationFailure {
							status: response.status,
							body: response.body,
						}),
					Classification::Reauthenticate => {
						if reauthenticated {
							return Err(Error::Unauthenticated {
								reason: format!(
									"vendor rejected refreshed credentials for tenant `{tenant}`"
								),
							});
						}

						reauthenticated = true;
						rejected_token = Some(credentials.access_token.expose().to_owned());

						continue;
					},
					Classification::Retryable { reason } => AttemptFailure {
						attempts: attempts + 1,
						status: Some(response.status),
						retry_after: response.retry_after(),
						reason,
					},
				},
				Err(e) if e.is_retryable() => AttemptFailure {
					attempts: attempts + 1,
					status: None,
					retry_after: None,
					reason: e.to_string(),
				},
				Err(e) => return Err(e),
			};

			attempts = failure.attempts;

			if !policy.allows_retry(attempts) {
				return Ok(ClassifiedResult::RetryExhausted(failure));
			}

			let delay = policy.delay_with_hint(attempts - 1, failure.retry_after);

			obs::record_retry(FlowKind::ApiCall);
			obs::retry_scheduled(FlowKind::ApiCall, attempts, delay, &failure.reason);

			tokio::time::sleep(delay).await;
		}
	}
}
impl Debug for ResilientClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResilientClient").field("policy", &self.policy).finish_non_exhaustive()
	}
}
