//! Broker-level error types shared across flows, stores, and the resilient client.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
///
/// Route handlers map these onto their own responses; see [`Error::suggested_status`].
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, timeouts).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Vendor payload did not match the expected shape.
	#[error("Response body could not be decoded at `{}`.", .0.path())]
	Decode(#[from] serde_path_to_error::Error<serde_json::Error>),

	/// No usable session exists; the caller must re-run the authorization flow.
	#[error("No usable session: {reason}.")]
	Unauthenticated {
		/// Broker-supplied reason string.
		reason: String,
	},
	/// Vendor rejected the refresh token (revoked or expired); the session was cleared.
	#[error("Provider rejected the refresh token: {reason}.")]
	RefreshRejected {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Vendor rejected the request on its merits.
	#[error("Vendor rejected the request with status {status}.")]
	Validation {
		/// HTTP status returned by the vendor.
		status: u16,
		/// Raw vendor body, suitable for surfacing to the end caller.
		body: String,
	},
	/// Every attempt for a retryable condition failed.
	#[error("Gave up after {attempts} attempt(s): {last_error}.")]
	RetryExhausted {
		/// Number of attempts performed.
		attempts: u32,
		/// Description of the final failure.
		last_error: String,
	},
}
impl Error {
	/// Returns `true` when the only remedy is sending the user back through authorization.
	pub fn requires_reauthorization(&self) -> bool {
		matches!(self, Self::Unauthenticated { .. } | Self::RefreshRejected { .. })
	}

	/// Returns `true` for transient upstream and transport failures.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(_) | Self::Transport(_))
	}

	/// Upstream `Retry-After` hint, when the failure carried one.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Transient(e) => e.retry_after(),
			_ => None,
		}
	}

	/// HTTP status a route handler should answer with for this failure.
	pub fn suggested_status(&self) -> u16 {
		match self {
			Self::Unauthenticated { .. } | Self::RefreshRejected { .. } => 401,
			Self::InvalidClient { .. } | Self::Decode(_) => 502,
			Self::Validation { status, .. } => *status,
			Self::RetryExhausted { .. } | Self::Transient(_) | Self::Transport(_) => 503,
			Self::Storage(_) | Self::Config(_) => 500,
		}
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[source] serde_json::Error),
	/// Header name or value cannot be sent.
	#[error("Header `{name}` is not a valid HTTP header.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},

	/// Descriptor does not enable the requested grant.
	#[error("Descriptor `{descriptor}` does not enable the {grant} grant.")]
	UnsupportedGrant {
		/// Provider identifier string.
		descriptor: String,
		/// Disabled grant label.
		grant: &'static str,
	},
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
	/// Token endpoint returned an identifier that fails validation.
	#[error("Token endpoint returned an invalid identifier.")]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Token endpoint response named neither a location nor a company.
	#[error("Token endpoint response does not identify a tenant.")]
	MissingTenant,
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl TransientError {
	/// HTTP status attached to the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::TokenEndpoint { status, .. } | Self::TokenResponseParse { status, .. } => *status,
		}
	}

	/// Retry-After hint attached to the failure, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::TokenEndpoint { retry_after, .. } => *retry_after,
			Self::TokenResponseParse { .. } => None,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the vendor.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The call exceeded its timeout.
	#[error("Vendor call timed out.")]
	Timeout,
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the vendor.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn auth_failures_route_back_to_authorization() {
		let unauthenticated = Error::Unauthenticated { reason: "no session".into() };
		let rejected = Error::RefreshRejected { reason: "invalid_grant".into() };
		let exhausted = Error::RetryExhausted { attempts: 3, last_error: "HTTP 503".into() };

		assert!(unauthenticated.requires_reauthorization());
		assert!(rejected.requires_reauthorization());
		assert!(!exhausted.requires_reauthorization());
		assert_eq!(unauthenticated.suggested_status(), 401);
		assert_eq!(rejected.suggested_status(), 401);
		assert_eq!(exhausted.suggested_status(), 503);
	}

	#[test]
	fn validation_failures_pass_the_vendor_status_through() {
		let err = Error::Validation { status: 409, body: "{\"message\":\"duplicate\"}".into() };

		assert_eq!(err.suggested_status(), 409);
		assert!(err.to_string().contains("409"));
	}

	#[test]
	fn transient_error_exposes_metadata() {
		let err = TransientError::TokenEndpoint {
			message: "throttled".into(),
			status: Some(429),
			retry_after: Some(Duration::seconds(2)),
		};

		assert_eq!(err.status(), Some(429));
		assert_eq!(err.retry_after(), Some(Duration::seconds(2)));
		assert_eq!(Error::from(err).suggested_status(), 503);
	}
}
