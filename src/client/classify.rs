//! Vendor response classification.

// self
use crate::{_prelude::*, http::ApiResponse};

/// What the resilient client should do with a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
	/// Return the response.
	Success,
	/// Back off and try again.
	Retryable {
		/// Short description used for logs and the exhaustion report.
		reason: String,
	},
	/// Credentials were rejected; force a refresh and retry once.
	Reauthenticate,
	/// The vendor rejected the request on its merits; return it immediately.
	ValidationFailure,
}

/// Decides how a vendor response is handled.
pub trait ResponseClassifier: Send + Sync {
	/// Classifies one response.
	fn classify(&self, response: &ApiResponse) -> Classification;
}

/// Classifier encoding the vendor's observed failure modes.
///
/// A 400 is normally final, except while a freshly installed location is still being
/// provisioned, when the vendor answers with one of a few recognizable messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultResponseClassifier {
	retry_patterns: Vec<String>,
}
impl DefaultResponseClassifier {
	/// Case-insensitive body fragments that make a 400 retryable.
	pub const DEFAULT_RETRY_PATTERNS: [&'static str; 2] =
		["cannot be created yet", "not yet provisioned"];

	/// Replaces the 400 retry patterns.
	pub fn with_retry_patterns<I, S>(patterns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		Self {
			retry_patterns: patterns
				.into_iter()
				.map(|pattern| pattern.as_ref().to_lowercase())
				.filter(|pattern| !pattern.is_empty())
				.collect(),
		}
	}

	fn matches_retry_pattern(&self, body: &str) -> bool {
		let body = body.to_lowercase();

		self.retry_patterns.iter().any(|pattern| body.contains(pattern.as_str()))
	}
}
impl Default for DefaultResponseClassifier {
	fn default() -> Self {
		Self::with_retry_patterns(Self::DEFAULT_RETRY_PATTERNS)
	}
}
impl ResponseClassifier for DefaultResponseClassifier {
	fn classify(&self, response: &ApiResponse) -> Classification {
		match response.status {
			200..=299 => Classification::Success,
			401 => Classification::Reauthenticate,
			400 if self.matches_retry_pattern(&response.body) =>
				Classification::Retryable { reason: "HTTP 400 (resource not yet provisioned)".into() },
			429 => Classification::Retryable { reason: "HTTP 429".into() },
			status @ 500..=599 => Classification::Retryable { reason: format!("HTTP {status}") },
			_ => Classification::ValidationFailure,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn classify(status: u16, body: &str) -> Classification {
		DefaultResponseClassifier::default().classify(&ApiResponse::new(status, body))
	}

	#[test]
	fn follows_the_decision_table() {
		assert_eq!(classify(200, "{}"), Classification::Success);
		assert_eq!(classify(204, ""), Classification::Success);
		assert_eq!(classify(401, ""), Classification::Reauthenticate);
		assert!(matches!(classify(429, ""), Classification::Retryable { .. }));
		assert!(matches!(classify(502, ""), Classification::Retryable { .. }));
		assert_eq!(classify(400, r#"{"message":"email is invalid"}"#), Classification::ValidationFailure);
		assert_eq!(classify(404, ""), Classification::ValidationFailure);
		assert_eq!(classify(409, ""), Classification::ValidationFailure);
		assert_eq!(classify(302, ""), Classification::ValidationFailure);
	}

	#[test]
	fn provisioning_400s_retry_case_insensitively() {
		assert!(matches!(
			classify(400, r#"{"message":"Custom field Cannot Be Created Yet"}"#),
			Classification::Retryable { .. }
		));
		assert!(matches!(
			classify(400, "location NOT YET PROVISIONED"),
			Classification::Retryable { .. }
		));

		let custom = DefaultResponseClassifier::with_retry_patterns(["try again shortly"]);

		assert!(matches!(
			custom.classify(&ApiResponse::new(400, "Try again shortly")),
			Classification::Retryable { .. }
		));
		assert_eq!(
			custom.classify(&ApiResponse::new(400, "cannot be created yet")),
			Classification::ValidationFailure
		);
	}
}
