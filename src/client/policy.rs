//! Bounded exponential backoff shared by vendor calls and refresh exchanges.

// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Retry budget and backoff schedule.
///
/// Attempt `n` (zero based) that fails with a retryable condition waits
/// `base_delay * 2^n` before attempt `n + 1`, never longer than `max_delay`. The call is
/// abandoned once `max_attempts` attempts have been made.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Total attempts, including the first one.
	pub max_attempts: u32,
	/// Delay before the first retry.
	#[serde(rename = "base_delay_ms", with = "serde_millis")]
	pub base_delay: StdDuration,
	/// Upper bound on any single wait, including waits requested by `Retry-After`.
	#[serde(rename = "max_delay_ms", with = "serde_millis")]
	pub max_delay: StdDuration,
	/// Adds up to 10% random delay to each backoff.
	pub jitter: bool,
}
impl RetryPolicy {
	/// Default attempt budget.
	pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
	/// Default delay before the first retry.
	pub const DEFAULT_BASE_DELAY: StdDuration = StdDuration::from_millis(1000);
	/// Default cap on a single wait.
	pub const DEFAULT_MAX_DELAY: StdDuration = StdDuration::from_secs(30);

	/// Creates a policy without jitter.
	pub fn new(max_attempts: u32, base_delay: StdDuration) -> Self {
		Self {
			max_attempts: max_attempts.max(1),
			base_delay,
			max_delay: Self::DEFAULT_MAX_DELAY,
			jitter: false,
		}
	}

	/// Policy that never retries, for non-idempotent calls.
	pub fn no_retry() -> Self {
		Self::new(1, Self::DEFAULT_BASE_DELAY)
	}

	/// Overrides the cap on a single wait.
	pub fn with_max_delay(mut self, max_delay: StdDuration) -> Self {
		self.max_delay = max_delay;

		self
	}

	/// Toggles jitter.
	pub fn with_jitter(mut self, jitter: bool) -> Self {
		self.jitter = jitter;

		self
	}

	/// Whether another attempt is allowed after `attempts` attempts were made.
	pub fn allows_retry(&self, attempts: u32) -> bool {
		attempts < self.max_attempts
	}

	/// Backoff after the zero-based `attempt` failed.
	pub fn delay(&self, attempt: u32) -> StdDuration {
		let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);

		self.base_delay.saturating_mul(factor).min(self.max_delay)
	}

	/// Backoff honoring an upstream `Retry-After` hint, which may lengthen but never shorten it.
	///
	/// The result, jitter included, never exceeds `max_delay`.
	pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> StdDuration {
		let mut delay = self.delay(attempt);

		if let Some(hint) = retry_after.and_then(|hint| StdDuration::try_from(hint).ok()) {
			delay = delay.max(hint.min(self.max_delay));
		}
		if self.jitter {
			let ceiling = u64::try_from(delay.as_millis() / 10).unwrap_or(u64::MAX);

			if ceiling > 0 {
				delay += StdDuration::from_millis(rand::rng().random_range(0..=ceiling));
			}
		}

		delay.min(self.max_delay)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BASE_DELAY)
	}
}

/// Serializes a [`StdDuration`] as whole milliseconds.
pub(crate) mod serde_millis {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub(crate) fn serialize<S>(value: &StdDuration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
	}

	pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<StdDuration, D::Error>
	where
		D: Deserializer<'de>,
	{
		u64::deserialize(deserializer).map(StdDuration::from_millis)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn delays_double_per_attempt() {
		let policy = RetryPolicy::default();

		assert_eq!(policy.delay(0), StdDuration::from_millis(1000));
		assert_eq!(policy.delay(1), StdDuration::from_millis(2000));
		assert_eq!(policy.delay(2), StdDuration::from_millis(4000));
		assert!(policy.allows_retry(2));
		assert!(!policy.allows_retry(3));
		assert_eq!(policy.delay(5), StdDuration::from_secs(30));
		assert_eq!(policy.delay(64), RetryPolicy::DEFAULT_MAX_DELAY);
	}

	#[test]
	fn retry_after_is_capped_by_max_delay() {
		let policy = RetryPolicy::default();

		assert_eq!(
			policy.delay_with_hint(0, Some(Duration::seconds(4_000_000_000))),
			RetryPolicy::DEFAULT_MAX_DELAY
		);

		let policy = policy.with_max_delay(StdDuration::from_secs(2)).with_jitter(true);

		for attempt in 0..4 {
			assert!(
				policy.delay_with_hint(attempt, Some(Duration::seconds(60)))
					<= StdDuration::from_secs(2)
			);
		}
	}

	#[test]
	fn retry_after_only_lengthens() {
		let policy = RetryPolicy::default();

		assert_eq!(
			policy.delay_with_hint(0, Some(Duration::seconds(5))),
			StdDuration::from_secs(5)
		);
		assert_eq!(
			policy.delay_with_hint(1, Some(Duration::milliseconds(10))),
			StdDuration::from_millis(2000)
		);
		assert_eq!(
			policy.delay_with_hint(0, Some(Duration::seconds(-3))),
			StdDuration::from_millis(1000)
		);
	}

	#[test]
	fn jitter_stays_within_ten_percent() {
		let policy = RetryPolicy::default().with_jitter(true);

		for _ in 0..32 {
			let delay = policy.delay_with_hint(0, None);

			assert!(delay >= StdDuration::from_millis(1000));
			assert!(delay <= StdDuration::from_millis(1100));
		}
	}

	#[test]
	fn deserializes_with_defaults() {
		let policy: RetryPolicy =
			serde_json::from_str(r#"{"max_attempts":1}"#).expect("Policy should deserialize.");

		assert_eq!(policy, RetryPolicy::no_retry());

		let policy: RetryPolicy = serde_json::from_str(r#"{"base_delay_ms":250,"jitter":true}"#)
			.expect("Policy should deserialize.");

		assert_eq!(policy.base_delay, StdDuration::from_millis(250));
		assert_eq!(policy.max_delay, RetryPolicy::DEFAULT_MAX_DELAY);
		assert_eq!(policy.max_attempts, 3);

		let policy: RetryPolicy =
			serde_json::from_str(r#"{"max_delay_ms":5000}"#).expect("Policy should deserialize.");

		assert_eq!(policy.max_delay, StdDuration::from_secs(5));
		assert!(policy.jitter);
	}
}
