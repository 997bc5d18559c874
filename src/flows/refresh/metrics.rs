// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-broker refresh counters, shared by every clone and scoped view.
///
/// `attempts == successes + failures` once all calls have returned. `reused` counts the
/// successes answered from the store after another caller refreshed first.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	reused: AtomicU64,
	exchanges: AtomicU64,
	rejections: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl RefreshMetrics {
	/// Total refresh calls.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Calls answered from the store without a vendor exchange.
	pub fn reused(&self) -> u64 {
		self.reused.load(Ordering::Relaxed)
	}

	/// Token endpoint requests issued, including retries.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Sessions cleared because the vendor rejected the refresh token.
	pub fn rejections(&self) -> u64 {
		self.rejections.load(Ordering::Relaxed)
	}

	/// Calls that returned a usable record.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Calls that returned an error.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_reuse(&self) {
		self.reused.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_rejection(&self) {
		self.rejections.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_outcome(&self, succeeded: bool) {
		let counter = if succeeded { &self.success } else { &self.failure };

		counter.fetch_add(1, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn outcomes_balance_attempts() {
		let metrics = RefreshMetrics::default();

		metrics.record_attempt();
		metrics.record_exchange();
		metrics.record_outcome(true);
		metrics.record_attempt();
		metrics.record_reuse();
		metrics.record_outcome(true);
		metrics.record_attempt();
		metrics.record_exchange();
		metrics.record_rejection();
		metrics.record_outcome(false);

		assert_eq!(metrics.attempts(), metrics.successes() + metrics.failures());
		assert_eq!((metrics.reused(), metrics.exchanges(), metrics.rejections()), (1, 2, 1));
	}
}
