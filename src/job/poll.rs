//! Fixed-interval polling for long-running vendor jobs.

// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	client::policy::serde_millis,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Polling cadence and overall ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
	/// Delay between polls.
	#[serde(rename = "interval_ms", with = "serde_millis")]
	pub interval: StdDuration,
	/// Total time after which polling gives up.
	#[serde(rename = "ceiling_ms", with = "serde_millis")]
	pub ceiling: StdDuration,
}
impl PollPolicy {
	/// Default delay between polls.
	pub const DEFAULT_INTERVAL: StdDuration = StdDuration::from_secs(2);
	/// Default overall ceiling.
	pub const DEFAULT_CEILING: StdDuration = StdDuration::from_secs(600);
}
impl Default for PollPolicy {
	fn default() -> Self {
		Self { interval: Self::DEFAULT_INTERVAL, ceiling: Self::DEFAULT_CEILING }
	}
}

/// Result of a single poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollState<T> {
	/// The job is still running.
	Pending,
	/// The job finished with `T`.
	Done(T),
}

/// Polls a job until it completes or the ceiling elapses.
#[derive(Clone, Copy, Debug, Default)]
pub struct JobPoller {
	policy: PollPolicy,
}
impl JobPoller {
	/// Creates a poller with `policy`.
	pub fn new(policy: PollPolicy) -> Self {
		Self { policy }
	}

	/// Policy applied by [`poll`](Self::poll).
	pub fn policy(&self) -> PollPolicy {
		self.policy
	}

	/// Awaits `check` every interval until it returns [`PollState::Done`].
	///
	/// Errors from `check` end polling immediately. Once the ceiling elapses with the job still
	/// pending the call fails with [`Error::RetryExhausted`].
	pub async fn poll<T, F, Fut>(&self, operation: &str, check: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<PollState<T>>>,
	{
		const KIND: FlowKind = FlowKind::JobPoll;

		let span = FlowSpan::new(KIND, "poll");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.run(operation, check)).await;

		obs::record_result(KIND, &result);

		result
	}

	async fn run<T, F, Fut>(&self, operation: &str, mut check: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<PollState<T>>>,
	{
		let started = Instant::now();
		let mut polls = 0_u32;

		loop {
			polls = polls.saturating_add(1);

			if let PollState::Done(value) = check().await? {
				return Ok(value);
			}

			let elapsed = started.elapsed();

			if elapsed >= self.policy.ceiling {
				return Err(Error::RetryExhausted {
					attempts: polls,
					last_error: format!(
						"job `{operation}` still pending after {}ms",
						elapsed.as_millis()
					),
				});
			}

			tokio::time::sleep(self.policy.interval.min(self.policy.ceiling - elapsed)).await;
		}
	}
}
