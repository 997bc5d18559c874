//! Optional observability helpers for broker flows.
//!
//! # Feature Flags
//!
//! - `tracing` wraps flows in spans named `crm_auth_broker.flow` with `flow` and `stage` fields,
//!   and emits `warn` events for retries and rejected refresh tokens.
//! - `metrics` increments `crm_auth_broker_flow_total{flow, outcome}` per attempt, success, and
//!   failure, plus `crm_auth_broker_retry_total{flow}` per scheduled retry.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization URL construction and code exchange.
	Authorize,
	/// Refresh token exchange.
	Refresh,
	/// Credential lookup for outbound calls.
	Credentials,
	/// Vendor API call through the resilient client.
	ApiCall,
	/// Long-running job polling.
	JobPoll,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Authorize => "authorize",
			FlowKind::Refresh => "refresh",
			FlowKind::Credentials => "credentials",
			FlowKind::ApiCall => "api_call",
			FlowKind::JobPoll => "job_poll",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records the final outcome of `result` for `kind`.
pub(crate) fn record_result<T>(kind: FlowKind, result: &Result<T>) {
	match result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => record_flow_outcome(kind, FlowOutcome::Failure),
	}
}
