// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span wrapper used by broker flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a span tagged with the flow kind and call site.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("crm_auth_broker.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a `warn` event before a retry sleeps.
pub fn retry_scheduled(kind: FlowKind, attempt: u32, delay: StdDuration, reason: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			flow = kind.as_str(),
			attempt,
			delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
			%reason,
			"retrying vendor call"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, attempt, delay, reason);
	}
}

/// Emits a `warn` event when the vendor rejects a refresh token and the session is dropped.
pub fn refresh_rejected(tenant: &str, reason: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(tenant, %reason, "refresh token rejected; session cleared");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (tenant, reason);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn events_are_safe_without_a_subscriber() {
		retry_scheduled(FlowKind::ApiCall, 1, StdDuration::from_millis(1000), &"HTTP 429");
		refresh_rejected("loc-1", &"invalid_grant");
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
