//! Refresh outcomes published to callers whose store lags behind.
//!
//! Per-request stores such as [`CookieStore`](crate::store::CookieStore) are not shared between
//! callers, so re-reading the store after the single-flight guard opens can still show the
//! refresh token another caller just spent. The ledger remembers, per tenant, which refresh
//! token the latest exchange consumed and what came of it.

// self
use crate::{
	_prelude::*,
	auth::{TenantId, TokenRecord},
};

/// How long a rejection stays visible to lagging callers.
const REJECTION_RETENTION: Duration = Duration::minutes(10);

/// Outcome of the latest exchange for a tenant.
#[derive(Clone, Debug)]
pub(crate) enum Published {
	/// The vendor issued `record` in exchange for the consumed refresh token.
	Rotated(TokenRecord),
	/// The vendor rejected the consumed refresh token.
	Rejected,
}

#[derive(Debug)]
struct Entry {
	consumed: String,
	outcome: Published,
	retain_until: OffsetDateTime,
}

/// Latest refresh outcome per tenant, shared by every clone and scoped view of a broker.
#[derive(Debug, Default)]
pub(crate) struct RefreshLedger {
	entries: Mutex<HashMap<TenantId, Entry>>,
}
impl RefreshLedger {
	/// Records that `consumed` was exchanged for `record`.
	pub(crate) fn publish_rotation(
		&self,
		consumed: &str,
		record: &TokenRecord,
		now: OffsetDateTime,
	) {
		self.publish(
			record.tenant().clone(),
			Entry {
				consumed: consumed.to_owned(),
				outcome: Published::Rotated(record.clone()),
				retain_until: record.expires_at(),
			},
			now,
		);
	}

	/// Records that the vendor rejected `consumed`.
	pub(crate) fn publish_rejection(&self, tenant: &TenantId, consumed: &str, now: OffsetDateTime) {
		self.publish(
			tenant.clone(),
			Entry {
				consumed: consumed.to_owned(),
				outcome: Published::Rejected,
				retain_until: now + REJECTION_RETENTION,
			},
			now,
		);
	}

	/// Outcome that supersedes `current`, if its refresh token was already spent.
	///
	/// A rotation is only returned when it is newer than `current`.
	pub(crate) fn superseding(
		&self,
		current: &TokenRecord,
		now: OffsetDateTime,
	) -> Option<Published> {
		let refresh_token = current.refresh_token.as_ref()?;
		let entries = self.entries.lock();
		let entry = entries
			.get(current.tenant())
			.filter(|entry| entry.retain_until > now && entry.consumed == refresh_token.expose())?;

		match &entry.outcome {
			Published::Rotated(record) if record.issued_at <= current.issued_at => None,
			outcome => Some(outcome.clone()),
		}
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.entries.lock().len()
	}

	fn publish(&self, tenant: TenantId, entry: Entry, now: OffsetDateTime) {
		let mut entries = self.entries.lock();

		entries.retain(|_, entry| entry.retain_until > now);
		entries.insert(tenant, entry);
	}
}
