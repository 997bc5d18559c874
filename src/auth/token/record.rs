//! Token records, lifecycle helpers, staleness checks, and builders.

// self
use crate::{
	_prelude::*,
	auth::{
		TenantId,
		token::{identity::SessionIdentity, secret::TokenSecret},
	},
};

/// Current lifecycle status for a token record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is not yet valid because the issued-at instant is in the future.
	Pending,
	/// Token is currently valid.
	Active,
	/// Token exceeded its declared lifetime.
	Expired,
}

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no lifetime was configured.
	#[error("Lifetime must be supplied via expires_in.")]
	MissingExpiry,
	/// Issued when the lifetime is zero or negative.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiry,
}

/// Cached vendor credentials for one tenant.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Tenant key plus auxiliary identifiers.
	pub identity: SessionIdentity,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the vendor issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the token was obtained.
	pub issued_at: OffsetDateTime,
	/// Vendor-declared lifetime; a heuristic, not an exact deadline.
	pub expires_in: Duration,
}
impl TokenRecord {
	/// Returns a builder for the provided identity.
	pub fn builder(identity: SessionIdentity) -> TokenRecordBuilder {
		TokenRecordBuilder::new(identity)
	}

	/// Tenant keying this record.
	pub fn tenant(&self) -> &TenantId {
		&self.identity.tenant
	}

	/// Instant the vendor considers the token expired.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.issued_at + self.expires_in
	}

	/// Lifetime left at `instant` (negative once expired).
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at() - instant
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant < self.issued_at {
			return TokenStatus::Pending;
		}
		if instant >= self.expires_at() {
			return TokenStatus::Expired;
		}

		TokenStatus::Active
	}

	/// Convenience helper that checks the status using the current UTC instant.
	pub fn status(&self) -> TokenStatus {
		self.status_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` if the record has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Expired)
	}

	/// Returns `true` once `instant - issued_at >= expires_in - margin`.
	///
	/// A negative margin is treated as zero.
	pub fn is_stale_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		let margin = if margin.is_negative() { Duration::ZERO } else { margin };

		instant - self.issued_at >= self.expires_in - margin
	}

	/// Builds a record replacing this one after a refresh.
	///
	/// The previous refresh token is kept when the vendor did not rotate it, and auxiliary
	/// identifiers the vendor omitted are inherited.
	pub fn rotated(&self, mut next: TokenRecord) -> TokenRecord {
		if next.refresh_token.is_none() {
			next.refresh_token = self.refresh_token.clone();
		}

		next.identity = next.identity.inherit(&self.identity);

		next
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("identity", &self.identity)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_in", &self.expires_in)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug)]
pub struct TokenRecordBuilder {
	identity: SessionIdentity,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenRecordBuilder {
	fn new(identity: SessionIdentity) -> Self {
		Self { identity, access_token: None, refresh_token: None, issued_at: None, expires_in: None }
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Convenience helper that stamps `issued_at` with the current clock.
	pub fn issued_now(self) -> Self {
		self.issued_at(OffsetDateTime::now_utc())
	}

	/// Sets the declared lifetime.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Sets the declared lifetime from the vendor's `expires_in` seconds.
	pub fn expires_in_secs(self, secs: i64) -> Self {
		self.expires_in(Duration::seconds(secs))
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let expires_in = self.expires_in.ok_or(TokenRecordBuilderError::MissingExpiry)?;

		if !expires_in.is_positive() {
			return Err(TokenRecordBuilderError::NonPositiveExpiry);
		}

		Ok(TokenRecord {
			identity: self.identity,
			access_token,
			refresh_token: self.refresh_token,
			issued_at: self.issued_at.unwrap_or_else(OffsetDateTime::now_utc),
			expires_in,
		})
	}
}
