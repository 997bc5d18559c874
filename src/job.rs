//! Deterministic progress estimates for jobs the vendor cannot report on.
//!
//! A [`JobId`] embeds its creation instant (`job_<epoch millis>`), so progress is a pure
//! function of elapsed time: repeated calls never go backwards and nothing is persisted.

pub mod poll;

pub use poll::*;

// self
use crate::_prelude::*;

const PREFIX: &str = "job_";

/// Errors raised while parsing a [`JobId`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum JobIdError {
	/// The id does not start with `job_`.
	#[error("Job id `{0}` does not start with `job_`.")]
	MissingPrefix(String),
	/// The timestamp part is not a representable epoch millisecond value.
	#[error("Job id `{0}` does not carry a valid millisecond timestamp.")]
	InvalidTimestamp(String),
}

/// Opaque job handle of the form `job_<creation epoch millis>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId {
	created_at_ms: i64,
}
impl JobId {
	/// Mints an id stamped with the current time.
	pub fn new() -> Self {
		Self::new_at(OffsetDateTime::now_utc())
	}

	/// Mints an id stamped with `instant`.
	pub fn new_at(instant: OffsetDateTime) -> Self {
		let millis = instant.unix_timestamp_nanos() / 1_000_000;

		Self { created_at_ms: i64::try_from(millis).unwrap_or(i64::MAX) }
	}

	/// Parses `job_<millis>`.
	pub fn parse(raw: &str) -> Result<Self, JobIdError> {
		let digits =
			raw.strip_prefix(PREFIX).ok_or_else(|| JobIdError::MissingPrefix(raw.to_owned()))?;
		let invalid = || JobIdError::InvalidTimestamp(raw.to_owned());

		if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
			return Err(invalid());
		}

		let created_at_ms = digits.parse::<i64>().map_err(|_| invalid())?;

		OffsetDateTime::from_unix_timestamp_nanos(i128::from(created_at_ms) * 1_000_000)
			.map_err(|_| invalid())?;

		Ok(Self { created_at_ms })
	}

	/// Creation instant embedded in the id.
	pub fn created_at(&self) -> OffsetDateTime {
		OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.created_at_ms) * 1_000_000)
			.unwrap_or(OffsetDateTime::UNIX_EPOCH)
	}
}
impl Default for JobId {
	fn default() -> Self {
		Self::new()
	}
}
impl Display for JobId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{PREFIX}{}", self.created_at_ms)
	}
}
impl FromStr for JobId {
	type Err = JobIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl TryFrom<String> for JobId {
	type Error = JobIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(&value)
	}
}
impl From<JobId> for String {
	fn from(value: JobId) -> Self {
		value.to_string()
	}
}

/// Coarse job status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
	/// Just created.
	Initializing,
	/// Running.
	Processing,
	/// Done.
	Completed,
}

/// Estimated job state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEstimate {
	/// Coarse status.
	pub status: JobStatus,
	/// Progress in percent.
	pub progress_percent: u8,
}

/// Estimates `job` against the current clock.
pub fn estimate(job: &JobId) -> JobEstimate {
	estimate_at(job, OffsetDateTime::now_utc())
}

/// Estimates `job` as of `now`. Ids from the future count as just created.
pub fn estimate_at(job: &JobId, now: OffsetDateTime) -> JobEstimate {
	let elapsed = (now - job.created_at()).max(Duration::ZERO);
	let (status, progress_percent) = match elapsed.whole_seconds() {
		..5 => (JobStatus::Initializing, 5),
		5..15 => (JobStatus::Processing, 25),
		15..30 => (JobStatus::Processing, 50),
		30..60 => (JobStatus::Processing, 75),
		_ => (JobStatus::Completed, 100),
	};

	JobEstimate { status, progress_percent }
}
