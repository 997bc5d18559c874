//! Vendor API request/response values and the [`ApiTransport`] seam.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, error::ConfigError, http::DEFAULT_TIMEOUT};

/// Boxed future returned by [`ApiTransport::send`].
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Executes one vendor API call.
///
/// Implementations report connection failures and timeouts as [`Error::Transport`]; any HTTP
/// status, including errors, is returned as an [`ApiResponse`].
pub trait ApiTransport: Send + Sync {
	/// Sends `request` and returns the raw response.
	fn send(&self, request: ApiRequest) -> TransportFuture<'_, ApiResponse>;
}

/// HTTP methods used against the vendor API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiMethod {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl ApiMethod {
	/// Returns the wire name of the method.
	pub const fn as_str(self) -> &'static str {
		match self {
			ApiMethod::Get => "GET",
			ApiMethod::Post => "POST",
			ApiMethod::Put => "PUT",
			ApiMethod::Patch => "PATCH",
			ApiMethod::Delete => "DELETE",
		}
	}
}
impl Display for ApiMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// One vendor API call, replayable across retries.
///
/// Header names are stored lowercase.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: ApiMethod,
	/// Absolute request URL.
	pub url: Url,
	/// Request headers.
	pub headers: BTreeMap<String, String>,
	/// Optional JSON body.
	pub body: Option<serde_json::Value>,
	/// Per-attempt timeout.
	pub timeout: StdDuration,
}
impl ApiRequest {
	/// Creates a request with no headers, no body, and the default 30 second timeout.
	pub fn new(method: ApiMethod, url: Url) -> Self {
		Self { method, url, headers: BTreeMap::new(), body: None, timeout: DEFAULT_TIMEOUT }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(ApiMethod::Get, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(ApiMethod::Post, url)
	}

	/// Sets (or replaces) a header.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.set_header(name, value);

		self
	}

	/// Sets (or replaces) a header in place.
	pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());
	}

	/// Returns a header value by case-insensitive name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Serializes `body` as the JSON payload.
	pub fn with_json<T>(mut self, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_value(body).map_err(ConfigError::RequestBody)?);

		Ok(self)
	}

	/// Overrides the per-attempt timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}
}

/// Raw vendor response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers with lowercase names.
	pub headers: BTreeMap<String, String>,
	/// Response body as text.
	pub body: String,
}
impl ApiResponse {
	/// Creates a response with no headers.
	pub fn new(status: u16, body: impl Into<String>) -> Self {
		Self { status, headers: BTreeMap::new(), body: body.into() }
	}

	/// Replaces the headers, lowercasing names.
	pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
		self.headers =
			headers.into_iter().map(|(name, value)| (name.to_ascii_lowercase(), value)).collect();

		self
	}

	/// Adds a single header.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Returns a header value by case-insensitive name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// `Retry-After` hint carried by the response, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		self.header("retry-after")
			.and_then(|raw| super::parse_retry_after(raw, OffsetDateTime::now_utc()))
	}

	/// Decodes the body as JSON, reporting the failing path on mismatch.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_str(&self.body);

		Ok(serde_path_to_error::deserialize(&mut de)?)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, Deserialize)]
	struct Contact {
		#[allow(dead_code)]
		id: String,
		#[allow(dead_code)]
		tags: Vec<String>,
	}

	#[test]
	fn headers_are_case_insensitive() {
		let request = ApiRequest::get(
			Url::parse("https://api.example.com/contacts").expect("URL fixture should parse."),
		)
		.with_header("Version", "2021-07-28");

		assert_eq!(request.header("version"), Some("2021-07-28"));
		assert_eq!(request.timeout, DEFAULT_TIMEOUT);

		let response = ApiResponse::new(429, "").with_header("Retry-After", "3");

		assert_eq!(response.retry_after(), Some(Duration::seconds(3)));
		assert!(!response.is_success());
	}

	#[test]
	fn json_decode_reports_the_failing_path() {
		let response = ApiResponse::new(200, r#"{"id":"c-1","tags":["a",7]}"#);
		let err = response.json::<Contact>().expect_err("Mismatched tag type should fail.");

		match err {
			Error::Decode(inner) => assert_eq!(inner.path().to_string(), "tags[1]"),
			other => panic!("Expected a decode error, got {other:?}."),
		}
	}
}
