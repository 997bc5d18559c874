//! HTTP seams used by the broker.
//!
//! [`TokenHttpClient`] carries token endpoint calls issued through the `oauth2` facade and
//! reports response metadata through a [`ResponseMetadataSlot`] so failures can be classified
//! with their status and `Retry-After` hint. [`ApiTransport`] carries vendor API calls issued by
//! [`ResilientClient`](crate::client::ResilientClient). [`ReqwestHttpClient`] implements both.

pub mod api;

pub use api::*;

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError};
#[cfg(feature = "reqwest")] use oauth2::{HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")]
use reqwest::{
	Method,
	header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER},
	redirect::Policy,
};
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;
#[cfg(feature = "reqwest")] use crate::error::{ConfigError, TransportError};

/// Default timeout applied to every outbound call.
pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// HTTP transport for token endpoint exchanges.
///
/// The broker asks for a short-lived [`AsyncHttpClient`] handle per token request; each handle
/// carries a clone of a [`ResponseMetadataSlot`]. Handles must own their state so their request
/// futures stay `Send`.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds a handle that records outcomes in `slot`.
	///
	/// Handles call [`ResponseMetadataSlot::take`] before sending so nothing leaks across retries,
	/// then [`ResponseMetadataSlot::store`] once a status is known.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Metadata captured from the most recent token endpoint response.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot shared between a transport handle and the facade's error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns and clears the captured metadata.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// reqwest-backed transport for both token exchanges and vendor API calls.
///
/// Token endpoints answer directly, so redirects must stay disabled on any client passed to
/// [`with_client`](Self::with_client).
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a client with redirects disabled and a 30 second timeout.
	pub fn new() -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(Policy::none())
			.timeout(DEFAULT_TIMEOUT)
			.build()
			.map_err(ConfigError::from)?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl Default for ReqwestHttpClient {
	fn default() -> Self {
		Self::new().unwrap_or_else(|_| Self(ReqwestClient::new()))
	}
}
#[cfg(feature = "reqwest")]
impl Debug for ReqwestHttpClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ReqwestHttpClient(..)")
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle(Arc::new((self.0.clone(), slot)))
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestHttpClient {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_, ApiResponse> {
		Box::pin(async move {
			let method = match request.method {
				ApiMethod::Get => Method::GET,
				ApiMethod::Post => Method::POST,
				ApiMethod::Put => Method::PUT,
				ApiMethod::Patch => Method::PATCH,
				ApiMethod::Delete => Method::DELETE,
			};
			let mut headers = HeaderMap::with_capacity(request.headers.len() + 1);

			for (name, value) in &request.headers {
				let invalid = || ConfigError::InvalidHeader { name: name.clone() };
				let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
				let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;

				headers.insert(header_name, header_value);
			}

			let mut builder =
				self.0.request(method, request.url.clone()).timeout(request.timeout);

			if let Some(body) = &request.body {
				let bytes = serde_json::to_vec(body).map_err(ConfigError::RequestBody)?;

				headers
					.entry(CONTENT_TYPE)
					.or_insert(HeaderValue::from_static("application/json"));

				builder = builder.body(bytes);
			}

			let response = builder.headers(headers).send().await.map_err(TransportError::from)?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.text().await.map_err(TransportError::from)?;

			Ok(ApiResponse::new(status, body).with_headers(headers))
		})
	}
}

/// Handle returned by [`ReqwestHttpClient`] that records token endpoint metadata.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<(ReqwestClient, ResponseMetadataSlot)>);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let inner = Arc::clone(&self.0);

		Box::pin(async move {
			let (client, slot) = &*inner;

			slot.take();

			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = headers
				.get(RETRY_AFTER)
				.and_then(|value| value.to_str().ok())
				.and_then(|raw| parse_retry_after(raw, OffsetDateTime::now_utc()));

			slot.store(ResponseMetadata { status: Some(status.as_u16()), retry_after });

			let mut converted = HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}

/// Parses a `Retry-After` value (delta seconds or an HTTP date) relative to `now`.
pub(crate) fn parse_retry_after(raw: &str, now: OffsetDateTime) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}

	let delta = OffsetDateTime::parse(raw, &Rfc2822).ok()? - now;

	delta.is_positive().then_some(delta)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_seconds_and_dates() {
		let now = datetime!(2024-05-01 12:00:00 UTC);

		assert_eq!(parse_retry_after(" 7 ", now), Some(Duration::seconds(7)));
		assert_eq!(
			parse_retry_after("Wed, 01 May 2024 12:00:30 +0000", now),
			Some(Duration::seconds(30))
		);
		assert_eq!(parse_retry_after("Wed, 01 May 2024 11:59:00 +0000", now), None);
		assert_eq!(parse_retry_after("soon", now), None);
	}

	#[test]
	fn metadata_slot_take_clears_value() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(429), retry_after: None });

		assert_eq!(slot.take().and_then(|meta| meta.status), Some(429));
		assert!(slot.take().is_none());
	}
}
