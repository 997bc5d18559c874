//! Provider strategy hooks for token endpoint calls.
//!
//! Strategies add vendor-specific form fields and map token endpoint failures onto
//! [`ProviderErrorKind`] without tying flows to an HTTP client.

// self
use crate::{_prelude::*, provider::descriptor::GrantType};

/// Strategy hook that decorates token requests and classifies token endpoint errors.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed token request onto the broker taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Adds vendor form parameters before a token request is dispatched.
	fn augment_token_request(&self, _grant: GrantType, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical token endpoint failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Vendor rejected the grant (expired or revoked refresh token, reused code).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Temporary failure worth retrying.
	Transient,
}

/// Primitive view of a failed token request handed to [`ProviderStrategy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant type of the failing request.
	pub grant_type: GrantType,
	/// HTTP status code, when a response was received.
	pub http_status: Option<u16>,
	/// OAuth `error` field.
	pub oauth_error: Option<String>,
	/// OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Truncated body for non-JSON payloads.
	pub body_preview: Option<String>,
	/// Whether the request never produced a response.
	pub network_error: bool,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates an empty context for `grant_type`.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
			network_error: false,
		}
	}

	/// Context for a request that failed before any response arrived.
	pub fn network_failure(grant_type: GrantType) -> Self {
		let mut ctx = Self::new(grant_type);

		ctx.network_error = true;

		ctx
	}

	/// Adds the HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description`.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview, truncated to 256 characters.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		let body = body.into();

		self.body_preview = Some(if body.chars().count() > Self::BODY_PREVIEW_LIMIT {
			let mut truncated: String = body.chars().take(Self::BODY_PREVIEW_LIMIT).collect();

			truncated.push('…');

			truncated
		} else {
			body
		});

		self
	}
}

/// Strategy used for the CRM vendor's token endpoint.
///
/// Structured OAuth fields win, then body hints, then the status code. Network failures are
/// always transient. A 400 without a recognizable error code counts as a rejected grant, which is
/// how the vendor reports a revoked or already-used refresh token.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}

		ctx.oauth_error
			.as_deref()
			.and_then(classify_code)
			.or_else(|| ctx.error_description.as_deref().and_then(classify_text))
			.or_else(|| ctx.body_preview.as_deref().and_then(classify_text))
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

fn classify_code(code: &str) -> Option<ProviderErrorKind> {
	match code.to_ascii_lowercase().as_str() {
		"invalid_grant" | "access_denied" => Some(ProviderErrorKind::InvalidGrant),
		"invalid_client" | "unauthorized_client" => Some(ProviderErrorKind::InvalidClient),
		"temporarily_unavailable" | "server_error" => Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_text(text: &str) -> Option<ProviderErrorKind> {
	let lowered = text.to_ascii_lowercase();

	if lowered.contains("invalid_grant") || lowered.contains("refresh token is invalid") {
		Some(ProviderErrorKind::InvalidGrant)
	} else if lowered.contains("invalid_client") {
		Some(ProviderErrorKind::InvalidClient)
	} else if lowered.contains("temporarily_unavailable") {
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 403) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		_ => ProviderErrorKind::Transient,
	}
}
