//! Per-attempt request decoration.

// self
use crate::{_prelude::*, flows::Credentials, http::ApiRequest};

/// Attaches credentials and vendor headers to an outbound request.
///
/// Called once per attempt with freshly derived credentials, so a refreshed token is picked up
/// by the next retry.
pub trait RequestDecorator: Send + Sync {
	/// Mutates `request` in place before it is sent.
	fn decorate(&self, request: &mut ApiRequest, credentials: &Credentials);
}

/// Static vendor headers plus bearer authorization.
///
/// Headers already present on the request win over configured ones, except `Authorization`,
/// which always reflects the current credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorHeaders {
	/// Value for the vendor's `Version` header.
	pub api_version: Option<String>,
	/// Value for `User-Agent`.
	pub user_agent: Option<String>,
	/// Additional static headers.
	pub extra: BTreeMap<String, String>,
}
impl VendorHeaders {
	/// API version the CRM vendor currently documents.
	pub const DEFAULT_API_VERSION: &'static str = "2021-07-28";

	/// Overrides the `Version` header.
	pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
		self.api_version = Some(version.into());

		self
	}

	/// Overrides the `User-Agent` header.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());

		self
	}

	/// Adds a static header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.extra.insert(name.into(), value.into());

		self
	}
}
impl Default for VendorHeaders {
	fn default() -> Self {
		Self {
			api_version: Some(Self::DEFAULT_API_VERSION.into()),
			user_agent: Some(concat!("crm-auth-broker/", env!("CARGO_PKG_VERSION")).into()),
			extra: BTreeMap::new(),
		}
	}
}
impl RequestDecorator for VendorHeaders {
	fn decorate(&self, request: &mut ApiRequest, credentials: &Credentials) {
		let configured = self
			.api_version
			.iter()
			.map(|version| ("version", version.as_str()))
			.chain(self.user_agent.iter().map(|agent| ("user-agent", agent.as_str())))
			.chain(std::iter::once(("accept", "application/json")))
			.chain(self.extra.iter().map(|(name, value)| (name.as_str(), value.as_str())));

		for (name, value) in configured {
			if request.header(name).is_none() {
				request.set_header(name, value);
			}
		}

		request.set_header("authorization", credentials.authorization_header());
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::{TenantId, TokenSecret};

	fn credentials(token: &str) -> Credentials {
		Credentials {
			access_token: TokenSecret::new(token),
			tenant: TenantId::new("loc-1").expect("Tenant fixture should be valid."),
			user_id: None,
			company_id: None,
		}
	}

	#[test]
	fn adds_vendor_headers_without_overriding_request_headers() {
		let mut request = ApiRequest::get(
			Url::parse("https://api.example.com/contacts").expect("URL fixture should parse."),
		)
		.with_header("Version", "2023-02-21");
		let headers = VendorHeaders::default().with_header("X-Trace", "abc");

		headers.decorate(&mut request, &credentials("token-1"));

		assert_eq!(request.header("version"), Some("2023-02-21"));
		assert_eq!(request.header("accept"), Some("application/json"));
		assert_eq!(request.header("x-trace"), Some("abc"));
		assert!(request.header("user-agent").is_some_and(|agent| agent.starts_with("crm-auth-broker/")));
		assert_eq!(request.header("authorization"), Some("Bearer token-1"));

		headers.decorate(&mut request, &credentials("token-2"));

		assert_eq!(request.header("authorization"), Some("Bearer token-2"));
	}

	#[test]
	fn deserializes_partial_configuration() {
		let headers: VendorHeaders = serde_json::from_str(r#"{"extra":{"X-App":"dashboard"}}"#)
			.expect("Header config should deserialize.");

		assert_eq!(headers.api_version.as_deref(), Some(VendorHeaders::DEFAULT_API_VERSION));
		assert_eq!(headers.extra.get("X-App").map(String::as_str), Some("dashboard"));
	}
}
