//! Token endpoint facade over the `oauth2` crate.
//!
//! The facade owns the vendor's token response shape ([`VendorTokenFields`]), sends the
//! `user_type` form field the vendor expects, and maps every failure onto the broker taxonomy so
//! flows only ever see [`Error`].

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, ExtraTokenFields, HttpClientError, RedirectUrl, RefreshToken, RequestTokenError,
	StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{CompanyId, SessionIdentity, TenantId, TokenRecord, UserId, UserType},
	error::{ConfigError, TransientError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy,
	},
};
#[cfg(feature = "reqwest")] use crate::error::TransportError;

type VendorTokenResponse = StandardTokenResponse<VendorTokenFields, BasicTokenType>;
type VendorClient = Client<
	BasicErrorResponse,
	VendorTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Non-standard fields the vendor adds to token responses.
///
/// The vendor has used both camelCase and snake_case spellings over time; both are accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorTokenFields {
	/// Location (sub-account) the token is scoped to.
	#[serde(default, alias = "locationId", skip_serializing_if = "Option::is_none")]
	pub location_id: Option<String>,
	/// Company (agency) that owns the location.
	#[serde(default, alias = "companyId", skip_serializing_if = "Option::is_none")]
	pub company_id: Option<String>,
	/// User who completed authorization.
	#[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	/// Account level, `Location` or `Company`.
	#[serde(default, alias = "userType", skip_serializing_if = "Option::is_none")]
	pub user_type: Option<String>,
}
impl ExtraTokenFields for VendorTokenFields {}
impl VendorTokenFields {
	/// Derives the session identity described by these fields.
	///
	/// The tenant is the location when present, otherwise the company (which forces a
	/// company-level account). `fallback` keeps the tenant of an existing session, since a refresh
	/// must never move a record to another key.
	pub fn identity(
		&self,
		fallback: Option<&SessionIdentity>,
		default_user_type: UserType,
	) -> Result<SessionIdentity> {
		let mut user_type = self
			.user_type
			.as_deref()
			.and_then(|raw| raw.parse().ok())
			.or(fallback.map(|previous| previous.user_type))
			.unwrap_or(default_user_type);
		let tenant = match (fallback, &self.location_id, &self.company_id) {
			(Some(previous), _, _) => previous.tenant.clone(),
			(None, Some(location), _) => TenantId::new(location).map_err(ConfigError::from)?,
			(None, None, Some(company)) => {
				user_type = UserType::Company;

				TenantId::new(company).map_err(ConfigError::from)?
			},
			(None, None, None) => return Err(ConfigError::MissingTenant.into()),
		};
		let mut identity = SessionIdentity::new(tenant).with_user_type(user_type);

		if let Some(user_id) = &self.user_id {
			identity = identity.with_user(UserId::new(user_id).map_err(ConfigError::from)?);
		}
		if let Some(company_id) = &self.company_id {
			identity = identity.with_company(CompanyId::new(company_id).map_err(ConfigError::from)?);
		}

		Ok(identity)
	}
}

/// Maps HTTP transport failures into broker [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a broker error.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() => ConfigError::from(*inner).into(),
			HttpClientError::Reqwest(inner) => TransportError::from(*inner).into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransientError::TokenEndpoint {
				message: format!("{grant} request failed in the HTTP client: {message}"),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
			_ => TransientError::TokenEndpoint {
				message: format!("{grant} request failed in the HTTP client"),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
		}
	}
}

pub(crate) trait OAuth2Facade {
	/// Redeems the refresh token of `current` and returns the rotated record.
	fn refresh_token<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		current: &'a TokenRecord,
	) -> FacadeFuture<'a, TokenRecord>;

	/// Exchanges an authorization code for the session's first record.
	fn exchange_authorization_code<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		code: &'a str,
		redirect_uri: &'a Url,
	) -> FacadeFuture<'a, TokenRecord>;
}

pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: VendorClient,
	user_type: Option<UserType>,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: Option<&str>,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let mut oauth_client: VendorClient = Client::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		if let Some(secret) = client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}
		if matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, user_type: descriptor.quirks.user_type, http_client, error_mapper })
	}

	fn extra_form(
		&self,
		strategy: &dyn ProviderStrategy,
		grant: GrantType,
		user_type: Option<UserType>,
	) -> BTreeMap<String, String> {
		let mut form = BTreeMap::new();

		if let Some(user_type) = user_type {
			form.insert("user_type".into(), user_type.as_str().into());
		}

		strategy.augment_token_request(grant, &mut form);

		form
	}

	fn map_error(
		&self,
		strategy: &dyn ProviderStrategy,
		grant: GrantType,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		let meta = meta.as_ref();

		match err {
			RequestTokenError::ServerResponse(response) => {
				let mut ctx = ProviderErrorContext::new(grant)
					.with_oauth_error(response.error().as_ref().to_owned());

				if let Some(description) = response.error_description() {
					ctx = ctx.with_error_description(description.clone());
				}
				if let Some(status) = meta_status(meta) {
					ctx = ctx.with_http_status(status);
				}

				let message = response
					.error_description()
					.cloned()
					.unwrap_or_else(|| response.error().as_ref().to_owned());

				classified_error(strategy.classify_token_error(&ctx), grant, message, meta)
			},
			RequestTokenError::Request(error) =>
				self.error_mapper.map_transport_error(grant, meta, error),
			RequestTokenError::Parse(source, body) => match meta_status(meta) {
				Some(status) if !(200..300).contains(&status) => {
					let preview = String::from_utf8_lossy(&body).into_owned();
					let ctx = ProviderErrorContext::new(grant)
						.with_http_status(status)
						.with_body_preview(preview.clone());

					classified_error(strategy.classify_token_error(&ctx), grant, preview, meta)
				},
				status => TransientError::TokenResponseParse { source, status }.into(),
			},
			RequestTokenError::Other(message) => TransientError::TokenEndpoint {
				message,
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
		}
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn refresh_token<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		current: &'a TokenRecord,
	) -> FacadeFuture<'a, TokenRecord> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let secret = current.refresh_token.as_ref().ok_or_else(|| Error::Unauthenticated {
				reason: format!("session for tenant `{}` has no refresh token", current.tenant()),
			})?;
			let refresh_token = RefreshToken::new(secret.expose().to_owned());
			let instrumented = self.http_client.with_metadata(meta.clone());
			let user_type = self.user_type.map(|_| current.identity.user_type);
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_token);

			for (key, value) in self.extra_form(strategy, GrantType::RefreshToken, user_type) {
				request = request.add_extra_param(key, value);
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				self.map_error(strategy, GrantType::RefreshToken, meta.take(), err)
			})?;
			let next = build_record(&response, Some(&current.identity), current.identity.user_type)?;

			Ok(current.rotated(next))
		})
	}

	fn exchange_authorization_code<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		code: &'a str,
		redirect_uri: &'a Url,
	) -> FacadeFuture<'a, TokenRecord> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let redirect_url = RedirectUrl::new(redirect_uri.to_string())
				.map_err(|source| ConfigError::InvalidRedirect { source })?;
			let instrumented = self.http_client.with_metadata(meta.clone());
			let mut request = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_redirect_uri(Cow::Owned(redirect_url));

			for (key, value) in
				self.extra_form(strategy, GrantType::AuthorizationCode, self.user_type)
			{
				request = request.add_extra_param(key, value);
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				self.map_error(strategy, GrantType::AuthorizationCode, meta.take(), err)
			})?;

			build_record(&response, None, self.user_type.unwrap_or_default())
		})
	}
}

fn build_record(
	response: &VendorTokenResponse,
	fallback: Option<&SessionIdentity>,
	default_user_type: UserType,
) -> Result<TokenRecord> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;
	let identity = response.extra_fields().identity(fallback, default_user_type)?;
	let mut builder = TokenRecord::builder(identity)
		.access_token(response.access_token().secret().to_owned())
		.issued_now()
		.expires_in_secs(expires_in);

	if let Some(refresh) = response.refresh_token() {
		builder = builder.refresh_token(refresh.secret().to_owned());
	}

	builder.build().map_err(|e| ConfigError::from(e).into())
}

fn classified_error(
	kind: ProviderErrorKind,
	grant: GrantType,
	message: String,
	meta: Option<&ResponseMetadata>,
) -> Error {
	match (kind, grant) {
		(ProviderErrorKind::InvalidGrant, GrantType::RefreshToken) =>
			Error::RefreshRejected { reason: message },
		(ProviderErrorKind::InvalidGrant, GrantType::AuthorizationCode) =>
			Error::Unauthenticated { reason: format!("authorization code rejected: {message}") },
		(ProviderErrorKind::InvalidClient, _) => Error::InvalidClient { reason: message },
		(ProviderErrorKind::Transient, _) => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
