//! Authorization Code flow: authorize URL construction and code exchange.
//!
//! [`Broker::start_authorization`] mints a random `state` and the vendor's location-chooser
//! URL. The host keeps the returned [`AuthorizationSession`] (it is serializable, e.g. into a
//! signed cookie) and passes it back to [`Broker::complete_authorization`] from the redirect
//! handler, which validates `state`, exchanges the code, and stores the first token record.

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	flows::{Broker, common},
	http::TokenHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::GrantType,
};

const STATE_LEN: usize = 32;

/// Pending authorization handshake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationSession {
	/// Opaque value that must round-trip through the vendor redirect.
	pub state: String,
	/// Redirect URI registered with the vendor.
	pub redirect_uri: Url,
	/// URL the user is sent to.
	pub authorize_url: Url,
	/// When the handshake started.
	#[serde(with = "time::serde::rfc3339")]
	pub started_at: OffsetDateTime,
}
impl AuthorizationSession {
	/// Checks the `state` returned on the redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		let matches = self.state.len() == returned_state.len()
			&& self
				.state
				.bytes()
				.zip(returned_state.bytes())
				.fold(0_u8, |acc, (left, right)| acc | (left ^ right))
				== 0;

		if matches {
			Ok(())
		} else {
			Err(Error::Unauthenticated { reason: "authorization state mismatch".into() })
		}
	}
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts an authorization handshake that returns to `redirect_uri`.
	pub fn start_authorization(&self, redirect_uri: Url) -> Result<AuthorizationSession> {
		common::ensure_grant(self, GrantType::AuthorizationCode)?;

		let state = random_state();
		let mut authorize_url = self.descriptor.endpoints.authorization.clone();

		{
			let mut pairs = authorize_url.query_pairs_mut();

			pairs.append_pair("response_type", "code");
			pairs.append_pair("client_id", &self.client_id);
			pairs.append_pair("redirect_uri", redirect_uri.as_str());

			if let Some(scope) = self.descriptor.scope_param() {
				pairs.append_pair("scope", &scope);
			}

			pairs.append_pair("state", &state);
		}

		Ok(AuthorizationSession {
			state,
			redirect_uri,
			authorize_url,
			started_at: OffsetDateTime::now_utc(),
		})
	}

	/// Exchanges an authorization code and stores the resulting session.
	pub async fn exchange_authorization_code(
		&self,
		code: &str,
		redirect_uri: &Url,
	) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::Authorize;

		let span = FlowSpan::new(KIND, "exchange_authorization_code");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				common::ensure_grant(self, GrantType::AuthorizationCode)?;

				let facade = common::facade(self)?;
				let record = facade
					.exchange_authorization_code(self.strategy.as_ref(), code, redirect_uri)
					.await?;

				self.store.put(record.clone()).await?;

				Ok(record)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Validates the returned `state` and exchanges `code` for the session.
	pub async fn complete_authorization(
		&self,
		session: &AuthorizationSession,
		returned_state: &str,
		code: &str,
	) -> Result<TokenRecord> {
		session.validate_state(returned_state)?;

		self.exchange_authorization_code(code, &session.redirect_uri).await
	}
}

fn random_state() -> String {
	rand::rng().sample_iter(Alphanumeric).take(STATE_LEN).map(char::from).collect()
}
