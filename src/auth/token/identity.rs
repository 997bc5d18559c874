//! Session identity: the tenant key plus the auxiliary identifiers that travel with a token.

// self
use crate::{
	_prelude::*,
	auth::{CompanyId, TenantId, UserId},
};

/// Kind of account a token was issued for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserType {
	#[default]
	/// Sub-account (location) token.
	Location,
	/// Agency-level (company) token.
	Company,
}
impl UserType {
	/// Returns the label the vendor expects in `user_type` form fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			UserType::Location => "Location",
			UserType::Company => "Company",
		}
	}
}
impl Display for UserType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for UserType {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		if s.eq_ignore_ascii_case("location") {
			Ok(Self::Location)
		} else if s.eq_ignore_ascii_case("company") {
			Ok(Self::Company)
		} else {
			Err(Error::InvalidClient { reason: format!("unknown user type `{s}`") })
		}
	}
}

/// Identifies who a cached token belongs to.
///
/// Only `tenant` keys the store; `user_id` and `company_id` are carried with the record and are
/// dropped together with it when the session is cleared.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionIdentity {
	/// Location (or company) identifier keying the session.
	pub tenant: TenantId,
	/// Signed-in user, when the vendor reported one.
	pub user_id: Option<UserId>,
	/// Owning company, when the vendor reported one.
	pub company_id: Option<CompanyId>,
	/// Account level the token was issued for.
	pub user_type: UserType,
}
impl SessionIdentity {
	/// Creates an identity for a location-level tenant with no auxiliary identifiers.
	pub fn new(tenant: TenantId) -> Self {
		Self { tenant, user_id: None, company_id: None, user_type: UserType::Location }
	}

	/// Attaches the user identifier.
	pub fn with_user(mut self, user_id: UserId) -> Self {
		self.user_id = Some(user_id);

		self
	}

	/// Attaches the company identifier.
	pub fn with_company(mut self, company_id: CompanyId) -> Self {
		self.company_id = Some(company_id);

		self
	}

	/// Overrides the account level.
	pub fn with_user_type(mut self, user_type: UserType) -> Self {
		self.user_type = user_type;

		self
	}

	/// Fills auxiliary identifiers missing from `self` with those known to `previous`.
	///
	/// Refresh responses often omit `userId`/`companyId`; the old values stay valid.
	pub fn inherit(mut self, previous: &SessionIdentity) -> Self {
		if self.user_id.is_none() {
			self.user_id = previous.user_id.clone();
		}
		if self.company_id.is_none() {
			self.company_id = previous.company_id.clone();
		}

		self
	}
}
