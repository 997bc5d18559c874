// self
use crate::{_prelude::*, auth::UserType};

/// Vendor-specific quirks that influence how flows behave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Account level sent as `user_type` on token requests; `None` omits the field.
	pub user_type: Option<UserType>,
	/// Character used to join scopes in the authorize URL.
	pub scope_delimiter: char,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { user_type: Some(UserType::Location), scope_delimiter: ' ' }
	}
}
