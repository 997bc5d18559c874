//! Vendor identifiers for locations, users, companies, and provider descriptors.
//!
//! CRM identifiers are opaque ASCII tokens (e.g. `ve9EPM428h8vShlRW1KT`). Anything outside
//! `[A-Za-z0-9._-]` is rejected so an identifier is always safe to embed in cookie names, file
//! snapshots, and log fields.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

/// Longest identifier accepted, in bytes.
pub const IDENTIFIER_MAX_LEN: usize = 128;

/// Which identifier failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
	/// [`TenantId`].
	Tenant,
	/// [`UserId`].
	User,
	/// [`CompanyId`].
	Company,
	/// [`ProviderId`].
	Provider,
}
impl IdentifierKind {
	/// Label used in debug output and error messages.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Tenant => "Tenant",
			Self::User => "User",
			Self::Company => "Company",
			Self::Provider => "Provider",
		}
	}
}
impl Display for IdentifierKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Identifier being validated.
		kind: IdentifierKind,
	},
	/// The identifier contains a character outside `[A-Za-z0-9._-]`.
	#[error("{kind} identifier contains {found:?} at byte {index}.")]
	InvalidCharacter {
		/// Identifier being validated.
		kind: IdentifierKind,
		/// Offending character.
		found: char,
		/// Byte offset of the offending character.
		index: usize,
	},
	/// The identifier is longer than [`IDENTIFIER_MAX_LEN`].
	#[error("{kind} identifier is {len} bytes; the limit is {IDENTIFIER_MAX_LEN}.")]
	TooLong {
		/// Identifier being validated.
		kind: IdentifierKind,
		/// Observed length in bytes.
		len: usize,
	},
}

macro_rules! vendor_id {
	($(#[$meta:meta])* $name:ident => $kind:ident) => {
		$(#[$meta])*
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Validates and wraps a vendor identifier.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let value = value.as_ref();

				validate(IdentifierKind::$kind, value)?;

				Ok(Self(value.to_owned()))
			}

			/// Identifier as a string slice.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate(IdentifierKind::$kind, &value)?;

				Ok(Self(value))
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, "{}({})", IdentifierKind::$kind, self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

vendor_id! {
	/// Location (or company, for agency-level installs) that keys a cached session.
	TenantId => Tenant
}
vendor_id! {
	/// User that authorized the session.
	UserId => User
}
vendor_id! {
	/// Company (agency) that owns the location.
	CompanyId => Company
}
vendor_id! {
	/// Name of a vendor provider descriptor.
	ProviderId => Provider
}

fn validate(kind: IdentifierKind, value: &str) -> Result<(), IdentifierError> {
	if value.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if let Some((index, found)) = value
		.char_indices()
		.find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
	{
		return Err(IdentifierError::InvalidCharacter { kind, found, index });
	}
	if value.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, len: value.len() });
	}

	Ok(())
}
