//! Token records, their owning session identity, and redacted secrets.

pub mod identity;
pub mod record;
pub mod secret;
