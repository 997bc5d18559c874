//! Auth-domain identifiers, session identity, and token models.

pub mod id;
pub mod token;

pub use id::*;
pub use token::{identity::*, record::*, secret::*};
