//! Vendor-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering HTTPS-only
//! endpoints, supported grants, client authentication preference, default scopes, and vendor
//! quirks (account level, scope delimiter). `strategy` defines [`ProviderStrategy`], the hook flows
//! use to decorate token requests and map token endpoint failures into the broker taxonomy.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
