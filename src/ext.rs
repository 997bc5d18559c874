//! Extension contracts applied to outbound vendor calls.
//!
//! [`RequestDecorator`] attaches credentials and static vendor headers to every attempt made by
//! [`ResilientClient`](crate::client::ResilientClient).

pub mod request_decorator;

pub use request_decorator::*;
