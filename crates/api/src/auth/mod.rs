//! Bearer token handling.
//!
//! Users are managed by an external identity service; this crate only
//! validates the access tokens it issues.

pub mod jwt;
