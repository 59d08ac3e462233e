//! Carina Core
//!
//! Provider-facing contract of an infrastructure management tool that treats
//! side effects as values: resource and state records, typed schemas,
//! the `Provider` trait and attribute diffing.

pub mod differ;
pub mod provider;
pub mod resource;
pub mod schema;
