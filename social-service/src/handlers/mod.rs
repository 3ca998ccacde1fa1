//! HTTP handlers for social-service.

pub mod auth;
pub mod metrics;
pub mod relationships;

pub use auth::*;
pub use relationships::*;
