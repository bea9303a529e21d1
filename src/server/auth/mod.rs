//! Shared-secret authentication for the token endpoint

pub mod middleware;

pub use middleware::{auth_middleware, Authenticator};
