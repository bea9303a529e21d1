pub mod broker;
pub mod handlers;
pub mod models;
pub mod routes;

pub use broker::{IssuanceConfig, TokenBroker};
