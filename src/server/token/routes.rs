use axum::{middleware, routing::any, Router};

use super::handlers;
use crate::server::auth::auth_middleware;
use crate::server::state::AppState;

/// Token routes, gated by the shared-secret middleware
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/token", any(handlers::issue_token))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
