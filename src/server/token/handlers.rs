use axum::{body::Bytes, extract::State, http::Method, Json};

use super::models::ExecCredential;
use crate::server::error::ServerError;
use crate::server::state::AppState;

/// Mint a token for the requested role
///
/// Accepts every method so the broker can answer non-POST requests with 405
/// after authentication has run. The body is read raw so malformed JSON maps
/// to a plain 400.
pub async fn issue_token(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Result<Json<ExecCredential>, ServerError> {
    let credential = state.broker.handle(&method, &body).await?;
    Ok(Json(credential))
}
