use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::server::error::ServerError;
use crate::server::state::AppState;

/// Authorization scheme expected in front of the shared secret
const TOKEN_SCHEME: &str = "Token";

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header required")]
    MissingHeader,

    #[error("Invalid authorization format")]
    MalformedHeader,

    #[error("Invalid token")]
    InvalidToken,
}

impl From<AuthError> for ServerError {
    fn from(err: AuthError) -> Self {
        ServerError::unauthorized(err.to_string())
    }
}

/// Shared-secret gate for the token endpoint
///
/// With no secret configured every request passes.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    secret: Option<String>,
}

impl Authenticator {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Check the `Authorization: Token <secret>` header
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };

        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingHeader)?;

        // An empty header value counts as absent
        if value.is_empty() {
            return Err(AuthError::MissingHeader);
        }

        let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;
        let presented = parse_token_header(value).ok_or(AuthError::MalformedHeader)?;

        if bool::from(presented.as_bytes().ct_eq(secret.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Split `Token <secret>` on single spaces; exactly two parts with the exact scheme word
fn parse_token_header(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    let scheme = parts.next()?;
    let token = parts.next()?;

    if parts.next().is_some() || scheme != TOKEN_SCHEME {
        return None;
    }

    Some(token)
}

/// Middleware that short-circuits with 401 unless the request carries the shared secret
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ServerError> {
    if let Err(err) = state.authenticator.authorize(req.headers()) {
        match err {
            AuthError::MissingHeader => {
                tracing::warn!(path = %req.uri().path(), "Rejected request without Authorization header")
            }
            AuthError::MalformedHeader => {
                tracing::warn!(path = %req.uri().path(), "Rejected request with malformed Authorization header")
            }
            AuthError::InvalidToken => {
                tracing::warn!(path = %req.uri().path(), "Rejected request with invalid shared secret")
            }
        }
        return Err(err.into());
    }

    Ok(next.run(req).await)
}
