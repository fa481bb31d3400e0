//! Admin token authentication

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_CONTEXT: &[u8] = b"arena-admin";

fn token_tag(token: &str) -> Result<HmacSha256, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(token.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(TOKEN_CONTEXT);
    Ok(mac)
}

/// Compare a presented token against the configured one in constant time
pub fn verify_token(presented: &str, expected: &str) -> Result<(), AuthError> {
    let expected_tag = token_tag(expected)?.finalize().into_bytes();
    token_tag(presented)?
        .verify_slice(&expected_tag)
        .map_err(|_| AuthError::InvalidToken)
}

/// Extract token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Invalid authorization header format")]
    InvalidFormat,

    #[error("Invalid token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingHeader => StatusCode::UNAUTHORIZED,
            AuthError::InvalidFormat => StatusCode::BAD_REQUEST,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
        };

        (status, self.to_string()).into_response()
    }
}

/// Middleware to require the admin token
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingHeader)?;

    let token = extract_bearer_token(auth_header).ok_or(AuthError::InvalidFormat)?;

    if let Err(e) = verify_token(token, &state.config.admin_token) {
        warn!(path = %request.uri().path(), "Rejected admin request");
        return Err(e);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_must_match_exactly() {
        assert!(verify_token("s3cret", "s3cret").is_ok());
        assert!(verify_token("s3cret ", "s3cret").is_err());
        assert!(verify_token("", "s3cret").is_err());
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(extract_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
    }
}
