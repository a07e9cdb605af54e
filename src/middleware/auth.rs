use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::errors::auth_error::AuthError;
use crate::state::AppState;

fn api_secret_matches(token: &str, secret: &str) -> bool {
    bool::from(token.as_bytes().ct_eq(secret.as_bytes()))
}

/// Bearer-secret middleware for operator-facing routes
///
/// ACS and EventGrid never call these routes, so only the outbound call
/// trigger sits behind it. When `AUTH_API_SECRET` is unset the request passes
/// through untouched.
///
/// Returns 401 when the header is missing, malformed, or does not match.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(secret) = state.config.auth_api_secret.as_deref() else {
        tracing::debug!("Authentication disabled, passing request through");
        return Ok(next.run(request).await);
    };

    let request_method = request.method().to_string();
    let request_path = request.uri().path().to_string();

    let auth_header = request
        .headers()
        .get("authorization")
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;

    if api_secret_matches(token, secret) {
        tracing::debug!(
            method = %request_method,
            path = %request_path,
            "API secret authentication successful"
        );
        Ok(next.run(request).await)
    } else {
        tracing::warn!(
            method = %request_method,
            path = %request_path,
            "API secret authentication failed: token mismatch"
        );
        Err(AuthError::Unauthorized("Invalid API secret".to_string()))
    }
}
