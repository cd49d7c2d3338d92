use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use super::AppState;
use crate::auth::Claims;
use crate::error::AppError;

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// JWT authentication middleware.
///
/// Validates the bearer token and makes the caller's `Claims` available to
/// handlers as a request extension.
pub async fn jwt_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(req.headers())
        .ok_or_else(|| AppError::Auth("Missing bearer token".to_string()))?;

    let claims = state.jwt_validator.validate(token).map_err(|e| {
        tracing::warn!(error = %e, "JWT validation failed");
        e
    })?;

    tracing::debug!(subject = %claims.subject(), "Caller authenticated");
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Reject callers holding none of `roles` (`admin` always passes)
pub fn require_role(claims: &Claims, roles: &[&str]) -> Result<(), AppError> {
    if claims.has_any_role(roles) {
        Ok(())
    } else {
        tracing::warn!(subject = %claims.subject(), required = ?roles, "Caller lacks required role");
        Err(AppError::Forbidden(format!(
            "requires one of the roles: {}",
            roles.join(", ")
        )))
    }
}
