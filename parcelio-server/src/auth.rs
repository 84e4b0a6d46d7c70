use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::server::ServerState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Reject any request without matching Basic credentials. Runs before
/// routing, so favicon and preflight requests are covered too.
pub async fn require_basic_auth(
    State(state): State<Arc<ServerState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(auth) = state.config.active_auth() else {
        return Ok(next.run(req).await);
    };

    if credentials_match(req.headers(), auth) {
        return Ok(next.run(req).await);
    }

    tracing::warn!(
        method = %req.method(),
        path = %req.uri().path(),
        "rejected request with missing or invalid credentials"
    );
    Err(ApiError::Unauthorized)
}

fn credentials_match(headers: &HeaderMap, auth: &AuthConfig) -> bool {
    let Some((username, password)) = parse_basic(headers) else {
        return false;
    };

    // Evaluate both comparisons so timing does not reveal which one failed.
    let user_ok: bool = username.as_bytes().ct_eq(auth.username.as_bytes()).into();
    let pass_ok: bool = password.as_bytes().ct_eq(auth.password.as_bytes()).into();
    user_ok & pass_ok
}

fn parse_basic(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
