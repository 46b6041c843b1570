use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine as _;

use crate::envelope::Envelope;
use crate::identity::Identity;
use crate::state::AppState;

fn basic_credentials(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (name, password) = text.split_once(':')?;
    Some((name.to_string(), password.to_string()))
}

/// A bearer token is accepted in `name:password` form, the same credential
/// pair as Basic auth.
fn bearer_credentials(value: &str) -> Option<(String, String)> {
    let token = value.strip_prefix("Bearer ")?;
    let (name, password) = token.split_once(':')?;
    Some((name.to_string(), password.to_string()))
}

fn unauthorized() -> Response {
    (
        axum::http::StatusCode::UNAUTHORIZED,
        Envelope { status: false, message: "unauthenticated".into(), data: serde_json::Value::Null },
    )
        .into_response()
}

fn too_many_requests() -> Response {
    (
        axum::http::StatusCode::TOO_MANY_REQUESTS,
        Envelope { status: false, message: "rate limit exceeded".into(), data: serde_json::Value::Null },
    )
        .into_response()
}

/// Resolves the caller's [`Identity`] from the `Authorization` header (Basic
/// or Bearer), falling back to anonymous only when `disable_auth` is set
/// (§4.7, §6), then enforces the per-identity rate limit (§5) before handing
/// off to the route handler.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let identity = match header.as_deref() {
        Some(value) => {
            let credentials = basic_credentials(value).or_else(|| bearer_credentials(value));
            match credentials {
                Some((name, password)) => match state.users.authenticate(&name, &password) {
                    Some(identity) => identity,
                    None => return unauthorized(),
                },
                None => return unauthorized(),
            }
        }
        None if state.config.disable_auth => Identity::Admin { name: "anonymous".into() },
        None => return unauthorized(),
    };

    let rate_key = format!("user:{}", identity.name());
    let limit = state
        .users
        .get(identity.name())
        .and_then(|u| u.rate_limit_per_min)
        .unwrap_or(if identity.is_admin() { u32::MAX } else { 60 });
    let now = chrono::Utc::now().timestamp() as u64;
    if !state.rate_limiter.admit(&rate_key, limit, now) {
        return too_many_requests();
    }

    request.extensions_mut().insert(identity);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_header() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("alice:hunter2");
        let header = format!("Basic {encoded}");
        assert_eq!(basic_credentials(&header), Some(("alice".into(), "hunter2".into())));
    }

    #[test]
    fn parses_bearer_header_as_name_password_pair() {
        assert_eq!(
            bearer_credentials("Bearer alice:hunter2"),
            Some(("alice".into(), "hunter2".into()))
        );
    }

    #[test]
    fn malformed_header_yields_no_credentials() {
        assert_eq!(basic_credentials("Basic not-base64!!"), None);
        assert_eq!(bearer_credentials("Bearer no-colon-here"), None);
    }
}
