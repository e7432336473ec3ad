use super::{error::ApiError, AppState};
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

const API_KEY_HEADER: &str = "x-api-key";
const API_KEY_PARAM: &str = "api_key";

/// Credential presented by the caller, from the bearer header, the
/// `X-API-Key` header, or the `api_key` query parameter.
fn presented_secret(request: &Request) -> Option<String> {
    // Other schemes (Basic from a proxy, say) are not ours to judge.
    if let Some(token) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    if let Some(value) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(value.trim().to_string());
    }

    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == API_KEY_PARAM)
        .map(|(_, value)| value.into_owned())
}

pub async fn require_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(secret) = state.secret.as_deref() else {
        return Ok(next.run(request).await);
    };

    match presented_secret(&request) {
        None => {
            warn!("Rejected request without credentials");
            Err(ApiError::Unauthorized)
        }
        Some(given) if given == secret => Ok(next.run(request).await),
        Some(_) => {
            warn!("Rejected request with wrong credentials");
            Err(ApiError::Forbidden)
        }
    }
}
