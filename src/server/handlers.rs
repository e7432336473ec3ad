use super::{
    error::{ApiError, ApiResult},
    AppState,
};
use axum::extract::{rejection::QueryRejection, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct FetchParams {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub success: bool,
    pub video_url: String,
    pub url_list: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub source: &'static str,
}

pub async fn root() -> &'static str {
    "Instagram bridge is running. POST to /fetch to use."
}

pub async fn fetch(
    State(state): State<AppState>,
    query: Result<Query<FetchParams>, QueryRejection>,
    body: Option<Json<FetchParams>>,
) -> ApiResult<Json<FetchResponse>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let url = body
        .and_then(|Json(params)| params.url)
        .or(query.url)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("URL is required".to_string()))?;

    info!("Fetching: {}", url);

    // A panic inside a strategy must not take the connection down with it.
    let resolver = state.resolver.clone();
    let resolution = tokio::spawn(async move { resolver.resolve(&url).await })
        .await
        .map_err(|e| ApiError::internal(format!("Resolution task failed: {e}")))?
        .ok_or(ApiError::NoMedia)?;

    let media = resolution.media;
    Ok(Json(FetchResponse {
        success: true,
        video_url: media.primary_url().to_string(),
        url_list: media.media_urls().to_vec(),
        image_url: media.thumbnail_url().map(str::to_string),
        source: resolution.strategy,
    }))
}
