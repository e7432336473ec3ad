use super::{
    strategy::Strategy,
    types::{MediaResult, Outcome},
    utils::json_str,
};
use crate::{config::DirectConfig, utils::extract_shortcode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Scrapes Instagram's internal `?__a=1` post endpoint.
pub struct DirectStrategy {
    client: reqwest::Client,
    base_url: String,
    app_id: String,
    cookie: Option<String>,
    timeout: Duration,
}

impl DirectStrategy {
    pub fn new(config: &DirectConfig, cookie: Option<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(timeout)
            .build()
            .context("Failed to create direct-scrape HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            cookie,
            timeout,
        })
    }
}

/// Reads either the GraphQL or the mobile-API post envelope.
pub fn parse_post(data: &Value) -> Option<MediaResult> {
    if let Some(media) = data.pointer("/graphql/shortcode_media") {
        let video = json_str(media, "/video_url")?;
        return MediaResult::new([video], json_str(media, "/display_url"));
    }

    let item = data.pointer("/items/0")?;
    let video = json_str(item, "/video_versions/0/url")?;
    MediaResult::new([video], json_str(item, "/image_versions2/candidates/0/url"))
}

#[async_trait]
impl Strategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn attempt(&self, url: &str) -> Result<Outcome> {
        let Some(shortcode) = extract_shortcode(url) else {
            return Ok(Outcome::declined("no post identifier in URL"));
        };

        let endpoint = format!("{}/p/{}/?__a=1&__d=dis", self.base_url, shortcode);
        info!(strategy = "direct", %endpoint, "Attempting direct scrape");

        let mut request = self
            .client
            .get(&endpoint)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header("X-Requested-With", "XMLHttpRequest")
            .header("X-IG-App-ID", &self.app_id);
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .context("Direct scrape request failed")?
            .error_for_status()
            .context("Direct scrape returned an error status")?;

        let text = response
            .text()
            .await
            .context("Failed to read direct scrape response")?;

        // A login wall comes back as HTML with a 200.
        let data: Value = match serde_json::from_str(&text) {
            Ok(data) => data,
            Err(e) => {
                debug!(
                    "direct scrape returned non-JSON ({}): {}",
                    e,
                    crate::utils::snippet(&text, 200)
                );
                return Ok(Outcome::declined("response was not JSON"));
            }
        };

        Ok(Outcome::from_result(
            parse_post(&data),
            "no video in post payload",
        ))
    }

    fn timeout(&self) -> Duration {
        self.timeout + Duration::from_secs(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn strategy_for(server: &MockServer, cookie: Option<&str>) -> DirectStrategy {
        DirectStrategy::new(
            &DirectConfig {
                base_url: server.uri(),
                timeout_secs: 5,
                ..Default::default()
            },
            cookie.map(str::to_string),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_graphql_shape() {
        let media = parse_post(&json!({
            "graphql": {"shortcode_media": {
                "video_url": "https://y/v.mp4",
                "display_url": "https://y/d.jpg"
            }}
        }))
        .unwrap();
        assert_eq!(media.primary_url(), "https://y/v.mp4");
        assert_eq!(media.thumbnail_url(), Some("https://y/d.jpg"));
    }

    #[test]
    fn test_parse_mobile_shape() {
        let media = parse_post(&json!({
            "items": [{
                "video_versions": [{"url": "https://y/m.mp4"}],
                "image_versions2": {"candidates": [{"url": "https://y/c.jpg"}]}
            }]
        }))
        .unwrap();
        assert_eq!(media.primary_url(), "https://y/m.mp4");
        assert_eq!(media.thumbnail_url(), Some("https://y/c.jpg"));
    }

    #[test]
    fn test_parse_photo_post_declines() {
        assert!(parse_post(&json!({
            "graphql": {"shortcode_media": {"video_url": "", "display_url": "https://y/d.jpg"}}
        }))
        .is_none());
        assert!(parse_post(&json!({"items": [{"image_versions2": {}}]})).is_none());
        assert!(parse_post(&json!({"require_login": true})).is_none());
    }

    #[tokio::test]
    async fn test_declines_without_shortcode() {
        let server = MockServer::start().await;
        let strategy = strategy_for(&server, None);
        let outcome = strategy
            .attempt("https://www.instagram.com/someone/")
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Declined(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_shape_and_graphql_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p/ABC123/"))
            .and(query_param("__a", "1"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .and(header("cookie", "sessionid=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "graphql": {"shortcode_media": {
                    "video_url": "https://y/v.mp4",
                    "display_url": "https://y/d.jpg"
                }}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = strategy_for(&server, Some("sessionid=abc"));
        let outcome = strategy
            .attempt("https://www.instagram.com/reel/ABC123/?igsh=1")
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Resolved(m) if m.primary_url() == "https://y/v.mp4"));
    }

    #[tokio::test]
    async fn test_login_wall_html_declines() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<!DOCTYPE html><html>login</html>"),
            )
            .mount(&server)
            .await;

        let strategy = strategy_for(&server, None);
        let outcome = strategy.attempt("https://www.instagram.com/p/A/").await.unwrap();
        assert!(matches!(outcome, Outcome::Declined(_)));
    }

    #[tokio::test]
    async fn test_non_2xx_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let strategy = strategy_for(&server, None);
        assert!(strategy.attempt("https://www.instagram.com/p/A/").await.is_err());
    }
}
