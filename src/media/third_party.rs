use super::{
    strategy::Strategy,
    types::{MediaResult, Outcome},
    utils::{first_json_str, json_str},
};
use crate::config::ThirdPartyConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Generic paid scraping API, in the shape RapidAPI-style providers expose.
pub struct ThirdPartyStrategy {
    client: reqwest::Client,
    api_key: String,
    host: String,
    endpoint: Url,
    method: Method,
    timeout: Duration,
}

impl ThirdPartyStrategy {
    /// Returns `None` when no API key is configured.
    pub fn new(config: &ThirdPartyConfig) -> Result<Option<Self>> {
        if !config.is_configured() {
            return Ok(None);
        }
        let api_key = config.api_key.clone().unwrap_or_default();

        let base = if config.host.contains("://") {
            config.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", config.host.trim_end_matches('/'))
        };
        let path = format!("/{}", config.path.trim_start_matches('/'));
        let endpoint = Url::parse(&format!("{base}{path}"))
            .with_context(|| format!("Invalid third-party API endpoint {base}{path}"))?;

        // The rapidapi host header wants the bare hostname.
        let host = endpoint.host_str().unwrap_or(&config.host).to_string();

        let method = Method::from_bytes(config.method.trim().to_uppercase().as_bytes())
            .with_context(|| format!("Invalid third-party API method {}", config.method))?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create third-party HTTP client")?;

        Ok(Some(Self {
            client,
            api_key,
            host,
            endpoint,
            method,
            timeout,
        }))
    }
}

/// Picks the widest entry of an Instagram `video_versions` list.
fn widest_version(versions: &[Value]) -> Option<String> {
    versions
        .iter()
        .filter_map(|v| Some((v["width"].as_u64().unwrap_or(0), json_str(v, "/url")?)))
        .max_by_key(|(width, _)| *width)
        .map(|(_, url)| url)
}

pub fn parse_response(data: &Value) -> Option<MediaResult> {
    if let Some(body) = data.pointer("/response/body") {
        if let Some(video) = json_str(body, "/video_url") {
            return MediaResult::new([video], json_str(body, "/thumbnail_url"));
        }

        let item = body.pointer("/items/0")?;
        let video = item
            .get("video_versions")
            .and_then(Value::as_array)
            .and_then(|versions| widest_version(versions));
        let thumbnail = json_str(item, "/image_versions2/candidates/0/url");
        return MediaResult::new(video, thumbnail);
    }

    let video = first_json_str(data, &["/video_url", "/link", "/url"]);
    let thumbnail = first_json_str(data, &["/thumbnail", "/thumb"]);
    MediaResult::new(video, thumbnail)
}

#[async_trait]
impl Strategy for ThirdPartyStrategy {
    fn name(&self) -> &'static str {
        "third-party"
    }

    async fn attempt(&self, url: &str) -> Result<Outcome> {
        info!(strategy = "third-party", endpoint = %self.endpoint, "Attempting third-party API");

        let mut request = if self.method == Method::GET {
            let mut endpoint = self.endpoint.clone();
            endpoint.query_pairs_mut().append_pair("url", url);
            self.client.get(endpoint)
        } else {
            self.client
                .request(self.method.clone(), self.endpoint.clone())
                .json(&json!({ "url": url }))
        };
        request = request
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", &self.host);

        let response = request
            .send()
            .await
            .context("Third-party API request failed")?
            .error_for_status()
            .context("Third-party API returned an error status")?;

        let data: Value = response
            .json()
            .await
            .context("Failed to parse third-party API response")?;
        debug!("third-party response: {}", data);

        Ok(Outcome::from_result(
            parse_response(&data),
            "third-party API returned no media",
        ))
    }

    fn timeout(&self) -> Duration {
        self.timeout + Duration::from_secs(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_not_configured_is_none() {
        assert!(ThirdPartyStrategy::new(&ThirdPartyConfig::default())
            .unwrap()
            .is_none());
        let blank = ThirdPartyConfig {
            api_key: Some("  ".into()),
            ..Default::default()
        };
        assert!(ThirdPartyStrategy::new(&blank).unwrap().is_none());
    }

    #[test]
    fn test_parse_nested_direct() {
        let media = parse_response(&json!({
            "response": {"body": {
                "video_url": "https://v/1.mp4",
                "thumbnail_url": "https://v/1.jpg"
            }}
        }))
        .unwrap();
        assert_eq!(media.primary_url(), "https://v/1.mp4");
        assert_eq!(media.thumbnail_url(), Some("https://v/1.jpg"));
    }

    #[test]
    fn test_parse_nested_items_picks_widest() {
        let media = parse_response(&json!({
            "response": {"body": {"items": [{
                "video_versions": [
                    {"width": 480, "url": "https://v/480.mp4"},
                    {"width": 1080, "url": "https://v/1080.mp4"},
                    {"width": 720, "url": "https://v/720.mp4"}
                ],
                "image_versions2": {"candidates": [{"url": "https://v/cover.jpg"}]}
            }]}}
        }))
        .unwrap();
        assert_eq!(media.primary_url(), "https://v/1080.mp4");
        assert_eq!(media.thumbnail_url(), Some("https://v/cover.jpg"));
    }

    #[test]
    fn test_parse_flat_shapes() {
        let media = parse_response(&json!({"link": "https://v/l.mp4", "thumb": "https://v/t.jpg"}))
            .unwrap();
        assert_eq!(media.primary_url(), "https://v/l.mp4");
        assert_eq!(media.thumbnail_url(), Some("https://v/t.jpg"));

        assert!(parse_response(&json!({"message": "quota exceeded"})).is_none());
        assert!(parse_response(&json!({"response": {"body": {"items": []}}})).is_none());
    }

    #[tokio::test]
    async fn test_get_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index"))
            .and(query_param("url", "https://www.instagram.com/p/A/"))
            .and(header("x-rapidapi-key", "k"))
            .and(header("x-rapidapi-host", "127.0.0.1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"url": "https://v/1.mp4"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let strategy = ThirdPartyStrategy::new(&ThirdPartyConfig {
            api_key: Some("k".into()),
            host: server.uri(),
            ..Default::default()
        })
        .unwrap()
        .unwrap();

        let outcome = strategy.attempt("https://www.instagram.com/p/A/").await.unwrap();
        assert!(matches!(outcome, Outcome::Resolved(m) if m.primary_url() == "https://v/1.mp4"));
    }

    #[tokio::test]
    async fn test_post_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/media"))
            .and(body_json(json!({"url": "https://www.instagram.com/p/A/"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"video_url": "https://v/2.mp4"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let strategy = ThirdPartyStrategy::new(&ThirdPartyConfig {
            api_key: Some("k".into()),
            host: server.uri(),
            path: "api/media".into(),
            method: "post".into(),
            ..Default::default()
        })
        .unwrap()
        .unwrap();

        let outcome = strategy.attempt("https://www.instagram.com/p/A/").await.unwrap();
        assert!(matches!(outcome, Outcome::Resolved(_)));
    }

    #[tokio::test]
    async fn test_non_2xx_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let strategy = ThirdPartyStrategy::new(&ThirdPartyConfig {
            api_key: Some("k".into()),
            host: server.uri(),
            ..Default::default()
        })
        .unwrap()
        .unwrap();

        assert!(strategy.attempt("https://www.instagram.com/p/A/").await.is_err());
    }
}
