use super::{
    strategy::Strategy,
    types::{MediaResult, Outcome},
    utils::{first_json_str, json_str},
};
use crate::config::CobaltConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The service moved from `/api/json` to the root path; both are still deployed.
const API_PATHS: [&str; 2] = ["/", "/api/json"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CobaltRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_quality: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename_style: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    download_mode: Option<&'a str>,
}

pub struct CobaltStrategy {
    client: reqwest::Client,
    instances: Vec<String>,
    config: CobaltConfig,
}

impl CobaltStrategy {
    pub fn new(config: &CobaltConfig) -> Result<Self> {
        // Some mirrors filter on client fingerprint and others run self-signed certs.
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create cobalt HTTP client")?;

        Ok(Self {
            client,
            instances: config.instances(),
            config: config.clone(),
        })
    }

    fn endpoints(&self) -> impl Iterator<Item = String> + '_ {
        self.instances.iter().flat_map(|instance| {
            API_PATHS.iter().map(move |path| {
                if *path == "/" {
                    format!("{instance}/")
                } else {
                    format!("{instance}{path}")
                }
            })
        })
    }

    async fn post(&self, endpoint: &str, url: &str) -> Result<Value> {
        let body = CobaltRequest {
            url,
            video_quality: self.config.video_quality.as_deref(),
            filename_style: self.config.filename_style.as_deref(),
            download_mode: self.config.download_mode.as_deref(),
        };

        let response = self
            .client
            .post(endpoint)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .context("Request to cobalt failed")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read cobalt response")?;

        // Structured errors come back with 4xx codes, so parse before checking status.
        serde_json::from_str(&text).with_context(|| {
            format!(
                "Invalid JSON from cobalt (HTTP {}): {}",
                status,
                crate::utils::snippet(&text, 100)
            )
        })
    }
}

/// Probes the known cobalt response shapes for media and thumbnail URLs.
pub fn parse_response(data: &Value) -> Option<MediaResult> {
    let picker: Vec<&Value> = data
        .get("picker")
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
        .unwrap_or_default();

    let picker_urls: Vec<String> = picker
        .iter()
        .filter_map(|item| json_str(item, "/url"))
        .collect();

    let mut urls = Vec::new();
    if let Some(url) = json_str(data, "/url") {
        urls.push(url);
    }
    for picked in picker_urls {
        if !urls.contains(&picked) {
            urls.push(picked);
        }
    }
    if urls.is_empty() {
        urls.extend(json_str(data, "/stream"));
    }

    let thumbnail = picker
        .first()
        .and_then(|item| json_str(item, "/thumb"))
        .or_else(|| first_json_str(data, &["/thumb", "/thumbnail"]));

    MediaResult::new(urls, thumbnail)
}

fn error_code(data: &Value) -> String {
    first_json_str(data, &["/error/code", "/text", "/error"]).unwrap_or_else(|| data.to_string())
}

#[async_trait]
impl Strategy for CobaltStrategy {
    fn name(&self) -> &'static str {
        "cobalt"
    }

    async fn attempt(&self, url: &str) -> Result<Outcome> {
        for endpoint in self.endpoints() {
            info!(strategy = "cobalt", %endpoint, "Attempting cobalt API");

            let data = match self.post(&endpoint, url).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(strategy = "cobalt", %endpoint, "Cobalt request failed: {:#}", e);
                    continue;
                }
            };
            debug!("cobalt response from {}: {}", endpoint, data);

            if data.get("status").and_then(Value::as_str) == Some("error") {
                warn!(
                    strategy = "cobalt",
                    %endpoint,
                    "Cobalt returned error: {}",
                    error_code(&data)
                );
                continue;
            }

            match parse_response(&data) {
                Some(media) => {
                    info!(strategy = "cobalt", %endpoint, "Cobalt resolved media");
                    return Ok(Outcome::Resolved(media));
                }
                None => {
                    warn!(strategy = "cobalt", %endpoint, "Cobalt response had no media URL");
                }
            }
        }

        Ok(Outcome::declined("all cobalt instances failed"))
    }

    /// Long enough to walk every endpoint; the configured value is a floor.
    fn timeout(&self) -> Duration {
        let endpoints = (self.instances.len() * API_PATHS.len()).max(1) as u32;
        let walk = Duration::from_secs(self.config.request_timeout_secs) * endpoints
            + Duration::from_secs(5);
        walk.max(Duration::from_secs(self.config.strategy_timeout_secs))
    }
}
