use super::library::{run_extractor, ExtractedMedia, MediaExtractor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct YtDlpExtractor {
    binary: String,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

pub fn parse_info(json_str: &str) -> Result<ExtractedMedia> {
    let json: Value = serde_json::from_str(json_str).context("Failed to parse media metadata")?;

    let mut urls: Vec<String> = Vec::new();
    if let Some(url) = json["url"].as_str() {
        urls.push(url.to_string());
    } else if let Some(formats) = json["requested_formats"].as_array() {
        // Separate video and audio streams; video comes first.
        urls.extend(
            formats
                .iter()
                .filter_map(|f| f["url"].as_str())
                .map(|s| s.to_string()),
        );
    }

    Ok(ExtractedMedia {
        urls,
        thumbnail: json["thumbnail"].as_str().map(|s| s.to_string()),
    })
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract(&self, url: &str) -> Result<ExtractedMedia> {
        debug!("Extracting media URLs with yt-dlp for: {}", url);
        let stdout = run_extractor(
            &self.binary,
            &["--dump-json", "--no-download", "--no-warnings"],
            url,
            self.timeout,
        )
        .await?;
        parse_info(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_single_url() {
        let media = parse_info(
            r#"{"id": "ABC", "url": "https://cdn/v.mp4", "thumbnail": "https://cdn/t.jpg"}"#,
        )
        .unwrap();
        assert_eq!(media.urls, vec!["https://cdn/v.mp4"]);
        assert_eq!(media.thumbnail.as_deref(), Some("https://cdn/t.jpg"));
    }

    #[test]
    fn test_parse_info_requested_formats() {
        let media = parse_info(
            r#"{"requested_formats": [{"url": "https://cdn/video"}, {"url": "https://cdn/audio"}]}"#,
        )
        .unwrap();
        assert_eq!(media.urls, vec!["https://cdn/video", "https://cdn/audio"]);
        assert!(media.thumbnail.is_none());
    }

    #[test]
    fn test_parse_info_without_urls() {
        let media = parse_info(r#"{"id": "ABC"}"#).unwrap();
        assert!(media.urls.is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_error() {
        let extractor = YtDlpExtractor::new("/nonexistent/yt-dlp", Duration::from_secs(5));
        assert!(extractor.extract("https://www.instagram.com/p/A/").await.is_err());
    }
}
