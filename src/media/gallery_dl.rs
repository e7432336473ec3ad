use super::library::{run_extractor, ExtractedMedia, MediaExtractor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct GalleryDlExtractor {
    binary: String,
    timeout: Duration,
}

impl GalleryDlExtractor {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

/// gallery-dl emits `[[type, metadata], [type, url, metadata], ...]`.
pub fn parse_dump(json_str: &str) -> Result<ExtractedMedia> {
    let json_array: Value =
        serde_json::from_str(json_str).context("Failed to parse media metadata")?;

    let array = json_array
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid media metadata format"))?;

    let mut urls = Vec::new();
    let mut thumbnail = None;

    for item in array {
        let Some(item_array) = item.as_array() else {
            continue;
        };
        if item_array.len() != 3 {
            continue;
        }
        if let Some(url_str) = item_array[1].as_str() {
            urls.push(url_str.to_string());

            if thumbnail.is_none() {
                thumbnail = item_array[2]["display_url"]
                    .as_str()
                    .or(item_array[2]["thumbnail"].as_str())
                    .map(|s| s.to_string());
            }
        }
    }

    debug!("Found {} media URLs", urls.len());
    Ok(ExtractedMedia { urls, thumbnail })
}

#[async_trait]
impl MediaExtractor for GalleryDlExtractor {
    fn name(&self) -> &'static str {
        "gallery-dl"
    }

    async fn extract(&self, url: &str) -> Result<ExtractedMedia> {
        debug!("Extracting media URLs with gallery-dl for: {}", url);
        let stdout = run_extractor(&self.binary, &["--dump-json"], url, self.timeout).await?;
        parse_dump(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dump_collects_urls() {
        let dump = r#"[
            [2, {"username": "someone"}],
            [3, "https://cdn/1.mp4", {"display_url": "https://cdn/1.jpg", "extension": "mp4"}],
            [3, "https://cdn/2.jpg", {"extension": "jpg"}]
        ]"#;
        let media = parse_dump(dump).unwrap();
        assert_eq!(media.urls, vec!["https://cdn/1.mp4", "https://cdn/2.jpg"]);
        assert_eq!(media.thumbnail.as_deref(), Some("https://cdn/1.jpg"));
    }

    #[test]
    fn test_parse_dump_empty_array() {
        let media = parse_dump("[]").unwrap();
        assert!(media.urls.is_empty());
    }

    #[test]
    fn test_parse_dump_rejects_non_array() {
        assert!(parse_dump(r#"{"error": "x"}"#).is_err());
        assert!(parse_dump("not json").is_err());
    }

    #[tokio::test]
    #[ignore = "Requires gallery-dl installed"]
    async fn test_gallery_dl_available() {
        let extractor = GalleryDlExtractor::new("gallery-dl", Duration::from_secs(30));
        let result = extractor.extract("https://www.instagram.com/p/DSF-umYCWkZ/").await;
        assert!(result.is_ok());
    }
}
