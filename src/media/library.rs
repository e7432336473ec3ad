use super::{
    gallery_dl::GalleryDlExtractor,
    strategy::Strategy,
    types::{MediaResult, Outcome},
    ytdlp::YtDlpExtractor,
};
use crate::config::LibraryConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Candidate media URLs reported by an extraction routine.
#[derive(Debug, Default)]
pub struct ExtractedMedia {
    pub urls: Vec<String>,
    pub thumbnail: Option<String>,
}

#[async_trait]
pub trait MediaExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, url: &str) -> Result<ExtractedMedia>;
}

/// Runs an extractor binary and returns its stdout.
pub async fn run_extractor(
    binary: &str,
    args: &[&str],
    url: &str,
    timeout: Duration,
) -> Result<String> {
    let output = tokio::time::timeout(
        timeout,
        tokio::process::Command::new(binary)
            .args(args)
            .arg(url)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .context("Media metadata extraction timed out")?
    .with_context(|| format!("Failed to run {binary}"))?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow::anyhow!(
            "Media metadata extraction failed: {}",
            error.trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Checks that an external tool is installed by asking for its version.
pub async fn probe_binary(binary: &str, version_arg: &str) -> bool {
    match tokio::process::Command::new(binary)
        .arg(version_arg)
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string();
            info!("✅ {} is available: {}", binary, version);
            true
        }
        Ok(_) => {
            warn!("❌ {} command failed", binary);
            false
        }
        Err(e) => {
            warn!("❌ {} not found: {}", binary, e);
            false
        }
    }
}

pub struct LibraryStrategy {
    extractors: Vec<Box<dyn MediaExtractor>>,
    timeout: Duration,
}

impl LibraryStrategy {
    pub fn new(config: &LibraryConfig) -> Self {
        let per_call = Duration::from_secs(config.timeout_secs);
        let mut extractors: Vec<Box<dyn MediaExtractor>> = Vec::new();

        for backend in &config.backends {
            match backend.as_str() {
                "gallery-dl" => extractors.push(Box::new(GalleryDlExtractor::new(
                    config.gallery_dl_path.clone(),
                    per_call,
                ))),
                "yt-dlp" => extractors.push(Box::new(YtDlpExtractor::new(
                    config.ytdlp_path.clone(),
                    per_call,
                ))),
                other => warn!("Unknown library backend {:?}, ignoring", other),
            }
        }

        let timeout = per_call * extractors.len().max(1) as u32 + Duration::from_secs(5);
        Self {
            extractors,
            timeout,
        }
    }

    #[cfg(test)]
    pub fn with_extractors(extractors: Vec<Box<dyn MediaExtractor>>) -> Self {
        let timeout = Duration::from_secs(30) * extractors.len().max(1) as u32;
        Self {
            extractors,
            timeout,
        }
    }
}

#[async_trait]
impl Strategy for LibraryStrategy {
    fn name(&self) -> &'static str {
        "library"
    }

    async fn attempt(&self, url: &str) -> Result<Outcome> {
        for extractor in &self.extractors {
            match extractor.extract(url).await {
                Ok(extracted) => {
                    if let Some(media) = MediaResult::new(extracted.urls, extracted.thumbnail) {
                        info!(strategy = "library", backend = extractor.name(), "Resolved media");
                        return Ok(Outcome::Resolved(media));
                    }
                    warn!(
                        strategy = "library",
                        backend = extractor.name(),
                        "Extractor returned no media URLs"
                    );
                }
                Err(e) => {
                    warn!(
                        strategy = "library",
                        backend = extractor.name(),
                        "Extractor failed: {:#}",
                        e
                    );
                }
            }
        }

        Ok(Outcome::declined("no library backend returned media"))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<Vec<&'static str>, &'static str>);

    #[async_trait]
    impl MediaExtractor for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn extract(&self, _url: &str) -> Result<ExtractedMedia> {
            match &self.0 {
                Ok(urls) => Ok(ExtractedMedia {
                    urls: urls.iter().map(|u| u.to_string()).collect(),
                    thumbnail: None,
                }),
                Err(e) => Err(anyhow::anyhow!(*e)),
            }
        }
    }

    #[test]
    fn test_new_respects_backend_order() {
        let strategy = LibraryStrategy::new(&LibraryConfig {
            backends: vec!["yt-dlp".into(), "bogus".into(), "gallery-dl".into()],
            ..Default::default()
        });
        let names: Vec<_> = strategy.extractors.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["yt-dlp", "gallery-dl"]);
    }

    #[tokio::test]
    async fn test_error_is_contained() {
        let strategy = LibraryStrategy::with_extractors(vec![
            Box::new(Fixed(Err("boom"))),
            Box::new(Fixed(Ok(vec!["https://cdn/v.mp4"]))),
        ]);
        let outcome = strategy.attempt("https://www.instagram.com/p/A/").await.unwrap();
        assert!(matches!(outcome, Outcome::Resolved(m) if m.primary_url() == "https://cdn/v.mp4"));
    }

    #[tokio::test]
    async fn test_empty_urls_decline() {
        let strategy = LibraryStrategy::with_extractors(vec![
            Box::new(Fixed(Ok(vec![]))),
            Box::new(Fixed(Ok(vec![""]))),
        ]);
        let outcome = strategy.attempt("https://www.instagram.com/p/A/").await.unwrap();
        assert!(matches!(outcome, Outcome::Declined(_)));
    }
}
