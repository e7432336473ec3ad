mod browser;
mod cobalt;
mod direct;
mod gallery_dl;
mod library;
mod strategy;
mod third_party;
mod thumbnail;
mod types;
mod utils;
mod ytdlp;

pub use browser::BrowserStrategy;
pub use cobalt::CobaltStrategy;
pub use direct::DirectStrategy;
pub use library::LibraryStrategy;
pub use strategy::{Strategy, ThumbnailSynthesizer};
pub use third_party::ThirdPartyStrategy;
pub use thumbnail::FrameExtractor;
pub use types::{MediaResult, Outcome, Resolution};

use crate::config::{Config, StrategyKind};
use anyhow::Result;
use tracing::{info, info_span, warn, Instrument};

pub struct MediaResolver {
    strategies: Vec<Box<dyn Strategy>>,
    thumbnails: Option<Box<dyn ThumbnailSynthesizer>>,
}

impl MediaResolver {
    pub fn new(
        strategies: Vec<Box<dyn Strategy>>,
        thumbnails: Option<Box<dyn ThumbnailSynthesizer>>,
    ) -> Self {
        Self {
            strategies,
            thumbnails,
        }
    }

    /// Builds the strategies in the configured order.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut strategies: Vec<Box<dyn Strategy>> = Vec::new();

        for kind in &config.resolver.order {
            match kind {
                StrategyKind::Cobalt => {
                    strategies.push(Box::new(CobaltStrategy::new(&config.cobalt)?));
                }
                StrategyKind::Library => {
                    strategies.push(Box::new(LibraryStrategy::new(&config.library)));
                }
                StrategyKind::ThirdParty => match ThirdPartyStrategy::new(&config.third_party)? {
                    Some(strategy) => strategies.push(Box::new(strategy)),
                    None => info!("Third-party API key not configured, skipping strategy"),
                },
                StrategyKind::Direct => {
                    strategies.push(Box::new(DirectStrategy::new(
                        &config.direct,
                        config.browser.cookie.clone(),
                    )?));
                }
                StrategyKind::Browser => {
                    strategies.push(Box::new(BrowserStrategy::new(&config.browser)));
                }
            }
        }

        let thumbnails: Option<Box<dyn ThumbnailSynthesizer>> = if config.thumbnail.enabled {
            Some(Box::new(FrameExtractor::new(&config.thumbnail)?))
        } else {
            None
        };

        let resolver = Self::new(strategies, thumbnails);
        info!(
            "Media resolver initialized with strategies: {}",
            resolver.strategy_names().join(" -> ")
        );
        Ok(resolver)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the waterfall; the first strategy to resolve wins.
    pub async fn resolve(&self, url: &str) -> Option<Resolution> {
        let span = info_span!("resolve", target = %url);
        self.run(url).instrument(span).await
    }

    async fn run(&self, url: &str) -> Option<Resolution> {
        info!("Resolving media for URL: {}", url);

        for strategy in &self.strategies {
            let name = strategy.name();
            let limit = strategy.timeout();

            let media = match tokio::time::timeout(limit, strategy.attempt(url)).await {
                Ok(Ok(Outcome::Resolved(media))) => media,
                Ok(Ok(Outcome::Declined(reason))) => {
                    info!(strategy = name, outcome = "declined", "{}", reason);
                    continue;
                }
                Ok(Err(e)) => {
                    warn!(strategy = name, outcome = "failed", "{:#}", e);
                    continue;
                }
                Err(_) => {
                    warn!(
                        strategy = name,
                        outcome = "timeout",
                        "Timed out after {}s",
                        limit.as_secs()
                    );
                    continue;
                }
            };

            info!(
                strategy = name,
                outcome = "resolved",
                urls = media.media_urls().len(),
                "Successfully resolved media"
            );
            let media = self.attach_thumbnail(media).await;
            return Some(Resolution {
                media,
                strategy: name,
            });
        }

        warn!("All strategies failed for {}", url);
        None
    }

    async fn attach_thumbnail(&self, media: MediaResult) -> MediaResult {
        if media.thumbnail_url().is_some() {
            return media;
        }
        let Some(thumbnails) = &self.thumbnails else {
            return media;
        };

        info!("No thumbnail returned, extracting a frame from the video");
        match thumbnails.synthesize(media.primary_url()).await {
            Some(thumbnail) => media.with_thumbnail(thumbnail),
            None => media,
        }
    }
}

/// Logs which external tools are installed. Missing tools only disable
/// the strategies that need them.
pub async fn test_setup(config: &Config) {
    info!("Testing external tool setup...");
    let order = &config.resolver.order;

    if order.contains(&StrategyKind::Library) {
        for backend in &config.library.backends {
            match backend.as_str() {
                "gallery-dl" => {
                    library::probe_binary(&config.library.gallery_dl_path, "--version").await;
                }
                "yt-dlp" => {
                    library::probe_binary(&config.library.ytdlp_path, "--version").await;
                }
                _ => {}
            }
        }
    }

    if config.thumbnail.enabled
        && !library::probe_binary(&config.thumbnail.ffmpeg_path, "-version").await
    {
        warn!("⚠️  Thumbnails will not be synthesized without ffmpeg");
    }
}
