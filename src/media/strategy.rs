use super::types::Outcome;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Human-readable name of the strategy
    fn name(&self) -> &'static str;

    /// Try to resolve the target URL into direct media URLs
    async fn attempt(&self, url: &str) -> Result<Outcome>;

    /// Upper bound for a whole attempt, enforced by the resolver
    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }
}

/// Produces a thumbnail for a video that came back without one.
#[async_trait]
pub trait ThumbnailSynthesizer: Send + Sync {
    async fn synthesize(&self, video_url: &str) -> Option<String>;
}
