use super::strategy::ThumbnailSynthesizer;
use crate::config::ThumbnailConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Synthesizes a thumbnail by grabbing one frame of the video with ffmpeg.
pub struct FrameExtractor {
    client: reqwest::Client,
    ffmpeg: String,
    temp_dir: PathBuf,
    ffmpeg_timeout: Duration,
    max_video_bytes: u64,
}

impl FrameExtractor {
    pub fn new(config: &ThumbnailConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            ffmpeg: config.ffmpeg_path.clone(),
            temp_dir: config.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
            ffmpeg_timeout: Duration::from_secs(config.ffmpeg_timeout_secs),
            max_video_bytes: config.max_video_bytes,
        })
    }

    fn scratch_file(&self, suffix: &str) -> Result<TempPath> {
        let file = tempfile::Builder::new()
            .prefix("igbridge-")
            .suffix(suffix)
            .rand_bytes(12)
            .tempfile_in(&self.temp_dir)
            .with_context(|| format!("Failed to create temp file in {}", self.temp_dir.display()))?;
        Ok(file.into_temp_path())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch video")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to download video: HTTP {}",
                response.status()
            ));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .context("Failed to open temp video file")?;
        let mut written: u64 = 0;

        while let Some(chunk) = response.chunk().await.context("Failed to read video data")? {
            written += chunk.len() as u64;
            if written > self.max_video_bytes {
                return Err(anyhow::anyhow!(
                    "Video exceeds {} bytes, skipping thumbnail",
                    self.max_video_bytes
                ));
            }
            file.write_all(&chunk)
                .await
                .context("Failed to write temp video file")?;
        }
        file.flush().await.context("Failed to flush temp video file")?;

        Ok(written)
    }

    async fn run_ffmpeg(&self, video: &Path, image: &Path, seek: &str) -> Result<()> {
        let output = tokio::time::timeout(
            self.ffmpeg_timeout,
            tokio::process::Command::new(&self.ffmpeg)
                .arg("-loglevel")
                .arg("error")
                .arg("-y")
                .arg("-ss")
                .arg(seek)
                .arg("-i")
                .arg(video)
                .arg("-vframes")
                .arg("1")
                .arg("-q:v")
                .arg("2")
                .arg("-f")
                .arg("image2")
                .arg(image)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .context("ffmpeg timed out")?
        .context("Failed to run ffmpeg")?;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "ffmpeg failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }

    async fn extract_frame(&self, video: &Path, image: &Path) -> Result<()> {
        let first = self.run_ffmpeg(video, image, "1").await;
        let produced = tokio::fs::metadata(image)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);

        if first.is_ok() && produced {
            return Ok(());
        }

        // Clips shorter than a second have no frame at 1s.
        debug!("No frame at 1s ({:?}), retrying at 0s", first.err());
        self.run_ffmpeg(video, image, "0").await
    }

    async fn synthesize_into(&self, url: &str, video: &Path, image: &Path) -> Result<String> {
        let size = self.download(url, video).await.context("download stage")?;
        debug!("Downloaded {} bytes for thumbnail extraction", size);

        self.extract_frame(video, image)
            .await
            .context("extract stage")?;

        let data = tokio::fs::read(image).await.context("read stage")?;
        if data.is_empty() {
            return Err(anyhow::anyhow!("read stage: empty thumbnail generated"));
        }
        Ok(encode_data_uri(&data))
    }
}

pub fn encode_data_uri(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

fn discard(path: TempPath) {
    let path_str = path.display().to_string();
    if let Err(e) = path.close() {
        if e.kind() == std::io::ErrorKind::NotFound {
            debug!("Temp file {} already removed", path_str);
        } else {
            warn!("Failed to remove temp file {}: {}", path_str, e);
        }
    }
}

#[async_trait]
impl ThumbnailSynthesizer for FrameExtractor {
    async fn synthesize(&self, video_url: &str) -> Option<String> {
        let video = match self.scratch_file(".mp4") {
            Ok(path) => path,
            Err(e) => {
                warn!("Thumbnail synthesis failed: {:#}", e);
                return None;
            }
        };
        let image = match self.scratch_file(".jpg") {
            Ok(path) => path,
            Err(e) => {
                discard(video);
                warn!("Thumbnail synthesis failed: {:#}", e);
                return None;
            }
        };

        let result = self.synthesize_into(video_url, &video, &image).await;
        discard(video);
        discard(image);

        match result {
            Ok(uri) => {
                info!("Synthesized thumbnail ({} bytes encoded)", uri.len());
                Some(uri)
            }
            Err(e) => {
                warn!(video_url, "Thumbnail synthesis failed: {:#}", e);
                None
            }
        }
    }
}
