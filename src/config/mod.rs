use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_COBALT_MIRRORS: [&str; 2] =
    ["https://cobalt.meowing.de", "https://cobalt.clxxped.lol"];

/// Resolution strategies, named as they appear in `resolver.order`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Cobalt,
    Library,
    ThirdParty,
    Direct,
    Browser,
}

impl StrategyKind {
    pub fn default_order() -> Vec<StrategyKind> {
        vec![
            StrategyKind::Cobalt,
            StrategyKind::Library,
            StrategyKind::ThirdParty,
            StrategyKind::Direct,
            StrategyKind::Browser,
        ]
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub resolver: ResolverConfig,
    pub cobalt: CobaltConfig,
    pub library: LibraryConfig,
    pub third_party: ThirdPartyConfig,
    pub direct: DirectConfig,
    pub browser: BrowserConfig,
    pub thumbnail: ThumbnailConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret callers must present. Unset means the API is open.
    pub secret: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ResolverConfig {
    pub order: Vec<StrategyKind>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            order: StrategyKind::default_order(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CobaltConfig {
    /// Operator's own instance, always tried before the public mirrors.
    pub self_hosted_url: Option<String>,
    pub mirrors: Vec<String>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub strategy_timeout_secs: u64,
    pub video_quality: Option<String>,
    pub filename_style: Option<String>,
    pub download_mode: Option<String>,
}

impl Default for CobaltConfig {
    fn default() -> Self {
        Self {
            self_hosted_url: None,
            mirrors: DEFAULT_COBALT_MIRRORS.iter().map(|m| m.to_string()).collect(),
            user_agent: "curl/7.68.0".to_string(),
            request_timeout_secs: 20,
            strategy_timeout_secs: 120,
            video_quality: None,
            filename_style: None,
            download_mode: None,
        }
    }
}

impl CobaltConfig {
    /// Base endpoints in priority order: self-hosted first, then mirrors.
    pub fn instances(&self) -> Vec<String> {
        let mut instances = Vec::new();
        let candidates = self.self_hosted_url.iter().chain(self.mirrors.iter());
        for candidate in candidates {
            let trimmed = candidate.trim().trim_end_matches('/');
            if trimmed.is_empty() || instances.iter().any(|i| i == trimmed) {
                continue;
            }
            instances.push(trimmed.to_string());
        }
        instances
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LibraryConfig {
    pub backends: Vec<String>,
    pub gallery_dl_path: String,
    pub ytdlp_path: String,
    pub timeout_secs: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            backends: vec!["gallery-dl".to_string(), "yt-dlp".to_string()],
            gallery_dl_path: "gallery-dl".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ThirdPartyConfig {
    pub api_key: Option<String>,
    pub host: String,
    pub path: String,
    pub method: String,
    pub timeout_secs: u64,
}

impl Default for ThirdPartyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            host: "instagram-downloader-download-instagram-videos-stories.p.rapidapi.com"
                .to_string(),
            path: "/index".to_string(),
            method: "GET".to_string(),
            timeout_secs: 20,
        }
    }
}

impl ThirdPartyConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DirectConfig {
    pub base_url: String,
    pub user_agent: String,
    pub app_id: String,
    pub timeout_secs: u64,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.instagram.com".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            app_id: "936619743392459".to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrowserProfile {
    #[default]
    Desktop,
    Mobile,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    pub executable: Option<PathBuf>,
    pub profile: BrowserProfile,
    /// Raw `name=value; name2=value2` cookie string for an authenticated session.
    pub cookie: Option<String>,
    pub navigation_timeout_secs: u64,
    pub video_wait_secs: u64,
    pub strategy_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            profile: BrowserProfile::Desktop,
            cookie: None,
            navigation_timeout_secs: 30,
            video_wait_secs: 5,
            strategy_timeout_secs: 90,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub enabled: bool,
    pub ffmpeg_path: String,
    pub temp_dir: Option<PathBuf>,
    pub download_timeout_secs: u64,
    pub ffmpeg_timeout_secs: u64,
    pub max_video_bytes: u64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ffmpeg_path: "ffmpeg".to_string(),
            temp_dir: None,
            download_timeout_secs: 60,
            ffmpeg_timeout_secs: 30,
            max_video_bytes: 100 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.normalize();
        Ok(config)
    }

    pub fn get_logging_format(&self) -> &str {
        &self.logging.format
    }

    /// Applies the environment variables the bridge has always honoured.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT").and_then(|p| p.trim().parse().ok()) {
            self.server.port = port;
        }
        if let Some(secret) = get("API_SECRET") {
            self.auth.secret = Some(secret);
        }
        if let Some(url) = get("COBALT_URL") {
            self.cobalt.self_hosted_url = Some(url);
        }
        if let Some(key) = get("RAPIDAPI_KEY") {
            self.third_party.api_key = Some(key);
        }
        if let Some(host) = get("RAPIDAPI_HOST") {
            self.third_party.host = host;
        }
        if let Some(path) = get("RAPIDAPI_PATH") {
            self.third_party.path = path;
        }
        if let Some(method) = get("RAPIDAPI_METHOD") {
            self.third_party.method = method;
        }
        if let Some(path) = get("CHROME_PATH") {
            self.browser.executable = Some(PathBuf::from(path));
        }
        if let Some(cookie) = get("INSTAGRAM_COOKIE") {
            self.browser.cookie = Some(cookie);
        }
        if let Some(path) = get("FFMPEG_PATH") {
            self.thumbnail.ffmpeg_path = path;
        }

        self.normalize();
    }

    fn normalize(&mut self) {
        let mut order = Vec::with_capacity(self.resolver.order.len());
        for kind in &self.resolver.order {
            if !order.contains(kind) {
                order.push(*kind);
            }
        }
        self.resolver.order = order;

        self.auth.secret = self.auth.secret.take().filter(|s| !s.trim().is_empty());
        self.browser.cookie = self.browser.cookie.take().filter(|c| !c.trim().is_empty());
    }
}
