use super::{
    strategy::Strategy,
    types::{MediaResult, Outcome},
    utils::decode_js_escapes,
};
use crate::config::{BrowserConfig, BrowserProfile};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, EventLoadingFinished};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures_util::{Stream, StreamExt};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DESKTOP_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const MOBILE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

const CHROME_ARGS: [&str; 8] = [
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-sandbox",
    "--no-first-run",
    "--disable-extensions",
    "--disable-background-networking",
];

// Runs before any page script.
const STEALTH_JS: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    window.chrome = { runtime: {} };
"#;

// Candidate sources in preference order; the caller skips unusable ones.
const VIDEO_SRC_JS: &str = r#"
    (() => {
        const video = document.querySelector('video');
        if (!video) return [];
        const source = video.querySelector('source');
        return [video.currentSrc || null, video.src || null, (source && source.src) || null];
    })()
"#;

/// How long the network must stay silent before the page counts as settled.
const NETWORK_QUIET: Duration = Duration::from_millis(500);

static META_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("meta pattern is valid"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z:_-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attr pattern is valid")
});
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>(.*?)</script>").expect("script pattern is valid")
});
static VIDEO_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""video_url"\s*:\s*"((?:[^"\\]|\\.)+)""#).expect("video_url pattern is valid")
});

impl BrowserProfile {
    fn user_agent(self) -> &'static str {
        match self {
            BrowserProfile::Desktop => DESKTOP_UA,
            BrowserProfile::Mobile => MOBILE_UA,
        }
    }

    fn window_size(self) -> (u32, u32) {
        match self {
            BrowserProfile::Desktop => (1920, 1080),
            BrowserProfile::Mobile => (390, 844),
        }
    }
}

/// Drives a throwaway headless Chrome per attempt.
pub struct BrowserStrategy {
    config: BrowserConfig,
}

impl BrowserStrategy {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn chrome_config(&self, user_data_dir: &Path) -> Result<ChromeConfig> {
        let (width, height) = self.config.profile.window_size();
        let mut builder = ChromeConfig::builder()
            .user_data_dir(user_data_dir)
            .window_size(width, height)
            .request_timeout(Duration::from_secs(self.config.navigation_timeout_secs))
            .args(CHROME_ARGS);
        if let Some(executable) = &self.config.executable {
            builder = builder.chrome_executable(executable);
        }
        builder
            .build()
            .map_err(|e| anyhow!("Browser config error: {e}"))
    }

    async fn prepare(&self, page: &Page) -> Result<()> {
        page.execute(SetUserAgentOverrideParams::new(
            self.config.profile.user_agent(),
        ))
        .await
        .context("Failed to override user agent")?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_JS))
            .await
            .context("Failed to inject stealth script")?;

        if let Some(cookie) = &self.config.cookie {
            let cookies = parse_cookie_string(cookie)
                .into_iter()
                .map(|(name, value)| {
                    CookieParam::builder()
                        .name(name)
                        .value(value)
                        .domain(".instagram.com")
                        .path("/")
                        .secure(true)
                        .build()
                        .map_err(|e| anyhow!("Invalid cookie: {e}"))
                })
                .collect::<Result<Vec<_>>>()?;
            debug!("Injecting {} session cookies", cookies.len());
            page.set_cookies(cookies)
                .await
                .context("Failed to set session cookies")?;
        }

        Ok(())
    }

    async fn wait_for_video(&self, page: &Page) -> bool {
        let deadline = Instant::now() + Duration::from_secs(self.config.video_wait_secs);
        loop {
            if page.find_element("video").await.is_ok() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn inspect(&self, browser: &Browser, url: &str) -> Result<Outcome> {
        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to create page")?;
        self.prepare(&page).await?;

        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .context("Failed to subscribe to network events")?;

        let navigation = Duration::from_secs(self.config.navigation_timeout_secs);
        tokio::time::timeout(navigation, page.goto(url))
            .await
            .context("Navigation timed out")?
            .context("Failed to navigate")?;

        if !wait_for_network_idle(&mut finished, NETWORK_QUIET, navigation).await {
            debug!("Network did not settle before timeout, continuing");
        }

        // A login wall usually means no video element ever shows up.
        if !self.wait_for_video(&page).await {
            info!(strategy = "browser", "No video element appeared");
        }

        match page.evaluate(VIDEO_SRC_JS).await {
            Ok(result) => match result.into_value::<Vec<Option<String>>>() {
                Ok(candidates) => match pick_video_src(&candidates) {
                    Some(src) => {
                        info!(strategy = "browser", method = "video-element", "Found video URL");
                        let html = page.content().await.unwrap_or_default();
                        return Ok(Outcome::from_result(
                            MediaResult::new([src], find_meta(&html, &["og:image"])),
                            "video element source was empty",
                        ));
                    }
                    None => debug!("Video element had no usable source"),
                },
                Err(e) => debug!("Unexpected video source value: {}", e),
            },
            Err(e) => debug!("Video element probe failed: {}", e),
        }

        let html = page.content().await.context("Failed to get page content")?;
        match extract_from_html(&html) {
            Some(media) => Ok(Outcome::Resolved(media)),
            None => {
                info!(
                    strategy = "browser",
                    snippet = crate::utils::snippet(&html, 500),
                    "No media found in rendered page"
                );
                Ok(Outcome::declined("no media in rendered page"))
            }
        }
    }
}

#[async_trait]
impl Strategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn attempt(&self, url: &str) -> Result<Outcome> {
        let user_data_dir = tempfile::Builder::new()
            .prefix("igbridge-chrome-")
            .tempdir()
            .context("Failed to create browser profile directory")?;

        info!(strategy = "browser", profile = ?self.config.profile, "Launching headless browser");
        let (mut browser, mut handler) = Browser::launch(self.chrome_config(user_data_dir.path())?)
            .await
            .context("Failed to launch browser")?;

        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let outcome = self.inspect(&browser, url).await;

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }
        handler_task.abort();
        if let Err(e) = user_data_dir.close() {
            warn!("Failed to remove browser profile directory: {}", e);
        }

        outcome
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.strategy_timeout_secs)
    }
}

fn is_usable_src(src: &str) -> bool {
    let src = src.trim();
    !src.is_empty() && !src.starts_with("blob:")
}

/// First candidate that is neither empty nor a `blob:` object URL.
fn pick_video_src(candidates: &[Option<String>]) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .find(|src| is_usable_src(src))
        .map(|src| src.trim().to_string())
}

/// Returns once no event has arrived for `quiet`, or `false` when `cap`
/// elapses first.
async fn wait_for_network_idle<S>(events: &mut S, quiet: Duration, cap: Duration) -> bool
where
    S: Stream + Unpin,
{
    let deadline = Instant::now() + cap;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        let window = quiet.min(deadline - now);
        match tokio::time::timeout(window, events.next()).await {
            Err(_) if window == quiet => return true,
            Err(_) => return false,
            Ok(Some(_)) => continue,
            Ok(None) => return true,
        }
    }
}

/// Splits a `name=value; name2=value2` cookie header.
pub fn parse_cookie_string(cookie: &str) -> Vec<(String, String)> {
    cookie
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn unescape_html(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// Content of the first `<meta>` whose `property` matches one of `names`, in order.
pub fn find_meta(html: &str, names: &[&str]) -> Option<String> {
    let tags: Vec<(String, String)> = META_RE
        .find_iter(html)
        .filter_map(|tag| {
            let mut property = None;
            let mut content = None;
            for caps in ATTR_RE.captures_iter(tag.as_str()) {
                let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
                match caps[1].to_ascii_lowercase().as_str() {
                    "property" | "name" => property = value.map(str::to_ascii_lowercase),
                    "content" => content = value.map(unescape_html),
                    _ => {}
                }
            }
            Some((property?, content.filter(|c| !c.trim().is_empty())?))
        })
        .collect();

    names.iter().find_map(|name| {
        tags.iter()
            .find(|(property, _)| property == name)
            .map(|(_, content)| content.clone())
    })
}

/// Best-effort `"video_url":"..."` scan over inline scripts.
pub fn find_script_video_url(html: &str) -> Option<String> {
    SCRIPT_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .flat_map(|script| VIDEO_URL_RE.captures_iter(script.as_str()))
        .map(|caps| decode_js_escapes(&caps[1]))
        .find(|url| url.starts_with("http"))
}

/// Page-level fallbacks once the video element came up empty.
pub fn extract_from_html(html: &str) -> Option<MediaResult> {
    let thumbnail = find_meta(html, &["og:image"]);

    if let Some(video) = find_meta(html, &["og:video:secure_url", "og:video", "og:video:url"]) {
        info!(strategy = "browser", method = "og-meta", "Found video URL");
        return MediaResult::new([video], thumbnail);
    }

    if let Some(video) = find_script_video_url(html) {
        info!(strategy = "browser", method = "script-scan", "Found video URL");
        return MediaResult::new([video], thumbnail);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie_string() {
        assert_eq!(
            parse_cookie_string("sessionid=abc%3A123; ds_user_id=42;;  csrftoken = t "),
            vec![
                ("sessionid".to_string(), "abc%3A123".to_string()),
                ("ds_user_id".to_string(), "42".to_string()),
                ("csrftoken".to_string(), "t".to_string()),
            ]
        );
        assert!(parse_cookie_string("garbage").is_empty());
    }

    #[test]
    fn test_blob_sources_rejected() {
        assert!(!is_usable_src("blob:https://www.instagram.com/1234"));
        assert!(!is_usable_src("  "));
        assert!(is_usable_src("https://scontent.cdninstagram.com/v.mp4"));
    }

    #[test]
    fn test_pick_video_src_skips_blob_candidates() {
        let candidates = vec![
            Some("blob:https://www.instagram.com/1234".to_string()),
            None,
            Some("https://scontent.cdninstagram.com/v.mp4".to_string()),
        ];
        assert_eq!(
            pick_video_src(&candidates).as_deref(),
            Some("https://scontent.cdninstagram.com/v.mp4")
        );

        let only_blob = vec![Some("blob:https://www.instagram.com/1".to_string()), None];
        assert!(pick_video_src(&only_blob).is_none());
        assert!(pick_video_src(&[]).is_none());
    }

    #[tokio::test]
    async fn test_network_idle_after_quiet_period() {
        let mut silent = futures_util::stream::pending::<()>();
        let settled = wait_for_network_idle(
            &mut silent,
            Duration::from_millis(50),
            Duration::from_secs(5),
        )
        .await;
        assert!(settled);
    }

    #[tokio::test]
    async fn test_network_idle_waits_out_bursts() {
        let started = Instant::now();
        let mut burst = futures_util::stream::iter(0..5)
            .then(|_| tokio::time::sleep(Duration::from_millis(20)))
            .boxed();
        let settled = wait_for_network_idle(
            &mut burst,
            Duration::from_millis(100),
            Duration::from_secs(5),
        )
        .await;
        assert!(settled);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_network_idle_gives_up_at_cap() {
        let mut chatty = futures_util::stream::repeat(())
            .then(|_| tokio::time::sleep(Duration::from_millis(10)))
            .boxed();
        let settled = wait_for_network_idle(
            &mut chatty,
            Duration::from_millis(100),
            Duration::from_millis(300),
        )
        .await;
        assert!(!settled);
    }

    #[test]
    fn test_og_video_meta() {
        let html = r#"<html><head>
            <meta property="og:image" content="https://cdn/cover.jpg?a=1&amp;b=2" />
            <meta content="https://cdn/video.mp4?x=1&amp;y=2" property="og:video">
        </head></html>"#;
        let media = extract_from_html(html).unwrap();
        assert_eq!(media.primary_url(), "https://cdn/video.mp4?x=1&y=2");
        assert_eq!(media.thumbnail_url(), Some("https://cdn/cover.jpg?a=1&b=2"));
    }

    #[test]
    fn test_script_scan_decodes_escapes() {
        let html = r#"<html><script type="application/json">
            {"require": [["x", {"video_url":"https:\/\/cdn.example\/v.mp4?efg=%3D&oh=1"}]]}
        </script></html>"#;
        let media = extract_from_html(html).unwrap();
        assert_eq!(media.primary_url(), "https://cdn.example/v.mp4?efg=%3D&oh=1");
        assert!(media.thumbnail_url().is_none());
    }

    #[test]
    fn test_og_meta_wins_over_scripts() {
        let html = r#"<meta property="og:video" content="https://cdn/og.mp4">
            <script>var x = {"video_url":"https://cdn/script.mp4"};</script>"#;
        assert_eq!(
            extract_from_html(html).unwrap().primary_url(),
            "https://cdn/og.mp4"
        );
    }

    #[test]
    fn test_login_wall_has_no_media() {
        let html = r#"<html><head><meta property="og:title" content="Instagram"></head>
            <body><script>window.__login = {"video_url": null};</script></body></html>"#;
        assert!(extract_from_html(html).is_none());
    }

    #[tokio::test]
    #[ignore = "Requires Chrome installed and network access"]
    async fn test_browser_attempt() {
        let strategy = BrowserStrategy::new(&BrowserConfig::default());
        let outcome = strategy
            .attempt("https://www.instagram.com/p/DSF-umYCWkZ/")
            .await;
        assert!(outcome.is_ok());
    }
}
