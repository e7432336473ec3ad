/// Normalized output every strategy converges to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaResult {
    media_urls: Vec<String>,
    thumbnail_url: Option<String>,
}

impl MediaResult {
    /// Returns `None` when no usable media URL remains after dropping blanks.
    pub fn new<I, S>(media_urls: I, thumbnail_url: Option<String>) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let media_urls: Vec<String> = media_urls
            .into_iter()
            .map(Into::into)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();

        if media_urls.is_empty() {
            return None;
        }

        Some(Self {
            media_urls,
            thumbnail_url: thumbnail_url.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn primary_url(&self) -> &str {
        &self.media_urls[0]
    }

    pub fn media_urls(&self) -> &[String] {
        &self.media_urls
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }

    pub fn with_thumbnail(self, thumbnail_url: String) -> Self {
        Self {
            thumbnail_url: Some(thumbnail_url).filter(|t| !t.trim().is_empty()),
            ..self
        }
    }
}

/// Result of a single strategy attempt. Transient failures travel as `Err`.
#[derive(Debug)]
pub enum Outcome {
    Resolved(MediaResult),
    Declined(String),
}

impl Outcome {
    pub fn declined(reason: impl Into<String>) -> Self {
        Outcome::Declined(reason.into())
    }

    /// Maps a probe result, declining with `reason` when nothing was found.
    pub fn from_result(result: Option<MediaResult>, reason: &str) -> Self {
        match result {
            Some(media) => Outcome::Resolved(media),
            None => Outcome::declined(reason),
        }
    }
}

/// A successful waterfall run and the strategy that produced it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub media: MediaResult,
    pub strategy: &'static str,
}
