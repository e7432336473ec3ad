use regex::Regex;
use std::sync::LazyLock;

static SHORTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:p|reels?|tv)/([A-Za-z0-9_-]+)").expect("shortcode pattern is valid")
});

/// Extracts the post or reel identifier from an Instagram URL.
pub fn extract_shortcode(url: &str) -> Option<String> {
    SHORTCODE_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Cuts a string to at most `max` bytes on a char boundary.
pub fn snippet(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_shortcode() {
        assert_eq!(
            extract_shortcode("https://www.instagram.com/p/ABC123/").as_deref(),
            Some("ABC123")
        );
        assert_eq!(
            extract_shortcode("https://www.instagram.com/reel/DSF-umYCWkZ/?igsh=xyz").as_deref(),
            Some("DSF-umYCWkZ")
        );
        assert_eq!(
            extract_shortcode("https://instagram.com/reels/a_b").as_deref(),
            Some("a_b")
        );
        assert_eq!(
            extract_shortcode("https://www.instagram.com/someone/p/XYZ/").as_deref(),
            Some("XYZ")
        );
        assert_eq!(extract_shortcode("https://www.instagram.com/someone/"), None);
        assert_eq!(extract_shortcode("not a url"), None);
    }

    #[test]
    fn test_snippet() {
        assert_eq!(snippet("hello", 10), "hello");
        assert_eq!(snippet("hello", 3), "hel");
        assert_eq!(snippet("héllo", 2), "h");
    }
}
