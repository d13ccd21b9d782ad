//! URL validation shared across the fetch and trap-detector layers.

/// Whether `url` is a fetchable http(s) URL, excluding `data:`/`javascript:`/
/// `mailto:` schemes.
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(is_valid_url("https://example.com"));
        assert!(is_valid_url("http://example.com/path?q=1"));
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(!is_valid_url("data:text/plain,hello"));
        assert!(!is_valid_url("javascript:alert(1)"));
        assert!(!is_valid_url("mailto:a@b.com"));
        assert!(!is_valid_url(""));
    }
}
