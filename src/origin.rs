//! Domain extraction and party relationships
//!
//! All comparisons work on the authority component of HTTP(S) URLs. Anything
//! that does not have that shape never matches a domain restriction.

use once_cell::sync::Lazy;
use regex::Regex;

static DOMAIN_EXTRACTOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i:https?)://([^/]+)").expect("domain extractor regex is valid")
});

/// Extract the lowercased authority of an HTTP(S) URL
pub fn extract_domain(url: &str) -> Option<String> {
    DOMAIN_EXTRACTOR
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Whether a URL starts with an `http://` or `https://` scheme
pub fn is_http_url(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Whether `domain` equals `restriction` or is a subdomain of it
pub fn domain_matches(domain: &str, restriction: &str) -> bool {
    match domain.strip_suffix(restriction) {
        Some("") => true,
        Some(head) => head.ends_with('.'),
        None => false,
    }
}

/// Whether two domains belong to the same party, in either direction
pub fn same_party(a: &str, b: &str) -> bool {
    if a.len() >= b.len() {
        domain_matches(a, b)
    } else {
        domain_matches(b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://example.com/path").as_deref(), Some("example.com"));
        assert_eq!(extract_domain("http://Sub.Example.com").as_deref(), Some("sub.example.com"));
        assert_eq!(extract_domain("HTTP://example.com:8080/").as_deref(), Some("example.com:8080"));
        assert_eq!(extract_domain("example.com"), None);
        assert_eq!(extract_domain("chrome://settings"), None);
        assert_eq!(extract_domain("http:///path"), None);
        assert_eq!(extract_domain(""), None);
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("http://a.com"));
        assert!(is_http_url("HTTPS://a.com"));
        assert!(!is_http_url("chrome-extension://abc/page.html"));
        assert!(!is_http_url("about:blank"));
        assert!(!is_http_url("http"));
    }

    #[test]
    fn test_domain_matches() {
        assert!(domain_matches("example.com", "example.com"));
        assert!(domain_matches("sub.example.com", "example.com"));
        assert!(!domain_matches("notexample.com", "example.com"));
        assert!(!domain_matches("example.com", "sub.example.com"));
    }

    #[test]
    fn test_same_party_is_symmetric() {
        assert!(same_party("a.example.com", "example.com"));
        assert!(same_party("example.com", "a.example.com"));
        assert!(same_party("example.com", "example.com"));
        assert!(!same_party("a.example.com", "b.example.com"));
        assert!(!same_party("example.com", "example.net"));
    }
}
