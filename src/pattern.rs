//! Adblock-style pattern compiler
//!
//! Turns the matcher part of a filter line into a case-insensitive matcher
//! over destination URLs. Three shapes are recognized: an all-wildcard
//! matcher that accepts everything, an inline `/regex/`, and the usual
//! anchored pattern with `|`, `||`, `*` and `^`.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::RuleError;

/// Regex prefix for the `||` domain anchor: a scheme followed by any number
/// of `label.` segments.
const DOMAIN_ANCHOR: &str = r"https?://(?:[^./]+\.)*";

/// Replacement for `*`
const WILDCARD: &str = r"[\s\S]*";

/// Replacement for the `^` separator placeholder
const SEPARATOR: &str = r"(?:[/:?=&]|$)";

/// Characters escaped before wildcard and separator substitution
const ESCAPED: &[char] = &['\\', '$', '+', '?', '.', '(', ')', '|', '[', ']', '{', '}'];

/// Compiled matcher over a destination URL
#[derive(Clone)]
pub enum Pattern {
    /// Matches every string, including the empty one
    Any,
    /// Translated or inline regular expression
    Regex(Regex),
}

impl Pattern {
    /// Compile the matcher text of a filter line
    pub fn compile(matcher: &str) -> Result<Self, RuleError> {
        if matcher.chars().all(|c| c == '*') {
            return Ok(Pattern::Any);
        }

        let source = if is_inline_regex(matcher) {
            matcher[1..matcher.len() - 1].to_string()
        } else {
            translate(matcher)
        };

        RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map(Pattern::Regex)
            .map_err(|source| RuleError::Pattern {
                pattern: matcher.to_string(),
                source,
            })
    }

    /// Test a destination URL
    pub fn is_match(&self, url: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Regex(re) => re.is_match(url),
        }
    }

    /// Regex source of this matcher, `None` for the accept-all matcher
    pub fn as_regex_str(&self) -> Option<&str> {
        match self {
            Pattern::Any => None,
            Pattern::Regex(re) => Some(re.as_str()),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Any => f.write_str("Pattern::Any"),
            Pattern::Regex(re) => f.debug_tuple("Pattern::Regex").field(&re.as_str()).finish(),
        }
    }
}

fn is_inline_regex(matcher: &str) -> bool {
    matcher.len() > 2 && matcher.starts_with('/') && matcher.ends_with('/')
}

/// Translate an Adblock pattern into regex source.
///
/// Anchors are stripped first so that escaping never touches the regex
/// fragments they introduce; wildcards and separators are substituted after
/// escaping for the same reason.
pub(crate) fn translate(matcher: &str) -> String {
    let mut body = matcher;
    let mut prefix = String::new();
    let mut suffix = "";

    if let Some(rest) = body.strip_prefix('|') {
        prefix.push('^');
        body = rest;

        // Domain anchor, only after a start anchor
        if let Some(rest) = body.strip_prefix('|') {
            prefix.push_str(DOMAIN_ANCHOR);
            body = rest;
        }
    }

    if let Some(rest) = body.strip_suffix('|') {
        suffix = "$";
        body = rest;
    }

    let mut out = String::with_capacity(prefix.len() + body.len() * 2 + suffix.len());
    out.push_str(&prefix);
    for c in body.chars() {
        match c {
            '*' => out.push_str(WILDCARD),
            '^' => out.push_str(SEPARATOR),
            c if ESCAPED.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push_str(suffix);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn compile(matcher: &str) -> Pattern {
        Pattern::compile(matcher).unwrap()
    }

    #[test]
    fn test_wildcard_only_accepts_everything() {
        for matcher in ["", "*", "**", "***"] {
            let pattern = compile(matcher);
            assert!(matches!(pattern, Pattern::Any), "{matcher:?}");
            assert!(pattern.is_match(""));
            assert!(pattern.is_match("http://example.com/"));
        }
    }

    #[test]
    fn test_domain_anchor() {
        let pattern = compile("||example.com^");
        assert!(pattern.is_match("http://example.com/x"));
        assert!(pattern.is_match("http://sub.example.com/x"));
        assert!(pattern.is_match("https://a.b.example.com"));
        assert!(!pattern.is_match("http://notexample.com/x"));
        assert!(!pattern.is_match("http://example.community/"));
        assert!(!pattern.is_match("ftp://example.com/"));
    }

    #[test]
    fn test_start_and_end_anchor() {
        let pattern = compile("|https://example.com|");
        assert!(pattern.is_match("https://example.com"));
        assert!(pattern.is_match("HTTPS://EXAMPLE.COM"));
        assert!(!pattern.is_match("https://example.com/"));
        assert!(!pattern.is_match("https://example.com/path"));
        assert!(!pattern.is_match("xhttps://example.com"));
    }

    #[test]
    fn test_unanchored_substring() {
        let pattern = compile("/ads/");
        // `/ads/` is an inline regex for `ads`
        assert!(pattern.is_match("http://example.com/ads/banner.png"));

        let pattern = compile("banner*.gif");
        assert!(pattern.is_match("http://example.com/img/banner-top.gif"));
        assert!(pattern.is_match("http://example.com/banner.gif"));
        assert!(!pattern.is_match("http://example.com/banner.png"));
    }

    #[test]
    fn test_metacharacters_are_literal() {
        let pattern = compile("a+b(c)?.js");
        assert!(pattern.is_match("http://x.com/a+b(c)?.js"));
        assert!(!pattern.is_match("http://x.com/aab.js"));
    }

    #[test]
    fn test_separator_placeholder() {
        let pattern = compile("example.com^");
        assert!(pattern.is_match("http://example.com/"));
        assert!(pattern.is_match("http://example.com:8080"));
        assert!(pattern.is_match("http://example.com"));
        assert!(pattern.is_match("http://x.com/?u=example.com&y"));
        assert!(!pattern.is_match("http://example.com.evil.net/"));
    }

    #[test]
    fn test_inline_regex() {
        let pattern = compile(r"/^https?://[a-z]+\.example\.com/ad[0-9]+/");
        assert!(pattern.is_match("https://cdn.example.com/ad42"));
        assert!(pattern.is_match("HTTPS://CDN.EXAMPLE.COM/AD42"));
        assert!(!pattern.is_match("https://cdn.example.com/adx"));
    }

    #[test]
    fn test_invalid_inline_regex() {
        let err = Pattern::compile("/ab(c/").unwrap_err();
        assert!(matches!(err, RuleError::Pattern { .. }));
    }

    #[test]
    fn test_translate_order() {
        assert_eq!(translate("|a|"), "^a$");
        assert_eq!(translate("||a.b^"), r"^https?://(?:[^./]+\.)*a\.b(?:[/:?=&]|$)");
        assert_eq!(translate("a*b"), r"a[\s\S]*b");
        assert_eq!(translate("{x}"), r"\{x\}");
    }

    proptest! {
        #[test]
        fn prop_star_matches_any_string(s in ".*") {
            prop_assert!(compile("*").is_match(&s));
            prop_assert!(compile("**").is_match(&s));
        }

        #[test]
        fn prop_literal_text_matches_itself(s in "[a-z0-9./:+?()]{1,24}") {
            prop_assume!(!(s.len() > 2 && s.starts_with('/') && s.ends_with('/')));
            let pattern = compile(&s);
            prop_assert!(pattern.is_match(&s));
            let upper = s.to_uppercase();
            prop_assert!(pattern.is_match(&upper));
        }
    }
}
