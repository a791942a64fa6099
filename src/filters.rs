//! Filter rule parsing for micro-rs
//!
//! One filter line becomes one [`Rule`]: an Adblock-style matcher followed by
//! an optional `$`-separated option list with party, domain, type and action
//! qualifiers.

use std::fmt;
use std::str::FromStr;

use log::debug;
use memchr::memrchr;

use crate::error::RuleError;
use crate::origin::{domain_matches, extract_domain, same_party};
use crate::pattern::Pattern;

/// Canonical name of the top-level document type
pub const MAIN_FRAME: &str = "main_frame";

/// Canonical name of the embedded document type
pub const SUB_FRAME: &str = "sub_frame";

/// Option tokens that are accepted and ignored
const INFORMATIONAL_OPTIONS: &[&str] = &["important", "libmicro"];

/// Resource type synonyms and their canonical names
const TYPE_NORMALIZER: &[(&str, &str)] = &[
    ("main_frame", MAIN_FRAME),
    ("document", MAIN_FRAME),
    ("sub_frame", SUB_FRAME),
    ("subdocument", SUB_FRAME),
    ("stylesheet", "stylesheet"),
    ("css", "stylesheet"),
    ("script", "script"),
    ("js", "script"),
    ("image", "image"),
    ("img", "image"),
    ("font", "font"),
    ("object", "object"),
    ("object-subrequest", "object"),
    ("xmlhttprequest", "xmlhttprequest"),
    ("xhr", "xmlhttprequest"),
    ("ping", "ping"),
    ("csp_report", "csp_report"),
    ("csp-report", "csp_report"),
    ("cspreport", "csp_report"),
    ("media", "media"),
    ("websocket", "websocket"),
    ("socket", "websocket"),
    ("other", "other"),
    ("beacon", "beacon"),
];

/// Canonicalize a resource type token, `None` if it is not a known type
pub fn normalize_type(token: &str) -> Option<&'static str> {
    TYPE_NORMALIZER
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(token))
        .map(|(_, canonical)| *canonical)
}

/// What a matching rule does with the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleAction {
    /// Cancel the request
    #[default]
    Block,
    /// Redirect to a named asset
    Redirect,
    /// Rewrite the response, accepted but not resolved
    Replace,
    /// Inject a named asset into the committed document
    Inject,
}

impl RuleAction {
    fn from_option(option: &str) -> Option<(Self, &str)> {
        [
            ("redirect=", RuleAction::Redirect),
            ("replace=", RuleAction::Replace),
            ("inject=", RuleAction::Inject),
        ]
        .into_iter()
        .find_map(|(prefix, action)| option.strip_prefix(prefix).map(|payload| (action, payload)))
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleAction::Block => "block",
            RuleAction::Redirect => "redirect",
            RuleAction::Replace => "replace",
            RuleAction::Inject => "inject",
        };
        f.write_str(name)
    }
}

/// Entry of a domain restriction list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainToken {
    /// Same party as the requester, from `first-party` / `third-party`
    SelfParty,
    /// A lowercased domain from `domain=`
    Domain(String),
}

/// A compiled filter rule
#[derive(Debug, Clone)]
pub struct Rule {
    source: String,
    pattern: Pattern,
    domain_match: Vec<DomainToken>,
    domain_unmatch: Vec<DomainToken>,
    type_match: Vec<&'static str>,
    type_unmatch: Vec<&'static str>,
    action: RuleAction,
    payload: String,
}

impl Rule {
    /// Parse one trimmed, non-comment filter line
    pub fn parse(line: &str) -> Result<Self, RuleError> {
        let (matcher, options) = split_options(line);

        if matcher.starts_with("@@") {
            return Err(RuleError::Whitelist {
                rule: line.to_string(),
            });
        }

        let mut builder = RuleBuilder::default();
        let mut in_domain_list = false;
        for option in options {
            if in_domain_list && builder.continues_domain_list(option) {
                builder.push_domains(option);
                continue;
            }
            in_domain_list = builder.apply_option(option)?;
        }
        builder.check_party()?;

        Ok(Rule {
            source: line.to_string(),
            pattern: Pattern::compile(matcher)?,
            domain_match: builder.domain_match,
            domain_unmatch: builder.domain_unmatch,
            type_match: builder.type_match,
            type_unmatch: builder.type_unmatch,
            action: builder.action.map(|(action, _)| action).unwrap_or_default(),
            payload: builder.payload,
        })
    }

    /// Check a request against this rule.
    ///
    /// `requester_domain` is the already extracted requester authority and
    /// `resource_type` is expected to be normalized. Party and domain
    /// restrictions fail closed when either domain is unknown.
    pub fn matches(
        &self,
        requester_domain: Option<&str>,
        destination: &str,
        resource_type: &str,
    ) -> bool {
        if !self.party_allows(requester_domain, destination) {
            return false;
        }

        if !self.type_match.is_empty() && !self.type_match.contains(&resource_type) {
            return false;
        }
        if self.type_unmatch.contains(&resource_type) {
            return false;
        }

        if !self.domains_allow(requester_domain) {
            return false;
        }

        self.pattern.is_match(destination)
    }

    fn party_allows(&self, requester_domain: Option<&str>, destination: &str) -> bool {
        let require_same = self.domain_match.first() == Some(&DomainToken::SelfParty);
        let forbid_same = self.domain_unmatch.first() == Some(&DomainToken::SelfParty);
        if !require_same && !forbid_same {
            return true;
        }

        let (Some(requester), Some(destination)) = (requester_domain, extract_domain(destination))
        else {
            return false;
        };
        same_party(requester, &destination) == require_same
    }

    fn domains_allow(&self, requester_domain: Option<&str>) -> bool {
        let mut matched = domains(&self.domain_match).peekable();
        let mut unmatched = domains(&self.domain_unmatch).peekable();
        if matched.peek().is_none() && unmatched.peek().is_none() {
            return true;
        }

        let Some(requester) = requester_domain else {
            return false;
        };
        if matched.peek().is_some() && !matched.any(|d| domain_matches(requester, d)) {
            return false;
        }
        !unmatched.any(|d| domain_matches(requester, d))
    }

    /// The filter line this rule was built from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compiled destination matcher
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Domains the requester must belong to
    pub fn domain_match(&self) -> &[DomainToken] {
        &self.domain_match
    }

    /// Domains the requester must not belong to
    pub fn domain_unmatch(&self) -> &[DomainToken] {
        &self.domain_unmatch
    }

    /// Normalized types the request must have
    pub fn type_match(&self) -> &[&'static str] {
        &self.type_match
    }

    /// Normalized types the request must not have
    pub fn type_unmatch(&self) -> &[&'static str] {
        &self.type_unmatch
    }

    /// Action taken on match
    pub fn action(&self) -> RuleAction {
        self.action
    }

    /// Asset name or replacement spec, empty for block rules
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl FromStr for Rule {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rule::parse(s)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Whether a trimmed filter line is blank or a comment
pub fn is_comment(line: &str) -> bool {
    line.is_empty()
        || line.starts_with('!')
        || (line.starts_with('#') && !line[1..].starts_with('#'))
}

fn domains(tokens: &[DomainToken]) -> impl Iterator<Item = &str> {
    tokens.iter().filter_map(|token| match token {
        DomainToken::Domain(d) => Some(d.as_str()),
        DomainToken::SelfParty => None,
    })
}

fn split_options(line: &str) -> (&str, Vec<&str>) {
    match memrchr(b'$', line.as_bytes()) {
        Some(anchor) => {
            let options = line[anchor + 1..]
                .split(',')
                .map(str::trim)
                .collect();
            (line[..anchor].trim(), options)
        }
        None => (line, Vec::new()),
    }
}

#[derive(Default)]
struct RuleBuilder {
    domain_match: Vec<DomainToken>,
    domain_unmatch: Vec<DomainToken>,
    type_match: Vec<&'static str>,
    type_unmatch: Vec<&'static str>,
    action: Option<(RuleAction, String)>,
    payload: String,
}

impl RuleBuilder {
    /// Apply one option; returns whether it opened a `domain=` list
    fn apply_option(&mut self, option: &str) -> Result<bool, RuleError> {
        let (negated, name) = match option.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, option),
        };

        if INFORMATIONAL_OPTIONS.contains(&name) {
            return Ok(false);
        }

        match name {
            "first-party" => {
                self.push_party(!negated);
                return Ok(false);
            }
            "third-party" => {
                self.push_party(negated);
                return Ok(false);
            }
            _ => {}
        }

        if let Some((action, payload)) = RuleAction::from_option(name) {
            if negated {
                return Err(invalid(option));
            }
            if let Some((_, first)) = &self.action {
                return Err(RuleError::ConflictingAction {
                    first: first.clone(),
                    second: option.to_string(),
                });
            }
            if payload.is_empty() {
                return Err(RuleError::EmptyPayload {
                    option: option.to_string(),
                });
            }
            self.action = Some((action, option.to_string()));
            self.payload = payload.to_string();
            return Ok(false);
        }

        if let Some(list) = name.strip_prefix("domain=") {
            if negated {
                return Err(invalid(option));
            }
            self.push_domains(list);
            return Ok(true);
        }

        if let Some(canonical) = normalize_type(name) {
            if negated {
                self.type_unmatch.push(canonical);
            } else {
                self.type_match.push(canonical);
            }
            return Ok(false);
        }

        Err(invalid(option))
    }

    fn push_party(&mut self, same_party: bool) {
        if same_party {
            self.domain_match.push(DomainToken::SelfParty);
        } else {
            self.domain_unmatch.push(DomainToken::SelfParty);
        }
    }

    fn push_domains(&mut self, list: &str) {
        for entry in list.split(['|', ',']).map(str::trim).filter(|d| !d.is_empty()) {
            match entry.strip_prefix('~') {
                Some(d) => self.domain_unmatch.push(DomainToken::Domain(d.to_ascii_lowercase())),
                None => self.domain_match.push(DomainToken::Domain(entry.to_ascii_lowercase())),
            }
        }
    }

    /// Comma tokens after `domain=` that look like domains continue the
    /// domain list; anything else is parsed as an option.
    fn continues_domain_list(&self, token: &str) -> bool {
        let name = token.strip_prefix('~').unwrap_or(token);
        let continues = name.contains('.') && !name.contains('=');
        if continues {
            debug!("Treating '{}' as part of the preceding domain list", token);
        }
        continues
    }

    fn check_party(&self) -> Result<(), RuleError> {
        let in_match = self.domain_match.contains(&DomainToken::SelfParty);
        let in_unmatch = self.domain_unmatch.contains(&DomainToken::SelfParty);

        if in_match && in_unmatch {
            return Err(RuleError::ConflictingParty);
        }
        if in_match && self.domain_match.len() > 1 {
            return Err(RuleError::PartyWithDomain {
                option: "first-party",
            });
        }
        if in_unmatch && self.domain_unmatch.len() > 1 {
            return Err(RuleError::PartyWithDomain {
                option: "third-party",
            });
        }
        Ok(())
    }
}

fn invalid(option: &str) -> RuleError {
    RuleError::InvalidOption {
        option: option.to_string(),
    }
}
