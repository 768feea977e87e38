use serde::{Deserialize, Serialize};
use url::{Host, Url};

/// Literal left behind when the billing system's URL substitution never ran.
pub const SITEURL_PLACEHOLDER: &str = "[wc_subscriptions_siteurl]";

const FALLBACK_HOST: &str = "example.com";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoredUrlState {
    NotSet,
    Corrupted,
    ValidUrl,
    InvalidFormat,
}

impl StoredUrlState {
    pub fn label(self) -> &'static str {
        match self {
            StoredUrlState::NotSet => "Not set",
            StoredUrlState::Corrupted => "Corrupted (unresolved placeholder)",
            StoredUrlState::ValidUrl => "Valid URL",
            StoredUrlState::InvalidFormat => "Invalid format",
        }
    }
}

pub fn is_corrupted(stored: &str) -> bool {
    stored.contains(SITEURL_PLACEHOLDER)
}

pub fn classify_stored_url(stored: Option<&str>) -> StoredUrlState {
    match stored {
        None => StoredUrlState::NotSet,
        Some(value) if value.is_empty() => StoredUrlState::NotSet,
        Some(value) if is_corrupted(value) => StoredUrlState::Corrupted,
        Some(value) if parse_absolute_url(value).is_some() => StoredUrlState::ValidUrl,
        Some(_) => StoredUrlState::InvalidFormat,
    }
}

/// Builds the URL written when staging mode is forced.
///
/// `staging.` is prepended to the canonical host; a host that already
/// mentions `staging` loses it and gets `live.` instead, so the result never
/// equals the canonical URL. Hosts like `my-staging-site.com` come out odd
/// (`live.my--site.com`) and that is accepted. When the rewritten host would
/// not parse, as with IP literals, a placeholder host under `example.com` is
/// used instead.
pub fn derive_staging_url(canonical: &str) -> String {
    let parsed = Url::parse(canonical).ok();
    let host = parsed
        .as_ref()
        .and_then(|url| url.host_str())
        .filter(|host| !host.is_empty())
        .unwrap_or(FALLBACK_HOST);
    let port = parsed.as_ref().and_then(Url::port);

    let derived_host = if host.contains("staging") {
        let stripped = match host.strip_prefix("staging.") {
            Some(rest) => rest.to_string(),
            None => host
                .replacen("staging", "", 1)
                .trim_start_matches(['.', '-'])
                .to_string(),
        };
        if stripped.is_empty() {
            format!("live.{FALLBACK_HOST}")
        } else {
            format!("live.{stripped}")
        }
    } else {
        format!("staging.{host}")
    };
    let derived_host = if Url::parse(&format!("https://{derived_host}")).is_ok() {
        derived_host
    } else if host.contains("staging") {
        format!("live.{FALLBACK_HOST}")
    } else {
        format!("staging.{FALLBACK_HOST}")
    };

    match port {
        Some(port) => format!("https://{derived_host}:{port}"),
        None => format!("https://{derived_host}"),
    }
}

/// Strips surrounding whitespace plus any control or whitespace characters
/// inside the candidate.
pub fn sanitize_url(candidate: &str) -> String {
    candidate
        .trim()
        .chars()
        .filter(|ch| !ch.is_control() && !ch.is_whitespace())
        .collect()
}

/// Sanitizes and validates an operator supplied URL. `None` means reject.
pub fn validate_custom_url(candidate: &str) -> Option<String> {
    let sanitized = sanitize_url(candidate);
    if sanitized.is_empty() || is_corrupted(&sanitized) {
        return None;
    }
    parse_absolute_url(&sanitized)?;
    Some(sanitized)
}

pub fn parse_absolute_url(value: &str) -> Option<Url> {
    let url = Url::parse(value).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Some(url),
        _ => None,
    }
}

/// Canonical site URLs need a domain host; `staging.` cannot be prefixed
/// onto an IP literal.
pub fn parse_canonical_url(value: &str) -> Option<Url> {
    let url = parse_absolute_url(value)?;
    matches!(url.host(), Some(Host::Domain(_))).then_some(url)
}
