//! Relay URL validation and normalization.
//!
//! User-supplied relay lists go through here before any connection is made,
//! so that `wss://Relay.Example.com/` and `wss://relay.example.com` are the
//! same relay and a typo fails at configuration time rather than as a
//! connection error on every sync.
//!
//! # Normalization Rules
//!
//! - Only `ws://` and `wss://` are accepted
//! - Scheme and host are lowercased, default ports dropped
//! - Trailing slashes are removed, paths are otherwise preserved

use nostr::RelayUrl;

/// Result of URL normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeResult {
    /// URL is valid; the normalized form.
    Ok(String),
    /// URL is not a usable relay URL; the reason.
    Invalid(String),
}

impl NormalizeResult {
    /// Returns the normalized URL if valid.
    pub fn ok(self) -> Option<String> {
        match self {
            Self::Ok(url) => Some(url),
            Self::Invalid(_) => None,
        }
    }

    /// Returns true if the URL is valid.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// Normalize a relay URL.
///
/// # Examples
///
/// ```
/// use feedz_sync::relay_url::normalize_relay_url;
///
/// assert_eq!(
///     normalize_relay_url("wss://Relay.Example.COM/").ok(),
///     Some("wss://relay.example.com".to_string())
/// );
/// assert!(!normalize_relay_url("https://relay.example.com").is_ok());
/// ```
pub fn normalize_relay_url(url: &str) -> NormalizeResult {
    let url = url.trim();

    let lowered = url.to_ascii_lowercase();
    if !lowered.starts_with("wss://") && !lowered.starts_with("ws://") {
        return NormalizeResult::Invalid("URL must start with wss:// or ws://".to_string());
    }

    let parsed = match RelayUrl::parse(url) {
        Ok(u) => u,
        Err(e) => return NormalizeResult::Invalid(format!("invalid relay URL: {e}")),
    };

    let mut normalized = parsed.to_string();
    while normalized.ends_with('/') {
        normalized.pop();
    }

    if normalized.ends_with("://") {
        return NormalizeResult::Invalid("empty host".to_string());
    }

    NormalizeResult::Ok(normalized)
}

/// Normalize and parse a relay URL in one step.
pub fn parse_relay_url(url: &str) -> Result<RelayUrl, String> {
    match normalize_relay_url(url) {
        NormalizeResult::Ok(normalized) => {
            RelayUrl::parse(&normalized).map_err(|e| format!("invalid relay URL: {e}"))
        }
        NormalizeResult::Invalid(reason) => Err(reason),
    }
}

/// Display form of a relay URL without the trailing slash.
pub fn display(url: &RelayUrl) -> String {
    url.to_string().trim_end_matches('/').to_string()
}
