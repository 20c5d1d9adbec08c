//! Sync configuration: which relays to talk to and how long to wait.
//!
//! Every fetch and publish takes its relay list from an explicit
//! [`SyncConfig`] rather than process-wide state.

use std::time::Duration;

use nostr::RelayUrl;

use crate::error::{Result, SyncError};
use crate::relay_url::{display, parse_relay_url};

/// Relays used when the caller supplies none.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.snort.social",
    "wss://relay.nostr.band",
    "wss://nostr-pub.wellorder.net",
];

/// Time allowed for one relay to connect and answer.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for a whole fetch or publish.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Relay list and timeouts for sync operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Relays to query and publish to, normalized and de-duplicated.
    pub relays: Vec<RelayUrl>,
    /// Per-relay connect/answer timeout.
    pub relay_timeout: Duration,
    /// Overall deadline for one operation.
    pub deadline: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            relays: default_relays(),
            relay_timeout: DEFAULT_RELAY_TIMEOUT,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

impl SyncConfig {
    /// Replace the relay list with `overrides`.
    ///
    /// An empty override keeps the built-in relays. Duplicates (after
    /// normalization) are dropped, first occurrence wins.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if any override is not a ws/wss URL.
    pub fn with_relays<I, S>(mut self, overrides: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut relays: Vec<RelayUrl> = Vec::new();
        for raw in overrides {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let url = parse_relay_url(raw)
                .map_err(|reason| SyncError::Config(format!("relay '{raw}': {reason}")))?;
            if !relays.contains(&url) {
                relays.push(url);
            }
        }

        self.relays = if relays.is_empty() {
            default_relays()
        } else {
            relays
        };
        Ok(self)
    }

    /// Set the per-relay timeout.
    pub fn with_relay_timeout(mut self, timeout: Duration) -> Self {
        self.relay_timeout = timeout;
        self
    }

    /// Set the overall deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `FEEDZ_RELAYS`: Comma-separated relay URLs (default: built-in list)
    /// - `FEEDZ_RELAY_TIMEOUT_SECS`: Per-relay timeout (default: 10)
    /// - `FEEDZ_SYNC_TIMEOUT_SECS`: Overall deadline (default: 30)
    pub fn from_env() -> Result<Self> {
        let relays = std::env::var("FEEDZ_RELAYS").unwrap_or_default();
        let relay_timeout = env_secs("FEEDZ_RELAY_TIMEOUT_SECS", DEFAULT_RELAY_TIMEOUT)?;
        let deadline = env_secs("FEEDZ_SYNC_TIMEOUT_SECS", DEFAULT_DEADLINE)?;

        let config = Self::default()
            .with_relays(relays.split(','))?
            .with_relay_timeout(relay_timeout)
            .with_deadline(deadline);
        config.validate()?;

        tracing::info!(
            relays = config.relays.len(),
            relay_timeout_secs = config.relay_timeout.as_secs(),
            deadline_secs = config.deadline.as_secs(),
            "sync configuration loaded"
        );

        Ok(config)
    }

    /// Check that the configuration can run an operation at all.
    pub fn validate(&self) -> Result<()> {
        if self.relays.is_empty() {
            return Err(SyncError::Config("relay list is empty".to_string()));
        }
        if self.relay_timeout.is_zero() || self.deadline.is_zero() {
            return Err(SyncError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Relay URLs in display form, for logs and CLI output.
    pub fn relay_names(&self) -> Vec<String> {
        self.relays.iter().map(display).collect()
    }
}

fn default_relays() -> Vec<RelayUrl> {
    DEFAULT_RELAYS
        .iter()
        .filter_map(|url| RelayUrl::parse(url).ok())
        .collect()
}

fn env_secs(key: &str, default: Duration) -> Result<Duration> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| SyncError::Config(format!("{key}='{value}': {e}"))),
        _ => Ok(default),
    }
}
