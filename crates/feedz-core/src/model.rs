//! Feed-state data model shared by the merge engine and the codec.
//!
//! Sets and maps are ordered (`BTreeSet`/`BTreeMap`) so every sequence the
//! engine emits has a stable order across runs and platforms.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::normalize::{extract_key, normalize_key, normalize_url};

/// Kind of a locally stored feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedKind {
    /// Syndication feed addressed by URL.
    Rss,
    /// Long-form feed addressed by a public key.
    #[serde(alias = "NOSTR")]
    KeyFeed,
    /// Video feed addressed by a public key.
    #[serde(alias = "NOSTR_VIDEO")]
    KeyVideoFeed,
}

impl FeedKind {
    /// Whether entries of this kind are addressed by public key.
    pub fn is_key_addressed(self) -> bool {
        matches!(self, Self::KeyFeed | Self::KeyVideoFeed)
    }
}

/// A feed identifier in one of the two addressing schemes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum FeedIdentifier {
    /// Syndication feed URL.
    Url(String),
    /// Public key (bare `npub1…` or a profile URL containing one).
    PublicKey(String),
}

impl FeedIdentifier {
    /// The identifier literal as it was received.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Url(s) | Self::PublicKey(s) => s,
        }
    }

    /// Comparison key for this identifier.
    pub fn normalized(&self) -> String {
        match self {
            Self::Url(s) => normalize_url(s),
            Self::PublicKey(s) => normalize_key(s),
        }
    }

    /// The local feed kind an addition of this identifier creates.
    pub fn feed_kind(&self) -> FeedKind {
        match self {
            Self::Url(_) => FeedKind::Rss,
            Self::PublicKey(_) => FeedKind::KeyFeed,
        }
    }

    /// Whether two identifiers denote the same feed.
    pub fn same_feed(&self, other: &Self) -> bool {
        self.feed_kind().is_key_addressed() == other.feed_kind().is_key_addressed()
            && self.normalized() == other.normalized()
    }
}

/// A feed as stored on this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFeedEntry {
    /// Addressing scheme / content type.
    pub kind: FeedKind,
    /// Feed URL or key literal.
    pub address: String,
    /// User-assigned tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Unix seconds at which the user removed this feed. Once set it is never
    /// cleared; the entry stays as a tombstone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<u64>,
}

impl LocalFeedEntry {
    /// Create an active entry with no tags.
    pub fn new(kind: FeedKind, address: impl Into<String>) -> Self {
        Self {
            kind,
            address: address.into(),
            tags: BTreeSet::new(),
            deleted_at: None,
        }
    }

    /// Attach tags to this entry.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Mark this entry as deleted at `timestamp`.
    pub fn deleted(mut self, timestamp: u64) -> Self {
        self.deleted_at = Some(timestamp);
        self
    }

    /// True unless the entry is a tombstone.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Comparison key, normalized according to the entry's own kind.
    pub fn normalized(&self) -> String {
        crate::normalize::normalize(self.kind, &self.address)
    }

    /// The identifier this entry is published under: the address for URL
    /// feeds, the embedded key for key feeds (falling back to the address).
    pub fn published_identifier(&self) -> &str {
        if self.kind.is_key_addressed() {
            extract_key(&self.address).unwrap_or(&self.address)
        } else {
            &self.address
        }
    }
}

/// The complete remote subscription state of one user.
///
/// A snapshot always replaces the previous one wholesale; it is never applied
/// as a delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    /// Active URL-addressed feeds.
    pub url_feeds: Vec<String>,
    /// Active key-addressed feeds.
    pub key_feeds: Vec<String>,
    /// Tags keyed by the literal address used in `url_feeds` / `key_feeds`.
    pub tags_by_address: BTreeMap<String, BTreeSet<String>>,
    /// Addresses the user deliberately removed.
    pub deleted_addresses: Option<Vec<String>>,
    /// Unix seconds at which the snapshot was produced.
    pub last_updated: u64,
}

impl SubscriptionSnapshot {
    /// Build a snapshot of the caller's current local state.
    ///
    /// Tombstoned entries are carried in `deleted_addresses` so the deletion
    /// reaches other devices. `deleted_addresses` is `None` when nothing is
    /// deleted.
    pub fn from_local(entries: &[LocalFeedEntry], now: u64) -> Self {
        let mut snapshot = Self {
            last_updated: now,
            ..Self::default()
        };
        let mut deleted = Vec::new();

        for entry in entries {
            let identifier = entry.published_identifier();

            if !entry.is_active() {
                deleted.push(identifier.to_string());
                continue;
            }

            if entry.kind.is_key_addressed() {
                snapshot.key_feeds.push(identifier.to_string());
            } else {
                snapshot.url_feeds.push(identifier.to_string());
            }

            if !entry.tags.is_empty() {
                snapshot
                    .tags_by_address
                    .insert(identifier.to_string(), entry.tags.clone());
            }
        }

        if !deleted.is_empty() {
            snapshot.deleted_addresses = Some(deleted);
        }
        snapshot
    }

    /// Tags recorded for a literal address (empty when none).
    pub fn tags_for(&self, address: &str) -> BTreeSet<String> {
        self.tags_by_address.get(address).cloned().unwrap_or_default()
    }

    /// Deleted addresses, or an empty slice.
    pub fn deleted(&self) -> &[String] {
        self.deleted_addresses.as_deref().unwrap_or(&[])
    }

    /// True if the snapshot lists no feeds at all.
    pub fn is_empty(&self) -> bool {
        self.url_feeds.is_empty() && self.key_feeds.is_empty() && self.deleted().is_empty()
    }
}

/// The complete remote read-status state of one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadStatusSnapshot {
    /// GUIDs of items that have been read.
    pub read_guids: BTreeSet<String>,
    /// Unix seconds at which the snapshot was produced.
    pub last_updated: u64,
}

impl ReadStatusSnapshot {
    /// Build a read-status snapshot from the local read set.
    pub fn new<I, S>(guids: I, now: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            read_guids: guids.into_iter().map(Into::into).collect(),
            last_updated: now,
        }
    }
}
