//! Snapshot encoding to and from Nostr events.
//!
//! Both snapshots travel as parameterized replaceable events: the slot is
//! identified by `(author, kind, d tag)` and a newer event replaces an older
//! one at the relay. The JSON content mirrors the documents written by the
//! web client:
//!
//! ```text
//! kind 30404, d = "nostr-feedz-subscriptions"
//!   { "rss": [url...], "nostr": [npub...], "tags": { address: [tag...] },
//!     "deleted": [address...], "lastUpdated": 1700000000 }
//!
//! kind 30405, d = "nostr-feedz-read-status"
//!   { "itemGuids": [guid...], "lastUpdated": 1700000000 }
//! ```
//!
//! Decoding is lenient about content: a record whose JSON does not match the
//! expected shape decodes to an empty snapshot (with a warning) so a single
//! corrupt record cannot block sync. It is strict about the envelope: the kind
//! and `d` tag must match.

use std::collections::{BTreeMap, BTreeSet};

use nostr::nips::nip19::FromBech32;
use nostr::{Event, EventBuilder, EventId, Kind, PublicKey, Tag, TagKind, Timestamp, UnsignedEvent};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ReadStatusSnapshot, SubscriptionSnapshot};
use crate::{
    CLIENT_NAME, READ_STATUS_IDENTIFIER, READ_STATUS_KIND, SUBSCRIPTION_LIST_KIND,
    SUBSCRIPTIONS_IDENTIFIER,
};

/// A snapshot type that can be carried in a replaceable event.
pub trait SnapshotPayload: Sized {
    /// Event kind of the record.
    const KIND: u16;

    /// Value of the `d` tag naming the record's slot.
    const IDENTIFIER: &'static str;

    /// Serialize to the JSON content document.
    fn to_content(&self) -> Result<String>;

    /// Parse the JSON content document.
    ///
    /// `created_at` is used when the document carries no `lastUpdated`.
    fn from_content(content: &str, created_at: u64) -> Result<Self>;

    /// An empty snapshot, used when a record's content is unreadable.
    fn empty(created_at: u64) -> Self;

    /// Unix seconds at which the snapshot was produced.
    fn last_updated(&self) -> u64;

    /// Stamp a new production time.
    fn set_last_updated(&mut self, timestamp: u64);

    /// Nostr kind of the record.
    fn kind() -> Kind {
        Kind::from(Self::KIND)
    }
}

/// A snapshot decoded from a relay record, with the envelope fields the
/// engine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T> {
    /// The decoded (or empty, if the content was corrupt) snapshot.
    pub snapshot: T,
    /// ID of the event the snapshot came from.
    pub event_id: EventId,
    /// Event `created_at`, unix seconds.
    pub created_at: u64,
    /// Author of the event.
    pub author: PublicKey,
    /// False when the content could not be parsed and `snapshot` is empty.
    pub content_valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SubscriptionContent {
    #[serde(default)]
    rss: Vec<String>,
    #[serde(default)]
    nostr: Vec<String>,
    #[serde(default)]
    tags: BTreeMap<String, BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deleted: Option<Vec<String>>,
    #[serde(rename = "lastUpdated", default, skip_serializing_if = "Option::is_none")]
    last_updated: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReadStatusContent {
    #[serde(rename = "itemGuids", default)]
    item_guids: BTreeSet<String>,
    #[serde(rename = "lastUpdated", default, skip_serializing_if = "Option::is_none")]
    last_updated: Option<u64>,
}

impl SnapshotPayload for SubscriptionSnapshot {
    const KIND: u16 = SUBSCRIPTION_LIST_KIND;
    const IDENTIFIER: &'static str = SUBSCRIPTIONS_IDENTIFIER;

    fn to_content(&self) -> Result<String> {
        let content = SubscriptionContent {
            rss: self.url_feeds.clone(),
            nostr: self.key_feeds.clone(),
            tags: self.tags_by_address.clone(),
            deleted: self.deleted_addresses.clone(),
            last_updated: Some(self.last_updated),
        };
        Ok(serde_json::to_string(&content)?)
    }

    fn from_content(content: &str, created_at: u64) -> Result<Self> {
        let parsed: SubscriptionContent = serde_json::from_str(content)?;
        Ok(Self {
            url_feeds: parsed.rss,
            key_feeds: parsed.nostr,
            tags_by_address: parsed.tags,
            deleted_addresses: parsed.deleted,
            last_updated: parsed.last_updated.unwrap_or(created_at),
        })
    }

    fn empty(created_at: u64) -> Self {
        Self {
            last_updated: created_at,
            ..Self::default()
        }
    }

    fn last_updated(&self) -> u64 {
        self.last_updated
    }

    fn set_last_updated(&mut self, timestamp: u64) {
        self.last_updated = timestamp;
    }
}

impl SnapshotPayload for ReadStatusSnapshot {
    const KIND: u16 = READ_STATUS_KIND;
    const IDENTIFIER: &'static str = READ_STATUS_IDENTIFIER;

    fn to_content(&self) -> Result<String> {
        let content = ReadStatusContent {
            item_guids: self.read_guids.clone(),
            last_updated: Some(self.last_updated),
        };
        Ok(serde_json::to_string(&content)?)
    }

    fn from_content(content: &str, created_at: u64) -> Result<Self> {
        let parsed: ReadStatusContent = serde_json::from_str(content)?;
        Ok(Self {
            read_guids: parsed.item_guids,
            last_updated: parsed.last_updated.unwrap_or(created_at),
        })
    }

    fn empty(created_at: u64) -> Self {
        Self {
            last_updated: created_at,
            ..Self::default()
        }
    }

    fn last_updated(&self) -> u64 {
        self.last_updated
    }

    fn set_last_updated(&mut self, timestamp: u64) {
        self.last_updated = timestamp;
    }
}

/// Build the event for a snapshot, ready to be given a pubkey and signed.
///
/// The event `created_at` is the snapshot's `last_updated`, so the relay-level
/// ordering and the content timestamp agree.
pub fn encode<T: SnapshotPayload>(snapshot: &T) -> Result<EventBuilder> {
    let content = snapshot.to_content()?;
    Ok(EventBuilder::new(T::kind(), content)
        .tags([
            Tag::identifier(T::IDENTIFIER),
            Tag::custom(TagKind::Client, [CLIENT_NAME]),
        ])
        .custom_created_at(Timestamp::from(snapshot.last_updated())))
}

/// Build the unsigned event for a snapshot authored by `author`.
pub fn encode_unsigned<T: SnapshotPayload>(snapshot: &T, author: PublicKey) -> Result<UnsignedEvent> {
    Ok(encode(snapshot)?.build(author))
}

/// Decode a relay record into a snapshot.
///
/// # Errors
///
/// Returns [`Error::UnexpectedRecord`] if the event's kind or `d` tag belong to
/// a different record type. Unreadable content is *not* an error: it yields an
/// empty snapshot with `content_valid == false`.
pub fn decode<T: SnapshotPayload>(event: &Event) -> Result<Decoded<T>> {
    check_envelope::<T>(event)?;

    let created_at = event.created_at.as_u64();
    let (snapshot, content_valid) = match T::from_content(&event.content, created_at) {
        Ok(snapshot) => (snapshot, true),
        Err(e) => {
            tracing::warn!(
                event_id = %event.id,
                kind = T::KIND,
                error = %e,
                "Corrupt snapshot content, treating record as empty"
            );
            (T::empty(created_at), false)
        }
    };

    Ok(Decoded {
        snapshot,
        event_id: event.id,
        created_at,
        author: event.pubkey,
        content_valid,
    })
}

/// Decode a relay record, failing on unreadable content.
pub fn decode_strict<T: SnapshotPayload>(event: &Event) -> Result<Decoded<T>> {
    check_envelope::<T>(event)?;
    let created_at = event.created_at.as_u64();
    let snapshot = T::from_content(&event.content, created_at)?;
    Ok(Decoded {
        snapshot,
        event_id: event.id,
        created_at,
        author: event.pubkey,
        content_valid: true,
    })
}

/// Value of the event's `d` tag, if any.
pub fn identifier_of(event: &Event) -> Option<&str> {
    event.tags.iter().find_map(|tag| match tag.as_slice() {
        [name, value, ..] if name == "d" => Some(value.as_str()),
        _ => None,
    })
}

/// Parse an owner given as `npub1…` or 64-character hex.
pub fn parse_owner(input: &str) -> Result<PublicKey> {
    let input = input.trim();
    let parsed = if input.starts_with("npub") {
        PublicKey::from_bech32(input).map_err(|e| e.to_string())
    } else {
        PublicKey::from_hex(input).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| Error::InvalidKey {
        input: input.to_string(),
        reason,
    })
}

fn check_envelope<T: SnapshotPayload>(event: &Event) -> Result<()> {
    let kind = event.kind.as_u16();
    if kind != T::KIND || identifier_of(event) != Some(T::IDENTIFIER) {
        return Err(Error::UnexpectedRecord {
            expected_kind: T::KIND,
            expected_identifier: T::IDENTIFIER,
            kind,
        });
    }
    Ok(())
}
