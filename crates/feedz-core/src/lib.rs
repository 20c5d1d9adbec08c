//! Core types and reconciliation logic for feedz subscription sync.
//!
//! This crate provides:
//! - Identifier normalization (feed URLs and bech32 public keys)
//! - Encoding/decoding of the sync snapshots carried in Nostr events
//! - The merge engine that diffs local feed state against a remote snapshot
//! - Shared error types
//!
//! Everything here is synchronous and free of I/O. Relay access lives in the
//! `feedz-sync` crate.

pub mod codec;
mod error;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod read_status;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// Replaceable event kind carrying the subscription snapshot.
pub const SUBSCRIPTION_LIST_KIND: u16 = 30404;

/// Replaceable event kind carrying the read-status snapshot.
pub const READ_STATUS_KIND: u16 = 30405;

/// `d` tag value identifying the subscription snapshot slot.
pub const SUBSCRIPTIONS_IDENTIFIER: &str = "nostr-feedz-subscriptions";

/// `d` tag value identifying the read-status snapshot slot.
pub const READ_STATUS_IDENTIFIER: &str = "nostr-feedz-read-status";

/// Value of the `client` tag attached to every published snapshot.
pub const CLIENT_NAME: &str = "nostr-feedz";

pub use codec::{Decoded, SnapshotPayload, parse_owner};
pub use error::{Error, Result};
pub use merge::{MergeResult, MergeStats, RemoteAddition, apply, merge};
pub use model::{
    FeedIdentifier, FeedKind, LocalFeedEntry, ReadStatusSnapshot, SubscriptionSnapshot,
};
pub use normalize::{extract_key, normalize, normalize_key, normalize_url};
pub use read_status::{ReadStatusMerge, merge_read_status};
