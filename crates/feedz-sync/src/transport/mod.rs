//! Relay transport abstraction.
//!
//! Fetch and publish are written against [`RelayTransport`], which talks to
//! one relay at a time. [`NostrTransport`] is the network implementation;
//! [`MockTransport`] scripts relay behavior in memory for tests and dry runs.

mod mock;
mod relay;

use std::time::Duration;

use async_trait::async_trait;
use feedz_core::SnapshotPayload;
use feedz_core::codec::identifier_of;
use nostr::{Event, Filter, Kind, PublicKey, RelayUrl};

use crate::error::TransportError;

pub use mock::MockTransport;
pub use relay::NostrTransport;

/// One relay round-trip: query records or send one.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Fetch the records `relay` holds for `filter`.
    async fn query(
        &self,
        relay: &RelayUrl,
        filter: &RecordFilter,
        timeout: Duration,
    ) -> Result<Vec<Event>, TransportError>;

    /// Send a signed record to `relay` and wait for its acknowledgment.
    async fn send(
        &self,
        relay: &RelayUrl,
        event: &Event,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Wait until connections left behind by finished or cancelled calls
    /// are closed.
    async fn close_abandoned(&self) {}
}

/// Records by kind, author and purpose (`d`) tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    /// Event kind.
    pub kind: Kind,
    /// Record owner.
    pub author: PublicKey,
    /// Value of the `d` tag.
    pub identifier: String,
}

impl RecordFilter {
    /// Filter for the snapshot slot of payload type `T` owned by `author`.
    pub fn for_payload<T: SnapshotPayload>(author: PublicKey) -> Self {
        Self {
            kind: T::kind(),
            author,
            identifier: T::IDENTIFIER.to_string(),
        }
    }

    /// Relay-side filter.
    pub fn to_filter(&self) -> Filter {
        Filter::new()
            .kind(self.kind)
            .author(self.author)
            .identifier(self.identifier.clone())
    }

    /// Whether `event` is a record this filter asks for.
    pub fn matches(&self, event: &Event) -> bool {
        event.kind == self.kind
            && event.pubkey == self.author
            && identifier_of(event) == Some(self.identifier.as_str())
    }
}
