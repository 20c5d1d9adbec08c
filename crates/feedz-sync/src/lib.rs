//! Relay I/O for feedz subscription sync.
//!
//! This crate fetches the newest sync snapshot from a set of Nostr relays,
//! hands it to the merge engine in `feedz-core`, and publishes local state
//! back.
//!
//! # Modules
//!
//! - [`transport`] - One-relay query/send seam (network and in-memory)
//! - [`query`] - Concurrent newest-record lookup across relays
//! - [`publish`] - Signing and first-acknowledgment broadcast
//! - [`client`] - Fetch, merge and publish in one place
//! - [`config`] - Relay list and timeouts
//! - [`state`] - Local state file used by the CLI
//!
//! # Flow
//!
//! ```text
//! ┌──────────────┐   fetch_latest    ┌──────────────┐
//! │    Relays    │ ────────────────▶ │   Decoded    │  newest (created_at, id)
//! └──────────────┘                   └──────┬───────┘
//!        ▲                                  │ merge(local, remote)
//!        │ publish (first ack wins)         ▼
//! ┌──────┴───────┐                   ┌──────────────┐
//! │   Snapshot   │ ◀──────────────── │ MergeResult  │  toAdd / toRemove / localOnly
//! └──────────────┘   from_local      └──────────────┘
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod publish;
pub mod query;
pub mod relay_url;
pub mod state;
pub mod transport;

pub use client::{PublishedReconciliation, ReadStatusReconciliation, Reconciliation, SyncClient};
pub use config::SyncConfig;
pub use error::{Result, SignError, SyncError, TransportError};
pub use publish::{NostrSignerAdapter, PublishReceipt, RecordSigner, publish, publish_at};
pub use query::{FetchOutcome, QueryStats, fetch_latest, select_latest};
pub use state::LocalState;
pub use transport::{MockTransport, NostrTransport, RecordFilter, RelayTransport};
