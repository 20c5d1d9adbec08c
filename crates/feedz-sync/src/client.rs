//! High-level sync driver.
//!
//! [`SyncClient`] wires the pieces together: fetch the newest snapshot, decode
//! it, merge it with local state, and publish local state back. It never
//! writes local state; callers apply the returned diffs themselves.

use std::collections::BTreeSet;

use feedz_core::codec::decode;
use feedz_core::{
    Decoded, LocalFeedEntry, MergeResult, ReadStatusMerge, ReadStatusSnapshot, SnapshotPayload,
    SubscriptionSnapshot, apply, merge, merge_read_status, parse_owner,
};
use nostr::Timestamp;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::publish::{PublishReceipt, RecordSigner, publish_at};
use crate::query::{FetchOutcome, QueryStats, fetch_latest};
use crate::transport::{NostrTransport, RecordFilter, RelayTransport};

/// Result of reconciling local feeds with the remote snapshot.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// The remote snapshot merged against, if one exists.
    pub remote: Option<Decoded<SubscriptionSnapshot>>,
    /// What to change locally and what to publish.
    pub merge: MergeResult,
    /// Relay accounting for the fetch.
    pub stats: QueryStats,
}

/// Result of reconciling local read markers with the remote snapshot.
#[derive(Debug, Clone)]
pub struct ReadStatusReconciliation {
    /// The remote snapshot merged against, if one exists.
    pub remote: Option<Decoded<ReadStatusSnapshot>>,
    /// Markers to apply locally and markers to publish.
    pub merge: ReadStatusMerge,
    /// Relay accounting for the fetch.
    pub stats: QueryStats,
}

/// Result of [`SyncClient::reconcile_and_publish`].
#[derive(Debug, Clone)]
pub struct PublishedReconciliation {
    /// The merge that was performed.
    pub reconciliation: Reconciliation,
    /// Local feeds with the merge applied; this is what was published.
    pub feeds: Vec<LocalFeedEntry>,
    /// Publish outcome.
    pub receipt: PublishReceipt,
}

/// Fetches, merges and publishes feed state for one device.
#[derive(Debug)]
pub struct SyncClient<T = NostrTransport> {
    transport: T,
    config: SyncConfig,
}

impl SyncClient<NostrTransport> {
    /// Client talking to real relays.
    pub fn new(config: SyncConfig) -> Self {
        Self::with_transport(NostrTransport::new(), config)
    }
}

impl<T: RelayTransport> SyncClient<T> {
    /// Client over an arbitrary transport.
    pub fn with_transport(transport: T, config: SyncConfig) -> Self {
        Self { transport, config }
    }

    /// The configuration every call uses.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch and decode the newest subscription snapshot of `owner`
    /// (`npub1…` or hex).
    pub async fn fetch_subscriptions(
        &self,
        owner: &str,
    ) -> Result<FetchOutcome<Decoded<SubscriptionSnapshot>>> {
        self.fetch_snapshot(owner).await
    }

    /// Fetch and decode the newest read-status snapshot of `owner`.
    pub async fn fetch_read_status(
        &self,
        owner: &str,
    ) -> Result<FetchOutcome<Decoded<ReadStatusSnapshot>>> {
        self.fetch_snapshot(owner).await
    }

    /// Fetch the remote subscriptions and merge them with `local`.
    ///
    /// With no remote snapshot the merge runs against an empty one, so every
    /// active local entry comes back as local-only.
    pub async fn reconcile(&self, owner: &str, local: &[LocalFeedEntry]) -> Result<Reconciliation> {
        let outcome = self.fetch_subscriptions(owner).await?;
        let empty = SubscriptionSnapshot::default();
        let remote = outcome
            .record
            .as_ref()
            .map_or(&empty, |decoded| &decoded.snapshot);

        let merged = merge(local, remote);
        tracing::info!(
            added = merged.stats.added_count,
            removed = merged.stats.removed_count,
            local_only = merged.stats.local_only_count,
            remote_found = outcome.record.is_some(),
            "Subscriptions reconciled"
        );

        Ok(Reconciliation {
            remote: outcome.record,
            merge: merged,
            stats: outcome.stats,
        })
    }

    /// Fetch the remote read markers and merge them with `local_read`.
    pub async fn reconcile_read_status(
        &self,
        owner: &str,
        local_read: &BTreeSet<String>,
    ) -> Result<ReadStatusReconciliation> {
        let outcome = self.fetch_read_status(owner).await?;
        let empty = ReadStatusSnapshot::default();
        let remote = outcome
            .record
            .as_ref()
            .map_or(&empty, |decoded| &decoded.snapshot);

        let merged = merge_read_status(local_read, remote);
        tracing::info!(
            to_mark_read = merged.to_mark_read.len(),
            local_only = merged.local_only.len(),
            remote_found = outcome.record.is_some(),
            "Read status reconciled"
        );

        Ok(ReadStatusReconciliation {
            remote: outcome.record,
            merge: merged,
            stats: outcome.stats,
        })
    }

    /// Publish a subscription snapshot of `local`.
    pub async fn publish_subscriptions<S>(
        &self,
        local: &[LocalFeedEntry],
        signer: &S,
    ) -> Result<PublishReceipt>
    where
        S: RecordSigner + ?Sized,
    {
        let now = Timestamp::now().as_u64();
        let snapshot = SubscriptionSnapshot::from_local(local, now);
        publish_at(&self.transport, &self.config, &snapshot, signer, now).await
    }

    /// Reconcile `local` with the remote snapshot of `owner`, then publish the
    /// merged feeds.
    ///
    /// Remote additions and deletions are applied before publishing, so the
    /// replaceable record never loses entries other devices wrote.
    ///
    /// # Errors
    ///
    /// [`SyncError::OwnerMismatch`] if `signer` does not sign as `owner`; the
    /// relays are not contacted.
    pub async fn reconcile_and_publish<S>(
        &self,
        owner: &str,
        local: &[LocalFeedEntry],
        signer: &S,
    ) -> Result<PublishedReconciliation>
    where
        S: RecordSigner + ?Sized,
    {
        let owner_key = parse_owner(owner)?;
        let signer_key = signer
            .public_key()
            .await
            .map_err(SyncError::SigningRefused)?;
        if signer_key != owner_key {
            return Err(SyncError::OwnerMismatch {
                owner: owner_key,
                signer: signer_key,
            });
        }

        let reconciliation = self.reconcile(owner, local).await?;
        let feeds = apply(local, &reconciliation.merge, Timestamp::now().as_u64());
        let receipt = self.publish_subscriptions(&feeds, signer).await?;

        Ok(PublishedReconciliation {
            reconciliation,
            feeds,
            receipt,
        })
    }

    /// Publish the complete local read set.
    pub async fn publish_read_status<S>(
        &self,
        read_guids: &BTreeSet<String>,
        signer: &S,
    ) -> Result<PublishReceipt>
    where
        S: RecordSigner + ?Sized,
    {
        let now = Timestamp::now().as_u64();
        let snapshot = ReadStatusSnapshot::new(read_guids.iter().cloned(), now);
        publish_at(&self.transport, &self.config, &snapshot, signer, now).await
    }

    async fn fetch_snapshot<P>(&self, owner: &str) -> Result<FetchOutcome<Decoded<P>>>
    where
        P: SnapshotPayload,
    {
        let owner = parse_owner(owner)?;
        let filter = RecordFilter::for_payload::<P>(owner);
        let outcome = fetch_latest(&self.transport, &self.config, &filter).await?;
        Ok(outcome.try_map(|event| decode::<P>(&event))?)
    }
}
