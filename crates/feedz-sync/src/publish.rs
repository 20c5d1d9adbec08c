//! Signing and broadcasting snapshots.
//!
//! A snapshot is stamped with the current time, encoded, handed to the signer
//! and sent to every relay at once. The first acknowledgment settles the
//! publish: the sends still in flight are dropped and their relays are
//! reported as abandoned. The publish returns only after those connections
//! are closed.

use async_trait::async_trait;
use feedz_core::SnapshotPayload;
use feedz_core::codec::encode_unsigned;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use metrics::counter;
use nostr::{Event, EventId, Keys, NostrSigner, PublicKey, RelayUrl, Timestamp, UnsignedEvent};

use crate::config::SyncConfig;
use crate::error::{Result, SignError, SyncError};
use crate::transport::RelayTransport;

/// Something that can sign records on the user's behalf.
///
/// Errors are passed through to [`SyncError::SigningRefused`] unchanged.
#[async_trait]
pub trait RecordSigner: Send + Sync {
    /// Public key records will be signed with.
    async fn public_key(&self) -> std::result::Result<PublicKey, SignError>;

    /// Sign `unsigned`.
    async fn sign(&self, unsigned: UnsignedEvent) -> std::result::Result<Event, SignError>;
}

#[async_trait]
impl RecordSigner for Keys {
    async fn public_key(&self) -> std::result::Result<PublicKey, SignError> {
        Ok(Keys::public_key(self))
    }

    async fn sign(&self, unsigned: UnsignedEvent) -> std::result::Result<Event, SignError> {
        unsigned.sign_with_keys(self).map_err(Into::into)
    }
}

/// Use any [`NostrSigner`] (browser extension, remote bunker, ...) as a
/// [`RecordSigner`].
#[derive(Debug, Clone)]
pub struct NostrSignerAdapter<S>(pub S);

#[async_trait]
impl<S> RecordSigner for NostrSignerAdapter<S>
where
    S: NostrSigner,
{
    async fn public_key(&self) -> std::result::Result<PublicKey, SignError> {
        self.0.get_public_key().await.map_err(Into::into)
    }

    async fn sign(&self, unsigned: UnsignedEvent) -> std::result::Result<Event, SignError> {
        self.0.sign_event(unsigned).await.map_err(Into::into)
    }
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// ID of the published event.
    pub event_id: EventId,
    /// The relay whose acknowledgment settled the publish.
    pub acknowledged_by: RelayUrl,
    /// Relays that failed before the acknowledgment, with reasons.
    pub failed: Vec<(RelayUrl, String)>,
    /// Relays whose sends were cancelled once the publish settled.
    pub abandoned: usize,
}

/// Publish `snapshot`, stamped with the current time.
///
/// # Errors
///
/// - [`SyncError::SigningRefused`] if the signer fails; nothing is sent
/// - [`SyncError::Publish`] if every relay rejects or is unreachable
/// - [`SyncError::Timeout`] if the deadline expires first
pub async fn publish<P, T, S>(
    transport: &T,
    config: &SyncConfig,
    snapshot: &P,
    signer: &S,
) -> Result<PublishReceipt>
where
    P: SnapshotPayload + Clone,
    T: RelayTransport + ?Sized,
    S: RecordSigner + ?Sized,
{
    publish_at(transport, config, snapshot, signer, Timestamp::now().as_u64()).await
}

/// Publish `snapshot` stamped with `now` (unix seconds).
pub async fn publish_at<P, T, S>(
    transport: &T,
    config: &SyncConfig,
    snapshot: &P,
    signer: &S,
    now: u64,
) -> Result<PublishReceipt>
where
    P: SnapshotPayload + Clone,
    T: RelayTransport + ?Sized,
    S: RecordSigner + ?Sized,
{
    config.validate()?;

    let mut snapshot = snapshot.clone();
    snapshot.set_last_updated(now);

    let event = sign(signer, &snapshot).await?;
    let event_id = event.id;
    let attempted = config.relays.len();

    tracing::debug!(%event_id, kind = P::KIND, relays = attempted, "Broadcasting snapshot");

    let event_ref = &event;
    let mut pending: FuturesUnordered<_> = config
        .relays
        .iter()
        .map(|relay| async move {
            let result = transport.send(relay, event_ref, config.relay_timeout).await;
            (relay, result)
        })
        .collect();

    let mut failed = Vec::new();
    let first_ack = async {
        while let Some((relay, result)) = pending.next().await {
            match result {
                Ok(()) => return Some(relay.clone()),
                Err(e) => {
                    counter!("sync_relay_failures_total", "op" => "publish").increment(1);
                    tracing::warn!(relay = %relay, error = %e, "Relay did not accept snapshot");
                    failed.push((relay.clone(), e.to_string()));
                }
            }
        }
        None
    };

    let settled = tokio::time::timeout(config.deadline, first_ack).await;
    let abandoned = pending.len();
    drop(pending);
    transport.close_abandoned().await;

    let acknowledged = match settled {
        Ok(acknowledged) => acknowledged,
        Err(_) => {
            counter!("sync_publish_total", "outcome" => "timeout").increment(1);
            tracing::warn!(%event_id, deadline_secs = config.deadline.as_secs(), "Publish deadline expired");
            return Err(SyncError::Timeout(config.deadline));
        }
    };

    match acknowledged {
        Some(relay) => {
            counter!("sync_publish_total", "outcome" => "ok").increment(1);
            tracing::info!(
                %event_id,
                kind = P::KIND,
                acknowledged_by = %relay,
                failed = failed.len(),
                abandoned,
                "Snapshot published"
            );
            Ok(PublishReceipt {
                event_id,
                acknowledged_by: relay,
                failed,
                abandoned,
            })
        }
        None => {
            counter!("sync_publish_total", "outcome" => "rejected").increment(1);
            tracing::warn!(%event_id, attempted, "No relay accepted snapshot");
            Err(SyncError::Publish {
                attempted,
                failures: failed,
            })
        }
    }
}

async fn sign<P, S>(signer: &S, snapshot: &P) -> Result<Event>
where
    P: SnapshotPayload,
    S: RecordSigner + ?Sized,
{
    let refused = |e: SignError| {
        counter!("sync_publish_total", "outcome" => "refused").increment(1);
        tracing::warn!(error = %e, "Signer refused");
        SyncError::SigningRefused(e)
    };

    let author = signer.public_key().await.map_err(refused)?;
    let unsigned = encode_unsigned(snapshot, author)?;
    signer.sign(unsigned).await.map_err(refused)
}
