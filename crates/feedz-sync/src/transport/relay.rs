//! Network transport backed by nostr-sdk.
//!
//! Each call opens its own single-relay [`Client`], so a connection belongs to
//! exactly one fetch or publish. The client lives in a [`RelaySession`] whose
//! `Drop` starts a disconnect; when a fetch or publish is cancelled (deadline
//! expiry, or a publish that already has its first acknowledgment) the
//! in-flight futures are dropped and their connections go with them.
//! [`RelayTransport::close_abandoned`] waits for those disconnects to finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use nostr::{Event, RelayUrl};
use nostr_sdk::Client;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{RecordFilter, RelayTransport};
use crate::error::TransportError;

type Disconnects = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// [`RelayTransport`] over real websocket connections.
#[derive(Debug, Clone, Default)]
pub struct NostrTransport {
    disconnects: Disconnects,
}

impl NostrTransport {
    /// Create a network transport.
    pub fn new() -> Self {
        Self::default()
    }
}

/// A connected single-relay client, disconnected on drop.
struct RelaySession {
    client: Client,
    relay: RelayUrl,
    disconnects: Disconnects,
}

impl RelaySession {
    async fn open(
        relay: &RelayUrl,
        timeout: Duration,
        disconnects: &Disconnects,
    ) -> Result<Self, TransportError> {
        let client = Client::default();
        client
            .add_relay(relay.clone())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        // Owned by the guard from here on, so a failed connect still tears down
        let session = Self {
            client,
            relay: relay.clone(),
            disconnects: Arc::clone(disconnects),
        };
        session
            .client
            .try_connect_relay(relay.clone(), timeout)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::debug!(relay = %relay, "Connected");
        Ok(session)
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        let client = self.client.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(async move {
                    client.disconnect().await;
                });
                self.disconnects.lock().push(task);
            }
            Err(_) => {
                tracing::debug!(
                    relay = %self.relay,
                    "No runtime, relay connection dropped without disconnect"
                );
            }
        }
    }
}

#[async_trait]
impl RelayTransport for NostrTransport {
    async fn query(
        &self,
        relay: &RelayUrl,
        filter: &RecordFilter,
        timeout: Duration,
    ) -> Result<Vec<Event>, TransportError> {
        let round_trip = async {
            let session = RelaySession::open(relay, timeout, &self.disconnects).await?;
            session
                .client
                .fetch_events(filter.to_filter(), timeout)
                .await
                .map_err(|e| TransportError::Query(e.to_string()))
        };

        // One budget for connect plus query
        let events = tokio::time::timeout(timeout, round_trip)
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        Ok(events.into_iter().collect())
    }

    async fn send(
        &self,
        relay: &RelayUrl,
        event: &Event,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let round_trip = async {
            let session = RelaySession::open(relay, timeout, &self.disconnects).await?;
            session
                .client
                .send_event(event)
                .await
                .map_err(|e| TransportError::Rejected(e.to_string()))
        };

        let output = tokio::time::timeout(timeout, round_trip)
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        if output.success.contains(relay) {
            return Ok(());
        }

        let reason = output
            .failed
            .get(relay)
            .cloned()
            .unwrap_or_else(|| "no acknowledgment".to_string());
        Err(TransportError::Rejected(reason))
    }

    async fn close_abandoned(&self) {
        let tasks = std::mem::take(&mut *self.disconnects.lock());
        if tasks.is_empty() {
            return;
        }
        let count = tasks.len();
        for result in join_all(tasks).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Relay disconnect task failed");
            }
        }
        tracing::debug!(connections = count, "Relay connections closed");
    }
}
