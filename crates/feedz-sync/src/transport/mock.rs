//! In-memory transport with scripted relay behavior.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use nostr::{Event, RelayUrl};
use parking_lot::Mutex;

use super::{RecordFilter, RelayTransport};
use crate::error::TransportError;

#[derive(Debug, Clone, Default)]
struct ScriptedRelay {
    records: Vec<Event>,
    delay: Duration,
    unreachable: bool,
    query_error: Option<String>,
    reject: Option<String>,
}

/// A [`RelayTransport`] whose relays are scripted in memory.
///
/// Relays that were never scripted answer queries with nothing and accept
/// every event. Accepted events are stored on the relay, so a later query
/// returns them.
#[derive(Debug, Default)]
pub struct MockTransport {
    relays: Mutex<HashMap<RelayUrl, ScriptedRelay>>,
    sent: Mutex<Vec<(RelayUrl, Event)>>,
    queried: Mutex<Vec<RelayUrl>>,
    in_flight: Mutex<usize>,
    close_calls: Mutex<usize>,
}

/// Counts a call as in flight until it finishes or is dropped.
struct InFlight<'a>(&'a Mutex<usize>);

impl<'a> InFlight<'a> {
    fn enter(count: &'a Mutex<usize>) -> Self {
        *count.lock() += 1;
        Self(count)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.0.lock() -= 1;
    }
}

impl MockTransport {
    /// Creates a mock transport with no scripted relays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `relay` returns for any query.
    pub fn set_records(&self, relay: &RelayUrl, records: Vec<Event>) {
        self.relays.lock().entry(relay.clone()).or_default().records = records;
    }

    /// Latency `relay` adds before answering.
    pub fn set_delay(&self, relay: &RelayUrl, delay: Duration) {
        self.relays.lock().entry(relay.clone()).or_default().delay = delay;
    }

    /// Make `relay` fail at the connection level.
    pub fn set_unreachable(&self, relay: &RelayUrl) {
        self.relays.lock().entry(relay.clone()).or_default().unreachable = true;
    }

    /// Make `relay` answer queries with an error.
    pub fn set_query_error(&self, relay: &RelayUrl, reason: &str) {
        self.relays.lock().entry(relay.clone()).or_default().query_error = Some(reason.to_string());
    }

    /// Make `relay` refuse every event with `reason`.
    pub fn set_rejecting(&self, relay: &RelayUrl, reason: &str) {
        self.relays.lock().entry(relay.clone()).or_default().reject = Some(reason.to_string());
    }

    /// Every accepted event with the relay that accepted it, in order.
    pub fn sent(&self) -> Vec<(RelayUrl, Event)> {
        self.sent.lock().clone()
    }

    /// Every relay that was queried, in order.
    pub fn queried(&self) -> Vec<RelayUrl> {
        self.queried.lock().clone()
    }

    /// Calls started but not yet finished or dropped.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    /// How many times callers waited for abandoned connections.
    pub fn close_calls(&self) -> usize {
        *self.close_calls.lock()
    }

    fn script(&self, relay: &RelayUrl) -> ScriptedRelay {
        self.relays.lock().get(relay).cloned().unwrap_or_default()
    }

    async fn reach(relay: &RelayUrl, script: &ScriptedRelay, timeout: Duration) -> Result<(), TransportError> {
        if script.delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Timeout(timeout));
        }
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        if script.unreachable {
            return Err(TransportError::Connect(format!("{relay}: connection refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl RelayTransport for MockTransport {
    async fn query(
        &self,
        relay: &RelayUrl,
        _filter: &RecordFilter,
        timeout: Duration,
    ) -> Result<Vec<Event>, TransportError> {
        self.queried.lock().push(relay.clone());
        let _guard = InFlight::enter(&self.in_flight);
        let script = self.script(relay);
        Self::reach(relay, &script, timeout).await?;

        if let Some(reason) = script.query_error {
            return Err(TransportError::Query(reason));
        }
        // Unfiltered on purpose: callers must re-check what relays return
        Ok(script.records)
    }

    async fn send(
        &self,
        relay: &RelayUrl,
        event: &Event,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let _guard = InFlight::enter(&self.in_flight);
        let script = self.script(relay);
        Self::reach(relay, &script, timeout).await?;

        if let Some(reason) = script.reject {
            return Err(TransportError::Rejected(reason));
        }

        self.sent.lock().push((relay.clone(), event.clone()));
        self.relays
            .lock()
            .entry(relay.clone())
            .or_default()
            .records
            .push(event.clone());
        Ok(())
    }

    async fn close_abandoned(&self) {
        *self.close_calls.lock() += 1;
    }
}
