//! Concurrent latest-record lookup across relays.
//!
//! Every relay is asked at once. Answers are collected in arrival order, but
//! the winning record is chosen afterwards by [`select_latest`], so which relay
//! answers first never changes the result.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use metrics::counter;
use nostr::Event;
use serde::Serialize;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::transport::{RecordFilter, RelayTransport};

/// What happened across relays during one fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    /// Relays asked.
    pub relays_queried: usize,
    /// Relays that returned an answer (possibly empty).
    pub relays_responded: usize,
    /// Relays that could not be reached or returned an error.
    pub relays_failed: usize,
    /// Records returned in total.
    pub records_seen: usize,
    /// Records dropped because they did not match the filter or verify.
    pub records_discarded: usize,
}

/// Result of a fetch: the newest record, if any relay had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome<R = Event> {
    /// The newest valid record, or `None` when no relay holds one.
    pub record: Option<R>,
    /// Per-relay accounting.
    pub stats: QueryStats,
}

impl<R> FetchOutcome<R> {
    /// Convert the record, keeping the stats.
    pub fn try_map<U, E>(
        self,
        f: impl FnOnce(R) -> std::result::Result<U, E>,
    ) -> std::result::Result<FetchOutcome<U>, E> {
        Ok(FetchOutcome {
            record: self.record.map(f).transpose()?,
            stats: self.stats,
        })
    }
}

/// Pick the record with the greatest `created_at`; ties go to the smallest
/// event id.
pub fn select_latest<I>(records: I) -> Option<Event>
where
    I: IntoIterator<Item = Event>,
{
    records.into_iter().min_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.as_bytes().cmp(b.id.as_bytes()))
    })
}

/// Fetch the newest record matching `filter` from the configured relays.
///
/// Relays that fail are left out. If every relay fails but at least one of
/// them was reachable, the result is "not found". Records that do not match the filter or
/// fail signature verification are discarded; their relay still counts as
/// having answered.
///
/// # Errors
///
/// - [`SyncError::AllEndpointsUnreachable`] if every relay failed at the
///   connection level
/// - [`SyncError::Timeout`] if the deadline expired first
/// - [`SyncError::Config`] if the configuration is unusable
pub async fn fetch_latest<T>(
    transport: &T,
    config: &SyncConfig,
    filter: &RecordFilter,
) -> Result<FetchOutcome>
where
    T: RelayTransport + ?Sized,
{
    config.validate()?;
    counter!("sync_fetch_total").increment(1);

    let mut stats = QueryStats {
        relays_queried: config.relays.len(),
        ..QueryStats::default()
    };
    let mut candidates = Vec::new();
    let mut unreachable = 0usize;

    let mut pending: FuturesUnordered<_> = config
        .relays
        .iter()
        .map(|relay| async move {
            let result = transport.query(relay, filter, config.relay_timeout).await;
            (relay, result)
        })
        .collect();

    let collect = async {
        while let Some((relay, result)) = pending.next().await {
            let records = match result {
                Ok(records) => records,
                Err(e) => {
                    stats.relays_failed += 1;
                    let reason = if e.is_connection_level() {
                        unreachable += 1;
                        "connect"
                    } else {
                        "query"
                    };
                    counter!("sync_relay_failures_total", "op" => "fetch", "reason" => reason)
                        .increment(1);
                    tracing::warn!(relay = %relay, error = %e, "Relay query failed");
                    continue;
                }
            };

            stats.relays_responded += 1;
            stats.records_seen += records.len();
            tracing::debug!(relay = %relay, records = records.len(), "Relay answered");

            for record in records {
                if filter.matches(&record) && record.verify().is_ok() {
                    candidates.push(record);
                } else {
                    stats.records_discarded += 1;
                    counter!("sync_records_discarded_total").increment(1);
                    tracing::warn!(
                        relay = %relay,
                        event_id = %record.id,
                        "Discarding record that does not match the query or verify"
                    );
                }
            }
        }
    };

    let settled = tokio::time::timeout(config.deadline, collect).await;
    drop(pending);
    transport.close_abandoned().await;

    if settled.is_err() {
        tracing::warn!(
            deadline_secs = config.deadline.as_secs(),
            responded = stats.relays_responded,
            "Fetch deadline expired"
        );
        return Err(SyncError::Timeout(config.deadline));
    }

    // A relay that answered with an error was reachable
    if unreachable == stats.relays_queried {
        tracing::warn!(attempted = stats.relays_queried, "No relay reachable");
        return Err(SyncError::AllEndpointsUnreachable {
            attempted: stats.relays_queried,
        });
    }

    let record = select_latest(candidates);
    tracing::info!(
        responded = stats.relays_responded,
        failed = stats.relays_failed,
        found = record.is_some(),
        created_at = record.as_ref().map(|r| r.created_at.as_u64()),
        "Fetch complete"
    );

    Ok(FetchOutcome { record, stats })
}
