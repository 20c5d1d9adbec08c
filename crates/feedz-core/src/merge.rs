//! Three-way reconciliation of local feed state against a remote snapshot.
//!
//! [`merge`] partitions the difference between the device's feeds and the
//! latest remote [`SubscriptionSnapshot`] into:
//!
//! - `to_add`: remote feeds missing locally
//! - `to_remove`: local feeds the remote snapshot tombstoned
//! - `local_only`: local feeds the remote has never seen (to be published)
//!
//! The function is pure. Lookups use hash sets but every output sequence
//! follows the order of its input sequence, so identical inputs always
//! produce identical results.
//!
//! # Tombstone Precedence
//!
//! An address listed in `deleted` wins over the same address listed as active
//! in the same snapshot: matching local entries are removed and the address is
//! never added. Removing without suppressing the addition would re-add the
//! feed on the next run and the merge would never converge.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{FeedIdentifier, FeedKind, LocalFeedEntry, SubscriptionSnapshot};
use crate::normalize::{normalize_key, normalize_url};

/// A remote feed the caller should add locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAddition {
    /// The identifier exactly as listed in the remote snapshot.
    pub identifier: FeedIdentifier,
    /// Tags the remote snapshot records for this identifier.
    pub tags: BTreeSet<String>,
}

impl RemoteAddition {
    /// Local kind the new entry should be created with.
    pub fn kind(&self) -> FeedKind {
        self.identifier.feed_kind()
    }
}

/// Diagnostic counts for one merge, in place of logging from inside it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    /// Length of [`MergeResult::to_add`].
    pub added_count: usize,
    /// Length of [`MergeResult::to_remove`].
    pub removed_count: usize,
    /// Length of [`MergeResult::local_only`].
    pub local_only_count: usize,
}

/// Output of [`merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    /// Remote feeds to add locally.
    pub to_add: Vec<RemoteAddition>,
    /// Local feeds to tombstone because the remote deleted them.
    pub to_remove: Vec<LocalFeedEntry>,
    /// Active local feeds absent from the remote snapshot.
    pub local_only: Vec<LocalFeedEntry>,
    /// Sizes of the three partitions.
    pub stats: MergeStats,
}

impl MergeResult {
    /// True when applying this result would change nothing locally.
    pub fn is_converged(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// True when the remote snapshot is missing local state and the caller
    /// should republish.
    pub fn needs_publish(&self) -> bool {
        !self.local_only.is_empty()
    }
}

/// Merge local feed entries with a remote snapshot.
pub fn merge(local: &[LocalFeedEntry], remote: &SubscriptionSnapshot) -> MergeResult {
    // A deleted literal may be either kind of address; record both readings.
    let tombstones: HashSet<String> = remote
        .deleted()
        .iter()
        .flat_map(|address| [normalize_url(address), normalize_key(address)])
        .collect();

    let active: Vec<(&LocalFeedEntry, String)> = local
        .iter()
        .filter(|entry| entry.is_active())
        .map(|entry| (entry, entry.normalized()))
        .collect();

    let to_remove: Vec<LocalFeedEntry> = active
        .iter()
        .filter(|(_, key)| tombstones.contains(key))
        .map(|(entry, _)| (*entry).clone())
        .collect();

    let local_urls: HashSet<&str> = active
        .iter()
        .filter(|(entry, _)| !entry.kind.is_key_addressed())
        .map(|(_, key)| key.as_str())
        .collect();
    let local_keys: HashSet<&str> = active
        .iter()
        .filter(|(entry, _)| entry.kind.is_key_addressed())
        .map(|(_, key)| key.as_str())
        .collect();

    let mut to_add = Vec::new();
    collect_additions(
        &remote.url_feeds,
        normalize_url,
        FeedIdentifier::Url,
        &local_urls,
        &tombstones,
        remote,
        &mut to_add,
    );
    collect_additions(
        &remote.key_feeds,
        normalize_key,
        FeedIdentifier::PublicKey,
        &local_keys,
        &tombstones,
        remote,
        &mut to_add,
    );

    let remote_urls: HashSet<String> = remote.url_feeds.iter().map(|u| normalize_url(u)).collect();
    let remote_keys: HashSet<String> = remote.key_feeds.iter().map(|k| normalize_key(k)).collect();

    let local_only: Vec<LocalFeedEntry> = active
        .iter()
        .filter(|(entry, key)| {
            let in_remote = if entry.kind.is_key_addressed() {
                remote_keys.contains(key)
            } else {
                remote_urls.contains(key)
            };
            !in_remote && !tombstones.contains(key)
        })
        .map(|(entry, _)| (*entry).clone())
        .collect();

    let stats = MergeStats {
        added_count: to_add.len(),
        removed_count: to_remove.len(),
        local_only_count: local_only.len(),
    };

    MergeResult {
        to_add,
        to_remove,
        local_only,
        stats,
    }
}

/// Append every remote address that is neither present locally nor
/// tombstoned, once per comparison key.
fn collect_additions(
    addresses: &[String],
    normalize: fn(&str) -> String,
    identifier: fn(String) -> FeedIdentifier,
    present: &HashSet<&str>,
    tombstones: &HashSet<String>,
    remote: &SubscriptionSnapshot,
    out: &mut Vec<RemoteAddition>,
) {
    let mut seen = HashSet::new();
    for address in addresses {
        let key = normalize(address);
        if present.contains(key.as_str()) || tombstones.contains(&key) || !seen.insert(key) {
            continue;
        }
        out.push(RemoteAddition {
            identifier: identifier(address.clone()),
            tags: remote.tags_for(address),
        });
    }
}

/// Apply a merge result to local state the way a store would.
///
/// Removed entries are tombstoned with `deleted_at = now` rather than dropped,
/// and additions are appended as active entries.
pub fn apply(local: &[LocalFeedEntry], result: &MergeResult, now: u64) -> Vec<LocalFeedEntry> {
    let mut next: Vec<LocalFeedEntry> = local
        .iter()
        .map(|entry| {
            if entry.is_active() && result.to_remove.contains(entry) {
                entry.clone().deleted(now)
            } else {
                entry.clone()
            }
        })
        .collect();

    next.extend(result.to_add.iter().map(|addition| LocalFeedEntry {
        kind: addition.kind(),
        address: addition.identifier.as_str().to_string(),
        tags: addition.tags.clone(),
        deleted_at: None,
    }));

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn rss(address: &str) -> LocalFeedEntry {
        LocalFeedEntry::new(FeedKind::Rss, address)
    }

    fn key_feed(address: &str) -> LocalFeedEntry {
        LocalFeedEntry::new(FeedKind::KeyFeed, address)
    }

    fn remote(rss: &[&str], nostr: &[&str], deleted: &[&str]) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            url_feeds: rss.iter().map(|s| s.to_string()).collect(),
            key_feeds: nostr.iter().map(|s| s.to_string()).collect(),
            tags_by_address: BTreeMap::new(),
            deleted_addresses: if deleted.is_empty() {
                None
            } else {
                Some(deleted.iter().map(|s| s.to_string()).collect())
            },
            last_updated: 1_700_000_000,
        }
    }

    fn added(result: &MergeResult) -> Vec<&str> {
        result.to_add.iter().map(|a| a.identifier.as_str()).collect()
    }

    // =========================================================================
    // Reference scenarios
    // =========================================================================

    #[test]
    fn test_scenario_remote_tombstone_removes_key_feed() {
        let local = vec![rss("http://a.com/feed/"), key_feed("npub1xyz")];
        let remote = remote(&["http://a.com/feed"], &[], &["npub1xyz"]);

        let result = merge(&local, &remote);

        assert!(result.to_add.is_empty());
        assert_eq!(result.to_remove, vec![key_feed("npub1xyz")]);
        assert!(result.local_only.is_empty());
    }

    #[test]
    fn test_scenario_empty_local_adds_everything() {
        let mut remote = remote(&["http://b.com/x"], &["npub1abc"], &[]);
        remote
            .tags_by_address
            .insert("http://b.com/x".to_string(), ["tech".to_string()].into());

        let result = merge(&[], &remote);

        assert_eq!(result.to_add.len(), 2);
        assert_eq!(
            result.to_add[0],
            RemoteAddition {
                identifier: FeedIdentifier::Url("http://b.com/x".to_string()),
                tags: ["tech".to_string()].into(),
            }
        );
        assert_eq!(
            result.to_add[1].identifier,
            FeedIdentifier::PublicKey("npub1abc".to_string())
        );
        assert!(result.to_add[1].tags.is_empty());
        assert_eq!(result.to_add[1].kind(), FeedKind::KeyFeed);
        assert!(result.to_remove.is_empty());
        assert!(result.local_only.is_empty());
    }

    #[test]
    fn test_scenario_local_only_entry() {
        let local = vec![rss("http://c.com")];
        let remote = remote(&[], &[], &[]);

        let result = merge(&local, &remote);

        assert!(result.to_add.is_empty());
        assert!(result.to_remove.is_empty());
        assert_eq!(result.local_only, local);
        assert!(result.needs_publish());
    }

    // =========================================================================
    // Tombstones
    // =========================================================================

    #[test]
    fn test_tombstone_wins_over_active_listing() {
        let local = vec![rss("https://a.com/feed")];
        let remote = remote(&["http://a.com/feed/"], &[], &["https://A.com/feed"]);

        let result = merge(&local, &remote);

        assert_eq!(result.to_remove, local);
        assert!(result.to_add.is_empty(), "tombstoned address must not be re-added");
        assert!(result.local_only.is_empty());
    }

    #[test]
    fn test_tombstone_matches_key_embedded_in_profile_url() {
        let local = vec![key_feed("https://njump.me/npub1gone")];
        let remote = remote(&[], &[], &["npub1GONE"]);

        let result = merge(&local, &remote);
        assert_eq!(result.to_remove, local);
    }

    #[test]
    fn test_tombstone_applies_to_video_feeds() {
        let local = vec![LocalFeedEntry::new(FeedKind::KeyVideoFeed, "npub1vid")];
        let result = merge(&local, &remote(&[], &[], &["npub1vid"]));
        assert_eq!(result.to_remove, local);
    }

    #[test]
    fn test_local_tombstones_ignored() {
        let local = vec![rss("http://a.com/feed").deleted(100), key_feed("npub1old").deleted(100)];
        let remote = remote(&[], &[], &["http://a.com/feed", "npub1old"]);

        let result = merge(&local, &remote);

        assert!(result.to_remove.is_empty(), "already deleted entries are not removed twice");
        assert!(result.local_only.is_empty());
    }

    #[test]
    fn test_local_tombstone_does_not_count_as_present() {
        // Only active local entries count as present
        let local = vec![rss("http://a.com/feed").deleted(100)];
        let result = merge(&local, &remote(&["http://a.com/feed"], &[], &[]));
        assert_eq!(added(&result), vec!["http://a.com/feed"]);
    }

    // =========================================================================
    // Additions and local-only
    // =========================================================================

    #[test]
    fn test_equivalent_urls_not_added() {
        let local = vec![rss("https://Example.com/feed?b=2&a=1")];
        let result = merge(&local, &remote(&["http://example.com/feed/?a=1&b=2"], &[], &[]));
        assert!(result.to_add.is_empty());
        assert!(result.local_only.is_empty());
    }

    #[test]
    fn test_key_kinds_compare_against_each_other_only() {
        // A video feed satisfies the remote key listing
        let local = vec![LocalFeedEntry::new(FeedKind::KeyVideoFeed, "https://x.com/npub1abc")];
        let result = merge(&local, &remote(&[], &["npub1abc"], &[]));
        assert!(result.to_add.is_empty());
        assert!(result.local_only.is_empty());

        // A URL entry does not satisfy a key listing, even with the same text
        let local = vec![rss("npub1abc")];
        let result = merge(&local, &remote(&[], &["npub1abc"], &[]));
        assert_eq!(added(&result), vec!["npub1abc"]);
        assert_eq!(result.local_only, local);
    }

    #[test]
    fn test_duplicate_remote_spellings_added_once() {
        let result = merge(
            &[],
            &remote(
                &["http://a.com/feed", "https://A.com/feed/"],
                &["npub1abc", "nostr:npub1ABC"],
                &[],
            ),
        );
        assert_eq!(added(&result), vec!["http://a.com/feed", "npub1abc"]);
    }

    #[test]
    fn test_tags_looked_up_by_literal_address() {
        let mut remote = remote(&["https://a.com/feed"], &["npub1abc"], &[]);
        remote
            .tags_by_address
            .insert("npub1abc".to_string(), ["people".to_string()].into());
        // Different spelling than the listed URL: no tags
        remote
            .tags_by_address
            .insert("http://a.com/feed".to_string(), ["ignored".to_string()].into());

        let result = merge(&[], &remote);
        assert!(result.to_add[0].tags.is_empty());
        assert!(result.to_add[1].tags.contains("people"));
    }

    #[test]
    fn test_local_only_lists_entries_absent_remotely() {
        let local = vec![rss("http://a.com/one"), rss("http://a.com/two"), key_feed("npub1k")];
        let result = merge(&local, &remote(&["http://a.com/two"], &[], &[]));
        assert_eq!(result.local_only, vec![rss("http://a.com/one"), key_feed("npub1k")]);
        assert_eq!(result.stats.local_only_count, 2);
    }

    #[test]
    fn test_partitions_are_disjoint() {
        let local = vec![
            rss("http://keep.com"),
            rss("http://gone.com"),
            rss("http://mine.com"),
            key_feed("npub1mine"),
        ];
        let remote = remote(&["http://keep.com", "http://new.com"], &["npub1new"], &["http://gone.com"]);

        let result = merge(&local, &remote);

        for entry in &result.local_only {
            assert!(!result.to_remove.contains(entry));
            assert!(
                !result
                    .to_add
                    .iter()
                    .any(|a| a.identifier.as_str() == entry.address)
            );
        }
        assert_eq!(added(&result), vec!["http://new.com", "npub1new"]);
        assert_eq!(result.to_remove, vec![rss("http://gone.com")]);
        assert_eq!(result.local_only, vec![rss("http://mine.com"), key_feed("npub1mine")]);
        assert_eq!(
            result.stats,
            MergeStats {
                added_count: 2,
                removed_count: 1,
                local_only_count: 2,
            }
        );
    }

    // =========================================================================
    // Determinism and convergence
    // =========================================================================

    fn fixtures() -> Vec<(Vec<LocalFeedEntry>, SubscriptionSnapshot)> {
        let mut tagged = remote(&["http://b.com/x", "https://c.com/rss"], &["npub1abc"], &[]);
        tagged
            .tags_by_address
            .insert("http://b.com/x".to_string(), ["tech".to_string()].into());

        vec![
            (
                vec![rss("http://a.com/feed/"), key_feed("npub1xyz")],
                remote(&["http://a.com/feed"], &[], &["npub1xyz"]),
            ),
            (vec![], tagged),
            (vec![rss("http://c.com")], remote(&[], &[], &[])),
            (
                vec![
                    rss("https://a.com/feed"),
                    rss("http://a.com/feed/"),
                    key_feed("https://njump.me/npub1dup"),
                    LocalFeedEntry::new(FeedKind::KeyVideoFeed, "npub1vid"),
                    rss("http://old.com").deleted(5),
                ],
                remote(
                    &["http://a.com/feed", "http://z.com", "http://z.com/"],
                    &["npub1dup", "npub1other"],
                    &["https://A.com/feed", "npub1vid", "http://z.com"],
                ),
            ),
        ]
    }

    #[test]
    fn test_merge_is_deterministic() {
        for (local, remote) in fixtures() {
            let first = merge(&local, &remote);
            let second = merge(&local, &remote);
            assert_eq!(first, second);
            assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&second).unwrap()
            );
        }
    }

    #[test]
    fn test_merge_converges_after_apply() {
        for (local, remote) in fixtures() {
            let first = merge(&local, &remote);
            let applied = apply(&local, &first, 1_800_000_000);
            let second = merge(&applied, &remote);

            assert!(second.to_add.is_empty(), "to_add not empty: {:?}", second.to_add);
            assert!(second.to_remove.is_empty(), "to_remove not empty: {:?}", second.to_remove);
            assert!(second.is_converged());
            // Applied additions come from the remote, so they are not local-only
            assert_eq!(second.local_only, first.local_only);
        }
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let (local, remote) = fixtures().remove(3);
        let local_before = local.clone();
        let remote_before = remote.clone();
        let _ = merge(&local, &remote);
        assert_eq!(local, local_before);
        assert_eq!(remote, remote_before);
    }

    #[test]
    fn test_apply_tombstones_removed_and_appends_additions() {
        let local = vec![rss("http://gone.com"), rss("http://keep.com")];
        let mut remote = remote(&["http://keep.com", "http://new.com"], &[], &["http://gone.com"]);
        remote
            .tags_by_address
            .insert("http://new.com".to_string(), ["x".to_string()].into());

        let result = merge(&local, &remote);
        let applied = apply(&local, &result, 77);

        assert_eq!(applied.len(), 3);
        assert_eq!(applied[0].deleted_at, Some(77));
        assert!(applied[1].is_active());
        assert_eq!(applied[2].address, "http://new.com");
        assert_eq!(applied[2].kind, FeedKind::Rss);
        assert!(applied[2].tags.contains("x"));
    }

    #[test]
    fn test_merge_result_json_shape() {
        let result = merge(&[rss("http://c.com")], &remote(&["http://d.com"], &[], &[]));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["toAdd"][0]["identifier"]["type"], "url");
        assert_eq!(value["toAdd"][0]["identifier"]["value"], "http://d.com");
        assert_eq!(value["localOnly"][0]["kind"], "RSS");
        assert_eq!(value["stats"]["addedCount"], 1);
    }
}
