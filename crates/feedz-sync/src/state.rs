//! Local device state kept by the CLI between runs.
//!
//! ```text
//! { "feeds": [LocalFeedEntry...], "readGuids": [guid...], "lastSync": 1700000000 }
//! ```
//!
//! A missing file is an empty state (first run on this device).

use std::collections::BTreeSet;
use std::path::Path;

use feedz_core::{LocalFeedEntry, MergeResult, ReadStatusMerge, apply};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Feeds and read markers stored on this device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalState {
    /// Every feed, tombstones included.
    #[serde(default)]
    pub feeds: Vec<LocalFeedEntry>,
    /// GUIDs of read items.
    #[serde(default)]
    pub read_guids: BTreeSet<String>,
    /// Unix seconds of the last applied sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<u64>,
}

impl LocalState {
    /// Load state from `path`, or an empty state if the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No state file, starting empty");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write state to `path`, replacing it atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), feeds = self.feeds.len(), "State saved");
        Ok(())
    }

    /// Apply a subscription merge and record the sync time.
    pub fn apply_merge(&mut self, result: &MergeResult, now: u64) {
        self.feeds = apply(&self.feeds, result, now);
        self.last_sync = Some(now);
    }

    /// Apply a read-status merge and record the sync time.
    pub fn apply_read_status(&mut self, result: &ReadStatusMerge, now: u64) {
        self.read_guids.extend(result.to_mark_read.iter().cloned());
        self.last_sync = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedz_core::{FeedKind, SubscriptionSnapshot, merge};
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let state = LocalState::load(dir.path().join("state.json")).unwrap();
        assert_eq!(state, LocalState::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let state = LocalState {
            feeds: vec![
                LocalFeedEntry::new(FeedKind::Rss, "http://a.com/feed").with_tags(["tech"]),
                LocalFeedEntry::new(FeedKind::KeyFeed, "npub1abc").deleted(7),
            ],
            read_guids: ["g1".to_string()].into(),
            last_sync: Some(99),
        };

        state.save(&path).unwrap();
        assert_eq!(LocalState::load(&path).unwrap(), state);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_legacy_kind_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"feeds":[{"kind":"NOSTR","address":"npub1abc"},{"kind":"RSS","address":"http://a.com"}]}"#,
        )
        .unwrap();

        let state = LocalState::load(&path).unwrap();
        assert_eq!(state.feeds[0].kind, FeedKind::KeyFeed);
        assert!(state.read_guids.is_empty());
        assert!(state.last_sync.is_none());
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            LocalState::load(&path),
            Err(crate::SyncError::State(_))
        ));
    }

    #[test]
    fn test_apply_merge_records_sync_time() {
        let mut state = LocalState {
            feeds: vec![LocalFeedEntry::new(FeedKind::Rss, "http://gone.com")],
            ..LocalState::default()
        };
        let remote = SubscriptionSnapshot {
            url_feeds: vec!["http://new.com".to_string()],
            deleted_addresses: Some(vec!["http://gone.com".to_string()]),
            ..SubscriptionSnapshot::default()
        };

        let result = merge(&state.feeds, &remote);
        state.apply_merge(&result, 42);

        assert_eq!(state.feeds.len(), 2);
        assert_eq!(state.feeds[0].deleted_at, Some(42));
        assert_eq!(state.feeds[1].address, "http://new.com");
        assert_eq!(state.last_sync, Some(42));
    }

    #[test]
    fn test_apply_read_status() {
        let mut state = LocalState::default();
        let result = ReadStatusMerge {
            to_mark_read: vec!["g1".to_string(), "g2".to_string()],
            local_only: vec![],
        };
        state.apply_read_status(&result, 5);
        assert_eq!(state.read_guids.len(), 2);
        assert_eq!(state.last_sync, Some(5));
    }
}
