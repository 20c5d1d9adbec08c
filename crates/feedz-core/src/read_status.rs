//! Read-status reconciliation.
//!
//! Read markers only ever accumulate: an item marked read on any device stays
//! read everywhere. Merging is therefore a set union split into the two
//! directions the caller acts on.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::ReadStatusSnapshot;

/// Output of [`merge_read_status`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadStatusMerge {
    /// GUIDs read on another device, to mark read locally.
    pub to_mark_read: Vec<String>,
    /// GUIDs read only on this device, to include in the next publish.
    pub local_only: Vec<String>,
}

impl ReadStatusMerge {
    /// True when the remote snapshot is missing local read markers.
    pub fn needs_publish(&self) -> bool {
        !self.local_only.is_empty()
    }
}

/// Split the union of local and remote read markers by origin.
///
/// Both output lists are sorted.
pub fn merge_read_status(local: &BTreeSet<String>, remote: &ReadStatusSnapshot) -> ReadStatusMerge {
    ReadStatusMerge {
        to_mark_read: remote.read_guids.difference(local).cloned().collect(),
        local_only: local.difference(&remote.read_guids).cloned().collect(),
    }
}
