//! Process-wide table of allocation classes in use
//!
//! One registry is shared by every [`RdtManager`](super::RdtManager)
//! created from the same [`RdtContext`](super::RdtContext). It tracks, per
//! group directory name, how many managers hold the group and whether this
//! process created it (and so may remove it).
//!
//! Every create/join/release runs with the table locked, including the
//! mkdir/rmdir itself. Two first callers can never both create a group,
//! and a release to zero can never race a join.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// One allocation class currently held by at least one manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub path: PathBuf,
    /// Number of managers bound to this group
    pub refs: usize,
    /// Created by us, so removed when `refs` drops to zero
    pub owned: bool,
}

impl GroupEntry {
    /// Held by someone other than a single owner
    pub fn is_shared(&self) -> bool {
        self.refs > 1 || !self.owned
    }
}

pub(crate) type GroupTable = HashMap<String, GroupEntry>;

/// ClosID → group table, guarded by a single mutex
#[derive(Debug, Default)]
pub struct ClosRegistry {
    groups: Mutex<GroupTable>,
}

impl ClosRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, GroupTable> {
        // A panic while holding the lock leaves counts that are still
        // consistent with the filesystem, so keep going.
        self.groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the entry for a group name
    pub fn get(&self, name: &str) -> Option<GroupEntry> {
        self.lock().get(name).cloned()
    }

    /// Number of managers bound to a group, 0 if unknown
    pub fn refs(&self, name: &str) -> usize {
        self.lock().get(name).map(|e| e.refs).unwrap_or(0)
    }

    /// Number of groups currently held
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
