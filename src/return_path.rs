use crate::{GroupId, InstanceId};
use std::collections::HashMap;

/// Maps every live instance to the group it must be returned to.
///
/// An entry is added once when the instance is constructed and stays until
/// the instance is destroyed, whether the instance is idle or active.
#[derive(Debug, Default)]
pub(crate) struct ReturnPaths {
    homes: HashMap<InstanceId, GroupId>,
}

impl ReturnPaths {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records the home group of `id`.
    ///
    /// Returns false and leaves the index untouched if `id` already has one.
    pub(crate) fn record(&mut self, id: InstanceId, group: GroupId) -> bool {
        if let Some(existing) = self.homes.get(&id) {
            tracing::warn!(
                instance = %id,
                existing = %existing,
                requested = %group,
                "instance already has a home group, ignoring"
            );
            return false;
        }
        self.homes.insert(id, group);
        true
    }

    pub(crate) fn resolve(&self, id: InstanceId) -> Option<GroupId> {
        self.homes.get(&id).copied()
    }

    pub(crate) fn forget(&mut self, id: InstanceId) -> Option<GroupId> {
        self.homes.remove(&id)
    }

    pub(crate) fn clear(&mut self) {
        self.homes.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.homes.len()
    }
}
