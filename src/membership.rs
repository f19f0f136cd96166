use crate::InstanceId;
use std::{
    collections::{BTreeSet, HashMap},
    hash::Hash,
};

/// The grouping an active instance is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Holder<P> {
    /// The manager's default grouping for instances acquired without a parent.
    Active,
    /// A caller supplied parent.
    Parent(P),
}

/// Explicit parent to children index for active instances.
///
/// Bulk operations work on the members of a holder instead of walking any
/// host hierarchy. Members are kept ordered by id so bulk operations are
/// deterministic.
#[derive(Debug)]
pub(crate) struct Membership<P> {
    members: HashMap<Holder<P>, BTreeSet<InstanceId>>,
}

impl<P: Eq + Hash> Membership<P> {
    pub(crate) fn new() -> Self {
        Membership {
            members: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, holder: Holder<P>, id: InstanceId) {
        self.members.entry(holder).or_default().insert(id);
    }

    pub(crate) fn remove(&mut self, holder: &Holder<P>, id: InstanceId) -> bool {
        let Some(set) = self.members.get_mut(holder) else {
            return false;
        };
        let removed = set.remove(&id);
        if set.is_empty() {
            self.members.remove(holder);
        }
        removed
    }

    pub(crate) fn members(&self, holder: &Holder<P>) -> Vec<InstanceId> {
        self.members
            .get(holder)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Total number of attached instances across every holder.
    pub(crate) fn len(&self) -> usize {
        self.members.values().map(BTreeSet::len).sum()
    }

    /// Empties the index and returns every member, ordered by id.
    pub(crate) fn drain(&mut self) -> BTreeSet<InstanceId> {
        self.members.drain().flat_map(|(_, set)| set).collect()
    }
}
