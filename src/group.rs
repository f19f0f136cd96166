use crate::{InstanceId, ReuseOrder};
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    hash::Hash,
};

/// Index of a [`PoolGroup`] inside its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub(crate) usize);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// A bucket of idle instances that were all constructed from one template.
#[derive(Debug)]
pub struct PoolGroup<K> {
    id: GroupId,
    template: K,
    order: ReuseOrder,
    idle: VecDeque<InstanceId>,
}

impl<K> PoolGroup<K> {
    fn new(id: GroupId, template: K, order: ReuseOrder) -> Self {
        PoolGroup {
            id,
            template,
            order,
            idle: VecDeque::new(),
        }
    }

    /// Id of this group.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// The template every member of this group was built from.
    pub fn template(&self) -> &K {
        &self.template
    }

    /// Number of idle instances.
    pub fn len(&self) -> usize {
        self.idle.len()
    }

    /// Checks if the group holds no idle instance.
    pub fn is_empty(&self) -> bool {
        self.idle.is_empty()
    }

    /// Iterates idle members in the order they would be reused.
    pub fn iter(&self) -> Box<dyn Iterator<Item = InstanceId> + '_> {
        match self.order {
            ReuseOrder::Lifo => Box::new(self.idle.iter().rev().copied()),
            ReuseOrder::Fifo => Box::new(self.idle.iter().copied()),
        }
    }

    /// Removes and returns one idle instance, if any.
    pub(crate) fn try_pop(&mut self) -> Option<InstanceId> {
        match self.order {
            ReuseOrder::Lifo => self.idle.pop_back(),
            ReuseOrder::Fifo => self.idle.pop_front(),
        }
    }

    pub(crate) fn push(&mut self, id: InstanceId) {
        self.idle.push_back(id);
    }

    /// Empties the group and returns every idle member.
    pub(crate) fn drain_all(&mut self) -> Vec<InstanceId> {
        self.idle.drain(..).collect()
    }
}

/// Maps templates to their pool group, creating groups lazily.
#[derive(Debug)]
pub(crate) struct TemplateRegistry<K> {
    by_template: HashMap<K, GroupId>,
    groups: Vec<PoolGroup<K>>,
    order: ReuseOrder,
}

impl<K> TemplateRegistry<K> {
    pub(crate) fn new(order: ReuseOrder) -> Self {
        TemplateRegistry {
            by_template: HashMap::new(),
            groups: Vec::new(),
            order,
        }
    }

    pub(crate) fn group(&self, id: GroupId) -> &PoolGroup<K> {
        &self.groups[id.0]
    }

    pub(crate) fn group_mut(&mut self, id: GroupId) -> &mut PoolGroup<K> {
        &mut self.groups[id.0]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &PoolGroup<K>> {
        self.groups.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PoolGroup<K>> {
        self.groups.iter_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.groups.len()
    }
}

impl<K: Eq + Hash + Clone> TemplateRegistry<K> {
    pub(crate) fn lookup(&self, template: &K) -> Option<GroupId> {
        self.by_template.get(template).copied()
    }

    /// Returns the group for `template`, creating an empty one on first use.
    pub(crate) fn get_or_create(&mut self, template: &K) -> GroupId {
        if let Some(id) = self.lookup(template) {
            return id;
        }
        let id = GroupId(self.groups.len());
        self.groups
            .push(PoolGroup::new(id, template.clone(), self.order));
        self.by_template.insert(template.clone(), id);
        id
    }
}
