use crate::GroupId;

/// Where an instance is attached in the host's grouping hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment<'a, P> {
    /// Idle storage of the pool group the instance belongs to.
    Idle(GroupId),
    /// The default grouping for vended instances that were not given a parent.
    Active,
    /// A caller supplied parent.
    Parent(&'a P),
}

/// A trait defining the interface between the pool and the host that
/// actually owns instances.
///
/// The pool never looks inside an instance. It only asks the allocator to
/// create and destroy instances from a template, flip their activation flag,
/// move them between groupings and validate them before they are stored back
/// in a pool group.
pub trait PoolAllocator {
    /// The kind of thing being pooled, e.g. a prefab reference. Used as a map
    /// key, so equality must mean identity.
    type Template;
    /// A handle to a live instance owned by the host.
    type Instance: Clone;
    /// A handle to a grouping an active instance can be parented to.
    type Parent;
    /// Error returned when construction fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates a new instance from `template`.
    fn allocate(&mut self, template: &Self::Template) -> Result<Self::Instance, Self::Error>;

    /// Destroys an instance. Called at most once per instance.
    fn destroy(&mut self, instance: Self::Instance);

    /// Sets the activation flag of an instance.
    fn set_active(&mut self, instance: &Self::Instance, active: bool);

    /// Re-parents an instance.
    ///
    /// By default, this method does nothing. Override it when the host keeps
    /// a grouping hierarchy.
    #[inline(always)]
    fn attach(&mut self, _instance: &Self::Instance, _to: Attachment<'_, Self::Parent>) {}

    /// Resets the placement of an instance to its canonical default before it
    /// is handed out.
    ///
    /// By default, this method does nothing.
    #[inline(always)]
    fn reset(&mut self, _instance: &Self::Instance) {}

    /// Validates that an instance is in a good state to be stored back in
    /// its pool group. Invalid instances are destroyed instead.
    ///
    /// By default, this method always returns true.
    #[inline(always)]
    fn is_valid(&self, _instance: &Self::Instance) -> bool {
        true
    }

    /// Validates a template before it is used as a pool key.
    ///
    /// By default, this method always returns true.
    #[inline(always)]
    fn is_valid_template(&self, _template: &Self::Template) -> bool {
        true
    }
}
