use std::{
    fmt,
    ops::Deref,
    sync::atomic::{AtomicU32, Ordering},
};

/// Identity of a [`PoolManager`](crate::PoolManager).
///
/// Managers built with [`PoolManager::new`](crate::PoolManager::new) draw a
/// fresh id from [`ManagerId::next`], so instance ids from two managers never
/// collide. Use [`PoolManager::with_id`](crate::PoolManager::with_id) to pick
/// ids yourself. `ManagerId(0)` is reserved for detached handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManagerId(u32);

/// Process-wide id source. It holds no pool state; two managers only ever
/// share the fact that their ids differ.
static NEXT_MANAGER: AtomicU32 = AtomicU32::new(1);

impl ManagerId {
    /// Id carried by handles that never came from a pool.
    pub const DETACHED: ManagerId = ManagerId(0);

    /// Wraps an explicit id. Returns `None` for `0`, which is
    /// [`ManagerId::DETACHED`].
    pub fn new(raw: u32) -> Option<Self> {
        (raw != 0).then_some(ManagerId(raw))
    }

    /// Draws the next id from the process-wide counter.
    ///
    /// Ids picked through [`ManagerId::new`] are not reserved here; mixing
    /// both sources is the caller's responsibility.
    pub fn next() -> Self {
        loop {
            let raw = NEXT_MANAGER.fetch_add(1, Ordering::Relaxed);
            if raw != 0 {
                return ManagerId(raw);
            }
        }
    }

    /// Returns the raw id.
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Stable identity of a pooled instance.
///
/// Assigned by the manager when the instance is constructed and never reused,
/// independent of activation state, parent or any host-assigned id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId {
    manager: ManagerId,
    serial: u64,
}

impl InstanceId {
    pub(crate) fn new(manager: ManagerId, serial: u64) -> Self {
        InstanceId { manager, serial }
    }

    /// The manager that issued this id.
    pub fn manager(self) -> ManagerId {
        self.manager
    }

    /// Position of this id in its manager's construction order.
    pub fn serial(self) -> u64 {
        self.serial
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.manager.0, self.serial)
    }
}

/// An active instance vended by a pool.
///
/// This is a move-only lease token: handing it back through
/// [`PoolManager::release`](crate::PoolManager::release) returns the instance
/// to the exact group it was created for. The lease number lets the manager
/// reject tokens for an instance that has since been recycled.
pub struct Pooled<I> {
    id: InstanceId,
    lease: u32,
    handle: I,
}

impl<I> Pooled<I> {
    pub(crate) fn new(id: InstanceId, lease: u32, handle: I) -> Self {
        Pooled { id, lease, handle }
    }

    /// Wraps a host handle that was never vended by any pool.
    ///
    /// Releasing it into a manager destroys it.
    pub fn detached(handle: I) -> Self {
        Pooled {
            id: InstanceId::new(ManagerId::DETACHED, 0),
            lease: 0,
            handle,
        }
    }

    /// Identity of the instance.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Lease number this token was issued with.
    pub fn lease(&self) -> u32 {
        self.lease
    }

    /// The host handle.
    pub fn handle(&self) -> &I {
        &self.handle
    }

    pub(crate) fn into_parts(self) -> (InstanceId, u32, I) {
        (self.id, self.lease, self.handle)
    }
}

impl<I> Deref for Pooled<I> {
    type Target = I;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<I> AsRef<I> for Pooled<I> {
    #[inline(always)]
    fn as_ref(&self) -> &I {
        &self.handle
    }
}

impl<I: fmt::Debug> fmt::Debug for Pooled<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("id", &self.id)
            .field("lease", &self.lease)
            .field("handle", &self.handle)
            .finish()
    }
}

impl<I> PartialEq for Pooled<I> {
    #[inline]
    fn eq(&self, other: &Pooled<I>) -> bool {
        self.id == other.id && self.lease == other.lease
    }
}
impl<I> Eq for Pooled<I> {}
