use crate::{
    AcquireOptions, ContextChange, DeferredTicket, PoolAllocator, PoolManager, PoolResult,
    PoolStats, Pooled,
};
use parking_lot::{Mutex, MutexGuard};
use std::{fmt, hash::Hash, sync::Arc, time::Duration};

/// A [`PoolManager`] that can be shared between threads.
///
/// Every operation takes one exclusive lock over the whole manager, so group
/// membership and the return-path index are never observed half updated.
/// Cloning yields another handle to the same manager.
pub struct SharedPool<A: PoolAllocator> {
    inner: Arc<Mutex<PoolManager<A>>>,
}

impl<A: PoolAllocator> Clone for SharedPool<A> {
    fn clone(&self) -> Self {
        SharedPool {
            inner: self.inner.clone(),
        }
    }
}

impl<A> SharedPool<A>
where
    A: PoolAllocator,
    A::Template: Eq + Hash + Clone + fmt::Debug,
    A::Instance: Eq + Hash,
    A::Parent: Eq + Hash + Clone,
{
    /// Wraps `manager` for shared use.
    pub fn new(manager: PoolManager<A>) -> Self {
        SharedPool {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    /// Locks the manager for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, PoolManager<A>> {
        self.inner.lock()
    }

    /// Runs `f` with the manager locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut PoolManager<A>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// See [`PoolManager::acquire`].
    pub fn acquire(&self, template: &A::Template) -> PoolResult<Pooled<A::Instance>> {
        self.inner.lock().acquire(template)
    }

    /// See [`PoolManager::acquire_with`].
    pub fn acquire_with(
        &self,
        template: &A::Template,
        options: AcquireOptions<A::Parent>,
    ) -> PoolResult<Pooled<A::Instance>> {
        self.inner.lock().acquire_with(template, options)
    }

    /// See [`PoolManager::release`].
    pub fn release(&self, instance: Pooled<A::Instance>) -> PoolResult<()> {
        self.inner.lock().release(instance)
    }

    /// See [`PoolManager::release_deferred_with`].
    pub fn release_deferred_with<F>(
        &self,
        instance: Pooled<A::Instance>,
        delay: Duration,
        callback: F,
    ) -> PoolResult<DeferredTicket>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner
            .lock()
            .release_deferred_with(instance, delay, callback)
    }

    /// See [`PoolManager::prewarm`].
    pub fn prewarm(&self, template: &A::Template, count: usize) -> PoolResult<usize> {
        self.inner.lock().prewarm(template, count)
    }

    /// See [`PoolManager::drain_and_destroy_all`].
    pub fn drain_and_destroy_all(&self) -> usize {
        self.inner.lock().drain_and_destroy_all()
    }

    /// See [`PoolManager::handle_context_change`].
    pub fn handle_context_change(&self, change: &ContextChange) -> usize {
        self.inner.lock().handle_context_change(change)
    }

    /// Advances the clock and performs due deferred releases under the lock,
    /// then runs their callbacks after releasing it. Callbacks may use the
    /// pool again, and every release of the tick is done before the first
    /// callback runs.
    pub fn tick(&self, dt: Duration) -> usize {
        let completions = self.inner.lock().advance(dt);
        let fired = completions.len();
        for callback in completions {
            callback();
        }
        fired
    }

    /// See [`PoolManager::stats`].
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats()
    }
}

impl<A: PoolAllocator> fmt::Debug for SharedPool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Some(manager) => f.debug_tuple("SharedPool").field(&*manager).finish(),
            None => f.write_str("SharedPool(<locked>)"),
        }
    }
}
