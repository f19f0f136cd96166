use crate::{
    deferred::{Completion, DeferredQueue, DeferredReturn},
    group::TemplateRegistry,
    membership::Membership,
    return_path::ReturnPaths,
    Attachment, ContextChange, DeferredTicket, GroupId, Holder, InstanceId, LifecycleEvents,
    ManagerId, PoolAllocator, PoolConfig, PoolError, PoolGroup, PoolResult, Pooled, PrewarmPlan,
    Subscription,
};
use std::{collections::HashMap, fmt, hash::Hash, time::Duration};

/// Counters describing what a manager has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances built through the allocator.
    pub constructed: u64,
    /// Acquires served from idle storage.
    pub reused: u64,
    /// Acquires that had to construct because the group was empty.
    pub creation_fallbacks: u64,
    /// Instances returned to idle storage.
    pub released: u64,
    /// Instances handed to the allocator for destruction.
    pub destroyed: u64,
    /// Releases of instances this manager never vended.
    pub unknown_releases: u64,
    /// Warnings and errors reported through `tracing`.
    pub warnings: u64,
}

/// Per-call options for [`PoolManager::acquire_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireOptions<P> {
    /// Parent to attach the instance to. The manager's default active
    /// grouping is used when `None`.
    pub parent: Option<P>,
    /// Activate the instance before handing it out.
    pub activate: bool,
    /// Construct a new instance when the group is empty. When false an empty
    /// group fails with [`PoolError::PoolEmpty`].
    pub create_if_empty: bool,
}

impl<P> Default for AcquireOptions<P> {
    fn default() -> Self {
        AcquireOptions {
            parent: None,
            activate: true,
            create_if_empty: true,
        }
    }
}

impl<P> AcquireOptions<P> {
    /// Default options: no parent, activate, create on miss.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the instance to `parent`.
    pub fn parent(mut self, parent: P) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets whether the instance is activated.
    pub fn activate(mut self, activate: bool) -> Self {
        self.activate = activate;
        self
    }

    /// Sets whether an empty group may construct.
    pub fn create_if_empty(mut self, create: bool) -> Self {
        self.create_if_empty = create;
        self
    }

    /// Only hand out preloaded instances.
    pub fn strict(self) -> Self {
        self.create_if_empty(false)
    }
}

struct Slot<I, P> {
    handle: I,
    lease: u32,
    /// `None` while idle.
    holder: Option<Holder<P>>,
}

/// Recycles host instances keyed by template.
///
/// The manager owns the bookkeeping for every instance it constructs: the
/// group each one must return to, whether it is idle or active, and where an
/// active instance is attached. The instances themselves live in the host and
/// are reached through the [`PoolAllocator`].
///
/// All operations are synchronous and run on the caller's thread. Deferred
/// returns and lifecycle notifications are serviced by [`Self::tick`].
/// Wrap the manager in a [`SharedPool`](crate::SharedPool) to drive it from
/// several threads.
pub struct PoolManager<A: PoolAllocator> {
    id: ManagerId,
    allocator: A,
    config: PoolConfig,
    registry: TemplateRegistry<A::Template>,
    return_paths: ReturnPaths,
    slots: HashMap<InstanceId, Slot<A::Instance, A::Parent>>,
    by_handle: HashMap<A::Instance, InstanceId>,
    membership: Membership<A::Parent>,
    deferred: DeferredQueue<A::Instance>,
    subscription: Option<Subscription>,
    next_serial: u64,
    now: Duration,
    stats: PoolStats,
}

impl<A> PoolManager<A>
where
    A: PoolAllocator,
    A::Template: Eq + Hash + Clone + fmt::Debug,
    A::Instance: Eq + Hash,
    A::Parent: Eq + Hash + Clone,
{
    /// Creates a manager with the default [`PoolConfig`].
    pub fn new(allocator: A) -> Self {
        Self::with_config(allocator, PoolConfig::default())
    }

    /// Creates a manager with the given config and an id drawn from
    /// [`ManagerId::next`].
    pub fn with_config(allocator: A, config: PoolConfig) -> Self {
        Self::with_id(allocator, config, ManagerId::next())
    }

    /// Creates a manager with an explicit id.
    ///
    /// Managers that may see each other's instances must use distinct ids.
    pub fn with_id(allocator: A, config: PoolConfig, id: ManagerId) -> Self {
        PoolManager {
            id,
            allocator,
            registry: TemplateRegistry::new(config.reuse_order),
            config,
            return_paths: ReturnPaths::new(),
            slots: HashMap::new(),
            by_handle: HashMap::new(),
            membership: Membership::new(),
            deferred: DeferredQueue::new(),
            subscription: None,
            next_serial: 0,
            now: Duration::ZERO,
            stats: PoolStats::default(),
        }
    }

    /// Gets an instance of `template` using the configured defaults.
    pub fn acquire(&mut self, template: &A::Template) -> PoolResult<Pooled<A::Instance>> {
        let options = AcquireOptions {
            parent: None,
            activate: self.config.activate_on_acquire,
            create_if_empty: self.config.create_if_empty,
        };
        self.acquire_with(template, options)
    }

    /// Gets an instance of `template`.
    ///
    /// An idle instance is reused when one exists. Otherwise a new one is
    /// constructed if `options.create_if_empty` allows it, which is reported
    /// as a warning since it means the group was not prewarmed enough.
    ///
    /// The instance is attached to `options.parent` (or the default active
    /// grouping), its placement is reset and it is activated if requested.
    pub fn acquire_with(
        &mut self,
        template: &A::Template,
        options: AcquireOptions<A::Parent>,
    ) -> PoolResult<Pooled<A::Instance>> {
        self.check_template(template, "acquire")?;

        let group = self.registry.lookup(template);
        let popped = group.and_then(|group| self.registry.group_mut(group).try_pop());
        let id = match popped {
            Some(id) => {
                self.stats.reused += 1;
                id
            }
            None if options.create_if_empty => {
                tracing::warn!(
                    template = ?template,
                    "acquire: pool empty, constructing a new instance; consider prewarming"
                );
                self.stats.warnings += 1;
                self.stats.creation_fallbacks += 1;
                self.construct(template)?.0
            }
            None => {
                tracing::error!(
                    template = ?template,
                    has_group = group.is_some(),
                    "acquire: pool empty and creation disabled"
                );
                self.stats.warnings += 1;
                return Err(PoolError::PoolEmpty {
                    template: format!("{template:?}"),
                });
            }
        };
        self.vend(id, options.parent, options.activate)
    }

    /// Returns an instance to the group it was created for, deactivating it
    /// if the config says so.
    ///
    /// An instance this manager never vended is destroyed and
    /// [`PoolError::UnknownInstance`] is returned; there is nothing left for
    /// the caller to clean up. A token that carries a handle this manager
    /// still tracks, such as [`Pooled::detached`] around one, is routed to
    /// that instance instead and never destroyed as foreign.
    pub fn release(&mut self, instance: Pooled<A::Instance>) -> PoolResult<()> {
        let deactivate = self.config.deactivate_on_release;
        self.release_with(instance, deactivate)
    }

    /// Returns an instance to its group.
    pub fn release_with(
        &mut self,
        instance: Pooled<A::Instance>,
        deactivate: bool,
    ) -> PoolResult<()> {
        let (id, lease, handle) = instance.into_parts();
        if id.manager() == self.id {
            return self.recycle(id, Some(lease), deactivate);
        }
        match self.by_handle.get(&handle).copied() {
            Some(own) => self.recycle(own, None, deactivate),
            None => Err(self.destroy_foreign(id, handle)),
        }
    }

    /// Releases every instance in order. Failures do not stop the batch and
    /// are collected in the returned list.
    pub fn release_many<T>(&mut self, instances: T, deactivate: bool) -> Vec<PoolError>
    where
        T: IntoIterator<Item = Pooled<A::Instance>>,
    {
        instances
            .into_iter()
            .filter_map(|instance| self.release_with(instance, deactivate).err())
            .collect()
    }

    /// Releases every active instance attached under `parent` and returns
    /// how many went back to their group.
    ///
    /// Outstanding [`Pooled`] tokens for those instances become stale.
    pub fn release_children(&mut self, parent: &A::Parent) -> usize {
        let deactivate = self.config.deactivate_on_release;
        self.membership
            .members(&Holder::Parent(parent.clone()))
            .into_iter()
            .filter(|id| self.recycle(*id, None, deactivate).is_ok())
            .count()
    }

    /// Schedules `instance` to be released once `delay` has elapsed on the
    /// manager clock.
    pub fn release_deferred(
        &mut self,
        instance: Pooled<A::Instance>,
        delay: Duration,
    ) -> PoolResult<DeferredTicket> {
        self.release_deferred_with(instance, delay, || {})
    }

    /// Schedules `instance` to be released once `delay` has elapsed, then
    /// runs `callback`.
    ///
    /// If the instance is destroyed or recycled through another path before
    /// the delay elapses, the request is dropped and `callback` never runs.
    pub fn release_deferred_with<F>(
        &mut self,
        instance: Pooled<A::Instance>,
        delay: Duration,
        callback: F,
    ) -> PoolResult<DeferredTicket>
    where
        F: FnOnce() + Send + 'static,
    {
        let instance = if instance.id().manager() == self.id {
            instance
        } else {
            let (id, _, handle) = instance.into_parts();
            let Some(own) = self.by_handle.get(&handle).copied() else {
                return Err(self.destroy_foreign(id, handle));
            };
            match self.slots.get(&own) {
                Some(slot) if slot.holder.is_some() => Pooled::new(own, slot.lease, handle),
                _ => return Err(self.reject_stale(own)),
            }
        };
        if !self.is_current(instance.id(), instance.lease()) {
            return Err(self.reject_stale(instance.id()));
        }
        let request = DeferredReturn {
            instance,
            deactivate: self.config.deactivate_on_release,
            callback: Box::new(callback),
        };
        Ok(self
            .deferred
            .schedule(self.now.saturating_add(delay), request))
    }

    /// Cancels a deferred release and hands the instance back to the caller.
    pub fn cancel_deferred(&mut self, ticket: DeferredTicket) -> Option<Pooled<A::Instance>> {
        self.deferred.cancel(ticket).map(|request| request.instance)
    }

    /// Constructs `count` idle instances of `template`.
    ///
    /// Instances built before a construction failure stay pooled.
    pub fn prewarm(&mut self, template: &A::Template, count: usize) -> PoolResult<usize> {
        self.check_template(template, "prewarm")?;
        for _ in 0..count {
            let (id, group) = self.construct(template)?;
            self.registry.group_mut(group).push(id);
        }
        tracing::debug!(template = ?template, count, "prewarmed");
        Ok(count)
    }

    /// Applies every entry of `plan` in order.
    pub fn prewarm_plan(&mut self, plan: &PrewarmPlan<A::Template>) -> PoolResult<usize> {
        plan.iter().try_fold(0, |total, entry| {
            Ok(total + self.prewarm(&entry.template, entry.count)?)
        })
    }

    /// Destroys every instance this manager tracks, idle or active, and
    /// clears the return-path index. Pending deferred returns are dropped.
    ///
    /// Groups survive, empty. Returns how many instances were destroyed.
    pub fn drain_and_destroy_all(&mut self) -> usize {
        let idle: Vec<InstanceId> = self
            .registry
            .iter_mut()
            .flat_map(|group| group.drain_all())
            .collect();
        let active = self.membership.drain();

        let destroyed = idle
            .into_iter()
            .chain(active)
            .filter(|id| self.destroy_tracked(*id))
            .count();
        debug_assert!(self.slots.is_empty());
        self.return_paths.clear();
        self.by_handle.clear();

        let slots = &self.slots;
        let cancelled = self.deferred.purge(|id| !slots.contains_key(&id));
        tracing::debug!(destroyed, cancelled, "drained all pool groups");
        destroyed
    }

    /// Subscribes to `events`, replacing any previous subscription.
    ///
    /// Changes are picked up on the next [`Self::tick`].
    pub fn subscribe(&mut self, events: &LifecycleEvents) {
        self.subscription = Some(events.subscribe());
    }

    /// Drops the lifecycle subscription. Returns false if there was none.
    pub fn unsubscribe(&mut self) -> bool {
        self.subscription.take().is_some()
    }

    /// Reacts to a context change: destroys every pooled instance unless
    /// `drain_on_context_change` is off.
    pub fn handle_context_change(&mut self, change: &ContextChange) -> usize {
        if !self.config.drain_on_context_change {
            tracing::debug!(next = %change.next, "context changed, keeping pool");
            return 0;
        }
        tracing::info!(
            previous = change.previous_name(),
            next = %change.next,
            "context changed, destroying all pooled instances"
        );
        self.drain_and_destroy_all()
    }

    /// Handles every context change waiting in the subscription mailbox.
    pub fn poll_lifecycle(&mut self) -> usize {
        let changes = match &self.subscription {
            Some(subscription) => subscription.drain(),
            None => return 0,
        };
        for change in &changes {
            self.handle_context_change(change);
        }
        changes.len()
    }

    /// Advances the manager clock by `dt`, performs every deferred release
    /// that became due and returns their callbacks without running them.
    ///
    /// All due releases are performed before the caller gets to run any
    /// callback, so callback `k` observes releases `k + 1..` as done. Use
    /// [`Self::tick`] to run each callback right after its own release.
    /// Pending context changes are handled first.
    pub fn advance(&mut self, dt: Duration) -> Vec<Completion> {
        self.start_tick(dt)
            .into_iter()
            .filter_map(|request| self.fire(request))
            .collect()
    }

    /// Advances the clock by `dt`. Each due deferred release is performed and
    /// its callback run before the next one fires. Returns how many fired.
    pub fn tick(&mut self, dt: Duration) -> usize {
        let mut fired = 0;
        for request in self.start_tick(dt) {
            if let Some(callback) = self.fire(request) {
                callback();
                fired += 1;
            }
        }
        fired
    }

    fn start_tick(&mut self, dt: Duration) -> Vec<DeferredReturn<A::Instance>> {
        self.poll_lifecycle();
        self.now = self.now.saturating_add(dt);
        self.deferred.pop_due(self.now)
    }

    /// Performs one deferred release. The callback is returned only when the
    /// release went through.
    fn fire(&mut self, request: DeferredReturn<A::Instance>) -> Option<Completion> {
        let id = request.instance.id();
        if !self.is_current(id, request.instance.lease()) {
            tracing::debug!(instance = %id, "deferred release cancelled, instance no longer active");
            return None;
        }
        match self.release_with(request.instance, request.deactivate) {
            Ok(()) => Some(request.callback),
            Err(err) => {
                tracing::debug!(instance = %id, error = %err, "deferred release failed");
                None
            }
        }
    }

    /// Id of this manager.
    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// Time accumulated by [`Self::tick`].
    pub fn now(&self) -> Duration {
        self.now
    }

    /// The config in use.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Borrows the allocator.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Mutably borrows the allocator.
    pub fn allocator_mut(&mut self) -> &mut A {
        &mut self.allocator
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Gets the group of `template`, if one was ever created.
    pub fn group(&self, template: &A::Template) -> Option<&PoolGroup<A::Template>> {
        self.registry
            .lookup(template)
            .map(|id| self.registry.group(id))
    }

    /// Iterates every group in creation order.
    pub fn groups(&self) -> impl Iterator<Item = &PoolGroup<A::Template>> {
        self.registry.iter()
    }

    /// Number of groups created so far.
    pub fn group_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of idle instances of `template`.
    pub fn idle_count(&self, template: &A::Template) -> usize {
        self.group(template).map_or(0, PoolGroup::len)
    }

    /// Number of instances currently handed out.
    pub fn active_count(&self) -> usize {
        self.membership.len()
    }

    /// Number of live instances in the return-path index.
    pub fn tracked_count(&self) -> usize {
        self.return_paths.len()
    }

    /// Number of deferred releases waiting to fire.
    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Checks whether `id` is a live instance of this manager.
    pub fn is_tracked(&self, id: InstanceId) -> bool {
        self.return_paths.resolve(id).is_some()
    }

    /// Checks whether `id` is currently handed out.
    pub fn is_active(&self, id: InstanceId) -> bool {
        self.slots
            .get(&id)
            .is_some_and(|slot| slot.holder.is_some())
    }

    /// The group `id` returns to.
    pub fn home_of(&self, id: InstanceId) -> Option<GroupId> {
        self.return_paths.resolve(id)
    }

    /// Host handle of a live instance.
    pub fn handle(&self, id: InstanceId) -> Option<&A::Instance> {
        self.slots.get(&id).map(|slot| &slot.handle)
    }

    /// Active instances attached under `parent`, ordered by id.
    pub fn children_of(&self, parent: &A::Parent) -> Vec<InstanceId> {
        self.membership.members(&Holder::Parent(parent.clone()))
    }

    fn check_template(&mut self, template: &A::Template, operation: &str) -> PoolResult<()> {
        if self.allocator.is_valid_template(template) {
            return Ok(());
        }
        tracing::error!(template = ?template, operation, "invalid template");
        self.stats.warnings += 1;
        Err(PoolError::InvalidArgument(format!(
            "{operation}: invalid template {template:?}"
        )))
    }

    /// Builds an instance, parks it inactive under its group and records its
    /// return path. It is not pushed into idle storage.
    fn construct(&mut self, template: &A::Template) -> PoolResult<(InstanceId, GroupId)> {
        let handle = match self.allocator.allocate(template) {
            Ok(handle) => handle,
            Err(source) => {
                tracing::error!(template = ?template, error = %source, "failed to construct instance");
                self.stats.warnings += 1;
                return Err(PoolError::ConstructionFailure {
                    template: format!("{template:?}"),
                    source: Box::new(source),
                });
            }
        };
        self.allocator.set_active(&handle, false);
        let group = self.registry.get_or_create(template);
        self.allocator.attach(&handle, Attachment::Idle(group));

        let id = InstanceId::new(self.id, self.next_serial);
        self.next_serial += 1;
        self.return_paths.record(id, group);
        self.by_handle.insert(handle.clone(), id);
        self.slots.insert(
            id,
            Slot {
                handle,
                lease: 0,
                holder: None,
            },
        );
        self.stats.constructed += 1;
        Ok((id, group))
    }

    fn vend(
        &mut self,
        id: InstanceId,
        parent: Option<A::Parent>,
        activate: bool,
    ) -> PoolResult<Pooled<A::Instance>> {
        let holder = parent.map_or(Holder::Active, Holder::Parent);
        let Some(slot) = self.slots.get_mut(&id) else {
            return Err(PoolError::InvalidArgument(format!(
                "instance {id} is not tracked"
            )));
        };
        slot.lease = slot.lease.wrapping_add(1);
        slot.holder = Some(holder.clone());
        let lease = slot.lease;
        let handle = slot.handle.clone();

        match &holder {
            Holder::Active => self.allocator.attach(&handle, Attachment::Active),
            Holder::Parent(parent) => self.allocator.attach(&handle, Attachment::Parent(parent)),
        }
        self.allocator.reset(&handle);
        if activate {
            self.allocator.set_active(&handle, true);
        }
        self.membership.insert(holder, id);
        Ok(Pooled::new(id, lease, handle))
    }

    /// Moves an active instance back to idle storage. `lease` is checked when
    /// given.
    fn recycle(&mut self, id: InstanceId, lease: Option<u32>, deactivate: bool) -> PoolResult<()> {
        let Some(group) = self.return_paths.resolve(id) else {
            tracing::warn!(instance = %id, "release: instance was already destroyed");
            self.stats.warnings += 1;
            return Err(PoolError::InvalidArgument(format!(
                "instance {id} was already destroyed"
            )));
        };
        let handle = match self.slots.get(&id) {
            Some(slot) if slot.holder.is_some() && lease.map_or(true, |l| l == slot.lease) => {
                slot.handle.clone()
            }
            _ => return Err(self.reject_stale(id)),
        };
        if !self.allocator.is_valid(&handle) {
            tracing::warn!(instance = %id, "release: instance failed validation, destroying");
            self.stats.warnings += 1;
            self.destroy_tracked(id);
            return Err(PoolError::InvalidArgument(format!(
                "instance {id} failed validation"
            )));
        }

        if let Some(holder) = self.slots.get_mut(&id).and_then(|slot| slot.holder.take()) {
            self.membership.remove(&holder, id);
        }
        let full = self
            .config
            .max_idle_per_group
            .is_some_and(|max| self.registry.group(group).len() >= max);
        if full {
            tracing::debug!(instance = %id, group = %group, "release: group full, destroying");
            self.destroy_tracked(id);
            return Ok(());
        }

        if deactivate {
            self.allocator.set_active(&handle, false);
        }
        self.allocator.attach(&handle, Attachment::Idle(group));
        self.registry.group_mut(group).push(id);
        self.stats.released += 1;
        Ok(())
    }

    fn is_current(&self, id: InstanceId, lease: u32) -> bool {
        self.slots
            .get(&id)
            .is_some_and(|slot| slot.holder.is_some() && slot.lease == lease)
    }

    fn reject_stale(&mut self, id: InstanceId) -> PoolError {
        tracing::warn!(instance = %id, "release: instance is not active under this lease");
        self.stats.warnings += 1;
        PoolError::InvalidArgument(format!("instance {id} is not active under this lease"))
    }

    fn destroy_foreign(&mut self, id: InstanceId, handle: A::Instance) -> PoolError {
        tracing::warn!(
            instance = %id,
            "release: instance did not originate from this pool, destroying"
        );
        self.stats.warnings += 1;
        self.stats.unknown_releases += 1;
        self.stats.destroyed += 1;
        self.allocator.destroy(handle);
        PoolError::UnknownInstance { id }
    }

    /// Destroys a tracked instance and forgets it. The caller removes it from
    /// idle storage first when it was idle.
    fn destroy_tracked(&mut self, id: InstanceId) -> bool {
        let Some(slot) = self.slots.remove(&id) else {
            return false;
        };
        if let Some(holder) = &slot.holder {
            self.membership.remove(holder, id);
        }
        self.return_paths.forget(id);
        self.by_handle.remove(&slot.handle);
        self.allocator.destroy(slot.handle);
        self.stats.destroyed += 1;
        true
    }
}

impl<A: PoolAllocator> fmt::Debug for PoolManager<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolManager")
            .field("id", &self.id)
            .field("groups", &self.registry.len())
            .field("tracked", &self.slots.len())
            .field("pending_deferred", &self.deferred.len())
            .field("subscribed", &self.subscription.is_some())
            .field("now", &self.now)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Destroys every tracked instance and unsubscribes.
impl<A: PoolAllocator> Drop for PoolManager<A> {
    fn drop(&mut self) {
        self.subscription = None;
        let mut ids: Vec<InstanceId> = self.slots.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(slot) = self.slots.remove(&id) {
                self.allocator.destroy(slot.handle);
            }
        }
    }
}
