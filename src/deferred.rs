//! Tick-serviced waiting list of deferred returns.

use crate::{InstanceId, Pooled};
use std::{collections::BTreeMap, fmt, time::Duration};

/// Callback run once a deferred return has completed.
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled deferred return, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeferredTicket(u64);

pub(crate) struct DeferredReturn<I> {
    pub(crate) instance: Pooled<I>,
    pub(crate) deactivate: bool,
    pub(crate) callback: Completion,
}

impl<I> fmt::Debug for DeferredReturn<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredReturn")
            .field("instance", &self.instance.id())
            .field("deactivate", &self.deactivate)
            .finish_non_exhaustive()
    }
}

/// Requests ordered by due time, ties broken by schedule order.
#[derive(Debug)]
pub(crate) struct DeferredQueue<I> {
    pending: BTreeMap<(Duration, u64), DeferredReturn<I>>,
    due_of: BTreeMap<u64, Duration>,
    next_seq: u64,
}

impl<I> DeferredQueue<I> {
    pub(crate) fn new() -> Self {
        DeferredQueue {
            pending: BTreeMap::new(),
            due_of: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn schedule(&mut self, due: Duration, request: DeferredReturn<I>) -> DeferredTicket {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert((due, seq), request);
        self.due_of.insert(seq, due);
        DeferredTicket(seq)
    }

    pub(crate) fn cancel(&mut self, ticket: DeferredTicket) -> Option<DeferredReturn<I>> {
        let due = self.due_of.remove(&ticket.0)?;
        self.pending.remove(&(due, ticket.0))
    }

    /// Removes and returns every request due at or before `now`, in firing
    /// order.
    pub(crate) fn pop_due(&mut self, now: Duration) -> Vec<DeferredReturn<I>> {
        let mut due = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let ((_, seq), request) = entry.remove_entry();
            self.due_of.remove(&seq);
            due.push(request);
        }
        due
    }

    /// Drops every request whose target `is_gone` reports as destroyed.
    pub(crate) fn purge<F>(&mut self, mut is_gone: F) -> usize
    where
        F: FnMut(InstanceId) -> bool,
    {
        let before = self.pending.len();
        let due_of = &mut self.due_of;
        self.pending.retain(|(_, seq), request| {
            let keep = !is_gone(request.instance.id());
            if !keep {
                due_of.remove(seq);
            }
            keep
        });
        before - self.pending.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
