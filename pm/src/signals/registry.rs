//! Wait registry: per-thread record lists, the ordered timeout queue, and
//! the registered-threads list.
//!
//! Three structures share the record slab:
//! - each thread owns an unordered list of its pending records,
//! - every timed record additionally sits in one global queue ordered by
//!   expiry under the clock's epoch-aware comparator,
//! - threads holding at least one record form a flat list so event delivery
//!   can enumerate candidates without walking the task table.
//!
//! All three are maintained together by [`Registry::link`] and
//! [`Registry::remove`]; nothing else touches the links.

use core::cmp::Ordering;

use opal_abi::addr::VirtAddr;
use opal_abi::signal::{EVT_INTR, PM_TASK, PortId};
use opal_abi::task::{INVALID_THR_ID, MAX_THR, MAX_TSK, ThrId};

use crate::platform::Platform;

use super::clock::TickClock;
use super::slab::{Deadline, NIL, RecordSlab, SlotIdx};

/// Per-thread signal state.
#[derive(Clone, Copy)]
pub(crate) struct ThrSignals {
    /// Head of the thread's record list.
    pub first: SlotIdx,
    /// The one record whose completion reactivates the thread, if any.
    pub blocking: SlotIdx,
    /// Registered-threads list links.
    pub next: ThrId,
    pub prev: ThrId,
    /// Set on delivery when the owning task has a handler installed; the
    /// scheduler consumes it on the thread's next dispatch.
    pub pending_int: bool,
    /// Stack for the user-mode handler trampoline (null when unset).
    pub stack: VirtAddr,
}

impl ThrSignals {
    pub const EMPTY: Self = Self {
        first: NIL,
        blocking: NIL,
        next: INVALID_THR_ID,
        prev: INVALID_THR_ID,
        pending_int: false,
        stack: VirtAddr::NULL,
    };
}

/// Per-task signal configuration.
#[derive(Clone, Copy)]
pub(crate) struct TskSignals {
    /// User-mode handler entry point (null disables the soft-int hook).
    pub handler_ep: VirtAddr,
    pub exceptions_port: PortId,
}

impl TskSignals {
    pub const EMPTY: Self = Self {
        handler_ep: VirtAddr::NULL,
        exceptions_port: 0,
    };
}

pub(crate) struct Registry {
    pub slots: RecordSlab,
    queue_head: SlotIdx,
    first_thr: ThrId,
    pub thr: [ThrSignals; MAX_THR],
    pub tsk: [TskSignals; MAX_TSK],
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            slots: RecordSlab::new(),
            queue_head: NIL,
            first_thr: INVALID_THR_ID,
            thr: [ThrSignals::EMPTY; MAX_THR],
            tsk: [TskSignals::EMPTY; MAX_TSK],
        }
    }

    #[inline]
    pub fn queue_head(&self) -> SlotIdx {
        self.queue_head
    }

    #[inline]
    pub fn first_registered(&self) -> ThrId {
        self.first_thr
    }

    #[inline]
    pub fn next_registered(&self, thread: ThrId) -> ThrId {
        self.thr[thread as usize].next
    }

    /// Link an allocated record into its thread's list, the timeout queue
    /// when timed, and the registered-threads list when the thread was idle.
    pub fn link(&mut self, idx: SlotIdx, clock: &TickClock) {
        let rec = *self.slots.get(idx);
        let thread = rec.thread as usize;

        let ofirst = self.thr[thread].first;
        {
            let r = self.slots.get_mut(idx);
            r.tnext = ofirst;
            r.tprev = NIL;
        }
        if ofirst != NIL {
            self.slots.get_mut(ofirst).tprev = idx;
        }
        self.thr[thread].first = idx;

        if let Deadline::At(slot) = rec.deadline {
            // Ordered insert: walk to the first strictly later record and
            // slot in before it, so equal expiries keep arrival order.
            let mut prv = NIL;
            let mut curr = self.queue_head;
            while curr != NIL {
                let c = self.slots.get(curr);
                let Deadline::At(cslot) = c.deadline else {
                    debug_assert!(false, "untimed record in timeout queue");
                    break;
                };
                if clock.order(slot, cslot) == Ordering::Less {
                    break;
                }
                prv = curr;
                curr = c.gnext;
            }
            if curr != NIL {
                self.slots.get_mut(curr).gprev = idx;
            }
            if prv != NIL {
                self.slots.get_mut(prv).gnext = idx;
            } else {
                self.queue_head = idx;
            }
            let r = self.slots.get_mut(idx);
            r.gprev = prv;
            r.gnext = curr;
        }

        if ofirst == NIL {
            self.register_thread(rec.thread);
        }
    }

    /// Unlink a record from every list, drop any interrupt registration it
    /// holds, and free its slot. Does not touch the scheduler: reactivation
    /// is the caller's decision.
    pub fn remove(&mut self, idx: SlotIdx, p: &mut impl Platform) {
        let rec = *self.slots.get(idx);
        let thread = rec.thread as usize;

        if self.thr[thread].blocking == idx {
            self.thr[thread].blocking = NIL;
        }

        if !rec.deadline.is_untimed() {
            if rec.gprev != NIL {
                self.slots.get_mut(rec.gprev).gnext = rec.gnext;
            } else {
                self.queue_head = rec.gnext;
            }
            if rec.gnext != NIL {
                self.slots.get_mut(rec.gnext).gprev = rec.gprev;
            }
        }

        if rec.tprev != NIL {
            self.slots.get_mut(rec.tprev).tnext = rec.tnext;
        } else {
            self.thr[thread].first = rec.tnext;
        }
        if rec.tnext != NIL {
            self.slots.get_mut(rec.tnext).tprev = rec.tprev;
        }

        if self.thr[thread].first == NIL {
            self.deregister_thread(rec.thread);
        }

        if rec.event_type == EVT_INTR && rec.task == PM_TASK {
            p.int_signal_remove(rec.thread, rec.signal_param);
        }

        self.slots.free(idx);
    }

    fn register_thread(&mut self, thread: ThrId) {
        let ofirst = self.first_thr;
        let t = &mut self.thr[thread as usize];
        t.next = ofirst;
        t.prev = INVALID_THR_ID;
        if ofirst != INVALID_THR_ID {
            self.thr[ofirst as usize].prev = thread;
        }
        self.first_thr = thread;
    }

    fn deregister_thread(&mut self, thread: ThrId) {
        let t = self.thr[thread as usize];
        if t.prev != INVALID_THR_ID {
            self.thr[t.prev as usize].next = t.next;
        } else {
            self.first_thr = t.next;
        }
        if t.next != INVALID_THR_ID {
            self.thr[t.next as usize].prev = t.prev;
        }
        let t = &mut self.thr[thread as usize];
        t.next = INVALID_THR_ID;
        t.prev = INVALID_THR_ID;
    }

    #[cfg(test)]
    pub fn check_invariants(&self, clock: &TickClock) {
        use super::clock::TimeSlot;

        // Timeout queue: back-links intact, only timed records, sorted.
        let mut queued = [false; super::slab::MAX_SIGNALS];
        let mut prev_slot: Option<TimeSlot> = None;
        let mut prev_idx = NIL;
        let mut idx = self.queue_head;
        while idx != NIL {
            let r = self.slots.get(idx);
            assert_eq!(r.gprev, prev_idx, "queue back-link broken");
            let Deadline::At(slot) = r.deadline else {
                panic!("untimed record in timeout queue");
            };
            if let Some(p) = prev_slot {
                assert_ne!(clock.order(p, slot), Ordering::Greater, "queue out of order");
            }
            queued[idx as usize] = true;
            prev_slot = Some(slot);
            prev_idx = idx;
            idx = r.gnext;
        }

        // Thread lists: ownership, back-links, queue membership, blocking.
        let mut listed = 0u16;
        for t in 0..MAX_THR {
            let ts = &self.thr[t];
            let mut seen_blocking = false;
            let mut prev_s = NIL;
            let mut s = ts.first;
            while s != NIL {
                let r = self.slots.get(s);
                assert_eq!(r.thread as usize, t, "record on wrong thread list");
                assert_eq!(r.tprev, prev_s, "thread list back-link broken");
                assert_eq!(
                    queued[s as usize],
                    !r.deadline.is_untimed(),
                    "queue membership disagrees with deadline"
                );
                if ts.blocking == s {
                    seen_blocking = true;
                }
                listed += 1;
                prev_s = s;
                s = r.tnext;
            }
            if ts.blocking != NIL {
                assert!(seen_blocking, "blocking record missing from its list");
            }
            let registered = self.walk_registered_contains(t as ThrId);
            assert_eq!(registered, ts.first != NIL, "registered-threads membership");
        }
        assert_eq!(listed, self.slots.live(), "slab live count disagrees with lists");
    }

    #[cfg(test)]
    fn walk_registered_contains(&self, thread: ThrId) -> bool {
        let mut t = self.first_thr;
        while t != INVALID_THR_ID {
            if t == thread {
                return true;
            }
            t = self.thr[t as usize].next;
        }
        false
    }
}
