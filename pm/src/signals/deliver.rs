//! Matching and delivery.
//!
//! Two things complete a wait: a matching event posting, or the timeout
//! queue reaching the record's expiry slot. Both funnel into
//! [`Signals::deliver`], which sends the reply, raises the soft-int flag,
//! reactivates a blocked owner, and retires the record unless it repeats.

use opal_abi::signal::{
    CMD_SIGNAL, EVT_SLEEP, EventCmd, GLOBAL_EVENT, OutMsg, PARAM_IGNORE, PM_TASK, SignalNotify,
    SignalRet,
};
use opal_abi::task::{INVALID_THR_ID, MAX_TSK, TaskId};
use opal_lib::{klog_debug, klog_warn};

use crate::platform::Platform;

use super::Signals;
use super::slab::{Deadline, NIL, SlotIdx};

impl Signals {
    /// Match one event posting against the outstanding waits.
    ///
    /// The task key compared against each record is the *sender* for a
    /// global posting; a targeted posting must come from the task it names
    /// (events cannot be forged on another task's behalf) and uses that id.
    /// Candidates are enumerated through the registered-threads list in both
    /// cases; the matcher decides.
    pub(super) fn event(&mut self, p: &mut impl Platform, evt: &EventCmd, sender: TaskId) {
        let match_task = if evt.task == GLOBAL_EVENT {
            sender
        } else {
            if (evt.task as usize) >= MAX_TSK || evt.task != sender {
                klog_debug!("pm: event for task {} refused from {}", evt.task, sender);
                return;
            }
            if p.task(evt.task).is_none() {
                return;
            }
            evt.task
        };

        // Next links are captured before each delivery: a delivery can
        // unlink the record and drop the thread off the registered list.
        let mut thread = self.reg.first_registered();
        while thread != INVALID_THR_ID {
            let tnext = self.reg.next_registered(thread);
            let mut idx = self.reg.thr[thread as usize].first;
            while idx != NIL {
                let r = self.reg.slots.get(idx);
                let snext = r.tnext;
                if r.task == match_task
                    && r.event_type == evt.event_type
                    && (r.signal_param == evt.param || r.signal_param == PARAM_IGNORE)
                {
                    self.deliver(p, idx, SignalRet::Ok, evt.event_res);
                }
                idx = snext;
            }
            thread = tnext;
        }
    }

    /// Advance the clock one tick and fire every wait whose expiry the queue
    /// head has reached.
    pub fn timer_tick(&mut self, p: &mut impl Platform) {
        self.clock.tick();
        loop {
            let head = self.reg.queue_head();
            if head == NIL {
                break;
            }
            let rec = self.reg.slots.get(head);
            let Deadline::At(slot) = rec.deadline else {
                debug_assert!(false, "untimed record in timeout queue");
                break;
            };
            if !self.clock.is_due(slot) {
                break;
            }
            if slot.at != self.clock.ticks() {
                klog_warn!(
                    "pm: draining past-due timeout (at {}, now {})",
                    slot.at,
                    self.clock.ticks()
                );
            }
            let ret = if rec.task == PM_TASK && rec.event_type == EVT_SLEEP {
                // an expired sleep is success, not a timeout
                SignalRet::Ok
            } else {
                SignalRet::Timeout
            };
            self.deliver(p, head, ret, 0);
        }
    }

    /// Deliver `idx` with the given outcome and retire it unless it repeats.
    fn deliver(&mut self, p: &mut impl Platform, idx: SlotIdx, ret: SignalRet, res: u32) {
        let rec = *self.reg.slots.get(idx);
        let thread = rec.thread;

        match p.thread(thread) {
            Some(info) => {
                let msg = SignalNotify {
                    command: CMD_SIGNAL,
                    thr_id: thread,
                    event_type: rec.event_type,
                    id: rec.id,
                    task: rec.task,
                    res,
                    ret,
                };
                p.send_msg(info.task, rec.signal_port, OutMsg::Signal(msg));
                if (info.task as usize) < MAX_TSK
                    && !self.reg.tsk[info.task as usize].handler_ep.is_null()
                {
                    // the scheduler vectors the thread through the task
                    // handler on its next dispatch
                    self.reg.thr[thread as usize].pending_int = true;
                }
            }
            None => klog_warn!("pm: dropping delivery for vanished thr {}", thread),
        }

        let repeating = rec.deadline.is_repeating();
        if self.reg.thr[thread as usize].blocking == idx {
            // blocking repeating waits are refused at registration
            debug_assert!(!repeating);
            if !repeating {
                self.reg.thr[thread as usize].blocking = NIL;
                p.activate(thread);
            }
        }
        if !repeating {
            self.reg.remove(idx, p);
        }
    }
}
