//! Signal and event dispatch.
//!
//! The manager's clients wait on named conditions by posting commands to the
//! signals port: a wait names the event source, an event type, a match param
//! and a reply port, and carries a timeout (a tick count, infinite, or
//! repeating). Events posted to the events port are matched against the
//! outstanding waits and answered with a reply message per match. A
//! blocking wait additionally parks its thread in the scheduler until the
//! reply is on its way.
//!
//! All dispatch state lives in one [`Signals`] value owned by the hosting
//! service loop; external collaborators are reached through the
//! [`Platform`](crate::platform::Platform) seam. Every command is processed
//! to completion before the next is read: the service is single-threaded
//! cooperative and nothing here suspends.

mod clock;
mod deliver;
mod registry;
mod slab;


use opal_abi::addr::VirtAddr;
use opal_abi::signal::{
    CMD_SET_SIGNAL_HANDLER, CMD_SET_SIGNAL_STACK, CMD_SIGNAL, DiscardSignal, EVT_INTR, OutMsg,
    PM_TASK, PortId, SetHandlerRes, SetSignalHandler, SetSignalStack, SignalNotify, SignalRequest,
    SignalRet, Timeout, WaitForSignal,
};
use opal_abi::task::{MAX_THR, MAX_TSK, TaskId, TaskState, ThrId, ThreadStateMask};
use opal_lib::klog_debug;

use crate::platform::Platform;

use clock::TickClock;
use registry::{Registry, ThrSignals, TskSignals};
use slab::{Deadline, NIL, SignalRecord};

/// Why a signal-port command was refused. Refusals never escape the
/// dispatcher; they become a `Failed` reply (or, for discards, a log line).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalError {
    BadThread,
    BadTask,
    /// The requesting task is mid-mmap and must not register waits.
    TaskBusy,
    /// The thread already has a blocking wait outstanding.
    AlreadyBlocking,
    /// Repeating waits cannot block.
    BadTimeoutForBlocking,
    /// Record slab exhausted.
    OutOfMemory,
    /// Handler entry point or stack failed validation.
    BadAddress,
    /// The interrupt dispatcher refused the registration.
    InterruptRegistration,
}

/// All state of the dispatch subsystem: the tick clock and the wait
/// registry. Constructed once at service start and driven by the hosting
/// loop.
pub struct Signals {
    clock: TickClock,
    reg: Registry,
}

impl Signals {
    pub const fn new() -> Self {
        Self {
            clock: TickClock::new(),
            reg: Registry::new(),
        }
    }

    /// Drain the signals port, processing each command to completion.
    pub fn process_signals(&mut self, p: &mut impl Platform) {
        while let Some((request, sender)) = p.recv_signal() {
            match request {
                SignalRequest::Wait(cmd) => self.wait_signal(p, &cmd, true, sender),
                SignalRequest::WaitNonBlocking(cmd) => self.wait_signal(p, &cmd, false, sender),
                SignalRequest::Discard(cmd) => {
                    if let Err(err) = self.try_discard(p, &cmd, sender) {
                        klog_debug!("pm: discard refused for thr {}: {:?}", cmd.thr_id, err);
                    }
                }
                SignalRequest::SetHandler(cmd) => self.set_signal_handler(p, &cmd, sender),
                SignalRequest::SetStack(cmd) => self.set_signal_stack(p, &cmd, sender),
            }
        }
    }

    /// Drain the events port.
    pub fn process_events(&mut self, p: &mut impl Platform) {
        while let Some((evt, sender)) = p.recv_event() {
            self.event(p, &evt, sender);
        }
    }

    // --- WAIT / WAIT_NBLOCK ---

    fn wait_signal(&mut self, p: &mut impl Platform, cmd: &WaitForSignal, blocking: bool, sender: TaskId) {
        if let Err(err) = self.try_wait(p, cmd, blocking, sender) {
            klog_debug!("pm: wait refused for thr {}: {:?}", cmd.thr_id, err);
            let msg = SignalNotify {
                command: CMD_SIGNAL,
                thr_id: cmd.thr_id,
                event_type: cmd.event_type,
                id: cmd.id,
                task: cmd.task,
                res: 0,
                ret: SignalRet::Failed,
            };
            p.send_msg(sender, cmd.signal_port, OutMsg::Signal(msg));
        }
    }

    fn try_wait(
        &mut self,
        p: &mut impl Platform,
        cmd: &WaitForSignal,
        blocking: bool,
        sender: TaskId,
    ) -> Result<(), SignalError> {
        let task = p.task(sender).ok_or(SignalError::BadTask)?;
        if task.state == TaskState::Mmapping {
            return Err(SignalError::TaskBusy);
        }

        if (cmd.thr_id as usize) >= MAX_THR {
            return Err(SignalError::BadThread);
        }
        let thread = p.thread(cmd.thr_id).ok_or(SignalError::BadThread)?;
        if thread.task != sender {
            return Err(SignalError::BadThread);
        }
        if !ThreadStateMask::WAITABLE.contains(thread.state.mask()) {
            return Err(SignalError::BadThread);
        }

        if blocking && self.reg.thr[cmd.thr_id as usize].blocking != NIL {
            return Err(SignalError::AlreadyBlocking);
        }

        let deadline = match Timeout::from_raw(cmd.timeout) {
            Timeout::Infinite => Deadline::Infinite,
            Timeout::Repeating => {
                if blocking {
                    return Err(SignalError::BadTimeoutForBlocking);
                }
                Deadline::Repeating
            }
            Timeout::Ticks(rel) => Deadline::At(self.clock.slot(rel)),
        };

        let rec = SignalRecord {
            thread: cmd.thr_id,
            event_type: cmd.event_type,
            id: cmd.id,
            task: cmd.task,
            signal_param: cmd.signal_param,
            signal_port: cmd.signal_port,
            deadline,
            tprev: NIL,
            tnext: NIL,
            gprev: NIL,
            gnext: NIL,
        };

        // Allocate before taking any side effect so a full slab refuses
        // cleanly.
        let idx = self.reg.slots.alloc(rec).ok_or(SignalError::OutOfMemory)?;

        // Park the thread before the interrupt hook: an interrupt arriving
        // within this same service step must find it already deactivated.
        if blocking {
            self.reg.thr[cmd.thr_id as usize].blocking = idx;
            p.deactivate(cmd.thr_id);
        }

        if cmd.event_type == EVT_INTR
            && cmd.task == PM_TASK
            && !p.int_signal(cmd.thr_id, cmd.signal_param)
        {
            if blocking {
                self.reg.thr[cmd.thr_id as usize].blocking = NIL;
                p.activate(cmd.thr_id);
            }
            self.reg.slots.free(idx);
            return Err(SignalError::InterruptRegistration);
        }

        self.reg.link(idx, &self.clock);
        Ok(())
    }

    // --- DISCARD ---

    fn try_discard(
        &mut self,
        p: &mut impl Platform,
        cmd: &DiscardSignal,
        sender: TaskId,
    ) -> Result<(), SignalError> {
        if (cmd.thr_id as usize) >= MAX_THR {
            return Err(SignalError::BadThread);
        }
        let thread = p.thread(cmd.thr_id).ok_or(SignalError::BadThread)?;
        if thread.task != sender {
            return Err(SignalError::BadThread);
        }
        if !ThreadStateMask::WAITABLE.contains(thread.state.mask()) {
            return Err(SignalError::BadThread);
        }

        let mut idx = self.reg.thr[cmd.thr_id as usize].first;
        while idx != NIL {
            let r = self.reg.slots.get(idx);
            if r.task == cmd.task
                && r.event_type == cmd.event_type
                && r.signal_param == cmd.signal_param
                && r.id == cmd.id
                && r.signal_port == cmd.signal_port
            {
                break;
            }
            idx = r.tnext;
        }
        if idx == NIL {
            // discarding a wait that is not there is a no-op
            return Ok(());
        }

        if self.reg.thr[cmd.thr_id as usize].blocking == idx {
            self.reg.thr[cmd.thr_id as usize].blocking = NIL;
            p.activate(cmd.thr_id);
        }
        self.reg.remove(idx, p);
        Ok(())
    }

    // --- SET_SIGNAL_HANDLER ---

    fn set_signal_handler(&mut self, p: &mut impl Platform, cmd: &SetSignalHandler, sender: TaskId) {
        let result = match self.try_set_handler(p, cmd, sender) {
            Ok(()) => SignalRet::Ok,
            Err(err) => {
                klog_debug!("pm: set handler refused for task {}: {:?}", sender, err);
                SignalRet::Failed
            }
        };
        let res = SetHandlerRes {
            command: CMD_SET_SIGNAL_HANDLER,
            thr_id: cmd.thr_id,
            result,
        };
        p.send_msg(sender, cmd.ret_port, OutMsg::HandlerRes(res));
    }

    fn try_set_handler(
        &mut self,
        p: &mut impl Platform,
        cmd: &SetSignalHandler,
        sender: TaskId,
    ) -> Result<(), SignalError> {
        if (sender as usize) >= MAX_TSK {
            return Err(SignalError::BadTask);
        }
        let task = p.task(sender).ok_or(SignalError::BadTask)?;
        if matches!(
            task.state,
            TaskState::Nothing | TaskState::Killing | TaskState::Killed
        ) {
            return Err(SignalError::BadTask);
        }

        if !cmd.stack.is_null() && cmd.handler_ep.is_null() {
            return Err(SignalError::BadAddress);
        }
        if !cmd.handler_ep.is_null() && !p.is_exec_addr(sender, cmd.handler_ep) {
            return Err(SignalError::BadAddress);
        }

        let t = &mut self.reg.tsk[sender as usize];
        t.handler_ep = cmd.handler_ep;
        t.exceptions_port = cmd.exceptions_port;
        Ok(())
    }

    // --- SET_SIGNAL_STACK ---

    fn set_signal_stack(&mut self, p: &mut impl Platform, cmd: &SetSignalStack, sender: TaskId) {
        let result = match self.try_set_stack(p, cmd, sender) {
            Ok(()) => SignalRet::Ok,
            Err(err) => {
                klog_debug!("pm: set stack refused for thr {}: {:?}", cmd.thr_id, err);
                SignalRet::Failed
            }
        };
        let res = SetHandlerRes {
            command: CMD_SET_SIGNAL_STACK,
            thr_id: cmd.thr_id,
            result,
        };
        p.send_msg(sender, cmd.ret_port, OutMsg::HandlerRes(res));
    }

    fn try_set_stack(
        &mut self,
        p: &mut impl Platform,
        cmd: &SetSignalStack,
        sender: TaskId,
    ) -> Result<(), SignalError> {
        if (cmd.thr_id as usize) >= MAX_THR {
            return Err(SignalError::BadThread);
        }
        let thread = p.thread(cmd.thr_id).ok_or(SignalError::BadThread)?;
        if thread.task != sender {
            return Err(SignalError::BadThread);
        }
        if !ThreadStateMask::WAITABLE.contains(thread.state.mask()) {
            return Err(SignalError::BadThread);
        }

        if !cmd.stack.is_null() {
            let task = p.task(sender).ok_or(SignalError::BadTask)?;
            // the handler stack must sit above the task image split
            if cmd.stack.as_u64() < task.user_base.as_u64() {
                return Err(SignalError::BadAddress);
            }
        }

        self.reg.thr[cmd.thr_id as usize].stack = cmd.stack;
        Ok(())
    }

    // --- Thread teardown & slot reuse ---

    /// Drop every pending wait of a dying thread: records are unlinked and
    /// freed, interrupt registrations released, the blocking mark cleared.
    /// No replies are sent and the thread is not reactivated; the caller is
    /// tearing it down.
    pub fn remove_thr_signals(&mut self, p: &mut impl Platform, thread: ThrId) {
        if (thread as usize) >= MAX_THR {
            return;
        }
        loop {
            let idx = self.reg.thr[thread as usize].first;
            if idx == NIL {
                break;
            }
            self.reg.remove(idx, p);
        }
    }

    /// Re-initialise a thread slot's signal state. Only valid for a slot
    /// with no pending records (fresh reuse after teardown).
    pub fn reset_thread(&mut self, thread: ThrId) {
        if (thread as usize) >= MAX_THR {
            return;
        }
        debug_assert!(self.reg.thr[thread as usize].first == NIL);
        self.reg.thr[thread as usize] = ThrSignals::EMPTY;
    }

    /// Re-initialise a task slot's signal configuration.
    pub fn reset_task(&mut self, task: TaskId) {
        if (task as usize) >= MAX_TSK {
            return;
        }
        self.reg.tsk[task as usize] = TskSignals::EMPTY;
    }

    // --- Scheduler-facing accessors ---

    /// Consume the soft-int flag; the scheduler calls this when it is about
    /// to dispatch the thread and vectors it through the task handler if the
    /// flag was set.
    pub fn take_pending_int(&mut self, thread: ThrId) -> bool {
        if (thread as usize) >= MAX_THR {
            return false;
        }
        let t = &mut self.reg.thr[thread as usize];
        let pending = t.pending_int;
        t.pending_int = false;
        pending
    }

    pub fn pending_int(&self, thread: ThrId) -> bool {
        (thread as usize) < MAX_THR && self.reg.thr[thread as usize].pending_int
    }

    /// Stack installed via SET_SIGNAL_STACK (null when unset).
    pub fn signal_stack(&self, thread: ThrId) -> VirtAddr {
        if (thread as usize) >= MAX_THR {
            return VirtAddr::NULL;
        }
        self.reg.thr[thread as usize].stack
    }

    /// Task-wide handler entry point (null when disabled).
    pub fn handler_entry(&self, task: TaskId) -> VirtAddr {
        if (task as usize) >= MAX_TSK {
            return VirtAddr::NULL;
        }
        self.reg.tsk[task as usize].handler_ep
    }

    pub fn exceptions_port(&self, task: TaskId) -> PortId {
        if (task as usize) >= MAX_TSK {
            return 0;
        }
        self.reg.tsk[task as usize].exceptions_port
    }

    /// Current tick count, for diagnostics.
    pub fn ticks(&self) -> u32 {
        self.clock.ticks()
    }

    /// Number of outstanding wait records, for diagnostics.
    pub fn pending_count(&self) -> u16 {
        self.reg.slots.live()
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        self.reg.check_invariants(&self.clock);
    }
}
