//! Scripted [`Platform`] implementation for tests.
//!
//! Ports are fixed-capacity rings, the task/thread tables are plain arrays
//! the test populates, and every scheduler or interrupt interaction is
//! recorded so assertions can replay it.

use opal_abi::addr::VirtAddr;
use opal_abi::signal::{
    DiscardSignal, EventCmd, OutMsg, PortId, SetHandlerRes, SignalRequest, SignalRet,
};
use opal_abi::task::{MAX_THR, MAX_TSK, TaskId, TaskState, ThrId, ThreadState};
use opal_lib::RingBuffer;

use crate::platform::{Platform, TaskInfo, ThreadInfo};

const NO_REQUEST: (SignalRequest, TaskId) = (
    SignalRequest::Discard(DiscardSignal {
        thr_id: 0,
        task: 0,
        event_type: 0,
        signal_param: 0,
        id: 0,
        signal_port: 0,
    }),
    0,
);
const NO_EVENT: (EventCmd, TaskId) = (
    EventCmd {
        task: 0,
        event_type: 0,
        param: 0,
        event_res: 0,
    },
    0,
);
const NO_OUT: (TaskId, PortId, OutMsg) = (
    0,
    0,
    OutMsg::HandlerRes(SetHandlerRes {
        command: 0,
        thr_id: 0,
        result: SignalRet::Failed,
    }),
);

/// Default kernel/user split handed out for every scripted task.
pub const USER_BASE: u64 = 0x0080_0000;

pub struct FakePlatform {
    pub tasks: [Option<TaskInfo>; MAX_TSK],
    pub threads: [Option<ThreadInfo>; MAX_THR],
    /// Verdict of `is_exec_addr` for non-null addresses.
    pub exec_ok: bool,
    /// Verdict of `int_signal`.
    pub int_accept: bool,
    pub active: [bool; MAX_THR],
    pub activations: u32,
    pub deactivations: u32,
    pub int_registered: RingBuffer<(ThrId, u16), 32>,
    pub int_removed: RingBuffer<(ThrId, u16), 32>,
    sig_in: RingBuffer<(SignalRequest, TaskId), 64>,
    evt_in: RingBuffer<(EventCmd, TaskId), 64>,
    pub sent: RingBuffer<(TaskId, PortId, OutMsg), 64>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            tasks: [None; MAX_TSK],
            threads: [None; MAX_THR],
            exec_ok: true,
            int_accept: true,
            active: [true; MAX_THR],
            activations: 0,
            deactivations: 0,
            int_registered: RingBuffer::new_with((0, 0)),
            int_removed: RingBuffer::new_with((0, 0)),
            sig_in: RingBuffer::new_with(NO_REQUEST),
            evt_in: RingBuffer::new_with(NO_EVENT),
            sent: RingBuffer::new_with(NO_OUT),
        }
    }

    pub fn add_task(&mut self, id: TaskId, state: TaskState) {
        self.tasks[id as usize] = Some(TaskInfo {
            state,
            user_base: VirtAddr::new(USER_BASE),
        });
    }

    pub fn add_thread(&mut self, id: ThrId, task: TaskId, state: ThreadState) {
        self.threads[id as usize] = Some(ThreadInfo { task, state });
        self.active[id as usize] = true;
    }

    pub fn push_request(&mut self, request: SignalRequest, sender: TaskId) {
        assert!(self.sig_in.try_push((request, sender)), "signal port full");
    }

    pub fn push_event(&mut self, evt: EventCmd, sender: TaskId) {
        assert!(self.evt_in.try_push((evt, sender)), "event port full");
    }

    pub fn pop_sent(&mut self) -> Option<(TaskId, PortId, OutMsg)> {
        self.sent.pop()
    }
}

impl Platform for FakePlatform {
    fn task(&self, id: TaskId) -> Option<TaskInfo> {
        if (id as usize) < MAX_TSK {
            self.tasks[id as usize]
        } else {
            None
        }
    }

    fn thread(&self, id: ThrId) -> Option<ThreadInfo> {
        if (id as usize) < MAX_THR {
            self.threads[id as usize]
        } else {
            None
        }
    }

    fn is_exec_addr(&self, _task: TaskId, _addr: VirtAddr) -> bool {
        self.exec_ok
    }

    fn activate(&mut self, thread: ThrId) {
        self.active[thread as usize] = true;
        self.activations += 1;
    }

    fn deactivate(&mut self, thread: ThrId) {
        self.active[thread as usize] = false;
        self.deactivations += 1;
    }

    fn int_signal(&mut self, thread: ThrId, irq: u16) -> bool {
        if !self.int_accept {
            return false;
        }
        assert!(self.int_registered.try_push((thread, irq)));
        true
    }

    fn int_signal_remove(&mut self, thread: ThrId, irq: u16) {
        assert!(self.int_removed.try_push((thread, irq)));
    }

    fn send_msg(&mut self, task: TaskId, port: PortId, msg: OutMsg) {
        assert!(self.sent.try_push((task, port, msg)), "outbound queue full");
    }

    fn recv_signal(&mut self) -> Option<(SignalRequest, TaskId)> {
        self.sig_in.pop()
    }

    fn recv_event(&mut self) -> Option<(EventCmd, TaskId)> {
        self.evt_in.pop()
    }
}
