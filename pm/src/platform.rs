//! External collaborator seam.
//!
//! The dispatch subsystem runs inside the process manager but owns none of
//! the tables it consults: task and thread lifecycles, scheduling, the
//! message transport, and interrupt routing all live elsewhere in the
//! service. Everything it needs from them is reached through [`Platform`],
//! one flat table of primitives the hosting service implements. Tests
//! substitute a scripted implementation.

use opal_abi::addr::VirtAddr;
use opal_abi::signal::{EventCmd, OutMsg, PortId, SignalRequest};
use opal_abi::task::{TaskId, TaskState, ThrId, ThreadState};

/// Task-table view of one task.
#[derive(Clone, Copy, Debug)]
pub struct TaskInfo {
    pub state: TaskState,
    /// Lowest address user code may hand the manager for handler stacks;
    /// everything below it belongs to the task image and the manager's
    /// mappings.
    pub user_base: VirtAddr,
}

/// Thread-table view of one thread.
#[derive(Clone, Copy, Debug)]
pub struct ThreadInfo {
    /// Owning task.
    pub task: TaskId,
    pub state: ThreadState,
}

/// The primitives the dispatch subsystem requires from the rest of the
/// service and the kernel beneath it.
pub trait Platform {
    /// Look up a task table entry.
    fn task(&self, id: TaskId) -> Option<TaskInfo>;

    /// Look up a thread table entry.
    fn thread(&self, id: ThrId) -> Option<ThreadInfo>;

    /// Whether `addr` points into an executable region of `task`'s image.
    fn is_exec_addr(&self, task: TaskId, addr: VirtAddr) -> bool;

    /// Make a parked thread runnable again.
    fn activate(&mut self, thread: ThrId);

    /// Park a thread until the manager activates it.
    fn deactivate(&mut self, thread: ThrId);

    /// Attach a thread's interrupt wait to the interrupt dispatcher.
    /// Returns false when the line cannot be attached.
    fn int_signal(&mut self, thread: ThrId, irq: u16) -> bool;

    /// Drop a registration made by [`Platform::int_signal`].
    fn int_signal_remove(&mut self, thread: ThrId, irq: u16);

    /// Send one message to `port` of `task`.
    fn send_msg(&mut self, task: TaskId, port: PortId, msg: OutMsg);

    /// Take the next pending command off the signals port, with its sender.
    /// `None` means the port is empty.
    fn recv_signal(&mut self) -> Option<(SignalRequest, TaskId)>;

    /// Take the next pending posting off the events port, with its sender.
    fn recv_event(&mut self) -> Option<(EventCmd, TaskId)>;
}
