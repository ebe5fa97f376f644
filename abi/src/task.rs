//! Task and thread identity shared between the manager and the kernel tables.
//!
//! The manager does not own the task or thread tables; it looks entries up
//! through its platform seam. This module pins down the id types, the table
//! bounds used for request validation, and the state machines those tables
//! report.

use bitflags::bitflags;

// --- Table bounds ---

pub const MAX_TSK: usize = 32;
pub const MAX_THR: usize = 64;

pub type TaskId = u16;
pub type ThrId = u16;

pub const INVALID_TASK_ID: TaskId = 0xFFFF;
pub const INVALID_THR_ID: ThrId = 0xFFFF;

// --- TaskState ---

/// Lifecycle state of a task as reported by the task table.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Task slot is not in use.
    #[default]
    Nothing = 0,
    /// Task is alive and schedulable.
    Running = 1,
    /// Task is in the middle of a memory-mapping operation and must not
    /// register new waits.
    Mmapping = 2,
    /// Task teardown has started.
    Killing = 3,
    /// Task has been destroyed and awaits slot reuse.
    Killed = 4,
}

impl TaskState {
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Mmapping,
            3 => Self::Killing,
            4 => Self::Killed,
            _ => Self::Nothing,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

// --- ThreadState ---

/// Lifecycle state of a thread as reported by the thread table.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ThreadState {
    /// Thread slot is not in use.
    #[default]
    Nothing = 0,
    Running = 1,
    Blocked = 2,
    Waiting = 3,
    /// Thread is stopped under a debugger.
    Dbg = 4,
    /// Thread took an unhandled exception.
    Exception = 5,
    Killed = 6,
}

impl ThreadState {
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Blocked,
            3 => Self::Waiting,
            4 => Self::Dbg,
            5 => Self::Exception,
            6 => Self::Killed,
            _ => Self::Nothing,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// The single-state mask for this state, for admission checks against
    /// [`ThreadStateMask`] sets.
    #[inline]
    pub const fn mask(self) -> ThreadStateMask {
        ThreadStateMask::from_bits_truncate(1 << self.as_u8())
    }
}

bitflags! {
    /// A set of thread states, used to gate which threads a signal-port
    /// command may address.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ThreadStateMask: u8 {
        const NOTHING = 1 << 0;
        const RUNNING = 1 << 1;
        const BLOCKED = 1 << 2;
        const WAITING = 1 << 3;
        const DBG = 1 << 4;
        const EXCEPTION = 1 << 5;
        const KILLED = 1 << 6;

        /// States in which a thread may hold or register signal waits.
        const WAITABLE = Self::RUNNING.bits()
            | Self::BLOCKED.bits()
            | Self::WAITING.bits()
            | Self::DBG.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for raw in 0..=6u8 {
            assert_eq!(ThreadState::from_u8(raw).as_u8(), raw);
        }
        for raw in 0..=4u8 {
            assert_eq!(TaskState::from_u8(raw).as_u8(), raw);
        }
        assert_eq!(ThreadState::from_u8(200), ThreadState::Nothing);
        assert_eq!(TaskState::from_u8(200), TaskState::Nothing);
    }

    #[test]
    fn test_waitable_mask() {
        assert!(ThreadStateMask::WAITABLE.contains(ThreadState::Running.mask()));
        assert!(ThreadStateMask::WAITABLE.contains(ThreadState::Blocked.mask()));
        assert!(ThreadStateMask::WAITABLE.contains(ThreadState::Waiting.mask()));
        assert!(ThreadStateMask::WAITABLE.contains(ThreadState::Dbg.mask()));
        assert!(!ThreadStateMask::WAITABLE.contains(ThreadState::Nothing.mask()));
        assert!(!ThreadStateMask::WAITABLE.contains(ThreadState::Exception.mask()));
        assert!(!ThreadStateMask::WAITABLE.contains(ThreadState::Killed.mask()));
    }
}
