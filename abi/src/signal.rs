//! Signal-protocol wire definitions.
//!
//! Client tasks talk to the manager's signal subsystem over two inbound
//! ports: [`SIGNALS_PORT`] carries wait/discard/configuration commands and
//! [`EVENTS_PORT`] carries event postings. Replies travel back on ports named
//! inside each command. This module defines the command tags, the sentinel
//! values, and the `#[repr(C)]` message bodies for both directions, plus the
//! decoded sum types the dispatcher consumes.

use crate::addr::VirtAddr;
use crate::task::{TaskId, ThrId};

/// An IPC port number, scoped to the task that owns it.
pub type PortId = u16;

/// Inbound port for wait/discard/configuration commands.
pub const SIGNALS_PORT: PortId = 6;
/// Inbound port for event postings.
pub const EVENTS_PORT: PortId = 7;

// --- Command tags ---

pub const CMD_WAIT_FOR_SIGNAL: u32 = 1;
pub const CMD_WAIT_FOR_SIGNAL_NBLOCK: u32 = 2;
pub const CMD_DISCARD_SIGNAL: u32 = 3;
pub const CMD_SET_SIGNAL_HANDLER: u32 = 4;
pub const CMD_SET_SIGNAL_STACK: u32 = 5;
pub const CMD_EVENT: u32 = 6;
/// Tag of the delivery reply the manager sends on a wait's `signal_port`.
pub const CMD_SIGNAL: u32 = 7;

// --- Sentinels ---

/// Raw wire timeout meaning "never expire".
pub const TIMEOUT_INFINITE: u32 = 0xFFFF_FFFF;
/// Raw wire timeout meaning "survive delivery and keep matching".
pub const TIMEOUT_REPEATING: u32 = 0xFFFF_FFFE;

/// Event `task` value that broadcasts across every waiting thread instead of
/// addressing one task.
pub const GLOBAL_EVENT: TaskId = 0xFFFE;

/// Wildcard for a wait's `signal_param`: matches any event param. The
/// wildcard covers the low 16 bits, which is the full stored width of the
/// field.
pub const PARAM_IGNORE: u16 = 0xFFFF;

/// The process manager's own task id. Sleeps and interrupt waits are
/// registered against it.
pub const PM_TASK: TaskId = 0;

// --- Event types ---

/// Sleep expiry, paired with [`PM_TASK`].
pub const EVT_SLEEP: u16 = 1;
/// Hardware interrupt notification, paired with [`PM_TASK`].
pub const EVT_INTR: u16 = 2;
/// First event type free for task-defined use.
pub const EVT_USER_BASE: u16 = 0x100;

// --- Outcome codes ---

/// Outcome carried in delivery and configuration replies.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalRet {
    Ok = 0,
    Timeout = 1,
    Failed = 2,
}

// --- Timeout decoding ---

/// Decoded form of the wire `timeout` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timeout {
    /// Relative tick count. Zero is rounded up to one tick by the manager.
    Ticks(u32),
    Infinite,
    Repeating,
}

impl Timeout {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            TIMEOUT_INFINITE => Self::Infinite,
            TIMEOUT_REPEATING => Self::Repeating,
            ticks => Self::Ticks(ticks),
        }
    }

    #[inline]
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Infinite => TIMEOUT_INFINITE,
            Self::Repeating => TIMEOUT_REPEATING,
            Self::Ticks(ticks) => ticks,
        }
    }
}

// --- Inbound message bodies ---

/// Register a wait for a matching event or a timeout.
///
/// Sent as [`CMD_WAIT_FOR_SIGNAL`] (blocking) or
/// [`CMD_WAIT_FOR_SIGNAL_NBLOCK`] (non-blocking); the body is identical.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitForSignal {
    /// Thread that will receive the delivery. Must belong to the sender.
    pub thr_id: ThrId,
    pub event_type: u16,
    /// Caller-chosen cookie echoed back in the delivery reply.
    pub id: u16,
    /// Task whose events this wait matches.
    pub task: TaskId,
    /// Event param to match, or [`PARAM_IGNORE`].
    pub signal_param: u16,
    /// Sender-owned port the delivery reply is sent to.
    pub signal_port: PortId,
    /// Raw timeout: tick count, [`TIMEOUT_INFINITE`] or [`TIMEOUT_REPEATING`].
    pub timeout: u32,
}

/// Cancel one pending wait. Matching is structural over every field below.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscardSignal {
    pub thr_id: ThrId,
    pub task: TaskId,
    pub event_type: u16,
    pub signal_param: u16,
    pub id: u16,
    pub signal_port: PortId,
}

/// Install or clear the task-wide user-mode signal handler.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetSignalHandler {
    pub thr_id: ThrId,
    /// Handler entry point, or null to disable the soft-int hook.
    pub handler_ep: VirtAddr,
    /// Optional dedicated handler stack; requires a non-null `handler_ep`.
    pub stack: VirtAddr,
    /// Port the manager reports exceptions to.
    pub exceptions_port: PortId,
    pub ret_port: PortId,
}

/// Set the per-thread stack used when vectoring through the handler.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetSignalStack {
    pub thr_id: ThrId,
    pub stack: VirtAddr,
    pub ret_port: PortId,
}

/// An event posting on [`EVENTS_PORT`].
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventCmd {
    /// Addressed task, or [`GLOBAL_EVENT`] to broadcast.
    pub task: TaskId,
    pub event_type: u16,
    pub param: u16,
    /// Result value copied into every matching delivery reply.
    pub event_res: u32,
}

/// A decoded signal-port command: one variant per wire tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalRequest {
    Wait(WaitForSignal),
    WaitNonBlocking(WaitForSignal),
    Discard(DiscardSignal),
    SetHandler(SetSignalHandler),
    SetStack(SetSignalStack),
}

// --- Outbound message bodies ---

/// Delivery reply sent to a wait's `signal_port` when the wait completes,
/// times out, or fails validation.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignalNotify {
    /// Always [`CMD_SIGNAL`].
    pub command: u32,
    pub thr_id: ThrId,
    pub event_type: u16,
    /// The cookie from the originating wait.
    pub id: u16,
    pub task: TaskId,
    /// The matching event's `event_res`, or 0 for timeouts and failures.
    pub res: u32,
    pub ret: SignalRet,
}

/// Reply to [`CMD_SET_SIGNAL_HANDLER`] / [`CMD_SET_SIGNAL_STACK`], sent on
/// the command's `ret_port`. `command` echoes the command replied to.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetHandlerRes {
    pub command: u32,
    pub thr_id: ThrId,
    pub result: SignalRet,
}

/// An outbound message, ready for the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutMsg {
    Signal(SignalNotify),
    HandlerRes(SetHandlerRes),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_round_trip() {
        assert_eq!(Timeout::from_raw(TIMEOUT_INFINITE), Timeout::Infinite);
        assert_eq!(Timeout::from_raw(TIMEOUT_REPEATING), Timeout::Repeating);
        assert_eq!(Timeout::from_raw(0), Timeout::Ticks(0));
        assert_eq!(Timeout::from_raw(10), Timeout::Ticks(10));
        for raw in [0, 1, 10, 0xFFFF_FFFD, TIMEOUT_REPEATING, TIMEOUT_INFINITE] {
            assert_eq!(Timeout::from_raw(raw).to_raw(), raw);
        }
    }

    #[test]
    fn test_sentinels_are_distinct() {
        assert_ne!(TIMEOUT_INFINITE, TIMEOUT_REPEATING);
        assert_ne!(GLOBAL_EVENT, crate::task::INVALID_TASK_ID);
        assert!(GLOBAL_EVENT as usize >= crate::task::MAX_TSK);
    }
}
