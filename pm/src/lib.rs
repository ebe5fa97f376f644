//! Signal and event dispatch for the Opal process manager.
//!
//! Client threads register interest in named asynchronous conditions
//! (timeouts, sleep expirations, interrupt notifications, task-defined
//! events) and the manager replies on a caller-chosen port when a condition
//! matches, optionally keeping the thread parked until delivery.
//!
//! The subsystem owns its own state (tick clock, record slab, wait registry)
//! and reaches everything else through the [`platform::Platform`] seam: the
//! task and thread tables, the scheduler, the message transport, the
//! interrupt dispatcher, and the loader's executable check. The service is
//! single-threaded cooperative: the hosting loop alternates between draining
//! the two inbound ports and forwarding clock ticks.

#![no_std]

pub mod platform;
pub mod signals;

#[cfg(test)]
pub(crate) mod test_platform;

pub use signals::{SignalError, Signals};
