//! Opal Process-Manager ABI Types
//!
//! This crate provides the canonical definitions for all types shared between
//! the process manager service and client tasks. Having a single source of
//! truth eliminates:
//! - Duplicate type definitions
//! - Wire-format mismatches between the manager and its clients
//! - The need for unsafe conversions at the port boundary
//!
//! All message types in this crate are `#[repr(C)]` for ABI stability.

#![no_std]
#![forbid(unsafe_code)]

pub mod addr;
pub mod signal;
pub mod task;

pub use addr::VirtAddr;
pub use signal::*;
pub use task::*;
