//! Service logging subsystem.
//!
//! All log output funnels through a single **backend** function pointer. The
//! manager itself has no console; whatever binary hosts it registers a
//! backend once its own output path is up, and every line logged before that
//! is dropped.
//!
//! # Backend contract
//!
//! The backend receives the pre-formatted arguments for a **single log line**
//! and is responsible for:
//!
//! 1. Writing the formatted text atomically (no interleaving with other
//!    writers of the same sink).
//! 2. Appending a trailing newline after the text.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use spin::RwLock;

// ---------------------------------------------------------------------------
// Log levels
// ---------------------------------------------------------------------------

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KlogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl KlogLevel {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => KlogLevel::Error,
            1 => KlogLevel::Warn,
            2 => KlogLevel::Info,
            3 => KlogLevel::Debug,
            _ => KlogLevel::Trace,
        }
    }
}

static CURRENT_LEVEL: AtomicU8 = AtomicU8::new(KlogLevel::Info as u8);

#[inline(always)]
fn is_enabled(level: KlogLevel) -> bool {
    level as u8 <= CURRENT_LEVEL.load(Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Backend dispatch
// ---------------------------------------------------------------------------

/// Signature of a klog backend.
///
/// The backend must write the formatted text **and** a trailing newline,
/// all under a single lock acquisition (if applicable) so that log lines
/// from different sources do not interleave.
pub type KlogBackend = fn(fmt::Arguments<'_>);

/// `None` means "no sink yet"; lines are dropped.
static BACKEND: RwLock<Option<KlogBackend>> = RwLock::new(None);

#[inline]
fn dispatch(args: fmt::Arguments<'_>) {
    if let Some(backend) = *BACKEND.read() {
        backend(args);
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Register the backend that receives all subsequent log lines.
///
/// Typically called once by the hosting binary during its initialisation.
pub fn klog_register_backend(backend: KlogBackend) {
    *BACKEND.write() = Some(backend);
}

/// Initialise klog (sets default level). Called once at service start.
pub fn klog_init() {
    CURRENT_LEVEL.store(KlogLevel::Info as u8, Ordering::Relaxed);
}

pub fn klog_set_level(level: KlogLevel) {
    CURRENT_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn klog_get_level() -> KlogLevel {
    KlogLevel::from_raw(CURRENT_LEVEL.load(Ordering::Relaxed))
}

pub fn is_enabled_level(level: KlogLevel) -> bool {
    is_enabled(level)
}

/// Emit a formatted log line at the given level.
///
/// The backend appends a trailing newline — callers should **not** include
/// one in their format string.
pub fn log_args(level: KlogLevel, args: fmt::Arguments<'_>) {
    if !is_enabled(level) {
        return;
    }
    dispatch(args);
}

// ---------------------------------------------------------------------------
// Macros
// ---------------------------------------------------------------------------

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::klog::log_args($level, ::core::format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! klog_error {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Error, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_warn {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Warn, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_info {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Info, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_debug {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Debug, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_trace {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Trace, ::core::format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    static LINES: AtomicUsize = AtomicUsize::new(0);

    fn counting_backend(_args: fmt::Arguments<'_>) {
        LINES.fetch_add(1, Ordering::Relaxed);
    }

    // One test so the global level/backend are not mutated concurrently.
    #[test]
    fn test_level_gating_and_backend() {
        klog_init();
        assert_eq!(klog_get_level(), KlogLevel::Info);
        assert!(is_enabled_level(KlogLevel::Error));
        assert!(is_enabled_level(KlogLevel::Info));
        assert!(!is_enabled_level(KlogLevel::Debug));

        klog_set_level(KlogLevel::Warn);
        assert!(!is_enabled_level(KlogLevel::Info));

        klog_register_backend(counting_backend);
        klog_warn!("counted {}", 1);
        klog_info!("dropped by level");
        assert_eq!(LINES.load(Ordering::Relaxed), 1);

        klog_set_level(KlogLevel::Info);
    }
}
