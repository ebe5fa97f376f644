//! Virtual address newtype for type-safe pointer fields in the ABI.
//!
//! Client tasks hand the manager entry points and stack tops as raw numbers;
//! wrapping them prevents a handler entry point from being confused with a
//! port number or an id somewhere along the dispatch path. The type is a
//! zero-cost abstraction (`#[repr(transparent)]`) over a raw u64.

/// A user-space virtual address.
///
/// The manager never dereferences these; they are validated against the
/// owning task's layout and stored for the scheduler's trampoline code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(pub u64);

impl VirtAddr {
    /// The null address. Fields use this to mean "not set".
    pub const NULL: Self = Self(0);

    /// Create a virtual address from a raw u64 value.
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw u64 value of this address.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}
