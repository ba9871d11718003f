//! Allocation failure reporting for the raw-memory layer.

use core::alloc::Layout;
use core::fmt;

/// Error returned when a storage reservation cannot be satisfied.
///
/// Overflowing the address space and the allocator refusing the request are
/// reported separately; both leave the container exactly as it was.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReserveError {
    /// The required allocation size exceeds what a single block may span.
    CapacityOverflow,
    /// The global allocator could not provide a block with this layout.
    AllocFailed { layout: Layout },
}

impl fmt::Display for ReserveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReserveError::CapacityOverflow => f.write_str("requested capacity exceeds the maximum allocation size"),
            ReserveError::AllocFailed { layout } => {
                f.write_fmt(format_args!("allocator failed to provide {} bytes (align {})", layout.size(), layout.align()))
            },
        }
    }
}

impl std::error::Error for ReserveError {}

/// Layout for `n` elements of `T`, or `CapacityOverflow` if no such block can exist.
pub(crate) fn array_layout<T>(n: usize) -> Result<Layout, ReserveError> {
    Layout::array::<T>(n).map_err(|_| ReserveError::CapacityOverflow)
}
