//! Contiguous, resizable array storage built from scratch on raw memory.
//!
//! The crate is split in two cooperating layers:
//! - [`RawStorage`]: a move-only owner of *uninitialized* storage for exactly
//!   `capacity` elements. It hands out addresses, it never constructs or
//!   drops an element.
//! - [`DynArray`]: the sequence container proper, owning one `RawStorage`
//!   plus the count of live elements, and with it all construction,
//!   destruction, and relocation logic.
//!
//! Growth and reservation offer the strong unwind guarantee: a new block is
//! fully built before the old one is released, so a panicking element
//! constructor or a failed allocation leaves the container untouched.

pub mod alloc;
pub mod array;
pub mod storage;

pub use alloc::ReserveError;
pub use array::{DynArray, IntoIter, PushError};
pub use storage::RawStorage;
