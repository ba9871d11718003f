//! Move-only ownership of raw, uninitialized element storage.

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;
use std::alloc::{alloc, dealloc};

use crate::alloc::{array_layout, ReserveError};

/// Owns a heap block sized for exactly `cap` elements of `T`.
///
/// The block is *storage only*: `RawStorage` never constructs or drops a `T`,
/// and dropping it releases the memory without touching whatever the owner
/// may have built inside. Keeping element lifetime out of this type is what
/// lets [`DynArray`](crate::DynArray) relocate and unwind without ever
/// pairing an allocation with the wrong destruction.
///
/// Not clonable; a move transfers the block wholesale and invalidates the
/// source, so exactly one owner exists at any time.
pub struct RawStorage<T> {
    ptr  : NonNull<T>,
    cap  : usize,
    _own : PhantomData<T>,
}

unsafe impl<T: Send> Send for RawStorage<T> {}
unsafe impl<T: Sync> Sync for RawStorage<T> {}

impl<T> RawStorage<T> {
    /// Storage for zero elements: a dangling, well-aligned pointer and no allocation.
    #[inline]
    pub const fn new() -> Self {
        Self { ptr: NonNull::dangling(), cap: 0, _own: PhantomData }
    }

    /// Reserves uninitialized storage for exactly `capacity` elements.
    ///
    /// Zero-sized elements and a capacity of 0 allocate nothing. A layout
    /// overflow or a refused allocation is propagated, never swallowed.
    pub fn allocate(capacity: usize) -> Result<Self, ReserveError> {
        if capacity == 0 || mem::size_of::<T>() == 0 {
            return Ok(Self::new());
        }

        let layout = array_layout::<T>(capacity)?;
        // SAFETY: the layout has a non-zero size, checked above
        let ptr = unsafe { alloc(layout) };
        match NonNull::new(ptr as *mut T) {
            Some(ptr) => Ok(Self { ptr, cap: capacity, _own: PhantomData }),
            None => Err(ReserveError::AllocFailed { layout }),
        }
    }

    /// Number of elements this block can hold. `usize::MAX` for zero-sized `T`.
    #[inline]
    pub fn capacity(&self) -> usize {
        if mem::size_of::<T>() == 0 {
            usize::MAX
        } else {
            self.cap
        }
    }

    /// Address of slot `offset`.
    ///
    /// `offset == capacity` is allowed so the one-past-the-end sentinel can be
    /// formed; anything further is a contract violation and asserts.
    #[inline]
    pub fn ptr_at(&self, offset: usize) -> *mut T {
        let cap = self.capacity();
        assert!(offset <= cap, "storage offset (is {offset}) should be <= capacity (is {cap})");
        // SAFETY: offset is within the block (or its end sentinel), checked above
        unsafe { self.ptr.as_ptr().add(offset) }
    }

    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Exchanges the two blocks in constant time, no element is touched.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.ptr, &mut other.ptr);
        mem::swap(&mut self.cap, &mut other.cap);
    }
}

impl<T> Drop for RawStorage<T> {
    fn drop(&mut self) {
        if self.cap != 0 && mem::size_of::<T>() != 0 {
            // `allocate` validated the layout arithmetic, so it cannot overflow here.
            // Any live elements are the owner's responsibility and must already be gone.
            unsafe {
                let layout = Layout::from_size_align_unchecked(mem::size_of::<T>() * self.cap, mem::align_of::<T>());
                dealloc(self.ptr.as_ptr() as *mut u8, layout);
            }
        }
    }
}

impl<T> fmt::Debug for RawStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawStorage").field("capacity", &self.capacity()).finish()
    }
}

impl<T> Default for RawStorage<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_storage_does_not_allocate() {
        let storage = RawStorage::<u64>::new();
        assert_eq!(storage.capacity(), 0);
        assert_eq!(storage.as_ptr() as usize % mem::align_of::<u64>(), 0);
    }

    #[test]
    fn allocate_and_release() {
        let storage = RawStorage::<u64>::allocate(16).unwrap();
        assert_eq!(storage.capacity(), 16);
        assert!(!storage.as_ptr().is_null());
    }

    #[test]
    fn zero_capacity_is_null_equivalent() {
        let storage = RawStorage::<u64>::allocate(0).unwrap();
        assert_eq!(storage.capacity(), 0);
    }

    #[test]
    fn zst_storage_is_boundless() {
        let storage = RawStorage::<()>::allocate(128).unwrap();
        assert_eq!(storage.capacity(), usize::MAX);
    }

    #[test]
    fn end_sentinel_address_is_allowed() {
        let storage = RawStorage::<u32>::allocate(4).unwrap();
        let base = storage.as_ptr() as usize;
        assert_eq!(storage.ptr_at(4) as usize, base + 4 * mem::size_of::<u32>());
    }

    #[test]
    #[should_panic(expected = "should be <= capacity")]
    fn addressing_past_the_sentinel_asserts() {
        let storage = RawStorage::<u32>::allocate(4).unwrap();
        let _ = storage.ptr_at(5);
    }

    #[test]
    fn swap_exchanges_blocks() {
        let mut a = RawStorage::<u32>::allocate(2).unwrap();
        let mut b = RawStorage::<u32>::allocate(8).unwrap();
        let (pa, pb) = (a.as_ptr(), b.as_ptr());

        a.swap(&mut b);

        assert_eq!(a.capacity(), 8);
        assert_eq!(b.capacity(), 2);
        assert_eq!(a.as_ptr(), pb);
        assert_eq!(b.as_ptr(), pa);
    }

    #[test]
    fn capacity_overflow_is_propagated() {
        assert_eq!(
            RawStorage::<u64>::allocate(usize::MAX / 4).unwrap_err(),
            ReserveError::CapacityOverflow
        );
    }
}
