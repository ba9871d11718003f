//! The dynamic array: element lifetime management on top of [`RawStorage`].

use core::{
    cmp,
    fmt,
    hash::{Hash, Hasher},
    iter::FusedIterator,
    mem::{self, ManuallyDrop, MaybeUninit},
    ops::{Deref, DerefMut, Index, IndexMut},
    ptr,
    slice::{self, SliceIndex},
};

use scopeguard::ScopeGuard;
use static_assertions::const_assert;

use crate::alloc::ReserveError;
use crate::storage::RawStorage;

/// A contiguous, growable sequence of `T` built directly on raw memory.
///
/// Elements at positions `[0, len)` are live; `[len, capacity)` is
/// unconstructed storage owned by the underlying [`RawStorage`]. Every
/// relocating operation (growth, reservation, full-capacity insertion)
/// completely builds the new block before the old one is released, so a
/// failed allocation or a panicking element constructor leaves the container
/// exactly as it was.
///
/// Pointers and slices into the array are invalidated by any operation that
/// may reallocate (`reserve`, `push`, `insert`, `resize`) and by removal
/// operations for positions at or after the removal point.
pub struct DynArray<T> {
    buf : RawStorage<T>,
    len : usize,
}

const_assert!(mem::size_of::<DynArray<u8>>() == 3 * mem::size_of::<usize>());
const_assert!(mem::size_of::<Option<DynArray<u8>>>() == mem::size_of::<DynArray<u8>>());

impl<T> DynArray<T> {
    /// An empty array; does not allocate until the first element arrives.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: RawStorage::new(), len: 0 }
    }

    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::try_with_capacity(capacity).expect("failed to allocate memory")
    }

    pub fn try_with_capacity(capacity: usize) -> Result<Self, ReserveError> {
        Ok(Self { buf: RawStorage::allocate(capacity)?, len: 0 })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }

    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.buf.as_ptr()
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.buf.as_mut_ptr()
    }

    /// # Safety
    ///
    /// `new_len` must not exceed the capacity and the elements at
    /// `[old_len, new_len)` must be initialized.
    #[inline]
    pub unsafe fn set_len(&mut self, new_len: usize) {
        debug_assert!(new_len <= self.capacity());
        self.len = new_len;
    }

    /// The unconstructed remainder of the storage, `[len, capacity)`.
    pub fn spare_capacity_mut(&mut self) -> &mut [MaybeUninit<T>] {
        let spare_len = self.capacity() - self.len;
        unsafe {
            slice::from_raw_parts_mut(self.as_mut_ptr().add(self.len) as *mut MaybeUninit<T>, spare_len)
        }
    }

    fn needs_to_grow(&self, additional: usize) -> bool {
        additional > self.capacity().wrapping_sub(self.len)
    }

    // Doubling from a minimum of 1 keeps a sequence of appends amortized O(1).
    fn amortized_capacity(&self, required: usize) -> usize {
        cmp::max(self.buf.capacity() * 2, cmp::max(required, 1))
    }

    /// Moves every live element into a fresh block of `new_cap` slots and
    /// commits it. The old block stays fully intact until the copy has
    /// landed, which is what makes growth a strong-guarantee operation.
    fn relocate(&mut self, new_cap: usize) -> Result<(), ReserveError> {
        debug_assert!(new_cap >= self.len);
        let mut new_buf = RawStorage::allocate(new_cap)?;
        // Relocation is a bitwise move for every `T` in Rust and cannot fail;
        // the sources are simply abandoned once the block is swapped in.
        unsafe {
            ptr::copy_nonoverlapping(self.buf.as_ptr(), new_buf.as_mut_ptr(), self.len);
        }
        self.buf.swap(&mut new_buf);
        Ok(())
    }

    fn grow_amortized(&mut self, additional: usize) -> Result<(), ReserveError> {
        debug_assert!(additional > 0);
        if mem::size_of::<T>() == 0 {
            // Capacity reads usize::MAX for zero-sized elements, so getting
            // here means the element count itself overflowed.
            return Err(ReserveError::CapacityOverflow);
        }
        let required = self.len.checked_add(additional).ok_or(ReserveError::CapacityOverflow)?;
        self.relocate(self.amortized_capacity(required))
    }

    fn grow_exact(&mut self, additional: usize) -> Result<(), ReserveError> {
        if mem::size_of::<T>() == 0 {
            return Err(ReserveError::CapacityOverflow);
        }
        let required = self.len.checked_add(additional).ok_or(ReserveError::CapacityOverflow)?;
        self.relocate(required)
    }

    /// Ensures room for at least `additional` more elements, growing
    /// amortized. A no-op when the capacity already suffices: no
    /// reallocation, no element is disturbed.
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        self.try_reserve(additional).expect("failed to allocate memory")
    }

    pub fn try_reserve(&mut self, additional: usize) -> Result<(), ReserveError> {
        if self.needs_to_grow(additional) {
            self.grow_amortized(additional)
        } else {
            Ok(())
        }
    }

    /// Like [`reserve`](Self::reserve), but grows to exactly the required capacity.
    #[inline]
    pub fn reserve_exact(&mut self, additional: usize) {
        self.try_reserve_exact(additional).expect("failed to allocate memory")
    }

    pub fn try_reserve_exact(&mut self, additional: usize) -> Result<(), ReserveError> {
        if self.needs_to_grow(additional) {
            self.grow_exact(additional)
        } else {
            Ok(())
        }
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        self.reserve(1);
        unsafe {
            ptr::write(self.as_mut_ptr().add(self.len), value);
            self.len += 1;
        }
    }

    /// Fallible append: on allocation failure the container is unchanged and
    /// the rejected value is handed back inside the error.
    pub fn try_push(&mut self, value: T) -> Result<(), PushError<T>> {
        if let Err(error) = self.try_reserve(1) {
            return Err(PushError { error, value });
        }
        unsafe {
            ptr::write(self.as_mut_ptr().add(self.len), value);
            self.len += 1;
        }
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            None
        } else {
            unsafe {
                self.len -= 1;
                Some(ptr::read(self.as_ptr().add(self.len)))
            }
        }
    }

    pub fn insert(&mut self, index: usize, element: T) {
        let len = self.len;
        assert!(index <= len, "insert index (is {index}) should be <= len (is {len})");

        if len == self.capacity() {
            self.insert_with_relocation(index, element).expect("failed to allocate memory");
        } else {
            unsafe {
                let ptr = self.as_mut_ptr().add(index);
                if index < len {
                    // Shift [index, len) one slot right; the stale duplicate
                    // left at `index` is overwritten, not dropped.
                    ptr::copy(ptr, ptr.add(1), len - index);
                }
                ptr::write(ptr, element);
            }
        }
        self.len += 1;
    }

    /// Insertion when the storage is full: the new block is populated in
    /// order (prefix, element, suffix) and only then swapped in.
    fn insert_with_relocation(&mut self, index: usize, element: T) -> Result<(), ReserveError> {
        if mem::size_of::<T>() == 0 {
            // A "full" container of zero-sized elements means the count saturated.
            return Err(ReserveError::CapacityOverflow);
        }
        let len = self.len;
        let required = len.checked_add(1).ok_or(ReserveError::CapacityOverflow)?;
        let mut new_buf = RawStorage::allocate(self.amortized_capacity(required))?;
        unsafe {
            let src = self.buf.as_ptr();
            let dst = new_buf.as_mut_ptr();
            ptr::copy_nonoverlapping(src, dst, index);
            ptr::write(dst.add(index), element);
            ptr::copy_nonoverlapping(src.add(index), dst.add(index + 1), len - index);
        }
        self.buf.swap(&mut new_buf);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> T {
        let len = self.len;
        assert!(index < len, "remove index (is {index}) should be < len (is {len})");
        unsafe {
            let ptr = self.as_mut_ptr().add(index);
            let ret = ptr::read(ptr);
            ptr::copy(ptr.add(1), ptr, len - index - 1);
            self.len = len - 1;
            ret
        }
    }

    /// O(1) removal that fills the hole with the last element, giving up
    /// ordering in exchange for not shifting the suffix.
    pub fn swap_remove(&mut self, index: usize) -> T {
        let len = self.len;
        assert!(index < len, "swap_remove index (is {index}) should be < len (is {len})");
        unsafe {
            let value = ptr::read(self.as_ptr().add(index));
            let base = self.as_mut_ptr();
            ptr::copy(base.add(len - 1), base.add(index), 1);
            self.len -= 1;
            value
        }
    }

    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        // Shrink `len` before dropping so a panicking element drop cannot
        // lead to a second drop of the same slot.
        unsafe {
            let remaining = self.len - len;
            let tail = ptr::slice_from_raw_parts_mut(self.as_mut_ptr().add(len), remaining);
            self.len = len;
            ptr::drop_in_place(tail);
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    pub fn resize_with<F>(&mut self, new_len: usize, f: F)
    where
        F: FnMut() -> T,
    {
        if new_len > self.len {
            self.extend_with(new_len - self.len, ExtendFunc(f));
        } else {
            self.truncate(new_len);
        }
    }

    /// O(1) exchange of storage and length with another array.
    #[inline]
    pub fn swap_with(&mut self, other: &mut Self) {
        self.buf.swap(&mut other.buf);
        mem::swap(&mut self.len, &mut other.len);
    }

    /// Appends `n` elements produced by `value`.
    ///
    /// If a constructor panics, the elements built so far are dropped and
    /// `len` is left where it was; the operation either appends all `n`
    /// elements or none.
    fn extend_with<E: ExtendWith<T>>(&mut self, n: usize, mut value: E) {
        self.reserve(n);
        let len = self.len;
        let base = unsafe { self.as_mut_ptr().add(len) };

        // If a constructor unwinds, the guard tears down what was built and
        // `len` never moves.
        let mut built = scopeguard::guard(0usize, move |built| {
            unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(base, built)) };
        });
        for _ in 1..n {
            unsafe { ptr::write(base.add(*built), value.next()) };
            *built += 1;
        }
        if n > 0 {
            // The final slot takes the source itself, skipping one clone.
            unsafe { ptr::write(base.add(*built), value.last()) };
            *built += 1;
        }
        self.len = len + ScopeGuard::into_inner(built);
    }
}

impl<T: Default> DynArray<T> {
    /// An array of `n` value-initialized elements.
    ///
    /// A panicking `T::default` drops whatever was already built and releases
    /// the storage before the panic continues.
    #[must_use]
    pub fn with_len(n: usize) -> Self {
        let mut arr = Self::with_capacity(n);
        arr.extend_with(n, ExtendFunc(T::default));
        arr
    }
}

impl<T: Clone> DynArray<T> {
    pub fn resize(&mut self, new_len: usize, value: T) {
        if new_len > self.len {
            self.extend_with(new_len - self.len, ExtendElement(value));
        } else {
            self.truncate(new_len);
        }
    }

    /// Clone-appends a slice. Clones run under an unwind guard: a panicking
    /// `T::clone` drops the partially built tail and leaves `len` unchanged.
    pub fn extend_from_slice(&mut self, other: &[T]) {
        self.reserve(other.len());
        let len = self.len;
        let base = unsafe { self.as_mut_ptr().add(len) };

        let mut built = scopeguard::guard(0usize, move |built| {
            unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(base, built)) };
        });
        for item in other {
            unsafe { ptr::write(base.add(*built), item.clone()) };
            *built += 1;
        }
        self.len = len + ScopeGuard::into_inner(built);
    }
}

// Element-production strategies for resize/with_len, so the fill loop is
// written once for both the cloning and the closure case.
trait ExtendWith<T> {
    fn next(&mut self) -> T;
    fn last(self) -> T;
}

struct ExtendElement<T>(T);
impl<T: Clone> ExtendWith<T> for ExtendElement<T> {
    fn next(&mut self) -> T {
        self.0.clone()
    }

    fn last(self) -> T {
        self.0
    }
}

struct ExtendFunc<F>(F);
impl<T, F: FnMut() -> T> ExtendWith<T> for ExtendFunc<F> {
    fn next(&mut self) -> T {
        (self.0)()
    }

    fn last(mut self) -> T {
        (self.0)()
    }
}

/// Error from [`DynArray::try_push`], carrying the value that was not appended.
pub struct PushError<T> {
    pub error : ReserveError,
    pub value : T,
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.error, f)
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<T> std::error::Error for PushError<T> {}

//------------------------------------------------------------------------------------------------------------------------------

impl<T> Deref for DynArray<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        unsafe { slice::from_raw_parts(self.as_ptr(), self.len) }
    }
}

impl<T> DerefMut for DynArray<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { slice::from_raw_parts_mut(self.buf.as_mut_ptr(), self.len) }
    }
}

impl<T> Drop for DynArray<T> {
    fn drop(&mut self) {
        unsafe {
            // Elements first; the storage releases itself afterwards.
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.buf.as_mut_ptr(), self.len));
        }
    }
}

impl<T> Default for DynArray<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for DynArray<T> {
    fn clone(&self) -> Self {
        let mut arr = Self::with_capacity(self.len);
        arr.extend_from_slice(self);
        arr
    }

    fn clone_from(&mut self, source: &Self) {
        if source.len > self.capacity() {
            // Build the copy aside and replace wholesale: strong, at the
            // cost of one transient allocation.
            *self = source.clone();
        } else {
            // Reuse own storage: assign over the overlap, then drop the
            // excess tail or clone-build the missing one. Basic guarantee: a
            // panicking clone leaves a valid but unspecified prefix behind.
            self.truncate(source.len);
            let overlap = self.len;
            self.as_mut_slice().clone_from_slice(&source[..overlap]);
            self.extend_from_slice(&source[overlap..]);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DynArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: Hash> Hash for DynArray<T> {
    /// Hashes like the corresponding slice, as `Borrow<[T]>` requires.
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        Hash::hash(&**self, state)
    }
}

impl<T, I: SliceIndex<[T]>> Index<I> for DynArray<T> {
    type Output = I::Output;

    #[inline]
    fn index(&self, index: I) -> &Self::Output {
        Index::index(&**self, index)
    }
}

impl<T, I: SliceIndex<[T]>> IndexMut<I> for DynArray<T> {
    #[inline]
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        IndexMut::index_mut(&mut **self, index)
    }
}

impl<T> AsRef<[T]> for DynArray<T> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        self
    }
}

impl<T> AsMut<[T]> for DynArray<T> {
    #[inline]
    fn as_mut(&mut self) -> &mut [T] {
        self
    }
}

impl<T> Extend<T> for DynArray<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        self.reserve(lower);
        for value in iter {
            self.push(value);
        }
    }
}

impl<T> FromIterator<T> for DynArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut arr = DynArray::new();
        arr.extend(iter);
        arr
    }
}

impl<T: Clone> From<&[T]> for DynArray<T> {
    fn from(s: &[T]) -> Self {
        let mut arr = Self::with_capacity(s.len());
        arr.extend_from_slice(s);
        arr
    }
}

impl<T: Clone> From<&mut [T]> for DynArray<T> {
    fn from(s: &mut [T]) -> Self {
        Self::from(&*s)
    }
}

impl<T, const N: usize> From<[T; N]> for DynArray<T> {
    fn from(arr: [T; N]) -> Self {
        let mut dynarr = Self::with_capacity(N);
        dynarr.extend(arr);
        dynarr
    }
}

//------------------------------------------------------------------------------------------------------------------------------

macro_rules! impl_slice_partial_eq {
    ([$($vars:tt)*] $lhs:ty, $rhs:ty) => {
        impl<T, U, $($vars)*> PartialEq<$rhs> for $lhs
        where
            T : PartialEq<U>,
        {
            #[inline]
            fn eq(&self, other: &$rhs) -> bool { self[..] == other[..] }
            #[inline]
            fn ne(&self, other: &$rhs) -> bool { self[..] != other[..] }
        }
    };
}

impl_slice_partial_eq!{ [] DynArray<T>, DynArray<U> }
impl_slice_partial_eq!{ [] DynArray<T>, [U] }
impl_slice_partial_eq!{ [] DynArray<T>, &[U] }
impl_slice_partial_eq!{ [] DynArray<T>, &mut [U] }
impl_slice_partial_eq!{ [const N: usize] DynArray<T>, [U; N] }
impl_slice_partial_eq!{ [const N: usize] DynArray<T>, &[U; N] }
impl_slice_partial_eq!{ [] [T], DynArray<U> }
impl_slice_partial_eq!{ [] &[T], DynArray<U> }

impl<T: Eq> Eq for DynArray<T> {}

impl<T: PartialOrd> PartialOrd for DynArray<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        PartialOrd::partial_cmp(&**self, &**other)
    }
}

impl<T: Ord> Ord for DynArray<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        Ord::cmp(&**self, &**other)
    }
}

//------------------------------------------------------------------------------------------------------------------------------

impl<T> IntoIterator for DynArray<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        let me = ManuallyDrop::new(self);
        unsafe {
            // The storage moves into the iterator; elements are read out lazily.
            let buf = ptr::read(&me.buf);
            let start = buf.as_ptr();
            let end = if mem::size_of::<T>() == 0 {
                (start as *const u8).wrapping_add(me.len) as *const T
            } else {
                start.add(me.len)
            };
            IntoIter { buf, start, end }
        }
    }
}

impl<'a, T> IntoIterator for &'a DynArray<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut DynArray<T> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// Owning iterator over a [`DynArray`].
///
/// Unconsumed elements are dropped with the iterator; the storage is released
/// by the owned [`RawStorage`] either way.
pub struct IntoIter<T> {
    buf   : RawStorage<T>,
    start : *const T,
    end   : *const T,
}

unsafe impl<T: Send> Send for IntoIter<T> {}
unsafe impl<T: Sync> Sync for IntoIter<T> {}

impl<T> IntoIter<T> {
    pub fn as_slice(&self) -> &[T] {
        unsafe { slice::from_raw_parts(self.start, self.len()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { &mut *self.as_raw_mut_slice() }
    }

    fn as_raw_mut_slice(&mut self) -> *mut [T] {
        ptr::slice_from_raw_parts_mut(self.start as *mut T, self.len())
    }
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        if self.start == self.end {
            None
        } else if mem::size_of::<T>() == 0 {
            // Zero-sized elements have no identity; step the end marker so
            // `start` stays an aligned pointer.
            self.end = (self.end as *const u8).wrapping_sub(1) as *const T;
            Some(unsafe { mem::zeroed() })
        } else {
            let old = self.start;
            self.start = unsafe { self.start.add(1) };
            Some(unsafe { ptr::read(old) })
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let exact = if mem::size_of::<T>() == 0 {
            (self.end as usize).wrapping_sub(self.start as usize)
        } else {
            unsafe { self.end.offset_from(self.start) as usize }
        };
        (exact, Some(exact))
    }

    #[inline]
    fn count(self) -> usize {
        self.len()
    }
}

impl<T> DoubleEndedIterator for IntoIter<T> {
    #[inline]
    fn next_back(&mut self) -> Option<T> {
        if self.start == self.end {
            None
        } else if mem::size_of::<T>() == 0 {
            self.end = (self.end as *const u8).wrapping_sub(1) as *const T;
            Some(unsafe { mem::zeroed() })
        } else {
            self.end = unsafe { self.end.sub(1) };
            Some(unsafe { ptr::read(self.end) })
        }
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}
impl<T> FusedIterator for IntoIter<T> {}

impl<T: fmt::Debug> fmt::Debug for IntoIter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntoIter").field(&self.as_slice()).finish()
    }
}

impl<T> Drop for IntoIter<T> {
    fn drop(&mut self) {
        // Whatever was not consumed goes first; `buf` then frees the block
        // even if an element drop unwinds.
        unsafe {
            ptr::drop_in_place(self.as_raw_mut_slice());
        }
    }
}

//------------------------------------------------------------------------------------------------------------------------------

#[macro_export]
macro_rules! count_exprs {
    () => { 0usize };
    ($_a:expr $(,)?) => { 1usize };
    ($_a:expr, $($rest:expr),+ $(,)?) => { 1usize + $crate::count_exprs!($($rest),+) };
}

#[macro_export]
macro_rules! dynarr {
    () => {
        $crate::DynArray::new()
    };
    ($($val:expr),+ $(,)?) => {
        {
            let mut arr = $crate::DynArray::with_capacity($crate::count_exprs!($($val),+));
            $(
                arr.push($val);
            )+
            arr
        }
    };
}

//------------------------------------------------------------------------------------------------------------------------------
