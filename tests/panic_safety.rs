//! Failure-path behavior: panicking element constructors and refused
//! reservations must never leak, double-drop, or corrupt the container.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use contig::{dynarr, DynArray, ReserveError};

// Clone panics once the shared budget runs out; live instances are counted
// so leaks and double drops show up as a wrong balance.
struct Volatile {
    value  : u32,
    budget : Arc<AtomicUsize>,
    live   : Arc<AtomicUsize>,
}

impl Volatile {
    fn new(value: u32, budget: &Arc<AtomicUsize>, live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { value, budget: Arc::clone(budget), live: Arc::clone(live) }
    }
}

impl Clone for Volatile {
    fn clone(&self) -> Self {
        if self.budget.load(Ordering::SeqCst) == 0 {
            panic!("clone budget exhausted");
        }
        self.budget.fetch_sub(1, Ordering::SeqCst);
        Volatile::new(self.value, &self.budget, &self.live)
    }
}

impl Drop for Volatile {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

fn volatile_array(n: u32, budget: &Arc<AtomicUsize>, live: &Arc<AtomicUsize>) -> DynArray<Volatile> {
    let mut arr = DynArray::new();
    for i in 0..n {
        arr.push(Volatile::new(i, budget, live));
    }
    arr
}

#[test]
fn clone_panic_leaves_the_source_byte_identical() {
    let budget = Arc::new(AtomicUsize::new(3));
    let live = Arc::new(AtomicUsize::new(0));
    let arr = volatile_array(6, &budget, &live);
    let cap = arr.capacity();
    let ptr = arr.as_ptr();

    let result = catch_unwind(AssertUnwindSafe(|| arr.clone()));
    assert!(result.is_err());

    // Source untouched: same length, capacity, storage, and contents.
    assert_eq!(arr.len(), 6);
    assert_eq!(arr.capacity(), cap);
    assert_eq!(arr.as_ptr(), ptr);
    let values: Vec<u32> = arr.iter().map(|v| v.value).collect();
    assert_eq!(values, [0, 1, 2, 3, 4, 5]);

    // The three partial clones were torn down again.
    assert_eq!(live.load(Ordering::SeqCst), 6);
}

#[test]
fn clone_from_spill_path_is_strong() {
    let budget = Arc::new(AtomicUsize::new(2));
    let live = Arc::new(AtomicUsize::new(0));
    let src = volatile_array(5, &budget, &live);
    let mut dst = volatile_array(2, &budget, &live);
    assert!(src.len() > dst.capacity());

    let result = catch_unwind(AssertUnwindSafe(|| dst.clone_from(&src)));
    assert!(result.is_err());

    // The replacement copy never finished, so the destination still holds
    // its original elements.
    assert_eq!(dst.len(), 2);
    let values: Vec<u32> = dst.iter().map(|v| v.value).collect();
    assert_eq!(values, [0, 1]);
    assert_eq!(live.load(Ordering::SeqCst), 7);
}

#[test]
fn extend_panic_drops_the_partial_tail_only() {
    let budget = Arc::new(AtomicUsize::new(usize::MAX));
    let live = Arc::new(AtomicUsize::new(0));
    let mut arr = volatile_array(2, &budget, &live);
    let extra: Vec<Volatile> = (10..14).map(|i| Volatile::new(i, &budget, &live)).collect();

    budget.store(2, Ordering::SeqCst);
    let result = catch_unwind(AssertUnwindSafe(|| arr.extend_from_slice(&extra)));
    assert!(result.is_err());

    // Basic guarantee: the original prefix survives, the two finished clones
    // are gone again, nothing leaked.
    assert_eq!(arr.len(), 2);
    assert_eq!(live.load(Ordering::SeqCst), 6);
}

#[test]
fn resize_panic_leaves_len_unchanged() {
    let budget = Arc::new(AtomicUsize::new(usize::MAX));
    let live = Arc::new(AtomicUsize::new(0));
    let mut arr = volatile_array(3, &budget, &live);

    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut calls = 0;
        let budget = Arc::clone(&budget);
        let live = Arc::clone(&live);
        arr.resize_with(8, move || {
            calls += 1;
            if calls == 3 {
                panic!("constructor failed");
            }
            Volatile::new(100 + calls, &budget, &live)
        });
    }));
    assert!(result.is_err());

    assert_eq!(arr.len(), 3);
    let values: Vec<u32> = arr.iter().map(|v| v.value).collect();
    assert_eq!(values, [0, 1, 2]);
    assert_eq!(live.load(Ordering::SeqCst), 3);
}

thread_local! {
    static DEFAULT_BUDGET: Cell<usize> = Cell::new(0);
    static DEFAULT_LIVE: Cell<isize> = Cell::new(0);
}

struct Seeded;

impl Default for Seeded {
    fn default() -> Self {
        let exhausted = DEFAULT_BUDGET.with(|b| {
            let left = b.get();
            if left == 0 {
                true
            } else {
                b.set(left - 1);
                false
            }
        });
        if exhausted {
            panic!("default budget exhausted");
        }
        DEFAULT_LIVE.with(|l| l.set(l.get() + 1));
        Seeded
    }
}

impl Drop for Seeded {
    fn drop(&mut self) {
        DEFAULT_LIVE.with(|l| l.set(l.get() - 1));
    }
}

#[test]
fn with_len_panic_releases_everything() {
    DEFAULT_BUDGET.with(|b| b.set(4));
    DEFAULT_LIVE.with(|l| l.set(0));

    let result = catch_unwind(|| DynArray::<Seeded>::with_len(8));
    assert!(result.is_err());

    // The four value-constructed elements were destroyed before the panic
    // left the constructor.
    assert_eq!(DEFAULT_LIVE.with(|l| l.get()), 0);
}

#[test]
fn try_reserve_overflow_leaves_state() {
    let mut arr = dynarr![1u8, 2, 3];
    let err = arr.try_reserve(usize::MAX - 1).unwrap_err();
    assert_eq!(err, ReserveError::CapacityOverflow);
    assert_eq!(arr, [1, 2, 3]);
    assert_eq!(arr.capacity(), 3);
}

#[test]
fn try_push_hands_the_value_back() {
    let mut arr: DynArray<()> = DynArray::new();
    unsafe { arr.set_len(usize::MAX) };
    let err = arr.try_push(()).unwrap_err();
    assert_eq!(err.error, ReserveError::CapacityOverflow);
    let _rejected: () = err.value;
    std::mem::forget(arr);
}
