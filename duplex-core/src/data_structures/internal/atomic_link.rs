use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::guard::Guard;

/// An atomically replaceable, heap-allocated, immutable tuple.
///
/// The cell always holds a valid tuple until it is taken during teardown.
/// Replaced tuples are handed to a [`Guard`] and stay readable for as long
/// as the read guard that observed them is pinned.
///
// Orderings: every load is Acquire, every CAS is AcqRel on success and
// Acquire on failure. A successful CAS both publishes the new tuple and
// observes everything published before the tuple it replaced.
pub(crate) struct AtomicLink<L> {
    ptr: AtomicPtr<L>,
    _owns: PhantomData<Box<L>>,
}

unsafe fn drop_tuple<L>(ptr: *mut L) {
    drop(unsafe { Box::from_raw(ptr) });
}

impl<L> AtomicLink<L> {
    pub(crate) fn new(tuple: L) -> Self {
        AtomicLink {
            ptr: AtomicPtr::new(Box::into_raw(Box::new(tuple))),
            _owns: PhantomData,
        }
    }

    /// Load the current tuple.
    ///
    /// The returned reference is valid while both the cell's owner and the
    /// pinned read guard are borrowed.
    #[inline]
    pub(crate) fn load<'a, P>(&'a self, _pin: &'a P) -> &'a L {
        let current = self.ptr.load(Ordering::Acquire);
        debug_assert!(!current.is_null(), "load from a torn-down cell");
        unsafe { &*current }
    }

    /// Overwrite the tuple of a cell no other thread can reach yet.
    ///
    /// # Safety
    ///
    /// The owning node must not have been published: no other thread may
    /// hold a reference obtained from this cell.
    pub(crate) unsafe fn reset(&self, tuple: L) {
        let fresh = Box::into_raw(Box::new(tuple));
        let old = self.ptr.swap(fresh, Ordering::AcqRel);
        if !old.is_null() {
            unsafe { drop_tuple(old) };
        }
    }

    /// ConditionalCAS with a fixed replacement.
    ///
    /// Re-reads the cell until either `predicate` rejects the current tuple
    /// (returns `false`, `new` is dropped unpublished) or the CAS from the
    /// current tuple to `new` succeeds (returns `true`, the old tuple is
    /// retired through `guard`).
    pub(crate) fn compare_exchange_if<G: Guard>(
        &self,
        new: L,
        mut predicate: impl FnMut(&L) -> bool,
        guard: &G,
        _pin: &G::ReadGuard,
    ) -> bool {
        let new = Box::into_raw(Box::new(new));
        let mut current = self.ptr.load(Ordering::Acquire);
        loop {
            if !predicate(unsafe { &*current }) {
                unsafe { drop_tuple(new) };
                return false;
            }
            match self
                .ptr
                .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    unsafe { guard.defer_destroy(current, drop_tuple::<L>) };
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// ConditionalCAS where the replacement is derived from the observed tuple.
    ///
    /// `f` returning `None` stops the loop. Returns `Ok(previous)` after a
    /// successful exchange, `Err(observed)` with the last tuple `f` declined.
    /// The previous tuple is retired but remains readable under `pin`.
    pub(crate) fn fetch_update<'a, G: Guard>(
        &'a self,
        guard: &G,
        _pin: &'a G::ReadGuard,
        mut f: impl FnMut(&L) -> Option<L>,
    ) -> Result<&'a L, &'a L> {
        let mut current = self.ptr.load(Ordering::Acquire);
        let mut spare: Option<Box<L>> = None;
        loop {
            let observed = unsafe { &*current };
            let Some(tuple) = f(observed) else {
                return Err(observed);
            };
            let new = match spare.take() {
                Some(mut boxed) => {
                    *boxed = tuple;
                    Box::into_raw(boxed)
                }
                None => Box::into_raw(Box::new(tuple)),
            };
            match self
                .ptr
                .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    unsafe { guard.defer_destroy(current, drop_tuple::<L>) };
                    return Ok(observed);
                }
                Err(actual) => {
                    spare = Some(unsafe { Box::from_raw(new) });
                    current = actual;
                }
            }
        }
    }

    /// Move the tuple out of a cell nobody else can reach.
    pub(crate) fn take(&mut self) -> Option<L> {
        let current = std::mem::replace(self.ptr.get_mut(), ptr::null_mut());
        if current.is_null() {
            None
        } else {
            Some(*unsafe { Box::from_raw(current) })
        }
    }
}

impl<L> Drop for AtomicLink<L> {
    fn drop(&mut self) {
        drop(self.take());
    }
}
