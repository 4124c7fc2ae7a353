#![forbid(unsafe_code)]

//! Lazy computed values that auto-update from observable dependencies.
//!
//! # Design
//!
//! [`Computed<T>`] wraps a compute function and its cached result in shared,
//! reference-counted storage. When any watched dependency changes, the cache
//! is invalidated (marked dirty). The next call to [`get()`](Computed::get)
//! recomputes and caches the result.
//!
//! # Invariants
//!
//! 1. `get()` always returns a value consistent with the current state of
//!    all watched dependencies.
//! 2. The compute function is called at most once per dependency change
//!    cycle (memoization).
//! 3. If no dependency has changed, `get()` returns the cached value in O(1).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::observable::{DependencySource, Subscription};

struct ComputedInner<T> {
    compute: Rc<dyn Fn() -> T>,
    cached: Option<T>,
    dirty: Cell<bool>,
    subscriptions: Vec<Subscription>,
}

/// A lazily-evaluated, memoized value derived from observable dependencies.
///
/// Dependencies are registered with [`watch()`](Computed::watch); any
/// invalidation marks the cache dirty. Cloning a `Computed` creates a new
/// handle to the **same** inner state.
pub struct Computed<T> {
    inner: Rc<RefCell<ComputedInner<T>>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value from a compute function with no dependencies
    /// yet. Call [`watch()`](Self::watch) to wire invalidation.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ComputedInner {
                compute: Rc::new(compute),
                cached: None,
                dirty: Cell::new(true),
                subscriptions: Vec::new(),
            })),
        }
    }

    /// Mark this value dirty whenever `source` changes. Returns `self` for
    /// builder-style chaining.
    #[must_use]
    pub fn watch(self, source: &dyn DependencySource) -> Self {
        let weak = Rc::downgrade(&self.inner);
        let sub = source.subscribe_invalidation(Box::new(move || {
            if let Some(strong) = weak.upgrade() {
                strong.borrow().dirty.set(true);
            }
        }));
        self.inner.borrow_mut().subscriptions.push(sub);
        self
    }

    /// Get the current value, recomputing if any dependency has changed.
    #[must_use]
    pub fn get(&self) -> T {
        self.refresh();
        self.inner
            .borrow()
            .cached
            .as_ref()
            .expect("cached is always Some after refresh")
            .clone()
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.borrow().dirty.get()
    }

    /// Force invalidation; the next `get()` recomputes.
    pub fn invalidate(&self) {
        self.inner.borrow().dirty.set(true);
    }

    fn refresh(&self) {
        let needs_compute = {
            let inner = self.inner.borrow();
            inner.dirty.get() || inner.cached.is_none()
        };
        if needs_compute {
            // The compute function may read observables; no borrow is held
            // across the call.
            let compute = Rc::clone(&self.inner.borrow().compute);
            let value = compute();
            let mut inner = self.inner.borrow_mut();
            inner.cached = Some(value);
            inner.dirty.set(false);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
