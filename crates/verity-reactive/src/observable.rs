#![forbid(unsafe_code)]

//! Version-tracked observable values with subscriber callbacks.
//!
//! # Design
//!
//! [`Observable<T>`] wraps a value in shared, reference-counted storage.
//! Mutations that change the value bump a monotonic version counter and
//! notify subscribers in registration order. Mutations that leave the value
//! equal to its previous state are no-ops: no version bump, no
//! notifications.
//!
//! Subscribers are held as `Weak` references; the strong half lives inside
//! the [`Subscription`] guard returned by [`subscribe()`](Observable::subscribe).
//! Dropping the guard makes the callback unreachable before the next
//! notification cycle, and dead entries are pruned lazily while notifying.
//!
//! # Failure Modes
//!
//! - **Subscriber panics**: propagates to the caller of the mutating method;
//!   remaining subscribers for that cycle are not invoked.
//! - **Re-entrant mutation from a subscriber**: allowed. The interior borrow
//!   is released before callbacks run, so a subscriber may read or mutate
//!   the observable it was notified about.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Holds a subscriber callback alive. Stored behind `Rc<dyn Any>` so one
/// guard type serves observables of every value type.
pub(crate) struct Subscriber<E: ?Sized> {
    pub(crate) notify: Box<dyn Fn(&E)>,
}

/// RAII guard for a subscriber registration.
///
/// The observable only holds a `Weak` reference to the callback; this guard
/// owns the strong reference. Dropping it unsubscribes: the callback will
/// not be invoked in any notification cycle that starts afterwards.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    _keep: Rc<dyn Any>,
}

impl Subscription {
    pub(crate) fn new(keep: Rc<dyn Any>) -> Self {
        Self { _keep: keep }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Subscription")
    }
}

struct Inner<T> {
    value: T,
    version: u64,
    subscribers: Vec<Weak<Subscriber<T>>>,
}

/// A shared, version-tracked value with change notification.
///
/// Cloning an `Observable` creates a new handle to the **same** value.
///
/// # Invariants
///
/// 1. `version()` increments by exactly 1 per effective mutation.
/// 2. Subscribers are notified in registration order.
/// 3. `set()` with an equal value is a no-op.
pub struct Observable<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a new observable holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Set a new value.
    ///
    /// If `value` equals the current value this is a no-op: the version is
    /// not bumped and subscribers are not notified. Returns whether the
    /// value actually changed.
    pub fn set(&self, value: T) -> bool {
        let to_notify = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return false;
            }
            inner.value = value;
            inner.version += 1;
            collect_live(&mut inner.subscribers)
        };
        // Borrow released: subscribers may re-enter.
        let current = self.inner.borrow().value.clone();
        for sub in &to_notify {
            (sub.notify)(&current);
        }
        true
    }

    /// Mutate the value in place.
    ///
    /// The previous value is cloned to detect whether the mutation was
    /// effective; an ineffective mutation is a no-op as in [`set()`](Self::set).
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let to_notify = {
            let mut inner = self.inner.borrow_mut();
            let before = inner.value.clone();
            f(&mut inner.value);
            if inner.value == before {
                return false;
            }
            inner.version += 1;
            collect_live(&mut inner.subscribers)
        };
        let current = self.inner.borrow().value.clone();
        for sub in &to_notify {
            (sub.notify)(&current);
        }
        true
    }

    /// Current version. Increments by 1 on each effective mutation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Register a callback invoked with the new value after each effective
    /// mutation. The callback stays registered for the lifetime of the
    /// returned [`Subscription`].
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong = Rc::new(Subscriber {
            notify: Box::new(callback) as Box<dyn Fn(&T)>,
        });
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription::new(strong)
    }

    /// Number of live subscribers (dead guards not yet pruned are excluded).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

/// Upgrade all live subscribers in registration order, pruning dead ones.
pub(crate) fn collect_live<E: ?Sized>(
    subscribers: &mut Vec<Weak<Subscriber<E>>>,
) -> Vec<Rc<Subscriber<E>>> {
    let mut live = Vec::with_capacity(subscribers.len());
    subscribers.retain(|weak| match weak.upgrade() {
        Some(strong) => {
            live.push(strong);
            true
        }
        None => false,
    });
    live
}

/// Type-erased invalidation subscription.
///
/// The validation engine tracks constraint dependencies of mixed value
/// types; it only needs to know *that* a dependency changed, not what it
/// changed to.
pub trait DependencySource {
    /// Invoke `callback` after every effective mutation of this source.
    fn subscribe_invalidation(&self, callback: Box<dyn Fn()>) -> Subscription;

    /// Stable identity for subscription de-duplication.
    fn source_id(&self) -> usize;
}

impl<T: Clone + PartialEq + 'static> DependencySource for Observable<T> {
    fn subscribe_invalidation(&self, callback: Box<dyn Fn()>) -> Subscription {
        self.subscribe(move |_| callback())
    }

    fn source_id(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
