#![forbid(unsafe_code)]

//! Single-threaded observable values and collections.
//!
//! This crate provides the change-tracking primitives consumed by the
//! `verity` validation engine:
//!
//! - [`Observable`]: A shared, version-tracked value wrapper with change
//!   notification via subscriber callbacks.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`ObservableVec`]: A nullable observable sequence that reports
//!   structural changes (insert/remove/replace/permute) at element
//!   granularity.
//! - [`Computed`]: A lazily-evaluated, memoized value derived from
//!   observable dependencies.
//! - [`DependencySource`]: Type-erased invalidation subscription, so a
//!   consumer can depend on observables of mixed value types.
//!
//! # Architecture
//!
//! All types use `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Subscribers are stored as `Weak` callbacks and cleaned up lazily during
//! notification.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version
//!    bump, no notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 5. Notifications fire after the mutation is fully applied; a subscriber
//!    reading the source always sees the new state.

pub mod computed;
pub mod observable;
pub mod vec;

pub use computed::Computed;
pub use observable::{DependencySource, Observable, Subscription};
pub use vec::{ObservableVec, VecChange};
