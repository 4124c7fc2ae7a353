#![forbid(unsafe_code)]

//! Constraint-based validation engine for observable values and collections.
//!
//! A [`Constraint`] binds a user-supplied validator function to a set of
//! dependency observables and an execution mode (synchronous, or
//! asynchronous with completions marshalled back to the owning thread).
//! The engine derives and maintains a validation state from all constraints
//! bound to a subject:
//!
//! - [`ConstrainedValue`] validates a single observable value and exposes
//!   `validating` / `valid` / `invalid` flags, a diagnostic list, and a
//!   *constrained value* that only advances to a new raw value once every
//!   constraint has accepted it.
//! - [`ConstrainedVec`] validates an observable collection: per-element
//!   constraints tracked by one [`ConstrainedElement`] per live member, plus
//!   collection-level constraints evaluated against the sequence as a whole,
//!   aggregated into a single state and a materialized constrained view.
//!
//! # Concurrency model
//!
//! The engine is single-writer: all engine state is mutated on the owning
//! thread. Asynchronous validators run wherever the user chooses; their
//! results travel through a [`ValidationPump`] channel back to the owner,
//! which applies them only if their generation stamp is still current.
//! Stale completions are discarded silently. The engine never blocks and
//! never forcibly cancels an in-flight validator.

pub mod change;
pub mod collection;
pub mod constraint;
pub mod constraints;
pub mod diagnostics;
pub mod element;
pub mod error;
pub mod pump;
pub mod result;
pub mod scalar;
mod tracker;

pub use collection::ConstrainedVec;
pub use constraint::{
    Completion, Constraint, DeferredValidation, Outcome, ValidationRun, VecConstraint, deferred,
};
pub use diagnostics::DiagnosticList;
pub use element::ConstrainedElement;
pub use error::ValidatorError;
pub use pump::{CompletionSink, ValidationPump};
pub use result::ValidationResult;
pub use scalar::ConstrainedValue;
