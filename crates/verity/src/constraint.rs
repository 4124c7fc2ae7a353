#![forbid(unsafe_code)]

//! The constraint model: validators, execution modes, and generation slots.
//!
//! # Design
//!
//! A [`Constraint`] is an immutable description of one validation rule: a
//! validator closure, the observables the rule depends on, and an optional
//! completion sink. No sink means the constraint is *synchronous* — its
//! validator must return [`ValidationRun::Complete`]. A sink designates an
//! *asynchronous* constraint: the validator returns
//! [`ValidationRun::Deferred`] and resolves the paired [`Completion`] from
//! whatever thread it computes on; the result is marshalled through the sink
//! back to the owning thread.
//!
//! Each (subject, constraint) pair owns a [`ConstraintSlot`] holding the
//! last outcome and a monotonic generation counter. Starting an attempt
//! bumps the generation; a deferred result is applied only if its stamp
//! still matches. An in-flight attempt superseded by a newer one therefore
//! resolves into a silent no-op — logical cancellation, the computation
//! itself is never interrupted.

use std::rc::Rc;
use std::sync::{Arc, Mutex};

use verity_reactive::DependencySource;

use crate::error::ValidatorError;
use crate::pump::{CompletionSink, Delivery, Ticket};
use crate::result::ValidationResult;

/// State of one constraint for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A validation attempt is in flight.
    Pending,
    /// The latest attempt accepted the value.
    Valid,
    /// The latest attempt rejected the value.
    Invalid,
    /// No attempt has produced a result: the constraint never ran, or its
    /// validator failed. Contributes to neither the valid nor the invalid
    /// aggregate.
    Unknown,
}

/// Per-(subject, constraint) validation bookkeeping.
#[derive(Debug)]
pub(crate) struct ConstraintSlot {
    pub(crate) outcome: Outcome,
    generation: u64,
}

impl ConstraintSlot {
    pub(crate) fn new() -> Self {
        Self {
            outcome: Outcome::Unknown,
            generation: 0,
        }
    }

    /// Start a new attempt: supersede anything in flight and return the new
    /// generation stamp.
    pub(crate) fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.outcome = Outcome::Pending;
        self.generation
    }

    /// Whether a result stamped `generation` is still current.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

/// What a validator invocation produced.
pub enum ValidationRun<D> {
    /// The validation completed inline. `Err` maps to [`Outcome::Unknown`].
    Complete(Result<ValidationResult<D>, ValidatorError>),
    /// The validation will complete later through a [`Completion`] handle.
    Deferred(DeferredValidation<D>),
}

impl<D> ValidationRun<D> {
    /// Inline passing result.
    pub fn valid() -> Self {
        Self::Complete(Ok(ValidationResult::valid()))
    }

    /// Inline failing result.
    pub fn invalid() -> Self {
        Self::Complete(Ok(ValidationResult::invalid()))
    }

    /// Inline result carrying a verdict.
    pub fn of(result: ValidationResult<D>) -> Self {
        Self::Complete(Ok(result))
    }

    /// Inline validator failure.
    pub fn fail(error: ValidatorError) -> Self {
        Self::Complete(Err(error))
    }
}

enum DeferredState<D> {
    /// Neither resolved nor routed yet.
    Open,
    /// Resolved before the engine routed it; the engine reads it inline.
    Resolved(Result<ValidationResult<D>, ValidatorError>),
    /// Routed before resolution; the completion posts through the sink.
    Routed(CompletionSink<D>, Ticket),
    /// The result has been handed over.
    Spent,
}

/// Engine-side handle for a validation that completes later.
///
/// Created with [`deferred()`]; returned from a validator inside
/// [`ValidationRun::Deferred`].
pub struct DeferredValidation<D> {
    state: Arc<Mutex<DeferredState<D>>>,
}

/// Resolver handle for a deferred validation. `Send` — resolve it from any
/// thread. Dropping it unresolved reports [`ValidatorError::Abandoned`].
pub struct Completion<D> {
    state: Arc<Mutex<DeferredState<D>>>,
    resolved: bool,
}

/// Create a deferred validation and its completion handle.
///
/// The validator returns the [`DeferredValidation`]; the computation (on any
/// thread) resolves the [`Completion`].
pub fn deferred<D>() -> (DeferredValidation<D>, Completion<D>) {
    let state = Arc::new(Mutex::new(DeferredState::Open));
    (
        DeferredValidation {
            state: Arc::clone(&state),
        },
        Completion {
            state,
            resolved: false,
        },
    )
}

impl<D> DeferredValidation<D> {
    /// Attach routing information. If the validation already resolved, the
    /// result is returned for inline application; otherwise the eventual
    /// completion will post through `sink`.
    pub(crate) fn route(
        self,
        sink: CompletionSink<D>,
        ticket: Ticket,
    ) -> Option<Result<ValidationResult<D>, ValidatorError>> {
        let mut state = self.state.lock().expect("deferred state poisoned");
        match std::mem::replace(&mut *state, DeferredState::Spent) {
            DeferredState::Open => {
                *state = DeferredState::Routed(sink, ticket);
                None
            }
            DeferredState::Resolved(result) => Some(result),
            DeferredState::Routed(..) | DeferredState::Spent => None,
        }
    }
}

impl<D> Completion<D> {
    /// Resolve with a validation result.
    pub fn complete(mut self, result: ValidationResult<D>) {
        self.resolved = true;
        resolve(&self.state, Ok(result));
    }

    /// Resolve with a validator failure.
    pub fn fail(mut self, error: impl Into<crate::error::BoxError>) {
        self.resolved = true;
        resolve(&self.state, Err(ValidatorError::failed(error)));
    }
}

impl<D> Drop for Completion<D> {
    fn drop(&mut self) {
        if !self.resolved {
            resolve(&self.state, Err(ValidatorError::Abandoned));
        }
    }
}

fn resolve<D>(
    state: &Arc<Mutex<DeferredState<D>>>,
    result: Result<ValidationResult<D>, ValidatorError>,
) {
    let routed = {
        let mut guard = state.lock().expect("deferred state poisoned");
        match std::mem::replace(&mut *guard, DeferredState::Spent) {
            DeferredState::Open => {
                *guard = DeferredState::Resolved(result);
                return;
            }
            DeferredState::Routed(sink, ticket) => Some((sink, ticket)),
            DeferredState::Resolved(_) | DeferredState::Spent => None,
        }
    };
    // Post outside the lock.
    if let Some((sink, ticket)) = routed {
        sink.post(Delivery { ticket, result });
    }
}

/// A validation rule for a scalar value or a collection element.
///
/// Built with [`Constraint::new`] (synchronous) or
/// [`Constraint::asynchronous`], then decorated with
/// [`with_dependency`](Constraint::with_dependency).
pub struct Constraint<T, D> {
    validator: Rc<dyn Fn(&T) -> ValidationRun<D>>,
    dependencies: Vec<Rc<dyn DependencySource>>,
    completion: Option<CompletionSink<D>>,
}

impl<T, D> Constraint<T, D> {
    /// A synchronous constraint: the validator must complete inline.
    pub fn new(validator: impl Fn(&T) -> ValidationRun<D> + 'static) -> Self {
        Self {
            validator: Rc::new(validator),
            dependencies: Vec::new(),
            completion: None,
        }
    }

    /// An asynchronous constraint: deferred results are marshalled through
    /// `sink` back to the owning thread.
    pub fn asynchronous(
        validator: impl Fn(&T) -> ValidationRun<D> + 'static,
        sink: CompletionSink<D>,
    ) -> Self {
        Self {
            validator: Rc::new(validator),
            dependencies: Vec::new(),
            completion: Some(sink),
        }
    }

    /// Re-evaluate this constraint whenever `source` changes, in addition to
    /// changes of the validated value itself.
    #[must_use]
    pub fn with_dependency(mut self, source: impl DependencySource + 'static) -> Self {
        self.dependencies.push(Rc::new(source));
        self
    }

    pub(crate) fn run(&self, value: &T) -> ValidationRun<D> {
        (self.validator)(value)
    }

    pub(crate) fn dependencies(&self) -> &[Rc<dyn DependencySource>] {
        &self.dependencies
    }

    pub(crate) fn completion(&self) -> Option<&CompletionSink<D>> {
        self.completion.as_ref()
    }
}

impl<T, D> std::fmt::Debug for Constraint<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constraint")
            .field("dependencies", &self.dependencies.len())
            .field("asynchronous", &self.completion.is_some())
            .finish()
    }
}

/// A validation rule for a collection as a whole.
///
/// The validator sees the entire backing sequence; `None` when the backing
/// value is null. Element-level rules use [`Constraint`] instead.
pub struct VecConstraint<T, D> {
    validator: Rc<dyn Fn(Option<&[T]>) -> ValidationRun<D>>,
    dependencies: Vec<Rc<dyn DependencySource>>,
    completion: Option<CompletionSink<D>>,
}

impl<T, D> VecConstraint<T, D> {
    /// A synchronous collection-level constraint.
    pub fn new(validator: impl Fn(Option<&[T]>) -> ValidationRun<D> + 'static) -> Self {
        Self {
            validator: Rc::new(validator),
            dependencies: Vec::new(),
            completion: None,
        }
    }

    /// An asynchronous collection-level constraint.
    pub fn asynchronous(
        validator: impl Fn(Option<&[T]>) -> ValidationRun<D> + 'static,
        sink: CompletionSink<D>,
    ) -> Self {
        Self {
            validator: Rc::new(validator),
            dependencies: Vec::new(),
            completion: Some(sink),
        }
    }

    /// Re-evaluate whenever `source` changes.
    #[must_use]
    pub fn with_dependency(mut self, source: impl DependencySource + 'static) -> Self {
        self.dependencies.push(Rc::new(source));
        self
    }

    pub(crate) fn run(&self, value: Option<&[T]>) -> ValidationRun<D> {
        (self.validator)(value)
    }

    pub(crate) fn dependencies(&self) -> &[Rc<dyn DependencySource>] {
        &self.dependencies
    }

    pub(crate) fn completion(&self) -> Option<&CompletionSink<D>> {
        self.completion.as_ref()
    }
}

impl<T, D> std::fmt::Debug for VecConstraint<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VecConstraint")
            .field("dependencies", &self.dependencies.len())
            .field("asynchronous", &self.completion.is_some())
            .finish()
    }
}
