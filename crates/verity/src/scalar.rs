#![forbid(unsafe_code)]

//! Scalar validation engine.
//!
//! # Design
//!
//! A [`ConstrainedValue`] watches one [`Observable`] source and evaluates a
//! fixed set of [`Constraint`]s against it. Each constraint owns one
//! [`ConstraintSlot`] carrying its latest outcome and a generation counter;
//! a source change or dependency invalidation bumps the generation before
//! re-running the validator, so results from superseded attempts are
//! recognized and dropped on arrival.
//!
//! # Invariants
//!
//! - `valid` and `invalid` are never both `true`.
//! - The constrained value only changes when every constraint reports
//!   `Valid` for the current generation. Between attempts it holds the last
//!   fully valid state.
//! - A stale delivery never mutates outcomes, diagnostics, or flags.
//!
//! # Failure Modes
//!
//! A validator error (including an abandoned completion) marks the slot
//! `Unknown`: the value is neither valid nor invalid, and the error is
//! logged. A deferred run from a constraint constructed without a
//! completion sink is reported as [`ValidatorError::DeferredWithoutExecutor`].

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::error;
use verity_reactive::{Observable, Subscription};

use crate::constraint::{Constraint, ConstraintSlot, Outcome, ValidationRun};
use crate::diagnostics::DiagnosticList;
use crate::error::ValidatorError;
use crate::pump::{AsyncTarget, SubjectId, Ticket, ValidationPump};
use crate::result::ValidationResult;
use crate::tracker::DependencyTracker;

struct ScalarState<T> {
    raw: T,
    slots: Vec<ConstraintSlot>,
}

struct ScalarCore<T, D: 'static> {
    pump: Rc<ValidationPump<D>>,
    subject: SubjectId,
    constraints: Vec<Constraint<T, D>>,
    state: RefCell<ScalarState<T>>,
    valid: Observable<bool>,
    invalid: Observable<bool>,
    validating: Observable<bool>,
    constrained: Observable<T>,
    diagnostics: Observable<DiagnosticList<D>>,
    // Held for its Drop side effect: unsubscribes on teardown.
    #[allow(dead_code)]
    trackers: RefCell<Vec<DependencyTracker>>,
}

/// A value validated against a set of constraints.
///
/// Observes a source [`Observable`], re-validating on every change. Exposes
/// the validation flags, per-constraint diagnostics, and the constrained
/// value as observables of its own.
pub struct ConstrainedValue<T, D: 'static> {
    core: Rc<ScalarCore<T, D>>,
    _source_sub: Subscription,
}

impl<T, D> ConstrainedValue<T, D>
where
    T: Clone + PartialEq + 'static,
    D: Clone + PartialEq + Send + 'static,
{
    /// Start validating `source` against `constraints`.
    ///
    /// All constraints are evaluated once immediately; until the first
    /// evaluation settles, the constrained value holds the source's current
    /// value only if there are no constraints, otherwise the initial raw
    /// value is withheld until it proves valid.
    pub fn observe(
        pump: &Rc<ValidationPump<D>>,
        source: &Observable<T>,
        constraints: Vec<Constraint<T, D>>,
    ) -> Self {
        let initial = source.get();
        let slot_count = constraints.len();
        let core = Rc::new_cyclic(|weak: &Weak<ScalarCore<T, D>>| {
            // The subject id must exist before any validator can defer.
            let subject = pump.register(weak.clone() as Weak<dyn AsyncTarget<D>>);
            ScalarCore {
                pump: Rc::clone(pump),
                subject,
                constraints,
                state: RefCell::new(ScalarState {
                    raw: initial.clone(),
                    slots: (0..slot_count).map(|_| ConstraintSlot::new()).collect(),
                }),
                valid: Observable::new(slot_count == 0),
                invalid: Observable::new(false),
                validating: Observable::new(false),
                constrained: Observable::new(initial.clone()),
                diagnostics: Observable::new(DiagnosticList::new(slot_count)),
                trackers: RefCell::new(Vec::new()),
            }
        });

        // Constraint dependency invalidation re-runs that one constraint
        // against the current raw value.
        {
            let mut trackers = core.trackers.borrow_mut();
            for (index, constraint) in core.constraints.iter().enumerate() {
                let mut tracker = DependencyTracker::new();
                let weak = Rc::downgrade(&core);
                tracker.track(constraint.dependencies(), move || {
                    if let Some(core) = weak.upgrade() {
                        let value = core.state.borrow().raw.clone();
                        core.start_attempt(index, &value);
                        core.recompute_aggregate();
                    }
                });
                trackers.push(tracker);
            }
        }

        let weak = Rc::downgrade(&core);
        let source_sub = source.subscribe(move |value: &T| {
            if let Some(core) = weak.upgrade() {
                core.on_value_changed(value.clone());
            }
        });

        core.revalidate_all();
        Self {
            core,
            _source_sub: source_sub,
        }
    }

    /// `true` while every constraint holds `Valid` for the current value.
    pub fn valid(&self) -> &Observable<bool> {
        &self.core.valid
    }

    /// `true` while at least one constraint holds `Invalid`.
    ///
    /// Not the negation of [`valid`](Self::valid): both are `false` while
    /// outcomes are pending or unknown.
    pub fn invalid(&self) -> &Observable<bool> {
        &self.core.invalid
    }

    /// `true` while at least one validation attempt is in flight.
    pub fn validating(&self) -> &Observable<bool> {
        &self.core.validating
    }

    /// The last value that passed every constraint.
    pub fn constrained(&self) -> &Observable<T> {
        &self.core.constrained
    }

    /// Per-constraint diagnostics from the most recent settled attempts.
    pub fn diagnostics(&self) -> &Observable<DiagnosticList<D>> {
        &self.core.diagnostics
    }
}

impl<T, D> ScalarCore<T, D>
where
    T: Clone + PartialEq + 'static,
    D: Clone + PartialEq + Send + 'static,
{
    fn on_value_changed(self: &Rc<Self>, value: T) {
        self.state.borrow_mut().raw = value.clone();
        if self.constraints.is_empty() {
            self.constrained.set(value);
            return;
        }
        self.revalidate_all();
    }

    fn revalidate_all(self: &Rc<Self>) {
        let value = self.state.borrow().raw.clone();
        for index in 0..self.constraints.len() {
            self.start_attempt(index, &value);
        }
        self.recompute_aggregate();
    }

    /// Bump the slot's generation and run one validator. No borrows are
    /// held across the validator call: it may read any observable,
    /// including this engine's own outputs.
    fn start_attempt(self: &Rc<Self>, index: usize, value: &T) {
        let generation = self.state.borrow_mut().slots[index].begin();

        match self.constraints[index].run(value) {
            ValidationRun::Complete(result) => {
                self.apply_result(index, generation, result);
            }
            ValidationRun::Deferred(pending) => {
                let Some(sink) = self.constraints[index].completion().cloned() else {
                    self.apply_result(
                        index,
                        generation,
                        Err(ValidatorError::DeferredWithoutExecutor),
                    );
                    return;
                };
                let ticket = Ticket {
                    subject: self.subject,
                    slot: index,
                    generation,
                };
                // Resolved before routing: apply inline.
                if let Some(result) = pending.route(sink, ticket) {
                    self.apply_result(index, generation, result);
                }
            }
        }
    }

    /// Record a settled attempt. Stale deliveries are dropped without side
    /// effects, including error logging. The diagnostic slot is written in
    /// one step on settlement, so a revalidation that reproduces the
    /// previous diagnostic does not notify diagnostics subscribers.
    fn apply_result(
        &self,
        index: usize,
        generation: u64,
        result: Result<ValidationResult<D>, ValidatorError>,
    ) {
        {
            let state = self.state.borrow();
            if !state.slots[index].is_current(generation) {
                return;
            }
        }
        match result {
            Ok(result) => {
                let (valid, diagnostic) = result.into_parts();
                self.state.borrow_mut().slots[index].outcome = if valid {
                    Outcome::Valid
                } else {
                    Outcome::Invalid
                };
                self.diagnostics.update(|list| match diagnostic {
                    Some(diagnostic) => list.set(index, diagnostic, valid),
                    None => list.clear(index),
                });
            }
            Err(err) => {
                error!(constraint = index, error = %err, "validator failed");
                self.state.borrow_mut().slots[index].outcome = Outcome::Unknown;
                self.diagnostics.update(|list| list.clear(index));
            }
        }
    }

    /// Fold slot outcomes into the flag observables, surfacing the raw
    /// value as constrained when everything is valid.
    fn recompute_aggregate(&self) {
        let (validating, all_valid, any_invalid, raw) = {
            let state = self.state.borrow();
            let validating = state
                .slots
                .iter()
                .any(|slot| slot.outcome == Outcome::Pending);
            let all_valid = state.slots.iter().all(|slot| slot.outcome == Outcome::Valid);
            let any_invalid = state
                .slots
                .iter()
                .any(|slot| slot.outcome == Outcome::Invalid);
            (validating, all_valid, any_invalid, state.raw.clone())
        };
        if all_valid {
            self.constrained.set(raw);
        }
        self.validating.set(validating);
        self.valid.set(all_valid);
        self.invalid.set(any_invalid);
    }
}

impl<T, D> AsyncTarget<D> for ScalarCore<T, D>
where
    T: Clone + PartialEq + 'static,
    D: Clone + PartialEq + Send + 'static,
{
    fn apply_delivery(
        &self,
        ticket: Ticket,
        result: Result<ValidationResult<D>, ValidatorError>,
    ) {
        self.apply_result(ticket.slot, ticket.generation, result);
        self.recompute_aggregate();
    }
}

impl<T, D: 'static> Drop for ScalarCore<T, D> {
    fn drop(&mut self) {
        self.pump.unregister(self.subject);
    }
}
