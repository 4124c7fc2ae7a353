#![forbid(unsafe_code)]

//! Per-element validation state for constrained collections.
//!
//! Each live member of a [`ConstrainedVec`](crate::collection::ConstrainedVec)
//! is tracked by one [`ConstrainedElement`]: the element's value is captured
//! at insertion and never changes, so a settled outcome stays settled until
//! the element leaves the collection. Position is not part of element
//! identity; permutations reorder trackers without re-running validators.
//!
//! Elements register as their own pump subjects. A deferred element
//! validation routes its completion straight to the element, which settles
//! its slot and notifies the owning collection to refresh the aggregate.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::error;

use crate::constraint::{Constraint, ConstraintSlot, Outcome, ValidationRun};
use crate::diagnostics::DiagnosticList;
use crate::error::ValidatorError;
use crate::pump::{AsyncTarget, SubjectId, Ticket, ValidationPump};
use crate::result::ValidationResult;

pub(crate) struct ElementCore<T, D: 'static> {
    pump: Rc<ValidationPump<D>>,
    subject: SubjectId,
    value: T,
    constraints: Rc<Vec<Constraint<T, D>>>,
    slots: RefCell<Vec<ConstraintSlot>>,
    diagnostics: RefCell<DiagnosticList<D>>,
    /// Called whenever an asynchronous result settles a slot. Captures a
    /// weak handle to the owning collection.
    on_settled: Box<dyn Fn()>,
}

/// Validation state of one collection member.
///
/// Handed out by [`ConstrainedVec::element`](crate::collection::ConstrainedVec::element)
/// for inspection. The tracked value is immutable; replacing a member
/// creates a fresh element. Cloning produces another handle to the same
/// tracker.
pub struct ConstrainedElement<T, D: 'static> {
    core: Rc<ElementCore<T, D>>,
}

impl<T, D: 'static> Clone for ConstrainedElement<T, D> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T, D> ConstrainedElement<T, D>
where
    T: Clone + 'static,
    D: Clone + PartialEq + Send + 'static,
{
    pub(crate) fn new(
        pump: &Rc<ValidationPump<D>>,
        value: T,
        constraints: Rc<Vec<Constraint<T, D>>>,
        on_settled: Box<dyn Fn()>,
    ) -> Self {
        let slot_count = constraints.len();
        let core = Rc::new_cyclic(|weak: &Weak<ElementCore<T, D>>| {
            let subject = pump.register(weak.clone() as Weak<dyn AsyncTarget<D>>);
            ElementCore {
                pump: Rc::clone(pump),
                subject,
                value,
                constraints,
                slots: RefCell::new((0..slot_count).map(|_| ConstraintSlot::new()).collect()),
                diagnostics: RefCell::new(DiagnosticList::new(slot_count)),
                on_settled,
            }
        });
        Self { core }
    }

    /// Run every constraint against the element's value. Called once when
    /// the element enters the collection.
    pub(crate) fn start_all(&self) {
        for index in 0..self.core.constraints.len() {
            self.core.start_attempt(index);
        }
    }

    /// Re-run one constraint, superseding any attempt in flight for it.
    pub(crate) fn revalidate(&self, index: usize) {
        self.core.start_attempt(index);
    }

    /// The tracked value.
    pub fn value(&self) -> &T {
        &self.core.value
    }

    /// `true` when every constraint has accepted the value.
    pub fn is_valid(&self) -> bool {
        let slots = self.core.slots.borrow();
        slots.iter().all(|slot| slot.outcome == Outcome::Valid)
    }

    /// `true` when at least one constraint rejected the value.
    pub fn is_invalid(&self) -> bool {
        let slots = self.core.slots.borrow();
        slots.iter().any(|slot| slot.outcome == Outcome::Invalid)
    }

    /// `true` while at least one attempt is in flight.
    pub fn is_validating(&self) -> bool {
        let slots = self.core.slots.borrow();
        slots.iter().any(|slot| slot.outcome == Outcome::Pending)
    }

    /// Snapshot of the element's per-constraint diagnostics.
    pub fn diagnostics(&self) -> DiagnosticList<D> {
        self.core.diagnostics.borrow().clone()
    }
}

impl<T, D> ElementCore<T, D>
where
    T: Clone + 'static,
    D: Clone + PartialEq + Send + 'static,
{
    fn start_attempt(self: &Rc<Self>, index: usize) {
        let generation = self.slots.borrow_mut()[index].begin();

        // No borrows held across the validator call.
        match self.constraints[index].run(&self.value) {
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
                if let Some(result) = pending.route(sink, ticket) {
                    self.apply_result(index, generation, result);
                }
            }
        }
    }

    fn apply_result(
        &self,
        index: usize,
        generation: u64,
        result: Result<ValidationResult<D>, ValidatorError>,
    ) {
        {
            let slots = self.slots.borrow();
            if !slots[index].is_current(generation) {
                return;
            }
        }
        match result {
            Ok(result) => {
                let (valid, diagnostic) = result.into_parts();
                self.slots.borrow_mut()[index].outcome = if valid {
                    Outcome::Valid
                } else {
                    Outcome::Invalid
                };
                // The slot is written once, on settlement; an in-flight
                // attempt leaves the previous diagnostic visible.
                let mut diagnostics = self.diagnostics.borrow_mut();
                match diagnostic {
                    Some(diagnostic) => diagnostics.set(index, diagnostic, valid),
                    None => diagnostics.clear(index),
                }
            }
            Err(err) => {
                error!(constraint = index, error = %err, "element validator failed");
                self.slots.borrow_mut()[index].outcome = Outcome::Unknown;
                self.diagnostics.borrow_mut().clear(index);
            }
        }
    }
}

impl<T, D> AsyncTarget<D> for ElementCore<T, D>
where
    T: Clone + 'static,
    D: Clone + PartialEq + Send + 'static,
{
    fn apply_delivery(
        &self,
        ticket: Ticket,
        result: Result<ValidationResult<D>, ValidatorError>,
    ) {
        // Staleness is checked inside; a dropped delivery must not wake the
        // collection either.
        let was_current = {
            let slots = self.slots.borrow();
            slots[ticket.slot].is_current(ticket.generation)
        };
        if !was_current {
            return;
        }
        self.apply_result(ticket.slot, ticket.generation, result);
        (self.on_settled)();
    }
}

impl<T, D: 'static> Drop for ElementCore<T, D> {
    fn drop(&mut self) {
        self.pump.unregister(self.subject);
    }
}
