#![forbid(unsafe_code)]

//! Collection validation engine.
//!
//! # Design
//!
//! A [`ConstrainedVec`] watches one [`ObservableVec`] source and maintains
//! two layers of validation state:
//!
//! - **Element constraints** apply to each member individually. Every live
//!   member is tracked by one [`ConstrainedElement`], created when the
//!   member enters the collection and dropped when it leaves. Reordering
//!   reorders the trackers without re-running element validators.
//! - **Collection constraints** ([`VecConstraint`]) see the sequence as a
//!   whole and re-run on every structural change, reorderings included.
//!
//! The constrained view mirrors the source, but only advances when every
//! element and collection constraint has accepted the current state.
//! Structural changes that accrue while validation is unsettled are merged
//! by a [`VecChangeAggregator`]; members that are added and removed again
//! before the state settles never appear in the view.
//!
//! # Invariants
//!
//! - The element arena is always index-aligned with the source sequence.
//! - The view changes at most once per settlement, by a single structural
//!   change or a refresh.
//! - A null source is distinct from an empty one: element validation is
//!   vacuous, collection validators see `None`, and a fully valid null
//!   state makes the view null.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::error;
use verity_reactive::{ObservableVec, VecChange, Observable, Subscription};

use crate::change::{ReplacedRange, VecChangeAggregator};
use crate::constraint::{Constraint, ConstraintSlot, Outcome, ValidationRun, VecConstraint};
use crate::diagnostics::DiagnosticList;
use crate::element::ConstrainedElement;
use crate::error::ValidatorError;
use crate::pump::{AsyncTarget, SubjectId, Ticket, ValidationPump};
use crate::result::ValidationResult;
use crate::tracker::DependencyTracker;

struct CollectionState<T, D: 'static> {
    /// One tracker per source member, index-aligned with the source.
    elements: Vec<ConstrainedElement<T, D>>,
    vec_slots: Vec<ConstraintSlot>,
    aggregator: VecChangeAggregator<T>,
    /// Mirror of the view's non-null content, used as the coordinate base
    /// for aggregation.
    view_items: Vec<T>,
    /// A wholesale replacement (or null transition) supersedes any
    /// aggregated granular changes.
    pending_refresh: bool,
}

struct CollectionCore<T, D: 'static> {
    pump: Rc<ValidationPump<D>>,
    subject: SubjectId,
    source: ObservableVec<T>,
    element_constraints: Rc<Vec<Constraint<T, D>>>,
    vec_constraints: Vec<VecConstraint<T, D>>,
    state: RefCell<CollectionState<T, D>>,
    valid: Observable<bool>,
    invalid: Observable<bool>,
    validating: Observable<bool>,
    diagnostics: Observable<DiagnosticList<D>>,
    view: ObservableVec<T>,
    // Held for its Drop side effect: unsubscribes on teardown.
    #[allow(dead_code)]
    trackers: RefCell<Vec<DependencyTracker>>,
}

enum ViewUpdate<T> {
    None,
    Refresh(Option<Vec<T>>),
    Splice(ReplacedRange<T>),
}

/// An observable collection validated against element and collection
/// constraints.
pub struct ConstrainedVec<T, D: 'static> {
    core: Rc<CollectionCore<T, D>>,
    _source_sub: Subscription,
}

impl<T, D> ConstrainedVec<T, D>
where
    T: Clone + PartialEq + 'static,
    D: Clone + PartialEq + Send + 'static,
{
    /// Start validating `source`.
    ///
    /// `element_constraints` run against each member; `vec_constraints` run
    /// against the sequence as a whole. All of them are evaluated once
    /// immediately.
    pub fn observe(
        pump: &Rc<ValidationPump<D>>,
        source: &ObservableVec<T>,
        element_constraints: Vec<Constraint<T, D>>,
        vec_constraints: Vec<VecConstraint<T, D>>,
    ) -> Self {
        let snapshot = source.get();
        let vec_slot_count = vec_constraints.len();
        let core = Rc::new_cyclic(|weak: &Weak<CollectionCore<T, D>>| {
            let subject = pump.register(weak.clone() as Weak<dyn AsyncTarget<D>>);
            CollectionCore {
                pump: Rc::clone(pump),
                subject,
                source: source.clone(),
                element_constraints: Rc::new(element_constraints),
                vec_constraints,
                state: RefCell::new(CollectionState {
                    elements: Vec::new(),
                    vec_slots: (0..vec_slot_count).map(|_| ConstraintSlot::new()).collect(),
                    aggregator: VecChangeAggregator::new(),
                    view_items: snapshot.clone().unwrap_or_default(),
                    pending_refresh: false,
                }),
                valid: Observable::new(false),
                invalid: Observable::new(false),
                validating: Observable::new(false),
                diagnostics: Observable::new(DiagnosticList::new(vec_slot_count)),
                view: ObservableVec::new(snapshot.clone()),
                trackers: RefCell::new(Vec::new()),
            }
        });

        // Seed the element arena before wiring any callbacks.
        if let Some(values) = snapshot {
            let fresh: Vec<_> = values
                .into_iter()
                .map(|value| core.make_element(value))
                .collect();
            core.state.borrow_mut().elements = fresh.clone();
            for element in &fresh {
                element.start_all();
            }
        }

        {
            let mut trackers = core.trackers.borrow_mut();
            // A collection-constraint dependency re-runs that one constraint
            // against the current sequence.
            for (index, constraint) in core.vec_constraints.iter().enumerate() {
                let mut tracker = DependencyTracker::new();
                let weak = Rc::downgrade(&core);
                tracker.track(constraint.dependencies(), move || {
                    if let Some(core) = weak.upgrade() {
                        core.start_vec_attempt(index);
                        core.recompute_aggregate();
                    }
                });
                trackers.push(tracker);
            }
            // An element-constraint dependency re-runs that constraint on
            // every live element.
            for (index, constraint) in core.element_constraints.iter().enumerate() {
                let mut tracker = DependencyTracker::new();
                let weak = Rc::downgrade(&core);
                tracker.track(constraint.dependencies(), move || {
                    if let Some(core) = weak.upgrade() {
                        let elements = core.state.borrow().elements.clone();
                        for element in &elements {
                            element.revalidate(index);
                        }
                        core.recompute_aggregate();
                    }
                });
                trackers.push(tracker);
            }
        }

        let weak = Rc::downgrade(&core);
        let source_sub = source.subscribe(move |change: &VecChange<T>| {
            if let Some(core) = weak.upgrade() {
                core.on_change(change);
            }
        });

        for index in 0..core.vec_constraints.len() {
            core.start_vec_attempt(index);
        }
        core.recompute_aggregate();

        Self {
            core,
            _source_sub: source_sub,
        }
    }

    /// `true` while every element and collection constraint holds `Valid`.
    pub fn valid(&self) -> &Observable<bool> {
        &self.core.valid
    }

    /// `true` while any element or collection constraint holds `Invalid`.
    pub fn invalid(&self) -> &Observable<bool> {
        &self.core.invalid
    }

    /// `true` while at least one validation attempt is in flight.
    pub fn validating(&self) -> &Observable<bool> {
        &self.core.validating
    }

    /// The constrained view: the last source state that passed every
    /// constraint, updated by at most one structural change per settlement.
    pub fn constrained(&self) -> &ObservableVec<T> {
        &self.core.view
    }

    /// Diagnostics of the collection-level constraints. Element diagnostics
    /// live on the individual [`ConstrainedElement`]s.
    pub fn diagnostics(&self) -> &Observable<DiagnosticList<D>> {
        &self.core.diagnostics
    }

    /// Number of tracked members. Zero for a null source.
    pub fn element_count(&self) -> usize {
        self.core.state.borrow().elements.len()
    }

    /// Handle to the tracker of the member at `index`.
    pub fn element(&self, index: usize) -> Option<ConstrainedElement<T, D>> {
        self.core.state.borrow().elements.get(index).cloned()
    }
}

impl<T, D> CollectionCore<T, D>
where
    T: Clone + PartialEq + 'static,
    D: Clone + PartialEq + Send + 'static,
{
    fn make_element(self: &Rc<Self>, value: T) -> ConstrainedElement<T, D> {
        let weak = Rc::downgrade(self);
        ConstrainedElement::new(
            &self.pump,
            value,
            Rc::clone(&self.element_constraints),
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.recompute_aggregate();
                }
            }),
        )
    }

    /// Apply one source change: realign the element arena, record the change
    /// for the view, then re-run the collection constraints.
    fn on_change(self: &Rc<Self>, change: &VecChange<T>) {
        // Arena and aggregator updates happen under the state borrow; new
        // elements start validating only after it is released.
        let started: Vec<ConstrainedElement<T, D>> = match change {
            VecChange::Refresh => {
                let snapshot = self.source.get();
                let fresh: Vec<_> = snapshot
                    .into_iter()
                    .flatten()
                    .map(|value| self.make_element(value))
                    .collect();
                let state = &mut *self.state.borrow_mut();
                state.elements = fresh.clone();
                state.pending_refresh = true;
                let _ = state.aggregator.complete();
                fresh
            }
            VecChange::Inserted { index, len } => {
                let values = self
                    .source
                    .with(|s| s.map(|s| s[*index..index + len].to_vec()))
                    .unwrap_or_default();
                let fresh: Vec<_> = values
                    .iter()
                    .cloned()
                    .map(|value| self.make_element(value))
                    .collect();
                let state = &mut *self.state.borrow_mut();
                state.elements.splice(*index..*index, fresh.iter().cloned());
                if !state.pending_refresh {
                    let CollectionState {
                        aggregator,
                        view_items,
                        ..
                    } = state;
                    aggregator.record_inserted(view_items, *index, &values);
                }
                fresh
            }
            VecChange::Removed { index, removed } => {
                let state = &mut *self.state.borrow_mut();
                state.elements.drain(*index..index + removed.len());
                if !state.pending_refresh {
                    let CollectionState {
                        aggregator,
                        view_items,
                        ..
                    } = state;
                    aggregator.record_removed(view_items, *index, removed.len());
                }
                Vec::new()
            }
            VecChange::Replaced {
                index,
                removed,
                len,
            } => {
                let values = self
                    .source
                    .with(|s| s.map(|s| s[*index..index + len].to_vec()))
                    .unwrap_or_default();
                let fresh: Vec<_> = values
                    .iter()
                    .cloned()
                    .map(|value| self.make_element(value))
                    .collect();
                let state = &mut *self.state.borrow_mut();
                state
                    .elements
                    .splice(*index..index + removed.len(), fresh.iter().cloned());
                if !state.pending_refresh {
                    let CollectionState {
                        aggregator,
                        view_items,
                        ..
                    } = state;
                    aggregator.record_replaced(view_items, *index, removed.len(), &values);
                }
                fresh
            }
            VecChange::Permuted { mapping } => {
                // Reorder trackers; element validators do not re-run.
                let state = &mut *self.state.borrow_mut();
                let old = std::mem::take(&mut state.elements);
                let mut keyed: Vec<(usize, ConstrainedElement<T, D>)> = old
                    .into_iter()
                    .enumerate()
                    .map(|(old_index, element)| (mapping[old_index], element))
                    .collect();
                keyed.sort_by_key(|(new_index, _)| *new_index);
                state.elements = keyed.into_iter().map(|(_, element)| element).collect();

                if !state.pending_refresh {
                    // The moved span, recorded as one replacement.
                    let mut span: Option<(usize, usize)> = None;
                    for (old_index, &new_index) in mapping.iter().enumerate() {
                        if old_index != new_index {
                            let lo = old_index.min(new_index);
                            let hi = old_index.max(new_index);
                            span = Some(match span {
                                None => (lo, hi),
                                Some((first, last)) => (first.min(lo), last.max(hi)),
                            });
                        }
                    }
                    if let Some((first, last)) = span {
                        let values = self
                            .source
                            .with(|s| s.map(|s| s[first..=last].to_vec()))
                            .unwrap_or_default();
                        let CollectionState {
                            aggregator,
                            view_items,
                            ..
                        } = state;
                        aggregator.record_replaced(view_items, first, last - first + 1, &values);
                    }
                }
                Vec::new()
            }
        };

        for element in &started {
            element.start_all();
        }
        // Any structural change, reordering included, re-runs the
        // collection constraints.
        for index in 0..self.vec_constraints.len() {
            self.start_vec_attempt(index);
        }
        self.recompute_aggregate();
    }

    fn start_vec_attempt(self: &Rc<Self>, index: usize) {
        let generation = self.state.borrow_mut().vec_slots[index].begin();

        // No borrows held across the validator call.
        let snapshot = self.source.get();
        match self.vec_constraints[index].run(snapshot.as_deref()) {
            ValidationRun::Complete(result) => {
                self.apply_vec_result(index, generation, result);
            }
            ValidationRun::Deferred(pending) => {
                let Some(sink) = self.vec_constraints[index].completion().cloned() else {
                    self.apply_vec_result(
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
                    self.apply_vec_result(index, generation, result);
                }
            }
        }
    }

    fn apply_vec_result(
        &self,
        index: usize,
        generation: u64,
        result: Result<ValidationResult<D>, ValidatorError>,
    ) {
        {
            let state = self.state.borrow();
            if !state.vec_slots[index].is_current(generation) {
                return;
            }
        }
        match result {
            Ok(result) => {
                let (valid, diagnostic) = result.into_parts();
                self.state.borrow_mut().vec_slots[index].outcome = if valid {
                    Outcome::Valid
                } else {
                    Outcome::Invalid
                };
                // One write per settlement: an unchanged diagnostic does not
                // notify subscribers.
                self.diagnostics.update(|list| match diagnostic {
                    Some(diagnostic) => list.set(index, diagnostic, valid),
                    None => list.clear(index),
                });
            }
            Err(err) => {
                error!(constraint = index, error = %err, "collection validator failed");
                self.state.borrow_mut().vec_slots[index].outcome = Outcome::Unknown;
                self.diagnostics.update(|list| list.clear(index));
            }
        }
    }

    /// Fold element and collection outcomes into the flag observables and,
    /// on a fully valid state, apply the pending view update.
    fn recompute_aggregate(&self) {
        let (validating, all_valid, any_invalid) = {
            let state = self.state.borrow();
            let el_validating = state.elements.iter().any(ConstrainedElement::is_validating);
            let el_valid = state.elements.iter().all(ConstrainedElement::is_valid);
            let el_invalid = state.elements.iter().any(ConstrainedElement::is_invalid);
            let vec_validating = state
                .vec_slots
                .iter()
                .any(|slot| slot.outcome == Outcome::Pending);
            let vec_valid = state.vec_slots.iter().all(|slot| slot.outcome == Outcome::Valid);
            let vec_invalid = state
                .vec_slots
                .iter()
                .any(|slot| slot.outcome == Outcome::Invalid);
            (
                el_validating || vec_validating,
                el_valid && vec_valid,
                el_invalid || vec_invalid,
            )
        };

        if all_valid {
            let update = {
                let state = &mut *self.state.borrow_mut();
                if state.pending_refresh {
                    state.pending_refresh = false;
                    let _ = state.aggregator.complete();
                    let snapshot = self.source.get();
                    state.view_items = snapshot.clone().unwrap_or_default();
                    ViewUpdate::Refresh(snapshot)
                } else {
                    let change = state.aggregator.complete();
                    if change.is_empty() {
                        ViewUpdate::None
                    } else {
                        state.view_items.splice(
                            change.from..change.from + change.remove_size,
                            change.added.iter().cloned(),
                        );
                        ViewUpdate::Splice(change)
                    }
                }
            };
            // View mutation happens outside the state borrow: view
            // subscribers may feed back into the source.
            match update {
                ViewUpdate::None => {}
                ViewUpdate::Refresh(snapshot) => {
                    self.view.replace_all(snapshot);
                }
                ViewUpdate::Splice(change) => {
                    self.view
                        .splice(change.from, change.remove_size, change.added);
                }
            }
        }

        self.validating.set(validating);
        self.valid.set(all_valid);
        self.invalid.set(any_invalid);
    }
}

impl<T, D> AsyncTarget<D> for CollectionCore<T, D>
where
    T: Clone + PartialEq + 'static,
    D: Clone + PartialEq + Send + 'static,
{
    fn apply_delivery(
        &self,
        ticket: Ticket,
        result: Result<ValidationResult<D>, ValidatorError>,
    ) {
        self.apply_vec_result(ticket.slot, ticket.generation, result);
        self.recompute_aggregate();
    }
}

impl<T, D: 'static> Drop for CollectionCore<T, D> {
    fn drop(&mut self) {
        self.pump.unregister(self.subject);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::deferred;

    fn positive() -> Constraint<i32, String> {
        Constraint::new(|n: &i32| {
            ValidationRun::of(if *n > 0 {
                ValidationResult::valid()
            } else {
                ValidationResult::invalid_with(format!("{n} is not positive"))
            })
        })
    }

    fn sorted() -> VecConstraint<i32, String> {
        VecConstraint::new(|items: Option<&[i32]>| {
            let ok = items.is_none_or(|s| s.windows(2).all(|w| w[0] <= w[1]));
            ValidationRun::of(if ok {
                ValidationResult::valid()
            } else {
                ValidationResult::invalid_with("not sorted".to_string())
            })
        })
    }

    #[test]
    fn initial_state_validates_every_member() {
        let pump = ValidationPump::new();
        let source = ObservableVec::from_vec(vec![1, 2, 3]);
        let vec = ConstrainedVec::observe(&pump, &source, vec![positive()], vec![sorted()]);

        assert!(vec.valid().get());
        assert_eq!(vec.element_count(), 3);
        assert_eq!(vec.constrained().get(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn invalid_element_blocks_the_view() {
        let pump = ValidationPump::new();
        let source = ObservableVec::from_vec(vec![1, 2]);
        let vec = ConstrainedVec::observe(&pump, &source, vec![positive()], Vec::new());
        assert!(vec.valid().get());

        source.push(-5);
        assert!(vec.invalid().get());
        assert_eq!(vec.constrained().get(), Some(vec![1, 2]));
        let bad = vec.element(2).unwrap();
        assert!(bad.is_invalid());
        assert_eq!(
            bad.diagnostics().invalid().cloned().collect::<Vec<_>>(),
            vec!["-5 is not positive".to_string()]
        );

        source.remove(2);
        assert!(vec.valid().get());
        assert_eq!(vec.constrained().get(), Some(vec![1, 2]));
    }

    #[test]
    fn transient_member_never_surfaces_in_view() {
        let pump = ValidationPump::new();
        let source = ObservableVec::from_vec(vec![1, 2]);
        let vec = ConstrainedVec::observe(&pump, &source, vec![positive()], Vec::new());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = vec
            .constrained()
            .subscribe(move |change| sink.borrow_mut().push(change.clone()));

        source.insert(1, -9);
        source.remove(1);

        assert!(vec.valid().get());
        assert_eq!(vec.constrained().get(), Some(vec![1, 2]));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn accrued_changes_apply_as_one_view_change() {
        let pump = ValidationPump::new();
        let source = ObservableVec::from_vec(vec![1, 2]);
        let vec = ConstrainedVec::observe(&pump, &source, vec![positive()], Vec::new());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = vec
            .constrained()
            .subscribe(move |change| sink.borrow_mut().push(change.clone()));

        // Invalid member holds the view while further changes accrue.
        source.push(-1);
        source.push(3);
        source.push(4);
        assert_eq!(vec.constrained().get(), Some(vec![1, 2]));

        source.remove(2); // drop the invalid member
        assert!(vec.valid().get());
        assert_eq!(vec.constrained().get(), Some(vec![1, 2, 3, 4]));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn collection_constraint_blocks_the_view() {
        let pump = ValidationPump::new();
        let source = ObservableVec::from_vec(vec![1, 3]);
        let vec = ConstrainedVec::observe(&pump, &source, Vec::new(), vec![sorted()]);
        assert!(vec.valid().get());

        source.insert(1, 9); // 1 9 3
        assert!(vec.invalid().get());
        assert_eq!(vec.constrained().get(), Some(vec![1, 3]));
        assert_eq!(
            vec.diagnostics().get().invalid().cloned().collect::<Vec<_>>(),
            vec!["not sorted".to_string()]
        );

        source.sort(); // 1 3 9
        assert!(vec.valid().get());
        assert_eq!(vec.constrained().get(), Some(vec![1, 3, 9]));
    }

    #[test]
    fn reproduced_collection_diagnostic_does_not_renotify() {
        let pump = ValidationPump::new();
        let source = ObservableVec::from_vec(vec![3, 1]);
        let vec = ConstrainedVec::observe(&pump, &source, Vec::new(), vec![sorted()]);
        assert!(vec.invalid().get());

        let notifications = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&notifications);
        let _sub = vec
            .diagnostics()
            .subscribe(move |_| *counter.borrow_mut() += 1);

        // Still unsorted: the re-run reproduces the identical diagnostic.
        source.push(0);
        assert!(vec.invalid().get());
        assert_eq!(
            vec.diagnostics().get().invalid().cloned().collect::<Vec<_>>(),
            vec!["not sorted".to_string()]
        );
        assert_eq!(*notifications.borrow(), 0);
    }

    #[test]
    fn permutation_reruns_collection_but_not_element_validators() {
        let pump = ValidationPump::new();
        let source = ObservableVec::from_vec(vec![5, 3, 1, 4, 2]);
        let element_runs = Rc::new(RefCell::new(0));
        let vec_runs = Rc::new(RefCell::new(0));

        let el_counter = Rc::clone(&element_runs);
        let element = Constraint::new(move |_n: &i32| {
            *el_counter.borrow_mut() += 1;
            ValidationRun::<String>::valid()
        });
        let vec_counter = Rc::clone(&vec_runs);
        let whole = VecConstraint::new(move |_items: Option<&[i32]>| {
            *vec_counter.borrow_mut() += 1;
            ValidationRun::<String>::valid()
        });

        let vec = ConstrainedVec::observe(&pump, &source, vec![element], vec![whole]);
        assert_eq!(*element_runs.borrow(), 5);
        assert_eq!(*vec_runs.borrow(), 1);

        source.sort();
        assert_eq!(*element_runs.borrow(), 5);
        assert_eq!(*vec_runs.borrow(), 2);
        assert_eq!(vec.constrained().get(), Some(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn null_source_is_vacuously_element_valid() {
        let pump = ValidationPump::new();
        let source: ObservableVec<i32> = ObservableVec::null();
        let vec = ConstrainedVec::observe(&pump, &source, vec![positive()], Vec::new());

        assert!(vec.valid().get());
        assert_eq!(vec.element_count(), 0);
        assert!(vec.constrained().is_null());
    }

    #[test]
    fn null_transition_gated_by_collection_constraint() {
        let pump = ValidationPump::new();
        let source = ObservableVec::from_vec(vec![1]);
        let not_null = VecConstraint::new(|items: Option<&[i32]>| {
            ValidationRun::of(if items.is_some() {
                ValidationResult::valid()
            } else {
                ValidationResult::invalid_with("value required".to_string())
            })
        });
        let vec = ConstrainedVec::observe(&pump, &source, Vec::new(), vec![not_null]);
        assert!(vec.valid().get());

        source.replace_all(None);
        assert!(vec.invalid().get());
        // The view holds the last valid content.
        assert_eq!(vec.constrained().get(), Some(vec![1]));

        source.replace_all(Some(vec![2]));
        assert!(vec.valid().get());
        assert_eq!(vec.constrained().get(), Some(vec![2]));
    }

    #[test]
    fn null_transition_applies_when_accepted() {
        let pump = ValidationPump::new();
        let source = ObservableVec::from_vec(vec![1]);
        let vec: ConstrainedVec<i32, String> =
            ConstrainedVec::observe(&pump, &source, Vec::new(), Vec::new());

        source.replace_all(None);
        assert!(vec.valid().get());
        assert!(vec.constrained().is_null());
    }

    #[test]
    fn async_element_validation_settles_view_once() {
        let pump = ValidationPump::new();
        let source = ObservableVec::from_vec(vec![10, 20, 30]);
        let completions: Rc<RefCell<Vec<crate::constraint::Completion<String>>>> =
            Rc::new(RefCell::new(Vec::new()));
        let slot = Rc::clone(&completions);
        let constraint = Constraint::asynchronous(
            move |_n: &i32| {
                let (pending, completion) = deferred();
                slot.borrow_mut().push(completion);
                ValidationRun::Deferred(pending)
            },
            pump.sink(),
        );
        let vec = ConstrainedVec::observe(&pump, &source, vec![constraint], Vec::new());
        assert!(vec.validating().get());

        let seen = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&seen);
        let _sub = vec.constrained().subscribe(move |_| *counter.borrow_mut() += 1);

        source.push(40);
        for completion in completions.borrow_mut().drain(..) {
            completion.complete(ValidationResult::valid());
        }
        pump.drain();

        assert!(vec.valid().get());
        assert_eq!(vec.constrained().get(), Some(vec![10, 20, 30, 40]));
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn element_dependency_invalidation_reruns_all_elements() {
        let pump = ValidationPump::new();
        let source = ObservableVec::from_vec(vec![1, 2, 3]);
        let limit = Observable::new(10);
        let limit_for_check = limit.clone();
        let under_limit = Constraint::new(move |n: &i32| {
            ValidationRun::<String>::of(ValidationResult::from_bool(*n <= limit_for_check.get()))
        })
        .with_dependency(limit.clone());
        let vec = ConstrainedVec::observe(&pump, &source, vec![under_limit], Vec::new());
        assert!(vec.valid().get());

        limit.set(2);
        assert!(vec.invalid().get());
        assert!(vec.element(2).unwrap().is_invalid());
        assert_eq!(vec.constrained().get(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn drop_releases_all_pump_subjects() {
        let pump = ValidationPump::new();
        let source = ObservableVec::from_vec(vec![1, 2]);
        let vec = ConstrainedVec::observe(&pump, &source, vec![positive()], Vec::new());
        // One subject for the collection, one per element.
        assert_eq!(pump.subject_count(), 3);
        drop(vec);
        assert_eq!(pump.subject_count(), 0);
    }
}
