#![forbid(unsafe_code)]

//! End-to-end scalar validation with worker-thread validators.
//!
//! Validates that:
//! 1. Initial evaluation runs every validator exactly once.
//! 2. The constrained value only ever holds values that passed validation.
//! 3. Rapid successive changes supersede in-flight attempts; only the last
//!    attempt's result is applied.
//! 4. Validator failures are contained: the engine reports neither valid
//!    nor invalid and recovers on the next change.
//! 5. Derived state (overall form validity) composes from validation flags.
//! 6. The aggregate is order-independent: completions of distinct
//!    constraints may arrive in any order with the same end state.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use verity::{
    Completion, Constraint, ConstrainedValue, ValidationPump, ValidationResult, ValidationRun,
    deferred,
};
use verity_reactive::{Computed, Observable};

// ============================================================================
// Helpers
// ============================================================================

/// An asynchronous non-blank check that settles on a worker thread after a
/// short delay.
fn slow_not_blank(pump: &Rc<ValidationPump<String>>, delay: Duration) -> Constraint<String, String> {
    Constraint::asynchronous(
        move |value: &String| {
            let (pending, completion) = deferred();
            let value = value.clone();
            thread::Builder::new()
                .name("validator".into())
                .spawn(move || {
                    thread::sleep(delay);
                    if value.trim().is_empty() {
                        completion.complete(ValidationResult::invalid_with("blank".to_string()));
                    } else {
                        completion.complete(ValidationResult::valid());
                    }
                })
                .expect("spawn validator thread");
            ValidationRun::Deferred(pending)
        },
        pump.sink(),
    )
}

/// An asynchronous constraint whose completions are captured in `slot` for
/// the test to resolve by hand.
fn capturing(
    pump: &Rc<ValidationPump<String>>,
    slot: &Rc<RefCell<Vec<Completion<String>>>>,
) -> Constraint<String, String> {
    let slot = Rc::clone(slot);
    Constraint::asynchronous(
        move |_value: &String| {
            let (pending, completion) = deferred();
            slot.borrow_mut().push(completion);
            ValidationRun::Deferred(pending)
        },
        pump.sink(),
    )
}

/// Pump deliveries until `done` holds or five seconds elapse.
fn settle(pump: &ValidationPump<String>, done: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() && Instant::now() < deadline {
        pump.drain_timeout(Duration::from_millis(10));
    }
    assert!(done(), "validation did not settle within the deadline");
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn initial_evaluation_runs_each_validator_once() {
    let pump: Rc<ValidationPump<String>> = ValidationPump::new();
    let source = Observable::new(4);

    let first_runs = Rc::new(RefCell::new(0));
    let second_runs = Rc::new(RefCell::new(0));
    let c1 = Rc::clone(&first_runs);
    let c2 = Rc::clone(&second_runs);

    let value = ConstrainedValue::observe(
        &pump,
        &source,
        vec![
            Constraint::new(move |n: &i32| {
                *c1.borrow_mut() += 1;
                ValidationRun::of(ValidationResult::from_bool(*n > 0))
            }),
            Constraint::new(move |n: &i32| {
                *c2.borrow_mut() += 1;
                ValidationRun::of(ValidationResult::from_bool(n % 2 == 0))
            }),
        ],
    );

    assert_eq!(*first_runs.borrow(), 1);
    assert_eq!(*second_runs.borrow(), 1);
    assert!(value.valid().get());
    assert_eq!(value.constrained().get(), 4);
}

#[test]
fn constrained_value_is_monotonically_valid() {
    let pump = ValidationPump::new();
    let source = Observable::new("seed".to_string());
    let value = ConstrainedValue::observe(
        &pump,
        &source,
        vec![slow_not_blank(&pump, Duration::from_millis(20))],
    );

    let history: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&history);
    let _sub = value
        .constrained()
        .subscribe(move |v: &String| sink.borrow_mut().push(v.clone()));

    settle(&pump, || !value.validating().get());
    assert!(value.valid().get());

    source.set("first".to_string());
    settle(&pump, || !value.validating().get());

    source.set("   ".to_string());
    settle(&pump, || !value.validating().get());
    assert!(value.invalid().get());
    // The rejected value is withheld.
    assert_eq!(value.constrained().get(), "first");

    source.set("second".to_string());
    settle(&pump, || !value.validating().get());
    assert_eq!(value.constrained().get(), "second");

    // Only values that passed validation ever surfaced.
    assert_eq!(
        *history.borrow(),
        vec!["first".to_string(), "second".to_string()]
    );
}

#[test]
fn rapid_changes_keep_only_the_last_attempt() {
    let pump = ValidationPump::new();
    let source = Observable::new("a".to_string());
    let value = ConstrainedValue::observe(
        &pump,
        &source,
        vec![slow_not_blank(&pump, Duration::from_millis(30))],
    );

    // Supersede the initial attempt twice before anything settles.
    source.set("b".to_string());
    source.set("c".to_string());

    settle(&pump, || !value.validating().get());
    assert!(value.valid().get());
    assert_eq!(value.constrained().get(), "c");
}

#[test]
fn validator_failure_is_contained_and_recoverable() {
    let pump: Rc<ValidationPump<String>> = ValidationPump::new();
    let source = Observable::new(1);
    let constraint = Constraint::asynchronous(
        move |n: &i32| {
            let (pending, completion) = deferred();
            let n = *n;
            thread::spawn(move || {
                if n < 0 {
                    completion.fail("lookup service unavailable");
                } else {
                    completion.complete(ValidationResult::valid());
                }
            });
            ValidationRun::Deferred(pending)
        },
        pump.sink(),
    );
    let value = ConstrainedValue::observe(&pump, &source, vec![constraint]);
    settle(&pump, || !value.validating().get());
    assert!(value.valid().get());

    source.set(-1);
    settle(&pump, || !value.validating().get());
    // Failed, not invalid: the verdict is unknown.
    assert!(!value.valid().get());
    assert!(!value.invalid().get());
    assert_eq!(value.constrained().get(), 1);

    source.set(2);
    settle(&pump, || !value.validating().get());
    assert!(value.valid().get());
    assert_eq!(value.constrained().get(), 2);
}

#[test]
fn abandoned_completion_reports_unknown() {
    let pump: Rc<ValidationPump<String>> = ValidationPump::new();
    let source = Observable::new(1);
    let constraint = Constraint::asynchronous(
        |_n: &i32| {
            let (pending, completion) = deferred::<String>();
            // The worker drops the handle without resolving it.
            thread::spawn(move || drop(completion));
            ValidationRun::Deferred(pending)
        },
        pump.sink(),
    );
    let value = ConstrainedValue::observe(&pump, &source, vec![constraint]);

    settle(&pump, || !value.validating().get());
    assert!(!value.valid().get());
    assert!(!value.invalid().get());
}

#[test]
fn completion_order_does_not_change_the_aggregate() {
    let pump: Rc<ValidationPump<String>> = ValidationPump::new();
    let source = Observable::new("alpha".to_string());
    let first: Rc<RefCell<Vec<Completion<String>>>> = Rc::new(RefCell::new(Vec::new()));
    let second: Rc<RefCell<Vec<Completion<String>>>> = Rc::new(RefCell::new(Vec::new()));
    let value = ConstrainedValue::observe(
        &pump,
        &source,
        vec![capturing(&pump, &first), capturing(&pump, &second)],
    );

    // First constraint settles before the second.
    first.borrow_mut().pop().unwrap().complete(ValidationResult::valid());
    pump.drain();
    assert!(value.validating().get());
    assert!(!value.valid().get());
    second.borrow_mut().pop().unwrap().complete(ValidationResult::valid());
    pump.drain();
    assert!(value.valid().get());
    assert_eq!(value.constrained().get(), "alpha");

    // Opposite order after a change: the same end state.
    source.set("beta".to_string());
    second.borrow_mut().pop().unwrap().complete(ValidationResult::valid());
    pump.drain();
    assert!(value.validating().get());
    first.borrow_mut().pop().unwrap().complete(ValidationResult::valid());
    pump.drain();
    assert!(value.valid().get());
    assert!(!value.invalid().get());
    assert_eq!(value.constrained().get(), "beta");

    // A rejection dominates regardless of arrival order.
    source.set("gamma".to_string());
    first
        .borrow_mut()
        .pop()
        .unwrap()
        .complete(ValidationResult::invalid_with("rejected".to_string()));
    second.borrow_mut().pop().unwrap().complete(ValidationResult::valid());
    pump.drain();
    assert!(value.invalid().get());
    assert_eq!(value.constrained().get(), "beta");

    source.set("delta".to_string());
    second.borrow_mut().pop().unwrap().complete(ValidationResult::valid());
    first
        .borrow_mut()
        .pop()
        .unwrap()
        .complete(ValidationResult::invalid_with("rejected".to_string()));
    pump.drain();
    assert!(value.invalid().get());
    assert!(!value.valid().get());
    assert_eq!(value.constrained().get(), "beta");
    assert_eq!(
        value.diagnostics().get().invalid().cloned().collect::<Vec<_>>(),
        vec!["rejected".to_string()]
    );
}

#[test]
fn form_validity_derives_from_field_flags() {
    let pump: Rc<ValidationPump<String>> = ValidationPump::new();
    let name = Observable::new("ada".to_string());
    let age = Observable::new(35);

    let name_field = ConstrainedValue::observe(
        &pump,
        &name,
        vec![verity::constraints::not_blank("name required".to_string())],
    );
    let age_field = ConstrainedValue::observe(
        &pump,
        &age,
        vec![verity::constraints::in_range(
            0..=150,
            "age out of range".to_string(),
        )],
    );

    let name_valid = name_field.valid().clone();
    let age_valid = age_field.valid().clone();
    let form_valid = Computed::new(move || name_valid.get() && age_valid.get())
        .watch(name_field.valid())
        .watch(age_field.valid());

    assert!(form_valid.get());

    age.set(200);
    assert!(form_valid.is_dirty());
    assert!(!form_valid.get());

    age.set(36);
    assert!(form_valid.get());
}
