#![forbid(unsafe_code)]

//! Ready-made constraints for common validation rules.
//!
//! All factories produce synchronous constraints carrying `diagnostic` on
//! rejection. For anything stateful or asynchronous, build a
//! [`Constraint`] directly.

use std::ops::RangeInclusive;

use crate::constraint::{Constraint, ValidationRun, VecConstraint};
use crate::result::ValidationResult;

fn verdict<D>(ok: bool, diagnostic: &D) -> ValidationRun<D>
where
    D: Clone,
{
    if ok {
        ValidationRun::valid()
    } else {
        ValidationRun::of(ValidationResult::invalid_with(diagnostic.clone()))
    }
}

/// Rejects `None`.
pub fn not_null<T, D>(diagnostic: D) -> Constraint<Option<T>, D>
where
    T: 'static,
    D: Clone + 'static,
{
    Constraint::new(move |value: &Option<T>| verdict(value.is_some(), &diagnostic))
}

/// Rejects strings that are empty or whitespace-only.
pub fn not_blank<D>(diagnostic: D) -> Constraint<String, D>
where
    D: Clone + 'static,
{
    Constraint::new(move |value: &String| {
        verdict(!value.trim().is_empty(), &diagnostic)
    })
}

/// Rejects strings longer than `limit` characters.
pub fn max_length<D>(limit: usize, diagnostic: D) -> Constraint<String, D>
where
    D: Clone + 'static,
{
    Constraint::new(move |value: &String| verdict(value.chars().count() <= limit, &diagnostic))
}

/// Rejects values outside `range`.
pub fn in_range<T, D>(range: RangeInclusive<T>, diagnostic: D) -> Constraint<T, D>
where
    T: PartialOrd + 'static,
    D: Clone + 'static,
{
    Constraint::new(move |value: &T| verdict(range.contains(value), &diagnostic))
}

/// Wraps an arbitrary predicate.
pub fn predicate<T, D>(check: impl Fn(&T) -> bool + 'static, diagnostic: D) -> Constraint<T, D>
where
    T: 'static,
    D: Clone + 'static,
{
    Constraint::new(move |value: &T| verdict(check(value), &diagnostic))
}

/// Rejects a null sequence.
pub fn vec_not_null<T, D>(diagnostic: D) -> VecConstraint<T, D>
where
    T: 'static,
    D: Clone + 'static,
{
    VecConstraint::new(move |items: Option<&[T]>| verdict(items.is_some(), &diagnostic))
}

/// Rejects a null or empty sequence.
pub fn vec_not_empty<T, D>(diagnostic: D) -> VecConstraint<T, D>
where
    T: 'static,
    D: Clone + 'static,
{
    VecConstraint::new(move |items: Option<&[T]>| {
        verdict(items.is_some_and(|s| !s.is_empty()), &diagnostic)
    })
}

/// Rejects sequences that are not in ascending order. A null sequence
/// passes.
pub fn vec_sorted<T, D>(diagnostic: D) -> VecConstraint<T, D>
where
    T: Ord + 'static,
    D: Clone + 'static,
{
    VecConstraint::new(move |items: Option<&[T]>| {
        let ok = items.is_none_or(|s| s.windows(2).all(|w| w[0] <= w[1]));
        verdict(ok, &diagnostic)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::ValidationRun;

    fn run_scalar<T, D: Clone + PartialEq + std::fmt::Debug>(
        constraint: &Constraint<T, D>,
        value: &T,
    ) -> ValidationResult<D> {
        match constraint.run(value) {
            ValidationRun::Complete(Ok(result)) => result,
            _ => panic!("factory constraints complete inline"),
        }
    }

    fn run_vec<T, D: Clone + PartialEq + std::fmt::Debug>(
        constraint: &VecConstraint<T, D>,
        value: Option<&[T]>,
    ) -> ValidationResult<D> {
        match constraint.run(value) {
            ValidationRun::Complete(Ok(result)) => result,
            _ => panic!("factory constraints complete inline"),
        }
    }

    #[test]
    fn not_null_rejects_none() {
        let c = not_null::<i32, _>("required");
        assert!(run_scalar(&c, &Some(1)).is_valid());
        let result = run_scalar(&c, &None);
        assert!(!result.is_valid());
        assert_eq!(result.diagnostic(), Some(&"required"));
    }

    #[test]
    fn not_blank_rejects_whitespace() {
        let c = not_blank("blank");
        assert!(run_scalar(&c, &"hello".to_string()).is_valid());
        assert!(!run_scalar(&c, &"   ".to_string()).is_valid());
        assert!(!run_scalar(&c, &String::new()).is_valid());
    }

    #[test]
    fn max_length_counts_characters() {
        let c = max_length(3, "too long");
        assert!(run_scalar(&c, &"abc".to_string()).is_valid());
        assert!(!run_scalar(&c, &"abcd".to_string()).is_valid());
        // Multi-byte characters count once.
        assert!(run_scalar(&c, &"äöü".to_string()).is_valid());
    }

    #[test]
    fn in_range_is_inclusive() {
        let c = in_range(1..=10, "out of range");
        assert!(run_scalar(&c, &1).is_valid());
        assert!(run_scalar(&c, &10).is_valid());
        assert!(!run_scalar(&c, &11).is_valid());
    }

    #[test]
    fn vec_factories() {
        let not_null = vec_not_null::<i32, _>("required");
        assert!(!run_vec(&not_null, None).is_valid());
        assert!(run_vec(&not_null, Some(&[])).is_valid());

        let not_empty = vec_not_empty::<i32, _>("empty");
        assert!(!run_vec(&not_empty, None).is_valid());
        assert!(!run_vec(&not_empty, Some(&[])).is_valid());
        assert!(run_vec(&not_empty, Some(&[1])).is_valid());

        let sorted = vec_sorted("unsorted");
        assert!(run_vec(&sorted, Some(&[1, 2, 2, 3])).is_valid());
        assert!(!run_vec(&sorted, Some(&[2, 1])).is_valid());
        assert!(run_vec(&sorted, None).is_valid());
    }
}
