#![forbid(unsafe_code)]

//! Nullable observable sequences with element-granular change events.
//!
//! # Design
//!
//! [`ObservableVec<T>`] wraps an `Option<Vec<T>>` in shared storage. The
//! nullable outer layer mirrors a reference-typed collection slot: the whole
//! sequence may be absent (`None`), which is distinct from an empty
//! sequence.
//!
//! Structural mutations emit a [`VecChange`] describing exactly what moved:
//! insertion, removal, in-range replacement, permutation, or wholesale
//! replacement of the backing value ([`VecChange::Refresh`]). Consumers that
//! maintain parallel state (the validation engine's element registry, content
//! bindings) apply these incrementally instead of diffing snapshots.
//!
//! # Invariants
//!
//! 1. Every emitted change, applied to the subscriber's mirror of the old
//!    state, reproduces the new state.
//! 2. A mutation that leaves the sequence equal to its previous state emits
//!    nothing and does not bump the version.
//! 3. Changes are emitted after the mutation is fully applied.
//! 4. `Permuted { mapping }` satisfies `new[mapping[i]] == old[i]` and
//!    `mapping` is a permutation of `0..len`.
//!
//! # Failure Modes
//!
//! - Structural ops (`insert`, `remove`, `set`, `permute`, ...) panic if the
//!   backing value is `None` or an index is out of bounds, like the
//!   corresponding `Vec` methods.

use std::cell::RefCell;
use std::rc::Rc;

use crate::observable::{DependencySource, Subscriber, Subscription, collect_live};

/// One structural change to an [`ObservableVec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VecChange<T> {
    /// The backing value was wholesale-replaced (including to or from
    /// `None`). Subscribers should resynchronize from the current state.
    Refresh,
    /// `len` elements were inserted starting at `index`.
    Inserted { index: usize, len: usize },
    /// The given elements were removed starting at `index`.
    Removed { index: usize, removed: Vec<T> },
    /// `removed` elements starting at `index` were replaced by `len` new
    /// elements at the same position.
    Replaced {
        index: usize,
        removed: Vec<T>,
        len: usize,
    },
    /// Elements were reordered with no addition or removal.
    /// `mapping[old_index] == new_index`.
    Permuted { mapping: Vec<usize> },
}

struct Inner<T> {
    value: Option<Vec<T>>,
    version: u64,
    subscribers: Vec<std::rc::Weak<Subscriber<VecChange<T>>>>,
}

/// A shared, nullable observable sequence.
///
/// Cloning an `ObservableVec` creates a new handle to the **same** sequence.
pub struct ObservableVec<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for ObservableVec<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ObservableVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ObservableVec")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> ObservableVec<T> {
    /// Create an observable sequence with the given initial value.
    pub fn new(value: Option<Vec<T>>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Shorthand for a non-null sequence.
    pub fn from_vec(value: Vec<T>) -> Self {
        Self::new(Some(value))
    }

    /// Shorthand for a null sequence.
    pub fn null() -> Self {
        Self::new(None)
    }

    /// Whether the backing value is `None`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.inner.borrow().value.is_none()
    }

    /// Element count; a null sequence has zero elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().value.as_ref().map_or(0, Vec::len)
    }

    /// Whether the sequence is null or has zero elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a clone of the backing value.
    #[must_use]
    pub fn get(&self) -> Option<Vec<T>> {
        self.inner.borrow().value.clone()
    }

    /// Access the backing value as a slice without cloning. `None` when the
    /// sequence is null.
    pub fn with<R>(&self, f: impl FnOnce(Option<&[T]>) -> R) -> R {
        f(self.inner.borrow().value.as_deref())
    }

    /// Current version. Increments by 1 per effective mutation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Register a callback invoked with each structural change.
    pub fn subscribe(&self, callback: impl Fn(&VecChange<T>) + 'static) -> Subscription {
        let strong = Rc::new(Subscriber {
            notify: Box::new(callback) as Box<dyn Fn(&VecChange<T>)>,
        });
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription::new(strong)
    }

    /// Wholesale-replace the backing value. Emits [`VecChange::Refresh`]
    /// unless the new value equals the old one.
    pub fn replace_all(&self, value: Option<Vec<T>>) -> bool {
        let to_notify = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return false;
            }
            inner.value = value;
            inner.version += 1;
            collect_live(&mut inner.subscribers)
        };
        let change = VecChange::Refresh;
        for sub in &to_notify {
            (sub.notify)(&change);
        }
        true
    }

    /// Insert `value` at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the sequence is null or `index > len`.
    pub fn insert(&self, index: usize, value: T) {
        self.insert_all(index, vec![value]);
    }

    /// Append `value` at the end.
    pub fn push(&self, value: T) {
        let len = self.len();
        self.insert(len, value);
    }

    /// Insert `values` starting at `index`.
    pub fn insert_all(&self, index: usize, values: Vec<T>) {
        if values.is_empty() {
            return;
        }
        let len = values.len();
        let to_notify = {
            let mut inner = self.inner.borrow_mut();
            let vec = inner.value.as_mut().expect("insert into null sequence");
            assert!(index <= vec.len(), "insert index out of bounds");
            vec.splice(index..index, values);
            inner.version += 1;
            collect_live(&mut inner.subscribers)
        };
        let change = VecChange::Inserted { index, len };
        for sub in &to_notify {
            (sub.notify)(&change);
        }
    }

    /// Remove and return the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the sequence is null or `index >= len`.
    pub fn remove(&self, index: usize) -> T {
        let (removed, to_notify) = {
            let mut inner = self.inner.borrow_mut();
            let vec = inner.value.as_mut().expect("remove from null sequence");
            let removed = vec.remove(index);
            inner.version += 1;
            (removed, collect_live(&mut inner.subscribers))
        };
        let change = VecChange::Removed {
            index,
            removed: vec![removed.clone()],
        };
        for sub in &to_notify {
            (sub.notify)(&change);
        }
        removed
    }

    /// Replace the element at `index` with `value`.
    ///
    /// A no-op if `value` equals the current element.
    pub fn set(&self, index: usize, value: T) -> bool {
        let (old, to_notify) = {
            let mut inner = self.inner.borrow_mut();
            let vec = inner.value.as_mut().expect("set on null sequence");
            if vec[index] == value {
                return false;
            }
            let old = std::mem::replace(&mut vec[index], value);
            inner.version += 1;
            (old, collect_live(&mut inner.subscribers))
        };
        let change = VecChange::Replaced {
            index,
            removed: vec![old],
            len: 1,
        };
        for sub in &to_notify {
            (sub.notify)(&change);
        }
        true
    }

    /// Replace `remove` elements starting at `index` with `values`, emitting
    /// a single change for the whole span.
    ///
    /// A no-op if the replaced span equals `values`. Degenerate spans emit
    /// the narrower [`VecChange::Inserted`] or [`VecChange::Removed`].
    ///
    /// # Panics
    ///
    /// Panics if the sequence is null or `index + remove > len`.
    pub fn splice(&self, index: usize, remove: usize, values: Vec<T>) -> bool {
        let (removed, len, to_notify) = {
            let mut inner = self.inner.borrow_mut();
            let vec = inner.value.as_mut().expect("splice on null sequence");
            assert!(index + remove <= vec.len(), "splice range out of bounds");
            if vec[index..index + remove] == values[..] {
                return false;
            }
            let len = values.len();
            let removed: Vec<T> = vec.splice(index..index + remove, values).collect();
            inner.version += 1;
            (removed, len, collect_live(&mut inner.subscribers))
        };
        let change = if removed.is_empty() {
            VecChange::Inserted { index, len }
        } else if len == 0 {
            VecChange::Removed { index, removed }
        } else {
            VecChange::Replaced {
                index,
                removed,
                len,
            }
        };
        for sub in &to_notify {
            (sub.notify)(&change);
        }
        true
    }

    /// Reorder elements according to `mapping`, where
    /// `mapping[old_index] == new_index`.
    ///
    /// A no-op if the mapping is the identity.
    ///
    /// # Panics
    ///
    /// Panics if the sequence is null, `mapping.len() != len`, or `mapping`
    /// is not a permutation of `0..len`.
    pub fn permute(&self, mapping: &[usize]) -> bool {
        let to_notify = {
            let mut inner = self.inner.borrow_mut();
            let vec = inner.value.as_mut().expect("permute on null sequence");
            assert_eq!(mapping.len(), vec.len(), "permutation length mismatch");
            if mapping.iter().enumerate().all(|(i, &m)| i == m) {
                return false;
            }
            let mut reordered: Vec<Option<T>> = (0..vec.len()).map(|_| None).collect();
            for (old_index, value) in vec.drain(..).enumerate() {
                let slot = &mut reordered[mapping[old_index]];
                assert!(slot.is_none(), "mapping is not a permutation");
                *slot = Some(value);
            }
            vec.extend(reordered.into_iter().map(|v| v.expect("complete permutation")));
            inner.version += 1;
            collect_live(&mut inner.subscribers)
        };
        let change = VecChange::Permuted {
            mapping: mapping.to_vec(),
        };
        for sub in &to_notify {
            (sub.notify)(&change);
        }
        true
    }
}

impl<T: Clone + PartialEq + Ord + 'static> ObservableVec<T> {
    /// Sort the sequence, emitting a single permutation change.
    pub fn sort(&self) -> bool {
        let mapping = {
            let inner = self.inner.borrow();
            let vec = inner.value.as_ref().expect("sort on null sequence");
            let mut order: Vec<usize> = (0..vec.len()).collect();
            order.sort_by(|&a, &b| vec[a].cmp(&vec[b]));
            // order[new] == old; invert to mapping[old] == new.
            let mut mapping = vec![0usize; order.len()];
            for (new_index, &old_index) in order.iter().enumerate() {
                mapping[old_index] = new_index;
            }
            mapping
        };
        self.permute(&mapping)
    }
}

impl<T: Clone + PartialEq + 'static> DependencySource for ObservableVec<T> {
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
