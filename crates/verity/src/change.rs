#![forbid(unsafe_code)]

//! Aggregates structural changes into one contiguous replaced range.
//!
//! # Design
//!
//! The constrained view of a collection is only updated when every
//! constraint has accepted the current backing state. Any number of backing
//! changes can pile up before that happens, and applying them one by one
//! would surface intermediate elements (added, then removed again) to view
//! observers. The aggregator merges the queue into a single
//! [`ReplacedRange`]: elements that come and go inside one aggregation run
//! never appear in the result.
//!
//! # Invariant
//!
//! At all times, `view` (the last applied state) with `view[from..from +
//! remove_size]` replaced by `added` equals the current backing state
//! restricted to this aggregation run. Recorded changes arrive in *current*
//! (backing) coordinates; the merge translates them into the pending window
//! before splicing.

/// A single contiguous replacement: `remove_size` elements at `from` give
/// way to `added`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacedRange<T> {
    pub from: usize,
    pub remove_size: usize,
    pub added: Vec<T>,
}

impl<T> ReplacedRange<T> {
    /// A change that moves nothing.
    pub fn empty() -> Self {
        Self {
            from: 0,
            remove_size: 0,
            added: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remove_size == 0 && self.added.is_empty()
    }
}

/// Merges a sequence of structural changes into one [`ReplacedRange`].
///
/// `view` passed to the recording methods is the state the aggregate will
/// eventually be applied to: the constrained view's current content.
#[derive(Debug)]
pub(crate) struct VecChangeAggregator<T> {
    /// Start of the pending window, in view coordinates. `None` when no
    /// change is pending.
    from: Option<usize>,
    remove_size: usize,
    added: Vec<T>,
}

impl<T: Clone + PartialEq> VecChangeAggregator<T> {
    pub(crate) fn new() -> Self {
        Self {
            from: None,
            remove_size: 0,
            added: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.from.is_none()
    }

    /// Record `elements` inserted at `index` of the current backing state.
    pub(crate) fn record_inserted(&mut self, view: &[T], index: usize, elements: &[T]) {
        self.merge(view, index, 0, elements);
    }

    /// Record `count` elements removed at `index`.
    pub(crate) fn record_removed(&mut self, view: &[T], index: usize, count: usize) {
        self.merge(view, index, count, &[]);
    }

    /// Record `removed` elements at `index` replaced by `elements`.
    pub(crate) fn record_replaced(
        &mut self,
        view: &[T],
        index: usize,
        removed: usize,
        elements: &[T],
    ) {
        self.merge(view, index, removed, elements);
    }

    /// Complete the aggregation run and return the pending change. The
    /// result must be applied to the view before recording resumes.
    pub(crate) fn complete(&mut self) -> ReplacedRange<T> {
        let Some(from) = self.from.take() else {
            return ReplacedRange::empty();
        };
        let change = ReplacedRange {
            from,
            remove_size: self.remove_size,
            added: std::mem::take(&mut self.added),
        };
        self.remove_size = 0;
        change
    }

    /// Merge one change, given in current (backing) coordinates: `c_removed`
    /// elements at `c_from` replaced by `c_added`.
    fn merge(&mut self, view: &[T], c_from: usize, c_removed: usize, c_added: &[T]) {
        if c_removed == 0 && c_added.is_empty() {
            return;
        }

        let Some(from) = self.from else {
            self.from = Some(c_from);
            self.remove_size = c_removed;
            self.added = c_added.to_vec();
            return;
        };

        // Grow the window leftward so it starts at or before c_from. The
        // region ahead of the old window is untouched view content, so
        // current and view coordinates coincide there.
        let mut from = from;
        if c_from < from {
            self.added.splice(0..0, view[c_from..from].iter().cloned());
            self.remove_size += from - c_from;
            from = c_from;
            self.from = Some(from);
        }

        // Grow the window rightward so it covers the incoming change's span.
        // Current coordinates past the window map to view coordinates
        // shifted by (remove_size - added.len()).
        let window_end = from + self.added.len();
        let target = c_from + c_removed;
        if target > window_end {
            let extend = target - window_end;
            let view_start = from + self.remove_size;
            self.added
                .extend(view[view_start..view_start + extend].iter().cloned());
            self.remove_size += extend;
        }

        // The span now lies inside the pending window; splice in place.
        let local = c_from - from;
        self.added
            .splice(local..local + c_removed, c_added.iter().cloned());
    }
}
