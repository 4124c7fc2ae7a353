#![forbid(unsafe_code)]

//! Per-subject diagnostic accumulation.
//!
//! One slot per constraint, in constraint order. A slot holds at most one
//! diagnostic together with the verdict that produced it; starting a new
//! validation attempt clears the slot. The list is cheap to clone and
//! compare, so engines expose it through an
//! [`Observable`](verity_reactive::Observable) and rely on set-equal elision
//! to suppress no-op notifications.

/// Diagnostics for one validation subject, indexed by constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticList<D> {
    slots: Vec<Option<(D, bool)>>,
}

impl<D: Clone> DiagnosticList<D> {
    /// An empty list with one slot per constraint.
    pub fn new(constraint_count: usize) -> Self {
        Self {
            slots: vec![None; constraint_count],
        }
    }

    pub(crate) fn set(&mut self, index: usize, diagnostic: D, valid: bool) {
        self.slots[index] = Some((diagnostic, valid));
    }

    pub(crate) fn clear(&mut self, index: usize) {
        self.slots[index] = None;
    }

    /// All present diagnostics, in constraint order.
    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.slots.iter().flatten().map(|(d, _)| d)
    }

    /// Diagnostics attached to failing outcomes, in constraint order.
    pub fn invalid(&self) -> impl Iterator<Item = &D> {
        self.slots
            .iter()
            .flatten()
            .filter(|(_, valid)| !valid)
            .map(|(d, _)| d)
    }

    /// Diagnostics attached to passing outcomes, in constraint order.
    pub fn valid(&self) -> impl Iterator<Item = &D> {
        self.slots
            .iter()
            .flatten()
            .filter(|(_, valid)| *valid)
            .map(|(d, _)| d)
    }

    /// The diagnostic for one constraint, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&D> {
        self.slots.get(index).and_then(|s| s.as_ref()).map(|(d, _)| d)
    }

    /// Number of present diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Whether no diagnostics are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
