#![forbid(unsafe_code)]

//! Marshals asynchronous validation results back to the owning thread.
//!
//! # Design
//!
//! The engine is single-writer: only the owning thread touches validation
//! state. Asynchronous validators complete on arbitrary threads, so their
//! results travel through a single-consumer channel. [`CompletionSink`] is
//! the cheap, cloneable, `Send` producer handle a [`Constraint`] carries as
//! its completion executor; [`ValidationPump`] owns the consumer end plus a
//! registry of live validation subjects.
//!
//! The owning thread periodically calls [`drain()`](ValidationPump::drain)
//! (or [`drain_timeout()`](ValidationPump::drain_timeout) when it has
//! nothing better to do). Each queued delivery is routed to its subject,
//! which re-checks the delivery's generation stamp against the current one
//! before applying anything — the [`Ticket`] is the staleness token.
//!
//! # Invariants
//!
//! 1. Deliveries for unregistered (disposed) subjects are dropped silently.
//! 2. Delivery order between distinct constraints is irrelevant; subjects
//!    aggregate idempotently.
//! 3. Registering and unregistering happens only on the owning thread.
//!
//! [`Constraint`]: crate::Constraint

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::error::ValidatorError;
use crate::result::ValidationResult;

/// Identifies one validation subject (a scalar value, a collection, or a
/// collection element) within its pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectId(pub(crate) u64);

/// Staleness token for one validation attempt: the subject, the constraint
/// slot within that subject, and the generation current when the attempt
/// started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub(crate) subject: SubjectId,
    pub(crate) slot: usize,
    pub(crate) generation: u64,
}

/// One completed asynchronous validation travelling back to the owner.
pub(crate) struct Delivery<D> {
    pub(crate) ticket: Ticket,
    pub(crate) result: Result<ValidationResult<D>, ValidatorError>,
}

/// Producer handle for asynchronous completions.
///
/// Cloneable and `Send`; a constraint configured with a sink is an
/// *asynchronous* constraint. Obtain one from [`ValidationPump::sink`].
pub struct CompletionSink<D> {
    tx: mpsc::Sender<Delivery<D>>,
}

impl<D> Clone for CompletionSink<D> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<D> CompletionSink<D> {
    /// Post a delivery. If the pump is gone the delivery is dropped; the
    /// subject it was headed for no longer exists either.
    pub(crate) fn post(&self, delivery: Delivery<D>) {
        let _ = self.tx.send(delivery);
    }
}

impl<D> std::fmt::Debug for CompletionSink<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CompletionSink")
    }
}

/// Implemented by engine cores that can absorb routed deliveries.
pub(crate) trait AsyncTarget<D> {
    /// Apply a delivered result if its ticket generation is still current.
    fn apply_delivery(&self, ticket: Ticket, result: Result<ValidationResult<D>, ValidatorError>);
}

/// Owner-thread mailbox for asynchronous validation completions.
///
/// One pump serves any number of validation subjects sharing a diagnostic
/// type `D`. Create it once, hand [`sink()`](Self::sink) handles to
/// asynchronous constraints, and drain it from the owning thread's loop.
pub struct ValidationPump<D> {
    tx: mpsc::Sender<Delivery<D>>,
    rx: mpsc::Receiver<Delivery<D>>,
    subjects: RefCell<HashMap<SubjectId, Weak<dyn AsyncTarget<D>>>>,
    next_subject: Cell<u64>,
}

impl<D: 'static> ValidationPump<D> {
    /// Create a pump on the owning thread.
    pub fn new() -> Rc<Self> {
        let (tx, rx) = mpsc::channel();
        Rc::new(Self {
            tx,
            rx,
            subjects: RefCell::new(HashMap::new()),
            next_subject: Cell::new(0),
        })
    }

    /// Producer handle for asynchronous constraints.
    #[must_use]
    pub fn sink(&self) -> CompletionSink<D> {
        CompletionSink {
            tx: self.tx.clone(),
        }
    }

    /// Number of live registered subjects.
    #[must_use]
    pub fn subject_count(&self) -> usize {
        self.subjects
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub(crate) fn register(&self, target: Weak<dyn AsyncTarget<D>>) -> SubjectId {
        let id = SubjectId(self.next_subject.get());
        self.next_subject.set(id.0 + 1);
        self.subjects.borrow_mut().insert(id, target);
        id
    }

    pub(crate) fn unregister(&self, id: SubjectId) {
        self.subjects.borrow_mut().remove(&id);
    }

    /// Route all queued deliveries without blocking. Returns the number of
    /// deliveries routed (stale and orphaned ones included).
    pub fn drain(&self) -> usize {
        let mut routed = 0;
        while let Ok(delivery) = self.rx.try_recv() {
            self.route(delivery);
            routed += 1;
        }
        routed
    }

    /// Route deliveries as they arrive until `timeout` has elapsed, then
    /// drain whatever is left without blocking.
    ///
    /// This is a convenience for tests and simple owner loops; an event-loop
    /// integration would poll [`drain()`](Self::drain) instead.
    pub fn drain_timeout(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut routed = 0;
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero())
            else {
                break;
            };
            match self.rx.recv_timeout(remaining) {
                Ok(delivery) => {
                    self.route(delivery);
                    routed += 1;
                }
                Err(_) => break,
            }
        }
        routed + self.drain()
    }

    fn route(&self, delivery: Delivery<D>) {
        let target = self
            .subjects
            .borrow()
            .get(&delivery.ticket.subject)
            .and_then(Weak::upgrade);
        match target {
            Some(target) => target.apply_delivery(delivery.ticket, delivery.result),
            None => {
                // Subject disposed while the validator was in flight.
                self.subjects.borrow_mut().remove(&delivery.ticket.subject);
            }
        }
    }
}
