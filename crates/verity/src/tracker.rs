#![forbid(unsafe_code)]

//! Groups dependency subscriptions for one validation subject.
//!
//! Each constraint's dependency set is subscribed once per distinct source
//! (duplicate entries share one subscription), and every invalidation routes
//! to that constraint's re-evaluation callback. All subscriptions for the
//! subject are torn down as a group when the tracker drops — the engine owns
//! its subscriptions outright, no weak-listener cleanup.

use std::collections::HashSet;
use std::rc::Rc;

use verity_reactive::{DependencySource, Subscription};

pub(crate) struct DependencyTracker {
    subscriptions: Vec<Subscription>,
}

impl DependencyTracker {
    pub(crate) fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Subscribe `on_invalidated` to every distinct source in `dependencies`.
    pub(crate) fn track(
        &mut self,
        dependencies: &[Rc<dyn DependencySource>],
        on_invalidated: impl Fn() + Clone + 'static,
    ) {
        let mut seen = HashSet::new();
        for dependency in dependencies {
            if seen.insert(dependency.source_id()) {
                let callback = on_invalidated.clone();
                self.subscriptions
                    .push(dependency.subscribe_invalidation(Box::new(move || callback())));
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}
