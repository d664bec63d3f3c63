//! Install queue: the drained-once output of the topological sort.

use std::collections::VecDeque;

use shipyard_core::Release;

/// Releases in install order, consumed strictly front to back.
#[derive(Debug, Clone, Default)]
pub struct InstallQueue {
    items: VecDeque<Release>,
}

impl InstallQueue {
    pub(crate) fn new(items: VecDeque<Release>) -> Self {
        Self { items }
    }

    /// Take the next release. A dequeued release never comes back.
    pub fn dequeue(&mut self) -> Option<Release> {
        self.items.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Names of the releases still queued, in order.
    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|r| r.name.clone()).collect()
    }
}
