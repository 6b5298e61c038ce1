use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Captured at the start of a keyed load; checked again before committing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    selector: K,
    generation: u64,
}

impl<K> Ticket<K> {
    pub fn selector(&self) -> &K {
        &self.selector
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Tracks the selector a list is currently keyed by. A response is only
/// committed when it belongs to the latest load for the current selector.
#[derive(Debug, Clone)]
pub struct SelectorGuard<K> {
    current: Option<K>,
    generation: u64,
}

impl<K> Default for SelectorGuard<K> {
    fn default() -> Self {
        Self {
            current: None,
            generation: 0,
        }
    }
}

impl<K: Clone + PartialEq> SelectorGuard<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&K> {
        self.current.as_ref()
    }

    /// Switches to `selector` and returns the ticket for the load it starts.
    pub fn select(&mut self, selector: K) -> Ticket<K> {
        self.generation += 1;
        self.current = Some(selector.clone());
        Ticket {
            selector,
            generation: self.generation,
        }
    }

    /// Re-issues a ticket for the current selector (manual refresh).
    pub fn reload(&mut self) -> Option<Ticket<K>> {
        let selector = self.current.clone()?;
        Some(self.select(selector))
    }

    pub fn is_current(&self, ticket: &Ticket<K>) -> bool {
        self.generation == ticket.generation && self.current.as_ref() == Some(&ticket.selector)
    }
}

/// Shared flag flipped when the owner of a background load goes away.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
