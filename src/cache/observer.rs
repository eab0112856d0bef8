//! Eviction Observer Module
//!
//! Ordered registry of callbacks fired whenever an entry leaves the store.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

// == Eviction Reason ==
/// Why an entry left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Explicit `delete`, including LRU overflow evictions
    Deleted,
    /// Removed by `load_and_delete`
    Taken,
    /// Found expired on access
    Expired,
    /// Removed by the background sweeper
    Swept,
    /// Released by store shutdown
    Shutdown,
}

impl EvictionReason {
    /// True when the entry left because its TTL elapsed.
    pub fn is_expiry(self) -> bool {
        matches!(self, EvictionReason::Expired | EvictionReason::Swept)
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionReason::Deleted => "deleted",
            EvictionReason::Taken => "taken",
            EvictionReason::Expired => "expired",
            EvictionReason::Swept => "swept",
            EvictionReason::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

// == Observer Trait ==
/// Callback invoked once per eviction event.
///
/// Runs while the store's write lock is held: implementations must not call
/// back into the store, and must not register or unregister observers.
pub trait EvictionObserver: Send + Sync {
    fn on_evict(&self, key: &str, value: &[u8], reason: EvictionReason);
}

impl<F> EvictionObserver for F
where
    F: Fn(&str, &[u8], EvictionReason) + Send + Sync,
{
    fn on_evict(&self, key: &str, value: &[u8], reason: EvictionReason) {
        self(key, value, reason)
    }
}

/// Handle returned by [`ObserverChain::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Registration {
    id: ObserverId,
    name: String,
    observer: Arc<dyn EvictionObserver>,
}

// == Observer Chain ==
/// Registered observers, fired newest registration first.
#[derive(Default)]
pub struct ObserverChain {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl ObserverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer to the front of the firing order.
    pub fn register(
        &self,
        name: impl Into<String>,
        observer: Arc<dyn EvictionObserver>,
    ) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations.write().push(Registration {
            id,
            name: name.into(),
            observer,
        });
        id
    }

    /// Removes an observer. Returns false if the id was unknown.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    /// Fires every observer for one eviction event.
    pub fn notify(&self, key: &str, value: &[u8], reason: EvictionReason) {
        let registrations = self.registrations.read();
        for registration in registrations.iter().rev() {
            registration.observer.on_evict(key, value, reason);
        }
    }

    /// Observer names in firing order.
    pub fn names(&self) -> Vec<String> {
        self.registrations
            .read()
            .iter()
            .rev()
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ObserverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverChain")
            .field("observers", &self.names())
            .finish()
    }
}
