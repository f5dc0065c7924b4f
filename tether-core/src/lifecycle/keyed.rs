//! Per-key serialization.
//!
//! Every template key has its own FIFO async mutex; different keys never
//! contend. Slots are created on demand and removed once nobody holds or
//! waits for them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

use crate::types::LifecycleState;

/// One key's lock plus the number of holders and waiters using it.
#[derive(Default, Debug)]
struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    users: usize,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

fn lock_slots<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // The maps are only mutated by short non-panicking sections.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of per-key async locks.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Slots,
}

/// Exclusive hold on one key. Released on drop.
///
/// Also exists, without the inner guard, while its acquisition is still
/// waiting, so an abandoned wait gives its slot back.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    slots: Slots,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let lock = {
            let mut slots = lock_slots(&self.slots);
            let slot = slots.entry(key.to_string()).or_default();
            slot.users += 1;
            Arc::clone(&slot.lock)
        };
        let mut held = KeyGuard {
            key: key.to_string(),
            slots: Arc::clone(&self.slots),
            guard: None,
        };
        held.guard = Some(lock.lock_owned().await);
        held
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        lock_slots(&self.slots).len()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut slots = lock_slots(&self.slots);
        self.guard.take();
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

/// Transient states (`Provisioning`, `Reclaiming`) of keys with a gateway
/// call in flight.
#[derive(Default)]
pub struct InFlight {
    states: Arc<Mutex<HashMap<String, LifecycleState>>>,
}

/// Marks a key as in flight until dropped; dropping reverts the mark, so an
/// early return leaves the key in its pre-transition state.
pub struct InFlightMark {
    key: String,
    states: Arc<Mutex<HashMap<String, LifecycleState>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, key: &str, state: LifecycleState) -> InFlightMark {
        lock_slots(&self.states).insert(key.to_string(), state);
        InFlightMark {
            key: key.to_string(),
            states: Arc::clone(&self.states),
        }
    }

    pub fn get(&self, key: &str) -> Option<LifecycleState> {
        lock_slots(&self.states).get(key).copied()
    }

    pub fn is(&self, key: &str, state: LifecycleState) -> bool {
        self.get(key) == Some(state)
    }
}

impl Drop for InFlightMark {
    fn drop(&mut self) {
        lock_slots(&self.states).remove(&self.key);
    }
}
