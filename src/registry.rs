//! Lifecycle registry of live isolated environments.
//!
//! Written by the executor when it provisions an environment and swept
//! by the reaper. Every operation takes the lock only long enough to
//! touch the map; no backend call ever happens under it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::sandbox::SandboxId;

/// Where an environment is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// Created, not yet started.
    Provisioned,
    /// Program started.
    Running,
    /// Program exited on its own.
    Completed,
    /// Program exceeded its timeout.
    TimedOut,
    /// Program or environment crashed.
    Faulted,
    /// Environment removed. Terminal.
    Destroyed,
}

impl SandboxState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use SandboxState::{Completed, Destroyed, Faulted, Provisioned, Running, TimedOut};
        matches!(
            (self, next),
            (Provisioned | Running | Completed | TimedOut | Faulted, Destroyed)
                | (Provisioned, Running | Faulted)
                | (Running, Completed | TimedOut | Faulted)
        )
    }
}

/// A registered environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxHandle {
    /// Backend identifier.
    pub id: SandboxId,
    /// When the environment was registered.
    pub created_at: DateTime<Utc>,
    /// When the reaper may destroy it.
    pub expires_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: SandboxState,
}

impl SandboxHandle {
    /// Whether the handle is past its expiry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Concurrent map of live environments keyed by id.
#[derive(Debug, Default)]
pub struct LifecycleRegistry {
    entries: Mutex<HashMap<SandboxId, SandboxHandle>>,
}

impl LifecycleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly provisioned environment expiring `ttl` from now.
    ///
    /// A TTL too large to represent never expires. Registering an id
    /// twice replaces the earlier entry.
    pub fn register(&self, id: SandboxId, ttl: Duration) -> SandboxHandle {
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let handle = SandboxHandle {
            id: id.clone(),
            created_at,
            expires_at,
            state: SandboxState::Provisioned,
        };
        debug!(sandbox = %id.short(), %expires_at, "Registered sandbox");
        self.lock().insert(id, handle.clone());
        handle
    }

    /// Remove an entry. Removing an unknown id is a no-op.
    pub fn unregister(&self, id: &SandboxId) -> Option<SandboxHandle> {
        self.lock().remove(id)
    }

    /// Move an entry to `next`.
    ///
    /// Returns false if the entry is gone (e.g. reaped) or the
    /// transition is illegal; the entry is left untouched in that case.
    pub fn transition(&self, id: &SandboxId, next: SandboxState) -> bool {
        let mut entries = self.lock();
        match entries.get_mut(id) {
            Some(handle) if handle.state.can_transition_to(next) => {
                handle.state = next;
                true
            }
            _ => false,
        }
    }

    /// Remove and return every entry expired at `now`.
    ///
    /// Taking the entries out under a single lock means only one caller
    /// ever owns an expired handle.
    pub fn take_expired(&self, now: DateTime<Utc>) -> Vec<SandboxHandle> {
        let mut entries = self.lock();
        let expired: Vec<SandboxId> = entries
            .values()
            .filter(|h| h.is_expired(now))
            .map(|h| h.id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|id| entries.remove(id))
            .collect()
    }

    /// Remove and return every entry.
    pub fn drain(&self) -> Vec<SandboxHandle> {
        self.lock().drain().map(|(_, handle)| handle).collect()
    }

    /// Copy of the entry for `id`.
    pub fn get(&self, id: &SandboxId) -> Option<SandboxHandle> {
        self.lock().get(id).cloned()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &SandboxId) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of registered environments.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SandboxId, SandboxHandle>> {
        // The map stays consistent even if a holder panicked
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
