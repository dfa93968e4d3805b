//! Background sweep that destroys environments past their TTL.
//!
//! The reaper is the crash-safety backstop behind the executor's own
//! cleanup: anything an execution path failed to remove is destroyed
//! within one sweep interval of its expiry.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{LifecycleRegistry, SandboxHandle};
use crate::sandbox::{IsolationBackend, SandboxId};

/// Periodic destroyer of expired environments.
pub struct Reaper {
    registry: Arc<LifecycleRegistry>,
    backend: Arc<dyn IsolationBackend>,
    interval: Duration,
}

impl Reaper {
    /// Create a reaper sweeping `registry` every `interval`.
    pub fn new(
        registry: Arc<LifecycleRegistry>,
        backend: Arc<dyn IsolationBackend>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            backend,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Time between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Destroy every handle expired now.
    ///
    /// Returns the ids swept out of the registry. Each one is removed
    /// whether or not its destroy call succeeded; failures are logged
    /// and never retried.
    pub async fn sweep(&self) -> Vec<SandboxId> {
        self.sweep_at(Utc::now()).await
    }

    /// Destroy every handle expired at `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<SandboxId> {
        let expired = self.registry.take_expired(now);
        if expired.is_empty() {
            return Vec::new();
        }
        self.destroy_all(expired, "expired").await
    }

    /// Destroy every registered handle regardless of expiry.
    pub async fn drain(&self) -> Vec<SandboxId> {
        let remaining = self.registry.drain();
        if remaining.is_empty() {
            return Vec::new();
        }
        info!("Destroying {} remaining sandbox(es)", remaining.len());
        self.destroy_all(remaining, "shutdown").await
    }

    async fn destroy_all(&self, handles: Vec<SandboxHandle>, reason: &str) -> Vec<SandboxId> {
        let mut swept = Vec::with_capacity(handles.len());
        for handle in handles {
            match self.backend.destroy(&handle.id).await {
                Ok(()) => {
                    info!(
                        event = "sandbox_reaped",
                        sandbox = %handle.id.short(),
                        reason,
                        state = ?handle.state,
                        age_secs = (Utc::now() - handle.created_at).num_seconds(),
                    );
                }
                Err(e) => {
                    warn!(
                        event = "cleanup_failure",
                        sandbox = %handle.id.short(),
                        reason,
                        category = e.category(),
                        "{e}"
                    );
                }
            }
            swept.push(handle.id);
        }
        swept
    }

    /// Run sweeps on a fixed interval until `cancel` fires.
    ///
    /// The first sweep happens one interval after spawning.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("Reaper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let swept = self.sweep().await;
                        if !swept.is_empty() {
                            debug!("Sweep removed {} sandbox(es)", swept.len());
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{MockBackend, MockRun, ResourceLimits};

    async fn provision(backend: &MockBackend) -> SandboxId {
        let dir = tempfile::tempdir().unwrap();
        backend
            .provision(&ResourceLimits::default(), dir.path())
            .await
            .unwrap()
    }

    fn setup() -> (Arc<LifecycleRegistry>, MockBackend, Reaper) {
        let registry = Arc::new(LifecycleRegistry::new());
        let backend = MockBackend::always(MockRun::exit(0, ""));
        let reaper = Reaper::new(
            Arc::clone(&registry),
            Arc::new(backend.clone()),
            Duration::from_millis(20),
        );
        (registry, backend, reaper)
    }

    #[tokio::test]
    async fn test_sweep_destroys_only_expired() {
        let (registry, backend, reaper) = setup();
        let expired = provision(&backend).await;
        let fresh = provision(&backend).await;
        registry.register(expired.clone(), Duration::ZERO);
        registry.register(fresh.clone(), Duration::from_secs(3600));

        let swept = reaper.sweep().await;

        assert_eq!(swept, vec![expired.clone()]);
        assert_eq!(backend.live(), vec![fresh.clone()]);
        assert!(registry.contains(&fresh));
        assert!(!registry.contains(&expired));
    }

    #[tokio::test]
    async fn test_sweep_never_touches_unbounded_ttl() {
        let (registry, backend, reaper) = setup();
        let id = provision(&backend).await;
        registry.register(id.clone(), Duration::MAX);

        let far_future = Utc::now() + chrono::Duration::days(365 * 100);
        assert!(reaper.sweep_at(far_future).await.is_empty());
        assert!(registry.contains(&id));
        assert!(backend.destroyed().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_removes_entry_even_when_destroy_fails() {
        let (registry, backend, reaper) = setup();
        let id = provision(&backend).await;
        registry.register(id.clone(), Duration::ZERO);
        backend.set_fail_destroy(true);

        let swept = reaper.sweep().await;

        assert_eq!(swept, vec![id.clone()]);
        assert!(registry.is_empty());
        // Not retried on the next tick
        assert!(reaper.sweep().await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_after_owner_cleanup_is_noop() {
        let (registry, backend, reaper) = setup();
        let id = provision(&backend).await;
        registry.register(id.clone(), Duration::ZERO);

        // Owner cleaned up first
        backend.destroy(&id).await.unwrap();
        registry.unregister(&id);

        assert!(reaper.sweep().await.is_empty());
        assert_eq!(backend.destroyed(), vec![id]);
    }

    #[tokio::test]
    async fn test_drain_destroys_everything() {
        let (registry, backend, reaper) = setup();
        for _ in 0..3 {
            let id = provision(&backend).await;
            registry.register(id, Duration::from_secs(3600));
        }

        let drained = reaper.drain().await;

        assert_eq!(drained.len(), 3);
        assert!(registry.is_empty());
        assert!(backend.live().is_empty());
    }

    #[tokio::test]
    async fn test_spawned_reaper_sweeps_on_next_tick_and_stops() {
        let (registry, backend, reaper) = setup();
        let reaper = Arc::new(reaper);
        let cancel = CancellationToken::new();
        let task = Arc::clone(&reaper).spawn(cancel.clone());

        let id = provision(&backend).await;
        registry.register(id.clone(), Duration::ZERO);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while registry.contains(&id) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!registry.contains(&id));
        assert!(backend.live().is_empty());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }
}
