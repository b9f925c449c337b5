//! Scheduling glue around the synchronous core.
//!
//! The sweep itself is synchronous and bounded (it works over a
//! snapshot), so the task here is just a ticker. Embedders that bring
//! their own scheduler can ignore this module and call
//! [`ReplicatedStore::scavenge`] directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::store::ReplicatedStore;

/// Drive periodic scavenging at the store's configured cadence.
///
/// Returns the task handle; abort it at shutdown.
pub fn spawn_scavenger(store: Arc<ReplicatedStore>) -> JoinHandle<()> {
    let interval = Duration::from_secs(store.config().scavenger.interval_secs);
    spawn_scavenger_with_interval(store, interval)
}

/// Drive periodic scavenging at an explicit cadence.
pub fn spawn_scavenger_with_interval(
    store: Arc<ReplicatedStore>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of `interval` fires immediately; consume it so
        // sweeps start one full period after spawn.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let outcome = store.scavenge();
            if outcome.removed > 0 {
                debug!(
                    examined = outcome.examined,
                    removed = outcome.removed,
                    "periodic scavenge"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReplicationConfig, ScavengerConfig};
    use crate::manager::DetachedManager;
    use crate::publish::NoopPublisher;
    use crate::state::{SessionId, now_millis};

    fn test_store() -> Arc<ReplicatedStore> {
        let config = ReplicationConfig {
            actual_max_inactive_secs: 0,
            scavenger: ScavengerConfig {
                interval_secs: 30,
                extra_time_secs: 0,
            },
        };
        Arc::new(
            ReplicatedStore::new(config, Arc::new(NoopPublisher), Arc::new(DetachedManager))
                .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_sweeps_expired_sessions() {
        let store = test_store();
        let id = SessionId::from("s1");
        store.new_state(&id, 10).unwrap();
        {
            let state = store.load_state(&id).unwrap();
            let mut guard = state.lock().unwrap();
            guard.set_last_accessed_time(now_millis() - 60_000);
        }

        let task = spawn_scavenger(store.clone());
        // Let the spawned task reach its first await.
        tokio::task::yield_now().await;
        assert_eq!(store.session_count(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert_eq!(store.session_count(), 0);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_does_not_sweep_before_the_first_period() {
        let store = test_store();
        store.new_state(&SessionId::from("fresh"), 1800).unwrap();

        let task = spawn_scavenger_with_interval(store.clone(), Duration::from_secs(30));
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(store.session_count(), 1);

        task.abort();
    }
}
