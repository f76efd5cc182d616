//! Local Expiry Sweep
//!
//! Background task that periodically removes aged entries from a client's
//! entry store. Reads already hide aged entries; the sweep bounds memory for
//! keys that are never read again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::EntryStore;

/// Interval until the next sweep.
///
/// Never longer than the local TTL when one is set, so nothing outlives the
/// bound by more than one TTL.
pub fn sweep_interval(base_interval_ms: u64, max_local_entry_age_ms: u64) -> Duration {
    let base = base_interval_ms.max(1);
    let millis = if max_local_entry_age_ms > 0 {
        base.min(max_local_entry_age_ms)
    } else {
        base
    };
    Duration::from_millis(millis)
}

/// Spawns the sweep loop for `store`.
///
/// The TTL is re-read on every iteration, so a changed
/// `max_local_entry_age` takes effect from the next tick. `on_expired` is
/// awaited with the removed keys while the store lock is still held, so a
/// concurrent write of the same key is always ordered after it. Abort the
/// returned handle to stop the loop.
pub fn spawn_sweep_task<F, Fut>(
    store: Arc<RwLock<EntryStore>>,
    base_interval_ms: u64,
    on_expired: F,
) -> JoinHandle<()>
where
    F: Fn(Vec<String>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        info!(
            "Starting local expiry sweep with base interval of {}ms",
            base_interval_ms
        );

        loop {
            let max_age = store.read().await.max_local_entry_age();
            tokio::time::sleep(sweep_interval(base_interval_ms, max_age)).await;

            let mut guard = store.write().await;
            let removed = guard.cleanup_expired();
            if !removed.is_empty() {
                debug!("Local sweep: removed {} expired entries", removed.len());
                on_expired(removed).await;
            }
            drop(guard);
        }
    })
}
