//! Server Expiry Task
//!
//! Background task that periodically asks the server coordinator to
//! invalidate every key whose announced deadline has passed.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::protocol::current_timestamp_ms;
use crate::server::ServerHandle;

/// Spawns the expiry loop. It ends on its own once the coordinator is gone.
pub fn spawn_expiry_task(server: ServerHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting server expiry task with interval of {}ms",
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            if server.expire_due(current_timestamp_ms()).is_err() {
                debug!("Coordinator gone, stopping expiry task");
                break;
            }
        }
    })
}
