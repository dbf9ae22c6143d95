//! Periodic eviction of stale cooldown entries.
//!
//! Without a sweep the cooldown table grows by one entry per distinct
//! client forever. The sweeper wakes on a fixed interval and drops every
//! entry whose last placement is older than the retention window.

use std::sync::Arc;
use std::time::Duration;

use pxls_core::{Clock, CooldownTracker};
use tokio::task::JoinHandle;
use tracing::debug;

/// Run one sweep and log the result. Returns the number of evicted
/// entries.
pub fn sweep_once(cooldowns: &CooldownTracker, clock: &dyn Clock) -> usize {
    let removed = cooldowns.sweep(clock.now_millis());
    if removed > 0 {
        debug!(
            removed,
            remaining = cooldowns.tracked_identities(),
            "swept stale cooldown entries"
        );
    }
    removed
}

/// Spawn the sweep loop. The task runs until aborted.
pub fn spawn_sweeper(
    cooldowns: Arc<CooldownTracker>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing is stale at startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(&cooldowns, clock.as_ref());
        }
    })
}
