//! TTL Sweep Task
//!
//! Background task that periodically removes expired entries from a store.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::ExpiringStore;

/// Spawns the sweeper for `store`.
///
/// Every `interval` the task calls [`ExpiringStore::sweep_once`], which
/// inspects a bounded batch of entries. The task exits when `stop` turns
/// `true`, when the sender side is dropped, or when the store itself is
/// gone. It only holds a weak reference so it never keeps a store alive.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(
    store: Weak<ExpiringStore>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "starting TTL sweeper");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let Some(store) = store.upgrade() else {
                        debug!("store dropped, sweeper exiting");
                        break;
                    };
                    let removed = store.sweep_once().await;
                    if removed > 0 {
                        info!(removed, "TTL sweep removed expired entries");
                    } else {
                        debug!("TTL sweep: no expired entries found");
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("TTL sweeper stopped");
    })
}
