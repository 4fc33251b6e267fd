//! Background scheduling of sync cycles.
//!
//! The scheduler runs on a tokio runtime and starts a full cycle when the
//! device comes back online and on every tick of a fixed interval. Cycles
//! themselves are synchronous and run on the blocking pool; the engine's
//! running guard keeps overlapping triggers from doing duplicate work.

use crate::engine::SyncEngine;
use crate::remote::RemotePeer;
use fieldsync_core::RecordStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What started a scheduled cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Connectivity went from offline to online.
    BecameOnline,
    /// The periodic interval elapsed.
    PeriodicTick,
}

/// Spawns the scheduling loop for an engine.
#[derive(Debug, Clone, Copy)]
pub struct SyncScheduler {
    interval: Duration,
}

impl SyncScheduler {
    /// Creates a scheduler ticking every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Starts the loop on the current runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S, P>(self, engine: Arc<SyncEngine<S, P>>) -> SchedulerHandle
    where
        S: RecordStore + 'static,
        P: RemotePeer + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (cycles_tx, cycles_rx) = watch::channel(0u64);
        let task = tokio::spawn(run_loop(
            engine,
            self.interval,
            shutdown_rx,
            cycles_tx,
        ));
        SchedulerHandle {
            shutdown: shutdown_tx,
            cycles: cycles_rx,
            task,
        }
    }
}

/// Handle to a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    cycles: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Observes the number of triggered cycles that have finished.
    pub fn cycles(&self) -> watch::Receiver<u64> {
        self.cycles.clone()
    }

    /// Stops the loop and waits for an in-flight cycle to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "scheduler task failed");
        }
    }
}

async fn run_loop<S, P>(
    engine: Arc<SyncEngine<S, P>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    cycles: watch::Sender<u64>,
) where
    S: RecordStore + 'static,
    P: RemotePeer + 'static,
{
    let mut online = engine.connectivity().subscribe();
    let mut was_online = *online.borrow_and_update();

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    tracing::info!(interval_secs = period.as_secs(), "sync scheduler started");

    loop {
        let trigger = tokio::select! {
            _ = shutdown.changed() => break,
            changed = online.changed() => {
                if changed.is_err() {
                    tracing::debug!("connectivity source dropped");
                    break;
                }
                let now_online = *online.borrow_and_update();
                let came_back = now_online && !was_online;
                was_online = now_online;
                if !came_back {
                    continue;
                }
                SyncTrigger::BecameOnline
            }
            _ = ticker.tick() => SyncTrigger::PeriodicTick,
        };

        let worker = Arc::clone(&engine);
        match tokio::task::spawn_blocking(move || worker.sync()).await {
            Ok(Ok(outcome)) => tracing::debug!(
                ?trigger,
                synced = outcome.synced_count,
                skipped = ?outcome.skipped,
                "scheduled sync finished"
            ),
            Ok(Err(e)) => tracing::error!(?trigger, error = %e, "scheduled sync failed"),
            Err(e) => tracing::error!(?trigger, error = %e, "scheduled sync panicked"),
        }
        cycles.send_modify(|n| *n += 1);
    }

    tracing::info!("sync scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::connectivity::ConnectivityState;
    use crate::outbox::Outbox;
    use crate::remote::MockPeer;
    use fieldsync_codec::Value;
    use fieldsync_core::{LogStore, ManualClock, Priority, RecordKind};

    fn engine(connectivity: ConnectivityState) -> Arc<SyncEngine<LogStore, MockPeer>> {
        let outbox =
            Outbox::in_memory(SyncConfig::default(), Arc::new(ManualClock::new(1_000))).unwrap();
        Arc::new(SyncEngine::new(
            outbox,
            MockPeer::new(),
            Arc::new(connectivity),
        ))
    }

    async fn wait_for_cycles(handle: &SchedulerHandle, n: u64) {
        let mut rx = handle.cycles();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|c| *c >= n))
            .await
            .expect("scheduler did not run in time")
            .unwrap();
    }

    #[tokio::test]
    async fn reconnect_triggers_sync() {
        let connectivity = ConnectivityState::offline();
        let engine = engine(connectivity.clone());
        engine
            .save(RecordKind::Grievance, Value::from("road"), Priority::High)
            .unwrap();

        let handle = SyncScheduler::new(Duration::from_secs(3600)).spawn(Arc::clone(&engine));
        connectivity.set_online(true);
        wait_for_cycles(&handle, 1).await;
        handle.shutdown().await;

        assert_eq!(engine.peer().push_count(), 1);
        assert!(engine.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn going_offline_does_not_trigger() {
        let connectivity = ConnectivityState::online();
        let engine = engine(connectivity.clone());

        let handle = SyncScheduler::new(Duration::from_secs(3600)).spawn(Arc::clone(&engine));
        connectivity.set_online(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*handle.cycles().borrow(), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn periodic_tick_triggers_sync() {
        let engine = engine(ConnectivityState::online());
        engine
            .save(RecordKind::MemberUpdate, Value::from(7), Priority::Low)
            .unwrap();

        let handle = SyncScheduler::new(Duration::from_millis(20)).spawn(Arc::clone(&engine));
        wait_for_cycles(&handle, 2).await;
        handle.shutdown().await;

        assert_eq!(engine.peer().push_count(), 1);
        assert!(engine.stats().cycles_completed >= 2);
    }
}
