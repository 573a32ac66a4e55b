//! Background driver for the engine.
//!
//! Wakes on metadata `Dirty` events (debounced) or manual triggers, promotes pending
//! indexes, then runs budgeted reindex passes until the dirty set is drained.

use crate::config::EngineConfig;
use crate::engine::IndexingEngine;
use crate::metadata::MetadataEvent;
use crate::{IndexerError, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

#[derive(Debug, Clone)]
struct RunSettings {
    debounce: Duration,
    time_budget: Duration,
    batch_size: usize,
}

enum SchedulerCommand {
    Trigger,
    Shutdown,
}

/// Floor for the first retry after a failed pass.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(10);
/// Ceiling for the retry backoff.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

enum CycleEnd {
    Idle,
    /// The pass failed; dirty work may remain with no event left to announce it.
    Failed,
    Stop,
}

/// Delay before retry number `failures` (1-based): the debounce, doubled per failure.
fn retry_delay(debounce: Duration, failures: u32) -> Duration {
    let base = debounce.max(MIN_RETRY_DELAY);
    let factor = 1u32 << failures.saturating_sub(1).min(16);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

#[derive(Clone)]
pub struct IndexScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    command_tx: mpsc::Sender<SchedulerCommand>,
    task: TokioMutex<Option<JoinHandle<()>>>,
}

impl IndexScheduler {
    /// Spawn the scheduling loop. A first pass runs right away to pick up work left
    /// over from a previous process.
    #[must_use]
    pub fn start(engine: Arc<IndexingEngine>, config: &EngineConfig) -> Self {
        let settings = RunSettings {
            debounce: config.scheduler.debounce(),
            time_budget: config.time_budget(),
            batch_size: config.batch_size,
        };
        let (command_tx, command_rx) = mpsc::channel(16);
        let events = engine.metadata().subscribe();
        let task = tokio::spawn(scheduler_loop(engine, settings, events, command_rx));

        Self {
            inner: Arc::new(SchedulerInner {
                command_tx,
                task: TokioMutex::new(Some(task)),
            }),
        }
    }

    /// Run as soon as possible, skipping the debounce.
    pub async fn trigger(&self) -> Result<()> {
        self.inner
            .command_tx
            .send(SchedulerCommand::Trigger)
            .await
            .map_err(|e| IndexerError::Other(format!("failed to send trigger: {e}")))
    }

    /// Stop the loop and wait for the current pass to end.
    pub async fn shutdown(&self) {
        let _ = self.inner.command_tx.send(SchedulerCommand::Shutdown).await;
        if let Some(task) = self.inner.task.lock().await.take() {
            if let Err(err) = task.await {
                warn!("Scheduler task ended abnormally: {err}");
            }
        }
    }
}

impl Drop for IndexScheduler {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.try_send(SchedulerCommand::Shutdown);
        }
    }
}

async fn scheduler_loop(
    engine: Arc<IndexingEngine>,
    settings: RunSettings,
    mut events: broadcast::Receiver<MetadataEvent>,
    mut command_rx: mpsc::Receiver<SchedulerCommand>,
) {
    let mut deadline: Option<Instant> = Some(Instant::now());
    let mut failures: u32 = 0;

    loop {
        let next_deadline = deadline;
        tokio::select! {
            command = command_rx.recv() => match command {
                Some(SchedulerCommand::Trigger) => deadline = Some(Instant::now()),
                Some(SchedulerCommand::Shutdown) | None => break,
            },
            event = events.recv() => match event {
                Ok(MetadataEvent::Dirty) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + settings.debounce);
                    }
                }
                Ok(MetadataEvent::Clean { .. }) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            () = async {
                if let Some(at) = next_deadline {
                    time::sleep_until(at).await;
                }
            }, if next_deadline.is_some() => {
                deadline = None;
                match run_cycle(&engine, &settings, &mut command_rx).await {
                    CycleEnd::Idle => failures = 0,
                    CycleEnd::Failed => {
                        failures = failures.saturating_add(1);
                        let delay = retry_delay(settings.debounce, failures);
                        warn!("Retrying indexing in {delay:?} (failure {failures})");
                        deadline = Some(Instant::now() + delay);
                    }
                    CycleEnd::Stop => break,
                }
            }
        }
    }
    debug!("Scheduler loop stopped");
}

async fn run_cycle(
    engine: &IndexingEngine,
    settings: &RunSettings,
    command_rx: &mut mpsc::Receiver<SchedulerCommand>,
) -> CycleEnd {
    match engine.promote_new_indexes().await {
        Ok(0) => {}
        Ok(promoted) => info!("Scheduler promoted {promoted} indexes"),
        Err(IndexerError::Disposed) => return CycleEnd::Stop,
        Err(err) => {
            error!("Index promotion failed: {err}");
            return CycleEnd::Failed;
        }
    }

    loop {
        match engine
            .index_updated_objects(settings.time_budget, settings.batch_size)
            .await
        {
            Ok(outcome) if outcome.completed => return CycleEnd::Idle,
            Ok(_) => {}
            Err(IndexerError::Disposed) => return CycleEnd::Stop,
            Err(err) => {
                error!("Reindex pass failed: {err}");
                return CycleEnd::Failed;
            }
        }

        // Budget spent: give other tasks a turn, honour a pending shutdown.
        tokio::task::yield_now().await;
        if let Ok(SchedulerCommand::Shutdown) = command_rx.try_recv() {
            return CycleEnd::Stop;
        }
    }
}
