//! Queue worker that drains the durable work queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, Mutex, Notify, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use pocket_core::{defaults, QueueAction, QueueItem, QueueRepository, QueueStatus, Result};
use pocket_db::Database;

use crate::handler::{HandlerResult, QueueContext, QueueHandler};

/// Configuration for the queue worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Whether to process the queue at all.
    pub enabled: bool,
    /// Safety-net polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Per-item handler timeout in seconds.
    pub handler_timeout_secs: u64,
    /// Delay before the first retry, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Factor applied to the delay per attempt already made.
    pub retry_backoff_multiplier: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: defaults::WORKER_POLL_INTERVAL_MS,
            handler_timeout_secs: defaults::HANDLER_TIMEOUT_SECS,
            retry_backoff_ms: defaults::RETRY_BACKOFF_INITIAL_MS,
            retry_backoff_multiplier: defaults::RETRY_BACKOFF_MULTIPLIER,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `POCKET_WORKER_ENABLED` | `true` | Enable/disable queue processing |
    /// | `POCKET_POLL_INTERVAL_MS` | `30000` | Poll interval when no wake arrives |
    /// | `POCKET_HANDLER_TIMEOUT_SECS` | `60` | Per-item handler timeout |
    /// | `POCKET_RETRY_BACKOFF_MS` | `5000` | Delay before the first retry |
    /// | `POCKET_RETRY_BACKOFF_MULTIPLIER` | `3` | Delay growth per attempt |
    pub fn from_env() -> Self {
        let enabled = std::env::var("POCKET_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var("POCKET_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::WORKER_POLL_INTERVAL_MS);

        let handler_timeout_secs = std::env::var("POCKET_HANDLER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::HANDLER_TIMEOUT_SECS)
            .max(1);

        let retry_backoff_ms = std::env::var("POCKET_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::RETRY_BACKOFF_INITIAL_MS);

        let retry_backoff_multiplier = std::env::var("POCKET_RETRY_BACKOFF_MULTIPLIER")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults::RETRY_BACKOFF_MULTIPLIER)
            .max(1);

        Self {
            enabled,
            poll_interval_ms,
            handler_timeout_secs,
            retry_backoff_ms,
            retry_backoff_multiplier,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_handler_timeout(mut self, secs: u64) -> Self {
        self.handler_timeout_secs = secs;
        self
    }

    /// Set the retry backoff. A zero delay makes retries claimable at once.
    pub fn with_retry_backoff(mut self, initial_ms: u64, multiplier: u32) -> Self {
        self.retry_backoff_ms = initial_ms;
        self.retry_backoff_multiplier = multiplier;
        self
    }

    /// Delay before the next attempt of an item that has failed
    /// `retry_count` times already.
    pub fn backoff_for(&self, retry_count: i32) -> Duration {
        let exponent = u32::try_from(retry_count).unwrap_or(0);
        let factor = u64::from(self.retry_backoff_multiplier).saturating_pow(exponent);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Event emitted by the queue worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// An item was claimed and handed to its handler.
    ItemStarted { item_id: Uuid, action: QueueAction },
    /// An item finished and was removed from the queue.
    ItemCompleted { item_id: Uuid, action: QueueAction },
    /// An item failed transiently and went back to pending.
    ItemRetrying {
        item_id: Uuid,
        action: QueueAction,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
        error: String,
    },
    /// An item reached the terminal failed state.
    ItemFailed {
        item_id: Uuid,
        action: QueueAction,
        error: String,
    },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
///
/// Dropping the handle stops the worker after its current item.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    wake: Arc<Notify>,
}

impl WorkerHandle {
    /// Signal the worker to shut down after its current item.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| pocket_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Ask the worker to drain now instead of waiting for the next poll.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

type HandlerMap = Arc<RwLock<HashMap<QueueAction, Arc<dyn QueueHandler>>>>;

/// Worker that processes queue items one at a time.
///
/// Orphaned `processing` items from a previous run are reset to `pending`
/// once, before this worker's first claim.
pub struct QueueWorker {
    db: Database,
    config: WorkerConfig,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
    wake: Arc<Notify>,
    /// Held across the reset so no claim overtakes it.
    recovered: Mutex<bool>,
}

impl QueueWorker {
    pub fn new(db: Database, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::WORKER_EVENT_CAPACITY);
        let wake = db.queue.job_notify();
        Self {
            db,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            wake,
            recovered: Mutex::new(false),
        }
    }

    /// Register a handler for an action, replacing any previous one.
    pub async fn register_handler<H: QueueHandler + 'static>(&self, handler: H) {
        let action = handler.action();
        self.handlers.write().await.insert(action, Arc::new(handler));
        debug!(%action, "Registered queue handler");
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();
        let wake = self.wake.clone();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            wake,
        }
    }

    /// Reset orphaned items, once per worker.
    ///
    /// Called automatically before the first claim; calling it again is a
    /// no-op.
    pub async fn recover(&self) -> Result<u64> {
        let mut recovered = self.recovered.lock().await;
        if *recovered {
            return Ok(0);
        }
        let count = self.db.queue.reset_all_processing_to_pending().await?;
        *recovered = true;
        if count > 0 {
            info!(
                subsystem = "jobs",
                component = "worker",
                op = "recover",
                row_count = count,
                "Reset orphaned processing items"
            );
        }
        Ok(count)
    }

    /// Process every item that is claimable now, then return the count.
    ///
    /// Items waiting out a retry backoff are left for a later pass.
    pub async fn drain_once(&self) -> Result<usize> {
        let mut processed = 0;
        while self.process_next().await? {
            processed += 1;
        }
        Ok(processed)
    }

    /// Claim and process one item. Returns false when nothing is claimable.
    pub async fn process_next(&self) -> Result<bool> {
        self.recover().await?;
        match self.db.queue.claim_next_pending().await? {
            Some(item) => {
                self.process_item(item).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Queue worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            handler_timeout_secs = self.config.handler_timeout_secs,
            "Queue worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Queue worker received shutdown signal");
                break;
            }

            match self.process_next().await {
                // Keep claiming while there is work.
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!(error = %e, "Queue claim failed"),
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Queue worker received shutdown signal");
                    break;
                }
                _ = self.wake.notified() => {
                    debug!("Queue worker woken");
                }
                _ = sleep(poll_interval) => {}
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Queue worker stopped");
    }

    /// Run a claimed item and settle it. Never returns an error: every
    /// outcome ends up recorded on the item.
    async fn process_item(&self, item: QueueItem) {
        let start = Instant::now();
        let item_id = item.id;
        let action = item.action;
        let retry_count = item.retry_count;

        debug!(item_id = %item_id, %action, retry_count, "Processing queue item");
        let _ = self
            .event_tx
            .send(WorkerEvent::ItemStarted { item_id, action });

        let handler = self.handlers.read().await.get(&action).cloned();
        let result = match handler {
            Some(handler) => self.execute_guarded(handler, item).await,
            None => {
                warn!(%action, "No handler registered for queue action");
                HandlerResult::Failed(format!("No handler for action: {action}"))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            HandlerResult::Success => match self.db.queue.mark_done(item_id).await {
                Ok(()) => {
                    info!(
                        subsystem = "jobs",
                        component = "worker",
                        item_id = %item_id,
                        %action,
                        duration_ms,
                        "Queue item completed"
                    );
                    let _ = self
                        .event_tx
                        .send(WorkerEvent::ItemCompleted { item_id, action });
                }
                // The item stays claimed; the next worker start resets it and
                // the handler runs again.
                Err(e) => error!(
                    subsystem = "jobs",
                    component = "worker",
                    item_id = %item_id,
                    %action,
                    error = %e,
                    "Completed item not removed, left processing until the next recovery"
                ),
            },
            HandlerResult::Failed(error) => self.settle_failed(item_id, action, error).await,
            HandlerResult::Retry(error) => {
                let next_retry_at = chrono::Duration::from_std(self.config.backoff_for(retry_count))
                    .ok()
                    .and_then(|delay| Utc::now().checked_add_signed(delay))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                match self
                    .db
                    .queue
                    .record_retryable_failure(item_id, &error, next_retry_at)
                    .await
                {
                    Ok(QueueStatus::Failed) => {
                        warn!(
                            subsystem = "jobs",
                            component = "worker",
                            item_id = %item_id,
                            %action,
                            error = %error,
                            "Queue item exhausted its retries"
                        );
                        let _ = self.event_tx.send(WorkerEvent::ItemFailed {
                            item_id,
                            action,
                            error,
                        });
                    }
                    Ok(_) => {
                        info!(
                            subsystem = "jobs",
                            component = "worker",
                            item_id = %item_id,
                            %action,
                            retry_count = retry_count + 1,
                            error = %error,
                            "Queue item will be retried"
                        );
                        let _ = self.event_tx.send(WorkerEvent::ItemRetrying {
                            item_id,
                            action,
                            retry_count: retry_count + 1,
                            next_retry_at,
                            error,
                        });
                    }
                    Err(e) => error!(error = %e, item_id = %item_id, "Failed to record retry"),
                }
            }
        }
    }

    async fn settle_failed(&self, item_id: Uuid, action: QueueAction, error: String) {
        match self.db.queue.mark_failed(item_id, &error).await {
            Ok(()) => {
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    item_id = %item_id,
                    %action,
                    error = %error,
                    "Queue item failed"
                );
                let _ = self.event_tx.send(WorkerEvent::ItemFailed {
                    item_id,
                    action,
                    error,
                });
            }
            Err(e) => error!(error = %e, item_id = %item_id, "Failed to mark item as failed"),
        }
    }

    /// Run the handler in its own task under the configured timeout. A
    /// timeout or a panic counts as a retryable failure.
    async fn execute_guarded(&self, handler: Arc<dyn QueueHandler>, item: QueueItem) -> HandlerResult {
        let timeout = Duration::from_secs(self.config.handler_timeout_secs);
        let item_id = item.id;
        let mut task = tokio::spawn(async move { handler.execute(QueueContext::new(item)).await });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => {
                error!(item_id = %item_id, "Queue handler panicked");
                HandlerResult::Retry("Handler panicked".to_string())
            }
            Ok(Err(join_err)) => HandlerResult::Retry(format!("Handler task aborted: {join_err}")),
            Err(_) => {
                task.abort();
                warn!(
                    item_id = %item_id,
                    "Queue item exceeded timeout of {}s", self.config.handler_timeout_secs
                );
                HandlerResult::Retry(format!(
                    "Handler exceeded timeout of {}s",
                    self.config.handler_timeout_secs
                ))
            }
        }
    }
}

/// Builder for creating a queue worker with handlers.
pub struct WorkerBuilder {
    db: Database,
    config: WorkerConfig,
    handlers: Vec<Box<dyn QueueHandler>>,
}

impl WorkerBuilder {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_handler<H: QueueHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub async fn build(self) -> QueueWorker {
        let worker = QueueWorker::new(self.db, self.config);
        {
            let mut handlers = worker.handlers.write().await;
            for handler in self.handlers {
                handlers.insert(handler.action(), Arc::from(handler));
            }
        }
        worker
    }
}
