//! Request orchestrator.
//!
//! Owns the queue, circuit breaker registry, rate limiter, response cache,
//! and monitor for the duration of a run session. The drain loop pulls the
//! highest-priority item under rate and concurrency constraints and hands
//! it to a worker; workers retry through the transport, update breaker
//! state and metrics, resolve the caller's result channel, and post the
//! optional webhook summary.

use crate::cache::ResponseCache;
use crate::config::OrchestratorConfig;
use crate::rate_limit::TokenBucket;
use crate::webhook::WebhookNotifier;
use sendflow_core::builder::RequestBuilder;
use sendflow_core::circuit_breaker::{CircuitBreakerRegistry, CircuitState};
use sendflow_core::descriptor::{BuiltRequest, RequestDescriptor};
use sendflow_core::monitor::{HealthStatus, MetricsReport, Monitor, SystemProbe};
use sendflow_core::transport::{Transport, TransportResult};
use sendflow_core::{fingerprint, BuildError, Priority, QueuedRequest, RequestId, RequestOutcome, Timestamp};
use sendflow_queue::{QueueError, QueueItem, RequestQueue};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;

/// Drain loop idle sleep when the queue is empty
const IDLE_SLEEP: Duration = Duration::from_millis(100);

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const WATCH_INTERVAL: Duration = Duration::from_secs(30);
const HEALTH_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

/// Queue depth above which the watch task logs a warning
const QUEUE_SIZE_WARN: usize = 500;

/// Failure rate above which the watch task logs a warning
const ERROR_RATE_WARN: f64 = 0.1;

/// Outcomes of a batch, keyed by request fingerprint
pub type BatchOutcome = HashMap<RequestId, RequestOutcome>;

/// Errors surfaced synchronously from request admission
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Request build failed: {0}")]
    Build(#[from] BuildError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Current system status
#[derive(Debug, Serialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub queue_size: usize,
    pub cache_entries: usize,
    pub circuit_breakers: HashMap<String, CircuitState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsReport>,
}

/// Health snapshot written to disk every minute
#[derive(Debug, Serialize)]
struct HealthSnapshot {
    timestamp: Timestamp,
    status: HealthStatus,
    queue_size: usize,
    cache_size: usize,
    open_circuits: usize,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Main request orchestrator.
///
/// Constructed once per run session; every collaborator is scoped to the
/// instance, there are no process-wide singletons.
pub struct Orchestrator {
    config: OrchestratorConfig,
    builder: Arc<RequestBuilder>,
    transport: Arc<dyn Transport>,
    queue: Arc<RequestQueue<QueuedRequest>>,
    breakers: Arc<CircuitBreakerRegistry>,
    rate_limiter: Arc<TokenBucket>,
    cache: Arc<ResponseCache>,
    monitor: Arc<Monitor>,
    webhook: Option<Arc<WebhookNotifier>>,
    pending: Mutex<HashMap<RequestId, Vec<oneshot::Sender<RequestOutcome>>>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Assemble an orchestrator from its collaborators.
    ///
    /// Configured custom headers become builder defaults; the queue
    /// restores its persisted snapshot when persistence is enabled.
    pub async fn new(
        config: OrchestratorConfig,
        builder: RequestBuilder,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn SystemProbe>,
    ) -> Arc<Self> {
        let mut builder = builder.with_default_timeout(config.request_timeout);
        for (name, value) in &config.custom_headers {
            builder = builder.with_default_header(name.clone(), value.clone());
        }

        let mut queue = RequestQueue::new(config.queue_capacity);
        if let Some(path) = &config.queue_persist_path {
            queue = queue.with_persistence(path.clone()).await;
        }

        let mut monitor = Monitor::new().with_probe(probe);
        if let Some(path) = &config.metrics_export_path {
            monitor = monitor.with_export_path(path.clone());
        }

        let webhook = config
            .webhook_url
            .as_ref()
            .map(|url| Arc::new(WebhookNotifier::new(url.clone())));

        let orchestrator = Arc::new(Self {
            rate_limiter: Arc::new(TokenBucket::new(config.rate_limit_per_second)),
            cache: Arc::new(ResponseCache::new(Duration::from_secs_f64(config.cache_ttl))),
            breakers: Arc::new(CircuitBreakerRegistry::default()),
            builder: Arc::new(builder),
            transport,
            queue: Arc::new(queue),
            monitor: Arc::new(monitor),
            webhook,
            pending: Mutex::new(HashMap::new()),
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            config,
        });

        info!("Orchestration system initialized");
        orchestrator
    }

    /// Start the drain loop and background tasks. Idempotent.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut shutdown = self.shutdown.lock().unwrap();
            if shutdown.is_some() {
                warn!("System already running");
                return;
            }
            let (tx, rx) = watch::channel(false);
            *shutdown = Some(tx);

            let mut tasks = self.tasks.lock().unwrap();
            tasks.push(tokio::spawn(Self::drain_loop(
                Arc::clone(self),
                rx.clone(),
            )));
            tasks.push(tokio::spawn(Self::cache_sweep_loop(
                Arc::clone(self),
                rx.clone(),
            )));
            tasks.push(tokio::spawn(Self::watch_loop(Arc::clone(self), rx.clone())));
            tasks.push(tokio::spawn(Self::health_snapshot_loop(
                Arc::clone(self),
                rx,
            )));
        }

        if self.config.enable_monitoring {
            self.monitor.start().await;
        }
        info!("Orchestration system started");
    }

    /// Stop the system gracefully.
    ///
    /// Background tasks are cancelled and awaited; in-flight workers
    /// finish their current send before this returns.
    pub async fn stop(&self) {
        let sender = self.shutdown.lock().unwrap().take();
        let Some(sender) = sender else {
            return;
        };
        info!("Stopping orchestration system");
        let _ = sender.send(true);

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        self.monitor.stop().await;
        info!("System stopped");
    }

    /// Whether a run session is active
    pub fn is_running(&self) -> bool {
        self.shutdown.lock().unwrap().is_some()
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Add a request to the orchestration queue.
    ///
    /// The descriptor is fingerprinted first; with caching enabled, a
    /// fresh cached result resolves the callback immediately and nothing
    /// is enqueued. Otherwise the request is built (fail-fast) and queued
    /// at the given priority.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Build`] for rejected descriptors,
    /// [`OrchestratorError::Queue`] when the queue or partition is full.
    pub async fn add_request(
        &self,
        descriptor: RequestDescriptor,
        priority: Priority,
        callback: Option<oneshot::Sender<RequestOutcome>>,
        metadata: Option<serde_json::Value>,
    ) -> Result<RequestId, OrchestratorError> {
        let id = fingerprint(&descriptor)?;

        if self.config.enable_caching {
            if let Some(result) = self.cache.get(&id) {
                info!(request_id = %id, "Returning cached result");
                if let Some(sender) = callback {
                    let _ = sender.send(RequestOutcome::cached(id.clone(), result));
                }
                return Ok(id);
            }
        }

        let built = self.builder.build(&descriptor)?;
        let partition = descriptor.partition.clone();
        let payload = QueuedRequest {
            descriptor,
            built,
            metadata: metadata.unwrap_or(serde_json::Value::Null),
        };

        let mut item = QueueItem::new(id.clone(), priority, payload);
        if let Some(partition) = partition {
            item = item.with_partition(partition);
        }

        if let Some(sender) = callback {
            self.pending
                .lock()
                .unwrap()
                .entry(id.clone())
                .or_default()
                .push(sender);
        }

        if let Err(err) = self.queue.add(item).await {
            // Unregister the callback added above
            if let Some(senders) = self.pending.lock().unwrap().get_mut(&id) {
                senders.pop();
            }
            return Err(err.into());
        }

        if self.config.enable_monitoring {
            self.monitor.record_request_queued(&id);
        }
        info!(request_id = %id, priority = %priority, "Request added to queue");
        Ok(id)
    }

    /// Add multiple requests as a batch.
    ///
    /// Every request gets its own result channel; a collector task joins
    /// them all and resolves `batch_callback` with the complete outcome
    /// map once the last request finishes.
    pub async fn add_batch_requests(
        &self,
        descriptors: Vec<RequestDescriptor>,
        priority: Priority,
        batch_callback: Option<oneshot::Sender<BatchOutcome>>,
    ) -> Result<Vec<RequestId>, OrchestratorError> {
        let mut ids = Vec::with_capacity(descriptors.len());
        let mut receivers = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let (tx, rx) = oneshot::channel();
            let id = self
                .add_request(
                    descriptor,
                    priority,
                    Some(tx),
                    Some(serde_json::json!({"batch": true})),
                )
                .await?;
            receivers.push((id.clone(), rx));
            ids.push(id);
        }

        if let Some(batch_sender) = batch_callback {
            tokio::spawn(async move {
                let mut outcomes = BatchOutcome::new();
                for (id, receiver) in receivers {
                    if let Ok(outcome) = receiver.await {
                        outcomes.insert(id, outcome);
                    }
                }
                let _ = batch_sender.send(outcomes);
            });
        }

        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Status and component access
    // ------------------------------------------------------------------

    /// Current system status
    pub fn get_status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            running: self.is_running(),
            queue_size: self.queue.size(),
            cache_entries: self.cache.len(),
            circuit_breakers: self.breakers.states(),
            metrics: self
                .config
                .enable_monitoring
                .then(|| self.monitor.get_metrics()),
        }
    }

    /// The queue, for dead-letter inspection and replay
    pub fn queue(&self) -> &Arc<RequestQueue<QueuedRequest>> {
        &self.queue
    }

    /// The monitor, for metrics, health, and alert wiring
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    // ------------------------------------------------------------------
    // Drain loop and workers
    // ------------------------------------------------------------------

    async fn drain_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_requests));
        let mut workers = JoinSet::new();

        loop {
            // Waits are the cancellation points; a popped item is always
            // handed to a worker before shutdown is observed.
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.rate_limiter.acquire() => {}
            }

            match self.queue.get(None).await {
                Some(item) => {
                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                        break;
                    };
                    let orchestrator = Arc::clone(&self);
                    workers.spawn(async move {
                        orchestrator.process_item(item).await;
                        drop(permit);
                    });
                }
                None => {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(IDLE_SLEEP) => {}
                    }
                }
            }

            while workers.try_join_next().is_some() {}
        }

        // Bounded-latency drain: in-flight workers finish their send
        while workers.join_next().await.is_some() {}
    }

    async fn process_item(&self, item: QueueItem<QueuedRequest>) {
        if self.config.enable_monitoring {
            self.monitor.record_request_started(&item.id);
        }

        let endpoint = item.payload.built.endpoint().to_string();
        if self.breakers.check(&endpoint) == CircuitState::Open {
            warn!(request_id = %item.id, endpoint, "Circuit breaker open");
            self.queue.complete(&item.id);
            self.fail_item(&item, 0, "Circuit breaker open").await;
            return;
        }

        let (attempts, outcome) = self.send_with_retry(&item.payload.built).await;
        self.queue.complete(&item.id);

        match outcome {
            Ok(result) => {
                if self.config.enable_caching && result.success {
                    self.cache.insert(item.id.clone(), result.clone());
                }

                self.deliver(RequestOutcome::completed(
                    item.id.clone(),
                    attempts,
                    result.clone(),
                ));

                if self.config.enable_monitoring {
                    self.monitor
                        .record_request_completed(&item.id, result.success, result.duration)
                        .await;
                }

                if let Some(webhook) = &self.webhook {
                    webhook
                        .notify(&item.id, item.priority, &result, &item.payload.metadata)
                        .await;
                }

                self.breakers.record_success(&endpoint);
            }
            Err(last_error) => {
                error!(request_id = %item.id, error = %last_error, "Request failed");
                let reason = format!("All retry attempts failed: {}", last_error);
                self.queue.add_to_dlq(item.clone(), reason.clone()).await;
                self.fail_item(&item, attempts, &reason).await;
                self.breakers.record_failure(&endpoint);
            }
        }
    }

    /// Attempt up to `retry_count` sends with deterministic exponential
    /// backoff between attempts. Returns the attempt count with either the
    /// first successful result or the last error.
    async fn send_with_retry(
        &self,
        request: &BuiltRequest,
    ) -> (u32, Result<TransportResult, String>) {
        let retries = self.config.retry_count.max(1);
        let mut last_error = "Unknown error".to_string();

        for attempt in 1..=retries {
            if attempt > 1 {
                let delay = self.config.retry_delay * 2f64.powi(attempt as i32 - 2);
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }

            let result = self.transport.send(request).await;
            if result.success {
                return (attempt, Ok(result));
            }

            last_error = result
                .error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            warn!(attempt, url = %request.url, error = %last_error, "Attempt failed");
        }

        (retries, Err(last_error))
    }

    async fn fail_item(&self, item: &QueueItem<QueuedRequest>, attempts: u32, error: &str) {
        self.deliver(RequestOutcome::failed(item.id.clone(), attempts, error));
        if self.config.enable_monitoring {
            self.monitor.record_request_failed(&item.id, error).await;
        }
    }

    /// Resolve every result channel registered for the outcome's id
    fn deliver(&self, outcome: RequestOutcome) {
        let senders = self
            .pending
            .lock()
            .unwrap()
            .remove(&outcome.request_id)
            .unwrap_or_default();
        for sender in senders {
            if sender.send(outcome.clone()).is_err() {
                debug!(request_id = %outcome.request_id, "Result receiver dropped");
            }
        }
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    async fn cache_sweep_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(CACHE_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = self.cache.sweep();
                    if removed > 0 {
                        info!(removed, "Cleaned up expired cache entries");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn watch_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(WATCH_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let queue_size = self.queue.size();
                    if queue_size > QUEUE_SIZE_WARN {
                        warn!(queue_size, "Queue size high");
                    }
                    if let Some(rate) = self.monitor.collector().gauge("requests.failure_rate") {
                        if rate > ERROR_RATE_WARN {
                            warn!(error_rate = rate, "High error rate");
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn health_snapshot_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(HEALTH_SNAPSHOT_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = HealthSnapshot {
                        timestamp: Timestamp::now(),
                        status: self.monitor.get_health_status().status,
                        queue_size: self.queue.size(),
                        cache_size: self.cache.len(),
                        open_circuits: self.breakers.open_count(),
                    };
                    self.write_health_snapshot(&snapshot).await;
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    async fn write_health_snapshot(&self, snapshot: &HealthSnapshot) {
        let path = &self.config.health_snapshot_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = tokio::fs::create_dir_all(parent).await {
                    error!(%err, "Health check error");
                    return;
                }
            }
        }
        match serde_json::to_vec_pretty(snapshot) {
            Ok(bytes) => {
                if let Err(err) = tokio::fs::write(path, bytes).await {
                    error!(%err, path = %path.display(), "Health check error");
                }
            }
            Err(err) => error!(%err, "Health snapshot serialization failed"),
        }
    }
}
