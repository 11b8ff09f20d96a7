use crate::error::JobError;
use crate::model::{Job, NewJob};
use crate::template::TemplateRequest;
use crate::service::JobService;
use gencore::JobId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Exponential backoff for failed job attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (zero-based): 60s, 120s, 240s, ...
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Upper bound for a single attempt
    pub job_timeout: Option<Duration>,
    /// Cadence of stream polling
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            retry: RetryPolicy::default(),
            job_timeout: None,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    /// Defaults overridden by `GENFLOW_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(workers) = env_parse::<usize>("GENFLOW_WORKERS") {
            config.workers = workers.max(1);
        }
        if let Some(retries) = env_parse("GENFLOW_MAX_RETRIES") {
            config.retry.max_retries = retries;
        }
        if let Some(secs) = env_parse("GENFLOW_RETRY_DELAY_SECS") {
            config.retry.base_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("GENFLOW_JOB_TIMEOUT_SECS") {
            config.job_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        match env_parse::<u64>("GENFLOW_POLL_INTERVAL_MS") {
            Some(0) => warn!("Ignoring GENFLOW_POLL_INTERVAL_MS=0, polling needs a non-zero period"),
            Some(ms) => config.poll_interval = Duration::from_millis(ms),
            None => {}
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

/// One unit of queued work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTask {
    pub job_id: JobId,
    /// Retries already consumed
    pub retry: u32,
}

/// In-process task queue with a fixed worker pool.
///
/// Each worker runs whole job attempts through [`JobService::run_attempt`];
/// failed attempts are requeued with exponential backoff until the retry
/// budget is spent.
pub struct JobQueue {
    service: Arc<JobService>,
    sender: mpsc::UnboundedSender<JobTask>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl JobQueue {
    pub fn start(service: Arc<JobService>, config: WorkerConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let shutdown = CancellationToken::new();

        let workers = (0..config.workers.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    service: service.clone(),
                    config: config.clone(),
                    sender: sender.clone(),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(worker.run(receiver.clone()))
            })
            .collect();

        info!(workers = config.workers.max(1), "Job queue started");

        Self {
            service,
            sender,
            shutdown,
            workers,
        }
    }

    pub fn service(&self) -> &Arc<JobService> {
        &self.service
    }

    /// Persist a submission and schedule its first attempt
    pub async fn submit(&self, request: NewJob) -> Result<Job, JobError> {
        let job = self.service.submit(request).await?;
        self.enqueue(job.id)?;
        Ok(job)
    }

    /// Submit against a stored template and schedule its first attempt
    pub async fn submit_template(&self, request: TemplateRequest) -> Result<Job, JobError> {
        let job = self.service.submit_template(request).await?;
        self.enqueue(job.id)?;
        Ok(job)
    }

    /// Submit several jobs at once.
    ///
    /// Each request is validated and queued on its own; one rejection
    /// does not affect the others. Outcomes are returned in request order.
    pub async fn submit_batch(&self, requests: Vec<NewJob>) -> Vec<Result<Job, JobError>> {
        let total = requests.len();
        let mut outcomes = Vec::with_capacity(total);
        for request in requests {
            let outcome = self.submit(request).await;
            if let Err(e) = &outcome {
                warn!("Batch job rejected: {}", e);
            }
            outcomes.push(outcome);
        }

        let queued = outcomes.iter().filter(|o| o.is_ok()).count();
        info!(total, queued, "Batch submitted");
        outcomes
    }

    pub fn enqueue(&self, job_id: JobId) -> Result<(), JobError> {
        self.sender
            .send(JobTask { job_id, retry: 0 })
            .map_err(|_| JobError::Store("job queue is shut down".to_string()))
    }

    /// Stop accepting work and wait for in-flight attempts to finish
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Worker terminated abnormally: {}", e);
            }
        }
        info!("Job queue stopped");
    }
}

struct Worker {
    id: usize,
    service: Arc<JobService>,
    config: WorkerConfig,
    sender: mpsc::UnboundedSender<JobTask>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self, receiver: Arc<Mutex<mpsc::UnboundedReceiver<JobTask>>>) {
        loop {
            let task = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                task = async { receiver.lock().await.recv().await } => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            self.process(task).await;
        }
        debug!(worker = self.id, "Worker exiting");
    }

    async fn process(&self, task: JobTask) {
        let job_id = task.job_id;

        if !self.is_active(job_id).await {
            debug!(worker = self.id, job_id = %job_id, "Skipping inactive job");
            return;
        }

        let attempt = self.service.run_attempt(job_id);
        let outcome = match self.config.job_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .unwrap_or_else(|_| Err(JobError::Timeout(limit))),
            None => attempt.await,
        };

        let err = match outcome {
            Ok(_) => return,
            Err(e) => e,
        };

        // Cancelled (or otherwise finished) underneath the worker
        if !self.is_active(job_id).await {
            info!(job_id = %job_id, "Job finished elsewhere during attempt: {}", err);
            return;
        }

        let message = err.user_message();
        if task.retry < self.config.retry.max_retries {
            let delay = self.config.retry.delay_for(task.retry);
            info!(
                job_id = %job_id,
                retry = task.retry + 1,
                delay_secs = delay.as_secs(),
                "Retrying job after failure: {}",
                message
            );
            match self.service.requeue(job_id, &message).await {
                Ok(_) => self.schedule(
                    JobTask {
                        job_id,
                        retry: task.retry + 1,
                    },
                    delay,
                ),
                Err(e) => warn!(job_id = %job_id, "Job not requeued: {}", e),
            }
        } else {
            error!(job_id = %job_id, attempts = task.retry + 1, "Job failed: {}", message);
            if let Err(e) = self.service.fail(job_id, &message).await {
                warn!(job_id = %job_id, "Failure not recorded: {}", e);
            }
        }
    }

    async fn is_active(&self, job_id: JobId) -> bool {
        match self.service.store().get(job_id).await {
            Ok(Some(job)) => job.status.is_active(),
            Ok(None) => false,
            Err(e) => {
                warn!(job_id = %job_id, "Job lookup failed: {}", e);
                false
            }
        }
    }

    fn schedule(&self, task: JobTask, delay: Duration) {
        let sender = self.sender.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if sender.send(task).is_err() {
                        warn!(job_id = %task.job_id, "Queue closed before retry");
                    }
                }
            }
        });
    }
}
