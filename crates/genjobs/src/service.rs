use crate::error::JobError;
use crate::model::{Job, JobStatus, JobUpdate, NewJob};
use crate::store::{JobQuery, JobStore};
use crate::template::{InMemoryTemplateStore, Template, TemplateQuery, TemplateRequest, TemplateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gencore::{ExecutionContext, JobId, Value};
use genruntime::{FlowRuntime, ProgressError, ProgressSink};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// User allowed to see and cancel every job
pub const ADMIN_USER: &str = "admin";

pub const MAX_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Output key the final stage stores its results under
const SAVED_IMAGES_KEY: &str = "saved_images";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub processing: usize,
    pub completed_today: usize,
    pub average_processing_secs: f64,
    pub estimated_wait_secs: f64,
}

/// Orchestrates jobs around the workflow runtime.
///
/// This is the only component translating engine failures into persisted
/// job state. It never retries on its own; see [`crate::JobQueue`].
pub struct JobService {
    store: Arc<dyn JobStore>,
    templates: Arc<dyn TemplateStore>,
    runtime: Arc<FlowRuntime>,
}

impl JobService {
    /// Service with an empty template catalog
    pub fn new(store: Arc<dyn JobStore>, runtime: Arc<FlowRuntime>) -> Self {
        Self {
            store,
            templates: Arc::new(InMemoryTemplateStore::new()),
            runtime,
        }
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateStore>) -> Self {
        self.templates = templates;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn templates(&self) -> &Arc<dyn TemplateStore> {
        &self.templates
    }

    pub fn runtime(&self) -> &Arc<FlowRuntime> {
        &self.runtime
    }

    /// Validate and persist a submission as a queued job
    pub async fn submit(&self, request: NewJob) -> Result<Job, JobError> {
        if request.prompt.trim().is_empty() {
            return Err(JobError::InvalidRequest("prompt must not be empty".to_string()));
        }
        // Reject unknown stage types before anything is queued
        self.runtime.build_workflow(&request.workflow)?;

        let mut job = Job::new(request, Utc::now());
        job.queue_position = Some(self.queue_position_at(job.created_at).await?);
        self.store.insert(job.clone()).await?;

        info!(job_id = %job.id, user_id = %job.user_id, position = ?job.queue_position, "Job queued");
        Ok(job)
    }

    /// Resolve an active template and submit its workflow
    pub async fn submit_template(&self, request: TemplateRequest) -> Result<Job, JobError> {
        let template = self
            .templates
            .get(request.template_id)
            .await?
            .filter(|template| template.is_active)
            .ok_or(JobError::TemplateUnavailable(request.template_id))?;

        let mut job = NewJob::new(request.user_id, request.prompt, template.workflow)
            .with_template(template.id);
        job.parameters = request.parameters;
        job.input_image = request.input_image;
        self.submit(job).await
    }

    /// Active templates, newest first, optionally limited to one category
    pub async fn active_templates(&self, category: Option<&str>) -> Result<Vec<Template>, JobError> {
        let mut query = TemplateQuery::active();
        if let Some(category) = category {
            query = query.category(category);
        }
        self.templates.list(&query).await
    }

    /// Distinct categories across the whole catalog, sorted
    pub async fn template_categories(&self) -> Result<Vec<String>, JobError> {
        let mut categories: Vec<String> = self
            .templates
            .list(&TemplateQuery::all())
            .await?
            .into_iter()
            .map(|template| template.category)
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    /// Owner-filtered lookup; the admin user sees every job
    pub async fn get(&self, job_id: JobId, user_id: &str) -> Result<Job, JobError> {
        let job = self.job(job_id).await?;
        if job.user_id != user_id && user_id != ADMIN_USER {
            return Err(JobError::NotFound(job_id));
        }
        Ok(job)
    }

    /// Current snapshot with a fresh queue position
    pub async fn job(&self, job_id: JobId) -> Result<Job, JobError> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))?;
        self.refresh_queue_position(job).await
    }

    pub async fn cancel(&self, job_id: JobId, user_id: &str) -> Result<Job, JobError> {
        let job = self
            .get(job_id, user_id)
            .await
            .map_err(|_| JobError::NotCancellable(job_id))?;
        if !job.status.is_active() {
            return Err(JobError::NotCancellable(job_id));
        }

        let job = self
            .store
            .update(job_id, JobUpdate::cancel(Utc::now()))
            .await
            .map_err(|e| match e {
                JobError::AlreadyFinished { .. } | JobError::InvalidTransition { .. } => {
                    JobError::NotCancellable(job_id)
                }
                other => other,
            })?;

        info!(job_id = %job_id, "Job cancelled");
        Ok(job)
    }

    /// A user's jobs, newest first
    pub async fn history(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, JobError> {
        let mut query = JobQuery::new();
        if user_id != ADMIN_USER {
            query = query.user(user_id);
        }
        if let Some(status) = status {
            query = query.status(status);
        }

        Ok(self
            .store
            .list(&query)
            .await?
            .into_iter()
            .skip(offset)
            .take(limit.clamp(1, MAX_HISTORY_LIMIT))
            .collect())
    }

    pub async fn queue_stats(&self) -> Result<QueueStats, JobError> {
        let jobs = self.store.list(&JobQuery::new()).await?;
        let today = Utc::now().date_naive();

        let queued = jobs.iter().filter(|j| j.status == JobStatus::Queued).count();
        let processing = jobs.iter().filter(|j| j.status == JobStatus::Processing).count();

        let completed_today: Vec<&Job> = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .filter(|j| j.completed_at.map_or(false, |at| at.date_naive() == today))
            .collect();

        let durations: Vec<f64> = completed_today
            .iter()
            .filter_map(|j| j.processing_time())
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .collect();
        let average_processing_secs = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        Ok(QueueStats {
            queued,
            processing,
            completed_today: completed_today.len(),
            average_processing_secs,
            estimated_wait_secs: queued as f64 * average_processing_secs,
        })
    }

    /// Delete completed and failed jobs created more than `older_than` ago
    pub async fn cleanup_finished(&self, older_than: chrono::Duration) -> Result<usize, JobError> {
        let query = JobQuery::new()
            .status(JobStatus::Completed)
            .status(JobStatus::Failed)
            .created_before(Utc::now() - older_than);

        let mut removed = 0;
        for job in self.store.list(&query).await? {
            if self.store.remove(job.id).await? {
                removed += 1;
            }
        }

        info!(removed, "Cleaned up finished jobs");
        Ok(removed)
    }

    /// Run the job's workflow once, from scratch.
    ///
    /// Dispatches the job, executes a freshly built workflow with progress
    /// written to the store, and completes the job with the saved images.
    /// Failures are returned as-is; persisting them is the caller's call.
    pub async fn run_attempt(&self, job_id: JobId) -> Result<Job, JobError> {
        let job = self
            .store
            .update(job_id, JobUpdate::dispatch(Utc::now()))
            .await?;
        info!(job_id = %job_id, "Processing job");

        let mut ctx = ExecutionContext::for_job(
            job.id,
            job.user_id.as_str(),
            job.prompt.as_str(),
            job.parameters.clone(),
        );
        if let Some(image) = &job.input_image {
            ctx.set_input_image(image.clone());
        }

        let sink = StoreProgress {
            store: self.store.clone(),
            job_id,
        };
        let result = self.runtime.run(&job.workflow, &mut ctx, &sink).await?;

        let saved = result
            .outputs
            .get(SAVED_IMAGES_KEY)
            .and_then(Value::as_results)
            .map(<[_]>::to_vec)
            .unwrap_or_default();
        if saved.is_empty() {
            return Err(JobError::NoResults);
        }

        let count = saved.len();
        let job = self
            .store
            .update(job_id, JobUpdate::complete(Utc::now(), saved))
            .await?;
        info!(job_id = %job_id, images = count, "Job completed");
        Ok(job)
    }

    /// Put a failed attempt back in the queue
    pub async fn requeue(&self, job_id: JobId, error: &str) -> Result<Job, JobError> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))?;
        let position = self.queue_position_at(job.created_at).await?;
        self.store
            .update(job_id, JobUpdate::requeue(error, position))
            .await
    }

    pub async fn fail(&self, job_id: JobId, error: &str) -> Result<Job, JobError> {
        self.store
            .update(job_id, JobUpdate::fail(Utc::now(), error))
            .await
    }

    async fn queue_position_at(&self, created_at: DateTime<Utc>) -> Result<u32, JobError> {
        let ahead = self
            .store
            .list(&JobQuery::new().status(JobStatus::Queued).created_before(created_at))
            .await?
            .len();
        Ok(ahead as u32 + 1)
    }

    async fn refresh_queue_position(&self, job: Job) -> Result<Job, JobError> {
        if job.status != JobStatus::Queued {
            return Ok(job);
        }
        let position = self.queue_position_at(job.created_at).await?;
        if job.queue_position == Some(position) {
            return Ok(job);
        }

        match self
            .store
            .update(job.id, JobUpdate::new().queue_position(Some(position)))
            .await
        {
            Ok(job) => Ok(job),
            // Finished concurrently; report what is stored now
            Err(JobError::AlreadyFinished { .. }) => self
                .store
                .get(job.id)
                .await?
                .ok_or(JobError::NotFound(job.id)),
            Err(e) => Err(e),
        }
    }
}

/// Progress sink writing each report to the job record
struct StoreProgress {
    store: Arc<dyn JobStore>,
    job_id: JobId,
}

#[async_trait]
impl ProgressSink for StoreProgress {
    async fn report(&self, percent: u8, _message: &str) -> Result<(), ProgressError> {
        self.store
            .update(self.job_id, JobUpdate::new().progress(percent))
            .await
            .map(|_| ())
            .map_err(|e| ProgressError(e.to_string()))
    }
}
