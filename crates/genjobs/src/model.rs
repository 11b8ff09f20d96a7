use crate::error::JobError;
use crate::template::TemplateId;
use chrono::{DateTime, Utc};
use gencore::{ImageResult, JobId, Value};
use genruntime::WorkflowConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Error text recorded on a job cancelled by its owner
pub const CANCELLED_MESSAGE: &str = "Cancelled by user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Queued or processing
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Whether a job in this state may move to `next`.
    ///
    /// Terminal states accept nothing; `processing -> queued` is a retry.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match self {
            Queued => matches!(next, Queued | Processing | Failed | Cancelled),
            Processing => matches!(next, Queued | Processing | Completed | Failed | Cancelled),
            Completed | Failed | Cancelled => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submission, before it becomes a job
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: String,
    pub template_id: Option<TemplateId>,
    pub prompt: String,
    pub parameters: HashMap<String, Value>,
    pub input_image: Option<Value>,
    pub workflow: WorkflowConfig,
}

impl NewJob {
    pub fn new(user_id: impl Into<String>, prompt: impl Into<String>, workflow: WorkflowConfig) -> Self {
        Self {
            user_id: user_id.into(),
            template_id: None,
            prompt: prompt.into(),
            parameters: HashMap::new(),
            input_image: None,
            workflow,
        }
    }

    pub fn with_template(mut self, template_id: TemplateId) -> Self {
        self.template_id = Some(template_id);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_input_image(mut self, image: impl Into<Value>) -> Self {
        self.input_image = Some(image.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub user_id: String,
    pub template_id: Option<TemplateId>,
    pub prompt: String,
    pub parameters: HashMap<String, Value>,
    pub input_image: Option<Value>,
    pub workflow: WorkflowConfig,
    pub status: JobStatus,
    pub progress: u8,
    pub queue_position: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_details: Option<String>,
    pub results: Vec<ImageResult>,
}

impl Job {
    pub fn new(request: NewJob, created_at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new_v4(),
            user_id: request.user_id,
            template_id: request.template_id,
            prompt: request.prompt,
            parameters: request.parameters,
            input_image: request.input_image,
            workflow: request.workflow,
            status: JobStatus::Queued,
            progress: 0,
            queue_position: None,
            created_at,
            started_at: None,
            completed_at: None,
            error_details: None,
            results: Vec::new(),
        }
    }

    /// Processing time of a finished job
    pub fn processing_time(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }

    /// Apply an update through the job state machine.
    ///
    /// Nothing is mutated when the update is rejected. Timestamps are set at
    /// most once and the queue position only exists while queued.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), JobError> {
        if self.status.is_terminal() {
            if update.status == Some(self.status) && update.results.is_empty() {
                return Ok(());
            }
            return Err(JobError::AlreadyFinished {
                job_id: self.id,
                status: self.status,
            });
        }

        if let Some(next) = update.status {
            if !self.status.can_transition_to(next) {
                return Err(JobError::InvalidTransition {
                    from: self.status,
                    to: next,
                });
            }
            self.status = next;
            if next != JobStatus::Queued {
                self.queue_position = None;
            }
        }

        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(position) = update.queue_position {
            if self.status == JobStatus::Queued {
                self.queue_position = position;
            }
        }
        if let Some(at) = update.started_at {
            self.started_at.get_or_insert(at);
        }
        if let Some(at) = update.completed_at {
            self.completed_at.get_or_insert(at);
        }
        if let Some(error) = update.error_details {
            self.error_details = Some(error);
        }
        self.results.extend(update.results);

        Ok(())
    }
}

/// Partial job update; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub queue_position: Option<Option<u32>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_details: Option<String>,
    /// Appended to the job's results
    pub results: Vec<ImageResult>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn queue_position(mut self, position: Option<u32>) -> Self {
        self.queue_position = Some(position);
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn error_details(mut self, error: impl Into<String>) -> Self {
        self.error_details = Some(error.into());
        self
    }

    pub fn results(mut self, results: Vec<ImageResult>) -> Self {
        self.results = results;
        self
    }

    /// A worker picked the job up; every attempt starts at zero progress
    pub fn dispatch(at: DateTime<Utc>) -> Self {
        Self::new()
            .status(JobStatus::Processing)
            .progress(0)
            .started_at(at)
    }

    pub fn complete(at: DateTime<Utc>, results: Vec<ImageResult>) -> Self {
        Self::new()
            .status(JobStatus::Completed)
            .progress(100)
            .completed_at(at)
            .results(results)
    }

    pub fn fail(at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self::new()
            .status(JobStatus::Failed)
            .completed_at(at)
            .error_details(error)
    }

    pub fn cancel(at: DateTime<Utc>) -> Self {
        Self::new()
            .status(JobStatus::Cancelled)
            .completed_at(at)
            .error_details(CANCELLED_MESSAGE)
    }

    /// Back to the queue for another attempt, keeping the last error
    pub fn requeue(error: impl Into<String>, position: u32) -> Self {
        Self::new()
            .status(JobStatus::Queued)
            .progress(0)
            .queue_position(Some(position))
            .error_details(error)
    }
}

/// Wire shape of a status update pushed to stream consumers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamMessage {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ImageResult>>,
}

impl StreamMessage {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            queue_position: job.queue_position,
            message: None,
            error: match job.status {
                JobStatus::Failed | JobStatus::Cancelled => job.error_details.clone(),
                _ => None,
            },
            results: (job.status == JobStatus::Completed).then(|| job.results.clone()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
