use crate::model::JobStatus;
use crate::template::TemplateId;
use gencore::{FlowError, JobId, WorkflowError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {0} not found or cannot be cancelled")]
    NotCancellable(JobId),

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job {job_id} is already {status}")]
    AlreadyFinished { job_id: JobId, status: JobStatus },

    #[error("Template not found or inactive")]
    TemplateUnavailable(TemplateId),

    #[error("Invalid job request: {0}")]
    InvalidRequest(String),

    #[error("Job store error: {0}")]
    Store(String),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("No images were generated")]
    NoResults,

    #[error("Job timed out after {0:?}")]
    Timeout(Duration),
}

impl From<WorkflowError> for JobError {
    fn from(e: WorkflowError) -> Self {
        JobError::Flow(FlowError::Workflow(e))
    }
}

impl JobError {
    /// Text persisted as the job's `error_details`
    pub fn user_message(&self) -> String {
        match self {
            JobError::Flow(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
