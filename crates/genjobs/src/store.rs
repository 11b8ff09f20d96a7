use crate::error::JobError;
use crate::model::{Job, JobStatus, JobUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gencore::JobId;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Filter for listing jobs
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub user_id: Option<String>,
    /// Empty matches every status
    pub statuses: Vec<JobStatus>,
    pub created_before: Option<DateTime<Utc>>,
}

impl JobQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.user_id.as_deref().map_or(true, |user| job.user_id == user)
            && (self.statuses.is_empty() || self.statuses.contains(&job.status))
            && self.created_before.map_or(true, |at| job.created_at < at)
    }
}

/// Persistence for job records.
///
/// `update` must run [`Job::apply`] atomically with respect to other
/// writers of the same job.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<(), JobError>;

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobError>;

    /// Apply an update and return the new snapshot
    async fn update(&self, id: JobId, update: JobUpdate) -> Result<Job, JobError>;

    /// Matching jobs, newest first
    async fn list(&self, query: &JobQuery) -> Result<Vec<Job>, JobError>;

    async fn remove(&self, id: JobId) -> Result<bool, JobError>;
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), JobError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(JobError::Store(format!("Job {} already exists", job.id)));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> Result<Job, JobError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;
        job.apply(update)?;
        Ok(job.clone())
    }

    async fn list(&self, query: &JobQuery) -> Result<Vec<Job>, JobError> {
        let mut matching: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| query.matches(job))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn remove(&self, id: JobId) -> Result<bool, JobError> {
        Ok(self.jobs.write().await.remove(&id).is_some())
    }
}
