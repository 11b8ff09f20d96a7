//! Job lifecycle around the workflow runtime
//!
//! Submissions name a stored [`Template`] or carry their own workflow config.
//! Jobs move through `queued -> processing -> {completed, failed, cancelled}`
//! under [`Job::apply`]. [`JobService`] runs single attempts, [`JobQueue`]
//! adds the worker pool and retry policy, and [`ProgressPublisher`] exposes
//! job state to polling and streaming transports.

mod error;
mod model;
mod publisher;
mod queue;
mod service;
mod store;
mod template;

pub use error::JobError;
pub use model::{Job, JobStatus, JobUpdate, NewJob, StreamMessage, CANCELLED_MESSAGE};
pub use publisher::{ProgressPublisher, CONNECTED_MESSAGE, MIN_POLL_INTERVAL};
pub use queue::{JobQueue, JobTask, RetryPolicy, WorkerConfig};
pub use service::{JobService, QueueStats, ADMIN_USER, DEFAULT_RETENTION_DAYS, MAX_HISTORY_LIMIT};
pub use store::{InMemoryJobStore, JobQuery, JobStore};
pub use template::{
    default_templates, InMemoryTemplateStore, Template, TemplateId, TemplateQuery, TemplateRequest,
    TemplateStore,
};
