use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
#[error("progress report rejected: {0}")]
pub struct ProgressError(pub String);

/// Receives `(percent, message)` after each node and once on failure.
///
/// Failures are logged by the scheduler and never abort execution.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: u8, message: &str) -> Result<(), ProgressError>;
}

/// Sink that discards every report
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _percent: u8, _message: &str) -> Result<(), ProgressError> {
        Ok(())
    }
}

/// `round(completed / total * 100)`, 0 for an empty workflow
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round().min(100.0) as u8
}
