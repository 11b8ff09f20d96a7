use crate::error::JobError;
use crate::model::{JobStatus, StreamMessage};
use crate::service::JobService;
use futures::stream::{self, Stream};
use gencore::JobId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

pub const CONNECTED_MESSAGE: &str = "Connected to job stream";

/// Shortest accepted poll period
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Pollable and streamable view of job state for transports.
///
/// The publisher owns no background task: a subscription polls only while
/// its stream is being consumed, and dropping the stream stops it.
pub struct ProgressPublisher {
    service: Arc<JobService>,
    poll_interval: Duration,
}

impl ProgressPublisher {
    /// `poll_interval` is raised to [`MIN_POLL_INTERVAL`] when shorter
    pub fn new(service: Arc<JobService>, poll_interval: Duration) -> Self {
        Self {
            service,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Current status of a job visible to `user_id`, with results once
    /// completed
    pub async fn snapshot(&self, job_id: JobId, user_id: &str) -> Result<StreamMessage, JobError> {
        let job = self.service.get(job_id, user_id).await?;
        Ok(StreamMessage::from_job(&job))
    }

    /// Stream of status messages for one job visible to `user_id`.
    ///
    /// Emits on connect, then polls at the configured cadence and emits
    /// only when status or progress changed. Ends after the job leaves
    /// queued/processing, or with an error if the job disappears or
    /// belongs to someone else.
    pub fn subscribe(
        &self,
        job_id: JobId,
        user_id: impl Into<String>,
    ) -> impl Stream<Item = Result<StreamMessage, JobError>> + Send + 'static {
        let state = PollState {
            service: self.service.clone(),
            job_id,
            user_id: user_id.into(),
            period: self.poll_interval,
            interval: None,
            last: None,
            done: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                if state.last.is_some() {
                    state.tick().await;
                }

                let job = match state.service.get(state.job_id, &state.user_id).await {
                    Ok(job) => job,
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                };

                let seen = (job.status, job.progress);
                let first = state.last.is_none();
                let changed = state.last != Some(seen);
                state.last = Some(seen);
                state.done = !job.status.is_active();

                if changed {
                    let mut message = StreamMessage::from_job(&job);
                    if first {
                        message = message.with_message(CONNECTED_MESSAGE);
                    }
                    return Some((Ok(message), state));
                }
            }
        })
    }
}

struct PollState {
    service: Arc<JobService>,
    job_id: JobId,
    user_id: String,
    period: Duration,
    interval: Option<Interval>,
    last: Option<(JobStatus, u8)>,
    done: bool,
}

impl PollState {
    async fn tick(&mut self) {
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
    }
}
