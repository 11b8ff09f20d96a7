// crates/genjobs/tests/publisher_test.rs

use chrono::Utc;
use futures::StreamExt;
use gencore::{ImageResult, JobId};
use genjobs::{
    InMemoryJobStore, JobError, JobService, JobStatus, JobUpdate, NewJob, ProgressPublisher,
    StreamMessage, CONNECTED_MESSAGE, MIN_POLL_INTERVAL,
};
use gennodes::{standard_registry, NodeServices};
use genruntime::{FlowRuntime, RuntimeConfig, StageConfig, WorkflowConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn service() -> Arc<JobService> {
    let registry = standard_registry(&NodeServices::default());
    let runtime = FlowRuntime::with_registry(Arc::new(registry), RuntimeConfig::default());
    Arc::new(JobService::new(Arc::new(InMemoryJobStore::new()), Arc::new(runtime)))
}

fn request() -> NewJob {
    NewJob::new(
        "alice",
        "a harbor at dusk",
        WorkflowConfig::default().with_stage(StageConfig::new("generation")),
    )
}

fn image() -> ImageResult {
    ImageResult {
        image_url: "https://example.com/images/x_0.jpg".to_string(),
        thumbnail_url: None,
        metadata: HashMap::new(),
    }
}

async fn collect(
    publisher: &ProgressPublisher,
    job_id: JobId,
    user_id: &str,
) -> Vec<Result<StreamMessage, JobError>> {
    publisher.subscribe(job_id, user_id).collect().await
}

#[tokio::test(start_paused = true)]
async fn test_stream_emits_only_on_change_and_ends_when_finished() {
    let service = service();
    let job = service.submit(request()).await.unwrap();
    let publisher = ProgressPublisher::new(service.clone(), Duration::from_secs(1));

    let store = service.store().clone();
    let job_id = job.id;
    let driver = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        store.update(job_id, JobUpdate::dispatch(Utc::now())).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        store.update(job_id, JobUpdate::new().progress(50)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        store
            .update(job_id, JobUpdate::complete(Utc::now(), vec![image()]))
            .await
            .unwrap();
    });

    let messages: Vec<StreamMessage> = collect(&publisher, job.id, "alice")
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    driver.await.unwrap();

    let seen: Vec<(JobStatus, u8)> = messages.iter().map(|m| (m.status, m.progress)).collect();
    assert_eq!(
        seen,
        vec![
            (JobStatus::Queued, 0),
            (JobStatus::Processing, 0),
            (JobStatus::Processing, 50),
            (JobStatus::Completed, 100),
        ],
        "unchanged polls are suppressed"
    );

    assert_eq!(messages[0].message.as_deref(), Some(CONNECTED_MESSAGE));
    assert_eq!(messages[0].queue_position, Some(1));
    assert!(messages[0].results.is_none());
    assert_eq!(messages[3].results.as_ref().map(Vec::len), Some(1));
    assert!(messages[3].error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stream_for_finished_job_emits_once() {
    let service = service();
    let job = service.submit(request()).await.unwrap();
    service.cancel(job.id, "alice").await.unwrap();
    let publisher = ProgressPublisher::new(service.clone(), Duration::from_secs(1));

    let messages = collect(&publisher, job.id, "alice").await;

    assert_eq!(messages.len(), 1);
    let message = messages[0].as_ref().unwrap();
    assert_eq!(message.status, JobStatus::Cancelled);
    assert_eq!(message.error.as_deref(), Some("Cancelled by user"));
    assert_eq!(message.message.as_deref(), Some(CONNECTED_MESSAGE));
}

#[tokio::test(start_paused = true)]
async fn test_stream_for_unknown_job_yields_error() {
    let publisher = ProgressPublisher::new(service(), Duration::from_secs(1));
    let missing = JobId::new_v4();

    let messages = collect(&publisher, missing, "alice").await;

    assert_eq!(messages.len(), 1);
    assert!(matches!(messages[0], Err(JobError::NotFound(id)) if id == missing));
}

#[tokio::test]
async fn test_snapshot_serializes_camel_case() {
    let service = service();
    let job = service.submit(request()).await.unwrap();
    let publisher = ProgressPublisher::new(service.clone(), Duration::from_secs(1));

    let snapshot = publisher.snapshot(job.id, "alice").await.unwrap();
    let json = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(json["jobId"], job.id.to_string());
    assert_eq!(json["status"], "queued");
    assert_eq!(json["queuePosition"], 1);
    assert!(json.get("results").is_none());
    assert!(json.get("error").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stream_is_scoped_to_the_job_owner() {
    let service = service();
    let job = service.submit(request()).await.unwrap();
    service.cancel(job.id, "alice").await.unwrap();
    let publisher = ProgressPublisher::new(service.clone(), Duration::from_secs(1));

    let messages = collect(&publisher, job.id, "mallory").await;
    assert_eq!(messages.len(), 1);
    assert!(matches!(messages[0], Err(JobError::NotFound(id)) if id == job.id));
    assert!(matches!(
        publisher.snapshot(job.id, "mallory").await,
        Err(JobError::NotFound(_))
    ));

    let messages = collect(&publisher, job.id, "admin").await;
    assert_eq!(messages[0].as_ref().unwrap().status, JobStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_zero_poll_interval_is_raised_to_minimum() {
    let service = service();
    let job = service.submit(request()).await.unwrap();
    let publisher = ProgressPublisher::new(service.clone(), Duration::ZERO);
    assert_eq!(publisher.poll_interval(), MIN_POLL_INTERVAL);

    let store = service.store().clone();
    let job_id = job.id;
    let driver = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.update(job_id, JobUpdate::dispatch(Utc::now())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        store
            .update(job_id, JobUpdate::complete(Utc::now(), vec![image()]))
            .await
            .unwrap();
    });

    let statuses: Vec<JobStatus> = collect(&publisher, job.id, "alice")
        .await
        .into_iter()
        .map(|message| message.unwrap().status)
        .collect();
    driver.await.unwrap();

    assert_eq!(
        statuses,
        vec![JobStatus::Queued, JobStatus::Processing, JobStatus::Completed]
    );
}
