// crates/genjobs/tests/template_test.rs

use genjobs::{
    default_templates, InMemoryJobStore, InMemoryTemplateStore, JobError, JobService, JobStatus,
    Template, TemplateId, TemplateQuery, TemplateRequest, TemplateStore,
};
use gennodes::{standard_registry, NodeServices};
use genruntime::{FlowRuntime, RuntimeConfig, StageConfig, WorkflowConfig};
use chrono::Utc;
use std::sync::Arc;

fn service() -> JobService {
    let registry = standard_registry(&NodeServices::default());
    let runtime = FlowRuntime::with_registry(Arc::new(registry), RuntimeConfig::default());
    JobService::new(Arc::new(InMemoryJobStore::new()), Arc::new(runtime))
        .with_templates(Arc::new(InMemoryTemplateStore::with_defaults()))
}

async fn template_named(service: &JobService, name: &str) -> Template {
    service
        .active_templates(None)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.name == name)
        .unwrap()
}

#[test]
fn test_default_catalog() {
    let templates = default_templates();

    let names: Vec<&str> = templates.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Photorealistic Portrait",
            "Anime Style",
            "Oil Painting",
            "3D Render",
            "Sketch to Art"
        ]
    );
    assert!(templates.iter().all(|t| t.is_active));

    let sketch = &templates[4];
    let stages: Vec<&str> = sketch
        .workflow
        .pipeline
        .iter()
        .map(|s| s.node_type.as_str())
        .collect();
    assert_eq!(stages, vec!["image_input", "img2img_generation"]);
    assert_eq!(sketch.workflow.width, 768);

    let anime = &templates[1];
    assert_eq!(anime.workflow.scheduler, "EulerAncestral");
    assert_eq!(anime.workflow.cfg_scale, 12.0);
}

#[tokio::test]
async fn test_every_default_template_builds() {
    let service = service();

    for template in service.active_templates(None).await.unwrap() {
        let workflow = service.runtime().build_workflow(&template.workflow);
        assert!(workflow.is_ok(), "{} must build", template.name);
    }
}

#[tokio::test]
async fn test_submit_template_runs_its_workflow() {
    let service = service();
    let portrait = template_named(&service, "Photorealistic Portrait").await;

    let job = service
        .submit_template(
            TemplateRequest::new(portrait.id, "alice", "an old fisherman")
                .with_parameter("num_images", 2u32),
        )
        .await
        .unwrap();

    assert_eq!(job.template_id, Some(portrait.id));
    assert_eq!(job.workflow, portrait.workflow);
    assert_eq!(job.status, JobStatus::Queued);

    let done = service.run_attempt(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.results.len(), 2);
    assert_eq!(
        done.results[0].metadata["prompt"].as_str(),
        Some("an old fisherman, photorealistic, high detail, professional lighting")
    );
}

#[tokio::test]
async fn test_sketch_template_uses_the_submitted_image() {
    let service = service();
    let sketch = template_named(&service, "Sketch to Art").await;

    let job = service
        .submit_template(
            TemplateRequest::new(sketch.id, "alice", "a cathedral").with_input_image("sketch-bytes"),
        )
        .await
        .unwrap();
    let done = service.run_attempt(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let without_image = service
        .submit_template(TemplateRequest::new(sketch.id, "alice", "a cathedral"))
        .await
        .unwrap();
    let err = service.run_attempt(without_image.id).await.unwrap_err();
    assert_eq!(err.user_message(), "No input image provided");
}

#[tokio::test]
async fn test_unknown_or_inactive_template_is_rejected() {
    let service = service();

    let missing = TemplateId::new_v4();
    let err = service
        .submit_template(TemplateRequest::new(missing, "alice", "a cat"))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::TemplateUnavailable(id) if id == missing));
    assert_eq!(err.user_message(), "Template not found or inactive");

    let oil = template_named(&service, "Oil Painting").await;
    assert!(service.templates().set_active(oil.id, false).await.unwrap());
    let err = service
        .submit_template(TemplateRequest::new(oil.id, "alice", "a cat"))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::TemplateUnavailable(id) if id == oil.id));

    assert!(service.history("alice", 10, 0, None).await.unwrap().is_empty());
    assert!(!service
        .templates()
        .set_active(missing, true)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_template_with_unknown_stage_fails_on_submit() {
    let service = service();
    let broken = Template::new(
        "Face Swap",
        "Experimental",
        WorkflowConfig::default().with_stage(StageConfig::new("face_swap")),
    );
    service.templates().insert(broken.clone()).await.unwrap();

    let err = service
        .submit_template(TemplateRequest::new(broken.id, "alice", "a cat"))
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "Workflow error: Unknown node type: face_swap");
}

#[tokio::test]
async fn test_listing_filters_by_category_and_activity() {
    let service = service();

    let art = service.active_templates(Some("Art")).await.unwrap();
    assert_eq!(art.len(), 1);
    assert_eq!(art[0].name, "Oil Painting");

    let mut retired = Template::new("Watercolor", "Art", WorkflowConfig::default()).inactive();
    retired.created_at = Utc::now() + chrono::Duration::seconds(1);
    service.templates().insert(retired.clone()).await.unwrap();

    assert_eq!(service.active_templates(Some("Art")).await.unwrap().len(), 1);
    let all_art = service
        .templates()
        .list(&TemplateQuery::all().category("Art"))
        .await
        .unwrap();
    assert_eq!(all_art.len(), 2);
    assert_eq!(all_art[0].id, retired.id, "newest first");

    assert_eq!(
        service.template_categories().await.unwrap(),
        vec!["3D", "Anime", "Art", "Portrait", "Transformation"]
    );

    let err = service.templates().insert(retired).await.unwrap_err();
    assert!(matches!(err, JobError::Store(_)));
}

#[test]
fn test_template_serializes_workflow_config_key() {
    let template = &default_templates()[0];
    let json = serde_json::to_value(template).unwrap();

    assert_eq!(json["workflow_config"]["steps"], 50);
    assert_eq!(json["workflow_config"]["pipeline"][0]["node_type"], "prompt_enhancement");
    assert!(json.get("workflow").is_none());
}
