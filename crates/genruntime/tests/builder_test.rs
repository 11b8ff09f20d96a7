// crates/genruntime/tests/builder_test.rs

use async_trait::async_trait;
use gencore::{Node, NodeContext, NodeError, NodeOutput, Value, WorkflowError};
use genruntime::{
    wiring_for, NodeFactory, NodeRegistry, StageConfig, WorkflowBuilder, WorkflowConfig,
    SAVE_NODE_ID,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

struct Stub(&'static str);

#[async_trait]
impl Node for Stub {
    fn node_type(&self) -> &str {
        self.0
    }

    async fn execute(&self, _ctx: NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new())
    }
}

struct StubFactory(&'static str);

impl NodeFactory for StubFactory {
    fn create(&self, _parameters: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(Stub(self.0)))
    }

    fn node_type(&self) -> &str {
        self.0
    }
}

fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    for key in [
        "prompt_enhancement",
        "generation",
        "image_input",
        "img2img_generation",
        "upscaling",
        "save_image",
    ] {
        registry.register(Arc::new(StubFactory(key)));
    }
    registry
}

fn edges(workflow: &gencore::Workflow) -> Vec<(String, String, String, String)> {
    let mut edges: Vec<_> = workflow
        .connections()
        .map(|c| {
            (
                c.from_node.clone(),
                c.from_port.clone(),
                c.to_node.clone(),
                c.to_port.clone(),
            )
        })
        .collect();
    edges.sort();
    edges
}

fn edge(from: &str, out: &str, to: &str, input: &str) -> (String, String, String, String) {
    (from.into(), out.into(), to.into(), input.into())
}

#[test]
fn test_pipeline_is_auto_wired_with_trailing_save() {
    let registry = registry();
    let config = WorkflowConfig::default()
        .with_stage(StageConfig::new("prompt_enhancement"))
        .with_stage(StageConfig::new("generation"))
        .with_stage(StageConfig::new("upscaling"));

    let workflow = WorkflowBuilder::new(&registry).build(&config).unwrap();

    let ids: Vec<&str> = workflow.nodes().map(|n| n.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["prompt_enhancement_0", "generation_1", "upscaling_2", SAVE_NODE_ID]
    );

    let mut expected = vec![
        edge("prompt_enhancement_0", "enhanced_prompt", "generation_1", "enhanced_prompt"),
        edge("prompt_enhancement_0", "negative_prompt", "generation_1", "negative_prompt"),
        edge("generation_1", "generated_images", "upscaling_2", "generated_images"),
        edge("upscaling_2", "upscaled_images", SAVE_NODE_ID, "generated_images"),
    ];
    expected.sort();
    assert_eq!(edges(&workflow), expected);
}

#[test]
fn test_img2img_pipeline_wires_the_input_image() {
    let registry = registry();
    let config = WorkflowConfig::default()
        .with_stage(StageConfig::new("image_input"))
        .with_stage(StageConfig::new("img2img_generation"));

    let workflow = WorkflowBuilder::new(&registry).build(&config).unwrap();

    let mut expected = vec![
        edge("image_input_0", "processed_image", "img2img_generation_1", "input_image"),
        edge("img2img_generation_1", "generated_images", SAVE_NODE_ID, "generated_images"),
    ];
    expected.sort();
    assert_eq!(edges(&workflow), expected);
}

#[test]
fn test_global_values_override_generation_parameters() {
    let registry = registry();
    let config = WorkflowConfig {
        width: 768,
        steps: 30,
        ..WorkflowConfig::default()
    }
    .with_stage(
        StageConfig::new("generation")
            .with_parameter("steps", json!(10))
            .with_parameter("negative_prompt", json!("blurry")),
    )
    .with_stage(StageConfig::new("upscaling").with_parameter("scale_factor", json!(4)));

    let workflow = WorkflowBuilder::new(&registry).build(&config).unwrap();

    let generation = workflow.node("generation_0").unwrap();
    assert_eq!(generation.parameters["steps"].as_u64(), Some(30));
    assert_eq!(generation.parameters["width"].as_u64(), Some(768));
    assert_eq!(generation.parameters["height"].as_u64(), Some(1024));
    assert_eq!(generation.parameters["negative_prompt"].as_str(), Some("blurry"));
    assert_eq!(
        generation.parameters["model"].as_str(),
        Some("stabilityai/stable-diffusion-xl-base-1.0")
    );

    // Non-generation stages keep only their own parameters
    let upscaling = workflow.node("upscaling_1").unwrap();
    assert_eq!(upscaling.parameters.len(), 1);
    assert_eq!(upscaling.parameters["scale_factor"].as_u64(), Some(4));
}

#[test]
fn test_unknown_stage_type_fails_the_build() {
    let registry = registry();
    let config = WorkflowConfig::default()
        .with_stage(StageConfig::new("generation"))
        .with_stage(StageConfig::new("face_swap"));

    let err = WorkflowBuilder::new(&registry).build(&config).unwrap_err();
    assert_eq!(err, WorkflowError::UnknownNodeType("face_swap".to_string()));
}

#[test]
fn test_unmatched_pair_is_left_unwired() {
    let registry = registry();
    let config = WorkflowConfig::default()
        .with_stage(StageConfig::new("upscaling"))
        .with_stage(StageConfig::new("generation"));

    let workflow = WorkflowBuilder::new(&registry).build(&config).unwrap();

    assert!(wiring_for("upscaling", "generation").is_none());
    assert_eq!(workflow.len(), 3);
    assert_eq!(
        edges(&workflow),
        vec![edge("generation_1", "generated_images", SAVE_NODE_ID, "generated_images")]
    );
}

#[test]
fn test_empty_pipeline_builds_an_empty_workflow() {
    let registry = registry();

    let workflow = WorkflowBuilder::new(&registry)
        .build(&WorkflowConfig::default())
        .unwrap();

    assert!(workflow.is_empty());
}

#[test]
fn test_config_accepts_camel_case_and_defaults() {
    let config = WorkflowConfig::from_value(json!({
        "model": "custom/model",
        "cfgScale": 9.0,
        "pipeline": [
            { "nodeType": "prompt_enhancement", "parameters": { "style_prompts": ["anime"] } },
            { "node_type": "generation" }
        ]
    }))
    .unwrap();

    assert_eq!(config.model, "custom/model");
    assert_eq!(config.cfg_scale, 9.0);
    assert_eq!(config.steps, 50);
    assert_eq!(config.width, 1024);
    assert_eq!(config.scheduler, "DPMSolverMultistep");
    assert_eq!(config.pipeline.len(), 2);
    assert_eq!(config.pipeline[0].node_type, "prompt_enhancement");
    assert_eq!(
        config.pipeline[0].parameters()["style_prompts"].as_string_list(),
        Some(vec!["anime".to_string()])
    );
}

#[test]
fn test_malformed_config_is_rejected() {
    let err = WorkflowConfig::from_json(r#"{ "pipeline": [ { "parameters": {} } ] }"#).unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidConfig(_)));
}
