use crate::config::WorkflowConfig;
use crate::registry::NodeRegistry;
use gencore::{Workflow, WorkflowError};

/// Id of the save stage appended to every non-empty pipeline
pub const SAVE_NODE_ID: &str = "save_output";
pub const SAVE_NODE_TYPE: &str = "save_image";

const GENERATION_TYPES: [&str; 2] = ["generation", "img2img_generation"];

type PortPairs = &'static [(&'static str, &'static str)];

/// `(source type, target type)` → `(output key, input key)` pairs to wire
/// between consecutive stages.
const WIRING_RULES: &[(&str, &str, PortPairs)] = &[
    (
        "prompt_enhancement",
        "generation",
        &[
            ("enhanced_prompt", "enhanced_prompt"),
            ("negative_prompt", "negative_prompt"),
        ],
    ),
    (
        "prompt_enhancement",
        "img2img_generation",
        &[
            ("enhanced_prompt", "enhanced_prompt"),
            ("negative_prompt", "negative_prompt"),
        ],
    ),
    (
        "image_input",
        "img2img_generation",
        &[("processed_image", "input_image")],
    ),
    (
        "generation",
        "upscaling",
        &[("generated_images", "generated_images")],
    ),
    (
        "img2img_generation",
        "upscaling",
        &[("generated_images", "generated_images")],
    ),
    (
        "generation",
        "save_image",
        &[("generated_images", "generated_images")],
    ),
    (
        "img2img_generation",
        "save_image",
        &[("generated_images", "generated_images")],
    ),
    (
        "upscaling",
        "save_image",
        &[("upscaled_images", "generated_images")],
    ),
];

/// Port pairs wired between two consecutive stage types, if any
pub fn wiring_for(source_type: &str, target_type: &str) -> Option<PortPairs> {
    WIRING_RULES
        .iter()
        .find(|(source, target, _)| *source == source_type && *target == target_type)
        .map(|(_, _, pairs)| *pairs)
}

/// Builds workflows from linear pipeline configs
pub struct WorkflowBuilder<'a> {
    registry: &'a NodeRegistry,
}

impl<'a> WorkflowBuilder<'a> {
    pub fn new(registry: &'a NodeRegistry) -> Self {
        Self { registry }
    }

    /// One node per stage (`{node_type}_{index}`), consecutive stages
    /// auto-wired, plus a trailing save stage when the pipeline is non-empty.
    pub fn build(&self, config: &WorkflowConfig) -> Result<Workflow, WorkflowError> {
        let mut workflow = Workflow::new();
        let mut previous: Option<(String, String)> = None;

        for (i, stage) in config.pipeline.iter().enumerate() {
            let node_id = format!("{}_{}", stage.node_type, i);

            let mut parameters = stage.parameters();
            if GENERATION_TYPES.contains(&stage.node_type.as_str()) {
                parameters.extend(config.generation_parameters());
            }

            let node = self
                .registry
                .create_node(&node_id, &stage.node_type, parameters)?;
            workflow.add_node(node)?;

            if let Some((prev_id, prev_type)) = &previous {
                auto_connect(&mut workflow, prev_id, prev_type, &node_id, &stage.node_type)?;
            }
            previous = Some((node_id, stage.node_type.clone()));
        }

        if let Some((prev_id, prev_type)) = previous {
            let save = self
                .registry
                .create_node(SAVE_NODE_ID, SAVE_NODE_TYPE, Default::default())?;
            workflow.add_node(save)?;
            auto_connect(&mut workflow, &prev_id, &prev_type, SAVE_NODE_ID, SAVE_NODE_TYPE)?;
        }

        tracing::debug!(
            nodes = workflow.len(),
            connections = workflow.connections().count(),
            "Built workflow from config"
        );
        Ok(workflow)
    }
}

fn auto_connect(
    workflow: &mut Workflow,
    source_id: &str,
    source_type: &str,
    target_id: &str,
    target_type: &str,
) -> Result<(), WorkflowError> {
    match wiring_for(source_type, target_type) {
        Some(pairs) => {
            for (output_key, input_key) in pairs {
                workflow.connect(source_id, output_key, target_id, input_key)?;
            }
        }
        None => {
            tracing::warn!(
                source = source_id,
                target = target_id,
                "No wiring rule for {} -> {}; {} receives no data from the previous stage",
                source_type,
                target_type,
                target_id,
            );
        }
    }
    Ok(())
}
