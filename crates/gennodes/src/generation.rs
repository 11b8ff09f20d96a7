use crate::services::{GenerationRequest, ImageGenerator};
use async_trait::async_trait;
use gencore::{Node, NodeContext, NodeError, NodeOutput, Value};
use genruntime::{
    NodeFactory, NodeMetadata, PortDefinition, DEFAULT_CFG_SCALE, DEFAULT_DIMENSION, DEFAULT_MODEL,
    DEFAULT_SCHEDULER, DEFAULT_STEPS,
};
use std::collections::HashMap;
use std::sync::Arc;

const MAX_IMAGES_PER_JOB: u64 = 4;

/// Prompt inputs, in order of preference
const PROMPT_INPUTS: [&str; 2] = ["enhanced_prompt", "prompt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    TextToImage,
    ImageToImage,
}

impl GenerationMode {
    fn node_type(self) -> &'static str {
        match self {
            GenerationMode::TextToImage => "generation",
            GenerationMode::ImageToImage => "img2img_generation",
        }
    }
}

/// Produces images through the configured generator
pub struct GenerationNode {
    mode: GenerationMode,
    generator: Arc<dyn ImageGenerator>,
}

impl GenerationNode {
    pub fn new(mode: GenerationMode, generator: Arc<dyn ImageGenerator>) -> Self {
        Self { mode, generator }
    }

    fn build_request(&self, ctx: &NodeContext<'_>) -> Result<GenerationRequest, NodeError> {
        let wired = PROMPT_INPUTS
            .iter()
            .find_map(|&field| ctx.input(field).map(|value| (field, value)));
        let prompt = match wired {
            Some((field, value)) => Some(value.as_str().ok_or_else(|| {
                NodeError::InvalidInputType {
                    field: field.to_string(),
                    expected: "string".to_string(),
                    actual: value.type_name().to_string(),
                }
            })?),
            None => ctx.execution.prompt(),
        }
        .filter(|p| !p.is_empty())
        .ok_or_else(|| NodeError::MissingInput("prompt".to_string()))?
        .to_string();

        let negative_prompt = ctx
            .input("negative_prompt")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .or_else(|| ctx.config.get("negative_prompt").and_then(Value::as_str))
            .or_else(|| ctx.execution.parameter("negative_prompt").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        let input_image = match self.mode {
            GenerationMode::TextToImage => None,
            GenerationMode::ImageToImage => Some(
                ctx.input("input_image")
                    .or_else(|| ctx.execution.input_image())
                    .cloned()
                    .ok_or_else(|| NodeError::MissingInput("input_image".to_string()))?,
            ),
        };

        let requested = ctx
            .execution
            .parameter("num_images")
            .and_then(Value::as_u64)
            .unwrap_or(1);
        let num_images = requested.clamp(1, MAX_IMAGES_PER_JOB);
        if num_images != requested {
            ctx.events.warn(format!(
                "num_images {} adjusted to {}",
                requested, num_images
            ));
        }

        Ok(GenerationRequest {
            prompt,
            negative_prompt,
            width: ctx.config_u32_or("width", DEFAULT_DIMENSION)?,
            height: ctx.config_u32_or("height", DEFAULT_DIMENSION)?,
            steps: ctx.config_u32_or("steps", DEFAULT_STEPS)?,
            cfg_scale: ctx.config_f64_or("cfg_scale", DEFAULT_CFG_SCALE),
            scheduler: ctx.config_str_or("scheduler", DEFAULT_SCHEDULER),
            model: ctx.config_str_or("model", DEFAULT_MODEL),
            seed: ctx.execution.parameter("seed").and_then(Value::as_u64),
            num_images: num_images as u32,
            input_image,
        })
    }
}

fn request_metadata(request: &GenerationRequest) -> HashMap<String, Value> {
    let mut metadata = HashMap::from([
        ("prompt".to_string(), Value::from(request.prompt.as_str())),
        (
            "negative_prompt".to_string(),
            Value::from(request.negative_prompt.as_str()),
        ),
        ("width".to_string(), Value::from(request.width)),
        ("height".to_string(), Value::from(request.height)),
        ("steps".to_string(), Value::from(request.steps)),
        ("cfg_scale".to_string(), Value::from(request.cfg_scale)),
        ("scheduler".to_string(), Value::from(request.scheduler.as_str())),
        ("model".to_string(), Value::from(request.model.as_str())),
    ]);
    if let Some(seed) = request.seed {
        metadata.insert("seed".to_string(), Value::Number(seed as f64));
    }
    metadata
}

#[async_trait]
impl Node for GenerationNode {
    fn node_type(&self) -> &str {
        self.mode.node_type()
    }

    async fn execute(&self, ctx: NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        let request = self.build_request(&ctx)?;

        ctx.events.info(format!(
            "Generating {} image(s) with {} ({} steps)",
            request.num_images, request.model, request.steps
        ));

        let mut images = self.generator.generate(&request).await?;
        if images.is_empty() {
            return Err(NodeError::Failed("Generator returned no images".to_string()));
        }

        let metadata = request_metadata(&request);
        for image in &mut images {
            image.metadata.extend(metadata.clone());
        }

        tracing::debug!(node_id = ctx.node_id, count = images.len(), "Generated images");

        Ok(NodeOutput::new()
            .with_output("generated_images", images)
            .with_output("generation_metadata", metadata))
    }
}

pub struct GenerationNodeFactory {
    mode: GenerationMode,
    generator: Arc<dyn ImageGenerator>,
}

impl GenerationNodeFactory {
    pub fn text_to_image(generator: Arc<dyn ImageGenerator>) -> Self {
        Self {
            mode: GenerationMode::TextToImage,
            generator,
        }
    }

    pub fn image_to_image(generator: Arc<dyn ImageGenerator>) -> Self {
        Self {
            mode: GenerationMode::ImageToImage,
            generator,
        }
    }
}

impl NodeFactory for GenerationNodeFactory {
    fn create(&self, _parameters: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(GenerationNode::new(self.mode, self.generator.clone())))
    }

    fn node_type(&self) -> &str {
        self.mode.node_type()
    }

    fn metadata(&self) -> NodeMetadata {
        let mut inputs = vec![
            PortDefinition::optional("enhanced_prompt", "Prompt from an enhancement stage"),
            PortDefinition::optional("prompt", "Explicit prompt"),
            PortDefinition::optional("negative_prompt", "Things to avoid"),
        ];
        let description = match self.mode {
            GenerationMode::TextToImage => "Generate images from a text prompt",
            GenerationMode::ImageToImage => {
                inputs.push(PortDefinition::required("input_image", "Source image"));
                "Generate images from a source image and a prompt"
            }
        };

        NodeMetadata {
            description: description.to_string(),
            category: "generation".to_string(),
            inputs,
            outputs: vec![
                PortDefinition::required("generated_images", "Generated image artifacts"),
                PortDefinition::required("generation_metadata", "Parameters used"),
            ],
        }
    }
}
