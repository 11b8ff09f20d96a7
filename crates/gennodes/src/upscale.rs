use crate::services::ImageGenerator;
use async_trait::async_trait;
use gencore::{Node, NodeContext, NodeError, NodeOutput, Value};
use genruntime::{NodeFactory, NodeMetadata, PortDefinition};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_SCALE_FACTOR: u32 = 2;
pub const DEFAULT_UPSCALER_MODEL: &str = "RealESRGAN_x4plus";

pub struct UpscaleNode {
    generator: Arc<dyn ImageGenerator>,
}

impl UpscaleNode {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Node for UpscaleNode {
    fn node_type(&self) -> &str {
        "upscaling"
    }

    async fn execute(&self, ctx: NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        let images = ctx
            .input("generated_images")
            .and_then(Value::as_images)
            .filter(|images| !images.is_empty())
            .ok_or_else(|| NodeError::Failed("No images to upscale".to_string()))?;

        let scale_factor = ctx.config_u32_or("scale_factor", DEFAULT_SCALE_FACTOR)?;
        let upscaler_model = ctx.config_str_or("upscaler_model", DEFAULT_UPSCALER_MODEL);

        let mut upscaled = Vec::with_capacity(images.len());
        for image in images {
            upscaled.push(
                self.generator
                    .upscale(image, scale_factor, &upscaler_model)
                    .await?,
            );
        }

        ctx.events.info(format!(
            "Upscaled {} image(s) by {}x",
            upscaled.len(),
            scale_factor
        ));

        Ok(NodeOutput::new()
            .with_output("upscaled_images", upscaled)
            .with_output("original_images", images.to_vec()))
    }
}

pub struct UpscaleNodeFactory {
    generator: Arc<dyn ImageGenerator>,
}

impl UpscaleNodeFactory {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self { generator }
    }
}

impl NodeFactory for UpscaleNodeFactory {
    fn create(&self, _parameters: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(UpscaleNode::new(self.generator.clone())))
    }

    fn node_type(&self) -> &str {
        "upscaling"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Upscale generated images".to_string(),
            category: "postprocess".to_string(),
            inputs: vec![PortDefinition::required("generated_images", "Images to upscale")],
            outputs: vec![
                PortDefinition::required("upscaled_images", "Upscaled images"),
                PortDefinition::required("original_images", "Images before upscaling"),
            ],
        }
    }
}
