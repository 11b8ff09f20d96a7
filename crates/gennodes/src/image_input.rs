use async_trait::async_trait;
use gencore::{Node, NodeContext, NodeError, NodeOutput, Value};
use genruntime::{NodeFactory, NodeMetadata, PortDefinition};
use std::collections::HashMap;

/// Supplies the source image of an img2img pipeline
pub struct ImageInputNode;

#[async_trait]
impl Node for ImageInputNode {
    fn node_type(&self) -> &str {
        "image_input"
    }

    async fn execute(&self, ctx: NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        let image = ctx
            .input("image_data")
            .or_else(|| ctx.execution.input_image())
            .cloned()
            .ok_or_else(|| NodeError::Failed("No input image provided".to_string()))?;

        let preprocessing = ctx.config_str_or("preprocessing", "none");

        Ok(NodeOutput::new()
            .with_output("processed_image", image.clone())
            .with_output("original_image", image)
            .with_output("preprocessing_applied", preprocessing))
    }
}

pub struct ImageInputNodeFactory;

impl NodeFactory for ImageInputNodeFactory {
    fn create(&self, _parameters: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(ImageInputNode))
    }

    fn node_type(&self) -> &str {
        "image_input"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Load the input image for img2img generation".to_string(),
            category: "input".to_string(),
            inputs: vec![PortDefinition::optional(
                "image_data",
                "Image payload; falls back to the job's input image",
            )],
            outputs: vec![
                PortDefinition::required("processed_image", "Image after preprocessing"),
                PortDefinition::required("original_image", "Image as received"),
                PortDefinition::required("preprocessing_applied", "Preprocessing name"),
            ],
        }
    }
}
