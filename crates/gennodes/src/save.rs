use crate::services::ImageStorage;
use async_trait::async_trait;
use gencore::{Node, NodeContext, NodeError, NodeOutput, Value};
use genruntime::{NodeFactory, NodeMetadata, PortDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// Stores every incoming image and emits the durable results
pub struct SaveImageNode {
    storage: Arc<dyn ImageStorage>,
}

impl SaveImageNode {
    pub fn new(storage: Arc<dyn ImageStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Node for SaveImageNode {
    fn node_type(&self) -> &str {
        "save_image"
    }

    async fn execute(&self, ctx: NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        let images = ctx
            .first_input(&["generated_images", "upscaled_images"])
            .and_then(Value::as_images)
            .filter(|images| !images.is_empty())
            .ok_or_else(|| NodeError::Failed("No images to save".to_string()))?;

        let job_id = ctx.execution.job_id;
        let mut saved = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            saved.push(self.storage.save(job_id, index, image).await?);
        }

        tracing::info!(%job_id, count = saved.len(), "Saved images");

        let count = saved.len();
        Ok(NodeOutput::new()
            .with_output("saved_images", saved)
            .with_output("image_count", count))
    }
}

pub struct SaveImageNodeFactory {
    storage: Arc<dyn ImageStorage>,
}

impl SaveImageNodeFactory {
    pub fn new(storage: Arc<dyn ImageStorage>) -> Self {
        Self { storage }
    }
}

impl NodeFactory for SaveImageNodeFactory {
    fn create(&self, _parameters: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(SaveImageNode::new(self.storage.clone())))
    }

    fn node_type(&self) -> &str {
        "save_image"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Save images to storage".to_string(),
            category: "output".to_string(),
            inputs: vec![
                PortDefinition::optional("generated_images", "Images to store"),
                PortDefinition::optional("upscaled_images", "Used when no generated images are wired"),
            ],
            outputs: vec![
                PortDefinition::required("saved_images", "Stored image results"),
                PortDefinition::required("image_count", "Number of stored images"),
            ],
        }
    }
}
