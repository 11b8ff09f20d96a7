//! Standard node library
//!
//! Built-in pipeline stages for prompt enhancement, image generation,
//! upscaling and storage. Nodes delegate the heavy lifting to the
//! collaborators in [`services`].

mod generation;
mod image_input;
mod prompt;
mod save;
pub mod services;
mod upscale;

pub use generation::{GenerationMode, GenerationNode, GenerationNodeFactory};
pub use image_input::{ImageInputNode, ImageInputNodeFactory};
pub use prompt::{PromptEnhancementNode, PromptEnhancementNodeFactory};
pub use save::{SaveImageNode, SaveImageNodeFactory};
pub use services::{
    GenerationRequest, ImageGenerator, ImageStorage, NodeServices, PlaceholderGenerator,
    ServiceError, UrlStorage,
};
pub use upscale::{UpscaleNode, UpscaleNodeFactory, DEFAULT_SCALE_FACTOR, DEFAULT_UPSCALER_MODEL};

use genruntime::NodeRegistry;
use std::sync::Arc;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry, services: &NodeServices) {
    registry.register(Arc::new(PromptEnhancementNodeFactory));
    registry.register(Arc::new(GenerationNodeFactory::text_to_image(
        services.generator.clone(),
    )));
    registry.register(Arc::new(ImageInputNodeFactory));
    registry.register(Arc::new(GenerationNodeFactory::image_to_image(
        services.generator.clone(),
    )));
    registry.register(Arc::new(UpscaleNodeFactory::new(services.generator.clone())));
    registry.register(Arc::new(SaveImageNodeFactory::new(services.storage.clone())));
}

/// A registry holding every standard node
pub fn standard_registry(services: &NodeServices) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry, services);
    registry
}
