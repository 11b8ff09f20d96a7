//! Collaborators the built-in nodes delegate to.
//!
//! The actual image computation and the object store live outside the
//! engine; nodes only see these traits. Implementations are constructed once
//! at process start and shared by every job.

use async_trait::async_trait;
use gencore::{ImageArtifact, ImageResult, JobId, NodeError, UpscaleInfo, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct ServiceError(pub String);

impl From<ServiceError> for NodeError {
    fn from(e: ServiceError) -> Self {
        NodeError::Failed(e.0)
    }
}

/// Everything a generator needs to produce images
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f64,
    pub scheduler: String,
    pub model: String,
    pub seed: Option<u64>,
    pub num_images: u32,
    /// Source image for img2img
    pub input_image: Option<Value>,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ImageArtifact>, ServiceError>;

    async fn upscale(
        &self,
        image: &ImageArtifact,
        scale_factor: u32,
        upscaler_model: &str,
    ) -> Result<ImageArtifact, ServiceError>;
}

#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// Durably store the `index`-th image of a job
    async fn save(
        &self,
        job_id: JobId,
        index: usize,
        image: &ImageArtifact,
    ) -> Result<ImageResult, ServiceError>;
}

/// Generator returning placeholder image data without running a model
pub struct PlaceholderGenerator;

const PLACEHOLDER_SEED: u64 = 12345;

#[async_trait]
impl ImageGenerator for PlaceholderGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ImageArtifact>, ServiceError> {
        let started = Instant::now();
        let base_seed = request.seed.unwrap_or(PLACEHOLDER_SEED);

        Ok((0..request.num_images.max(1))
            .map(|i| ImageArtifact {
                image_data: format!("placeholder_image_{}", uuid::Uuid::new_v4()),
                seed: base_seed + i as u64,
                model_used: request.model.clone(),
                generation_time_secs: started.elapsed().as_secs_f64(),
                metadata: Default::default(),
                upscale: None,
            })
            .collect())
    }

    async fn upscale(
        &self,
        image: &ImageArtifact,
        scale_factor: u32,
        upscaler_model: &str,
    ) -> Result<ImageArtifact, ServiceError> {
        Ok(ImageArtifact {
            upscale: Some(UpscaleInfo {
                scale_factor,
                upscaler_model: upscaler_model.to_string(),
            }),
            ..image.clone()
        })
    }
}

/// Storage that derives public URLs from the job id without persisting bytes
pub struct UrlStorage {
    image_base_url: String,
    thumbnail_base_url: String,
}

impl UrlStorage {
    pub fn new(image_base_url: impl Into<String>, thumbnail_base_url: impl Into<String>) -> Self {
        Self {
            image_base_url: image_base_url.into().trim_end_matches('/').to_string(),
            thumbnail_base_url: thumbnail_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for UrlStorage {
    fn default() -> Self {
        Self::new("https://example.com/images", "https://example.com/thumbnails")
    }
}

#[async_trait]
impl ImageStorage for UrlStorage {
    async fn save(
        &self,
        job_id: JobId,
        index: usize,
        image: &ImageArtifact,
    ) -> Result<ImageResult, ServiceError> {
        let mut metadata = image.metadata.clone();
        metadata.insert("seed".to_string(), Value::Number(image.seed as f64));
        metadata.insert("model_used".to_string(), Value::from(image.model_used.as_str()));

        Ok(ImageResult {
            image_url: format!("{}/{}_{}.jpg", self.image_base_url, job_id, index),
            thumbnail_url: Some(format!("{}/{}_{}.jpg", self.thumbnail_base_url, job_id, index)),
            metadata,
        })
    }
}

/// Shared collaborators handed to every node factory
#[derive(Clone)]
pub struct NodeServices {
    pub generator: Arc<dyn ImageGenerator>,
    pub storage: Arc<dyn ImageStorage>,
}

impl NodeServices {
    pub fn new(generator: Arc<dyn ImageGenerator>, storage: Arc<dyn ImageStorage>) -> Self {
        Self { generator, storage }
    }
}

impl Default for NodeServices {
    fn default() -> Self {
        Self::new(Arc::new(PlaceholderGenerator), Arc::new(UrlStorage::default()))
    }
}
