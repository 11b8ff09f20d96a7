use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An image produced by a generation step and passed between nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageArtifact {
    pub image_data: String,
    pub seed: u64,
    pub model_used: String,
    pub generation_time_secs: f64,
    /// Parameters the image was generated with
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub upscale: Option<UpscaleInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpscaleInfo {
    pub scale_factor: u32,
    pub upscaler_model: String,
}

/// A durably stored image, as attached to a job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageResult {
    pub image_url: String,
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}
