use gencore::{Value, WorkflowError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_MODEL: &str = "stabilityai/stable-diffusion-xl-base-1.0";
pub const DEFAULT_SCHEDULER: &str = "DPMSolverMultistep";
pub const DEFAULT_STEPS: u32 = 50;
pub const DEFAULT_CFG_SCALE: f64 = 7.5;
pub const DEFAULT_DIMENSION: u32 = 1024;

/// Declarative pipeline description a workflow is built from.
///
/// Accepts both snake_case and camelCase keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_scheduler")]
    pub scheduler: String,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_cfg_scale", alias = "cfgScale")]
    pub cfg_scale: f64,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default)]
    pub pipeline: Vec<StageConfig>,
}

/// One linear pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageConfig {
    #[serde(alias = "nodeType")]
    pub node_type: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

impl StageConfig {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn parameters(&self) -> HashMap<String, Value> {
        self.parameters
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect()
    }
}

impl WorkflowConfig {
    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        serde_json::from_str(json).map_err(|e| WorkflowError::InvalidConfig(e.to_string()))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, WorkflowError> {
        serde_json::from_value(value).map_err(|e| WorkflowError::InvalidConfig(e.to_string()))
    }

    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.pipeline.push(stage);
        self
    }

    /// Global values merged into every generation stage
    pub fn generation_parameters(&self) -> HashMap<String, Value> {
        HashMap::from([
            ("width".to_string(), Value::from(self.width)),
            ("height".to_string(), Value::from(self.height)),
            ("steps".to_string(), Value::from(self.steps)),
            ("cfg_scale".to_string(), Value::from(self.cfg_scale)),
            ("scheduler".to_string(), Value::from(self.scheduler.as_str())),
            ("model".to_string(), Value::from(self.model.as_str())),
        ])
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            scheduler: default_scheduler(),
            steps: DEFAULT_STEPS,
            cfg_scale: DEFAULT_CFG_SCALE,
            width: DEFAULT_DIMENSION,
            height: DEFAULT_DIMENSION,
            pipeline: Vec::new(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_scheduler() -> String {
    DEFAULT_SCHEDULER.to_string()
}

fn default_steps() -> u32 {
    DEFAULT_STEPS
}

fn default_cfg_scale() -> f64 {
    DEFAULT_CFG_SCALE
}

fn default_dimension() -> u32 {
    DEFAULT_DIMENSION
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
        }
    }
}
