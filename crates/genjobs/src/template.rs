use crate::error::JobError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gencore::Value;
use genruntime::{StageConfig, WorkflowConfig, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type TemplateId = Uuid;

/// A named, stored workflow users submit prompts against
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    #[serde(rename = "workflow_config", alias = "workflowConfig")]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub example_images: Vec<String>,
    /// UI hints for user-tunable parameters
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Template {
    pub fn new(name: impl Into<String>, category: impl Into<String>, workflow: WorkflowConfig) -> Self {
        Self {
            id: TemplateId::new_v4(),
            name: name.into(),
            description: None,
            category: category.into(),
            workflow,
            example_images: Vec::new(),
            parameters: HashMap::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_example_image(mut self, url: impl Into<String>) -> Self {
        self.example_images.push(url.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, hint: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), hint);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Filter for listing templates
#[derive(Debug, Clone, Default)]
pub struct TemplateQuery {
    pub category: Option<String>,
    pub active_only: bool,
}

impl TemplateQuery {
    /// Active templates of every category
    pub fn active() -> Self {
        Self {
            category: None,
            active_only: true,
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn matches(&self, template: &Template) -> bool {
        (!self.active_only || template.is_active)
            && self
                .category
                .as_deref()
                .map_or(true, |category| template.category == category)
    }
}

/// Persistence for the template catalog
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn insert(&self, template: Template) -> Result<(), JobError>;

    async fn get(&self, id: TemplateId) -> Result<Option<Template>, JobError>;

    /// Matching templates, newest first
    async fn list(&self, query: &TemplateQuery) -> Result<Vec<Template>, JobError>;

    /// Soft delete or restore; `false` when the template does not exist
    async fn set_active(&self, id: TemplateId, active: bool) -> Result<bool, JobError>;
}

#[derive(Default)]
pub struct InMemoryTemplateStore {
    templates: RwLock<HashMap<TemplateId, Template>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog seeded with [`default_templates`]
    pub fn with_defaults() -> Self {
        let templates: HashMap<TemplateId, Template> = default_templates()
            .into_iter()
            .map(|template| (template.id, template))
            .collect();
        Self {
            templates: RwLock::new(templates),
        }
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn insert(&self, template: Template) -> Result<(), JobError> {
        let mut templates = self.templates.write().await;
        if templates.contains_key(&template.id) {
            return Err(JobError::Store(format!(
                "Template {} already exists",
                template.id
            )));
        }
        templates.insert(template.id, template);
        Ok(())
    }

    async fn get(&self, id: TemplateId) -> Result<Option<Template>, JobError> {
        Ok(self.templates.read().await.get(&id).cloned())
    }

    async fn list(&self, query: &TemplateQuery) -> Result<Vec<Template>, JobError> {
        let mut matching: Vec<Template> = self
            .templates
            .read()
            .await
            .values()
            .filter(|template| query.matches(template))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(matching)
    }

    async fn set_active(&self, id: TemplateId, active: bool) -> Result<bool, JobError> {
        match self.templates.write().await.get_mut(&id) {
            Some(template) => {
                template.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// A submission against a stored template
#[derive(Debug, Clone)]
pub struct TemplateRequest {
    pub template_id: TemplateId,
    pub user_id: String,
    pub prompt: String,
    pub parameters: HashMap<String, Value>,
    pub input_image: Option<Value>,
}

impl TemplateRequest {
    pub fn new(template_id: TemplateId, user_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            template_id,
            user_id: user_id.into(),
            prompt: prompt.into(),
            parameters: HashMap::new(),
            input_image: None,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_input_image(mut self, image: impl Into<Value>) -> Self {
        self.input_image = Some(image.into());
        self
    }
}

fn styled_workflow(
    model: &str,
    scheduler: &str,
    steps: u32,
    cfg_scale: f64,
    (width, height): (u32, u32),
    style_prompts: serde_json::Value,
    negative_prompt: &str,
) -> WorkflowConfig {
    WorkflowConfig {
        model: model.to_string(),
        scheduler: scheduler.to_string(),
        steps,
        cfg_scale,
        width,
        height,
        pipeline: vec![
            StageConfig::new("prompt_enhancement").with_parameter("style_prompts", style_prompts),
            StageConfig::new("generation")
                .with_parameter("model_type", json!("diffusion"))
                .with_parameter("negative_prompt", json!(negative_prompt)),
        ],
    }
}

const SD15: &str = "runwayml/stable-diffusion-v1-5";

/// The starter catalog: four text-to-image styles and one sketch
/// transformation pipeline
pub fn default_templates() -> Vec<Template> {
    vec![
        Template::new(
            "Photorealistic Portrait",
            "Portrait",
            styled_workflow(
                DEFAULT_MODEL,
                "DPMSolverMultistep",
                50,
                7.5,
                (1024, 1024),
                json!(["photorealistic", "high detail", "professional lighting"]),
                "cartoon, anime, painting, drawing, illustration, low quality, blurry",
            ),
        )
        .with_description("Generate high-quality photorealistic human portraits")
        .with_example_image("https://www.telegraph.co.uk/multimedia/archive/02635/photorealistic_2635731k.jpg?imwidth=680")
        .with_parameter(
            "style_strength",
            json!({"type": "slider", "min": 0.1, "max": 1.0, "default": 0.7}),
        ),
        Template::new(
            "Anime Style",
            "Anime",
            styled_workflow(
                SD15,
                "EulerAncestral",
                30,
                12.0,
                (768, 1024),
                json!(["anime", "manga style", "cel shading", "vibrant colors"]),
                "realistic, photograph, 3d render, low quality",
            ),
        )
        .with_description("Create beautiful anime-style illustrations")
        .with_example_image("https://photo.coolenjoy.co.kr/data/editor/1610/thumb-Bimg_20161015030009_ptegolgm.jpg")
        .with_parameter(
            "color_scheme",
            json!({"type": "select", "options": ["vibrant", "pastel", "dark", "monochrome"], "default": "vibrant"}),
        ),
        Template::new(
            "Oil Painting",
            "Art",
            styled_workflow(
                DEFAULT_MODEL,
                "DDIM",
                40,
                8.0,
                (1024, 768),
                json!(["oil painting", "classical art", "renaissance style", "rich textures"]),
                "digital art, photograph, cartoon, low quality",
            ),
        )
        .with_description("Classical oil painting style artwork")
        .with_example_image("https://afremov.com/media/catalog/product/image_675_1.jpeg")
        .with_parameter(
            "brush_style",
            json!({"type": "select", "options": ["smooth", "textured", "impasto"], "default": "textured"}),
        ),
        Template::new(
            "3D Render",
            "3D",
            styled_workflow(
                DEFAULT_MODEL,
                "DPMSolverMultistep",
                35,
                9.0,
                (1024, 1024),
                json!(["3d render", "octane render", "blender", "high quality", "professional lighting"]),
                "2d, flat, painting, sketch, low quality, pixelated",
            ),
        )
        .with_description("Modern 3D rendered scenes and objects")
        .with_example_image("https://cdn.mos.cms.futurecdn.net/4365c5720b2f0aac43cc632b5694eda9-1200-80.jpg.webp")
        .with_parameter(
            "lighting_setup",
            json!({"type": "select", "options": ["studio", "natural", "dramatic", "soft"], "default": "studio"}),
        ),
        Template::new(
            "Sketch to Art",
            "Transformation",
            WorkflowConfig {
                model: SD15.to_string(),
                scheduler: "DDIM".to_string(),
                steps: 20,
                cfg_scale: 7.0,
                width: 768,
                height: 768,
                pipeline: vec![
                    StageConfig::new("image_input")
                        .with_parameter("input_type", json!("sketch"))
                        .with_parameter("preprocessing", json!("edge_detection")),
                    StageConfig::new("img2img_generation")
                        .with_parameter("model_type", json!("diffusion"))
                        .with_parameter("strength", json!(0.8)),
                ],
            },
        )
        .with_description("Transform sketches into detailed artwork")
        .with_example_image("https://images.squarespace-cdn.com/content/v1/57d5444be58c62ac0e2b4f95/1473599946759-0OR1TXLW0SSCXACKGRSS/TheAstronomer_Small.jpg")
        .with_parameter(
            "transformation_strength",
            json!({"type": "slider", "min": 0.1, "max": 1.0, "default": 0.8}),
        ),
    ]
}
