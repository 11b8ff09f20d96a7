use crate::Value;
use std::collections::HashMap;
use uuid::Uuid;

pub type JobId = Uuid;

pub const PROMPT_KEY: &str = "prompt";
pub const PARAMETERS_KEY: &str = "parameters";
pub const INPUT_IMAGE_KEY: &str = "input_image";

/// Job-scoped state threaded through every node of one execution attempt.
///
/// A context is owned by exactly one attempt: it is never shared between
/// jobs and a retry starts from a freshly seeded one.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub job_id: JobId,
    pub user_id: String,
    data: HashMap<String, Value>,
    cache: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new(job_id: JobId, user_id: impl Into<String>) -> Self {
        Self {
            job_id,
            user_id: user_id.into(),
            data: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    /// Context seeded with the submitted prompt and request parameters
    pub fn for_job(
        job_id: JobId,
        user_id: impl Into<String>,
        prompt: impl Into<String>,
        parameters: HashMap<String, Value>,
    ) -> Self {
        Self::new(job_id, user_id)
            .with_data(PROMPT_KEY, Value::String(prompt.into()))
            .with_data(PARAMETERS_KEY, Value::Object(parameters))
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn prompt(&self) -> Option<&str> {
        self.data.get(PROMPT_KEY).and_then(Value::as_str)
    }

    pub fn parameters(&self) -> Option<&HashMap<String, Value>> {
        self.data.get(PARAMETERS_KEY).and_then(Value::as_object)
    }

    /// A single request parameter, e.g. `negative_prompt` or `seed`
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters().and_then(|p| p.get(name))
    }

    pub fn input_image(&self) -> Option<&Value> {
        self.data.get(INPUT_IMAGE_KEY).filter(|v| !v.is_null())
    }

    pub fn set_input_image(&mut self, image: impl Into<Value>) {
        self.data.insert(INPUT_IMAGE_KEY.to_string(), image.into());
    }

    pub fn cached(&self, key: &str) -> Option<&Value> {
        self.cache.get(key)
    }

    pub fn cache(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.cache.insert(key.into(), value.into());
    }
}
