use async_trait::async_trait;
use gencore::{Node, NodeContext, NodeError, NodeOutput, Value};
use genruntime::{NodeFactory, NodeMetadata, PortDefinition};
use std::collections::HashMap;

/// Appends style fragments to the user's prompt
pub struct PromptEnhancementNode;

#[async_trait]
impl Node for PromptEnhancementNode {
    fn node_type(&self) -> &str {
        "prompt_enhancement"
    }

    async fn execute(&self, ctx: NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        let base_prompt = ctx
            .input("prompt")
            .and_then(Value::as_str)
            .or_else(|| ctx.execution.prompt())
            .unwrap_or_default()
            .to_string();

        let style_prompts = ctx
            .config
            .get("style_prompts")
            .and_then(Value::as_string_list)
            .unwrap_or_default();
        let negative_prompt = ctx.config_str_or("negative_prompt", "");

        let enhanced_prompt = if style_prompts.is_empty() {
            base_prompt.clone()
        } else {
            format!("{}, {}", base_prompt, style_prompts.join(", "))
        };

        Ok(NodeOutput::new()
            .with_output("enhanced_prompt", enhanced_prompt)
            .with_output("negative_prompt", negative_prompt)
            .with_output("original_prompt", base_prompt))
    }
}

pub struct PromptEnhancementNodeFactory;

impl NodeFactory for PromptEnhancementNodeFactory {
    fn create(&self, _parameters: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(PromptEnhancementNode))
    }

    fn node_type(&self) -> &str {
        "prompt_enhancement"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Enhance the prompt with style-specific additions".to_string(),
            category: "prompt".to_string(),
            inputs: vec![PortDefinition::optional("prompt", "Overrides the job prompt")],
            outputs: vec![
                PortDefinition::required("enhanced_prompt", "Prompt with styles appended"),
                PortDefinition::required("negative_prompt", "Configured negative prompt"),
                PortDefinition::required("original_prompt", "Prompt before enhancement"),
            ],
        }
    }
}
