use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::capabilities::{allowed_actions, CapabilityKind};
use crate::language_model::{LanguageModelClient, ModelOptions};
use crate::planner::{PlanResponse, Planner};
use crate::trace::TraceEntry;

/// Planner that asks a language model for a JSON plan. The reply is returned
/// unvalidated; the engine checks its shape.
pub struct LlmPlanner {
    model: Arc<dyn LanguageModelClient>,
    options: ModelOptions,
}

impl LlmPlanner {
    pub fn new(model: Arc<dyn LanguageModelClient>) -> Self {
        let options = ModelOptions {
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            ..ModelOptions::default()
        };
        Self { model, options }
    }

    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    fn build_prompt(&self, request: &str, trace: &[TraceEntry]) -> String {
        let mut prompt = String::new();
        prompt.push_str("Plan the steps needed to handle the customer request below.\n\n");
        prompt.push_str("<<ACTIONS>>\n");
        for target in [CapabilityKind::Data, CapabilityKind::Response] {
            prompt.push_str(&format!(
                "- {}: {}\n",
                target.as_str(),
                allowed_actions(target).join(", ")
            ));
        }
        prompt.push_str("<<TRACE>>\n");
        for entry in trace {
            prompt.push_str(&entry.to_string());
            prompt.push('\n');
        }
        prompt.push_str("<<REQUEST>>\n");
        prompt.push_str(request);
        prompt.push_str("\n\nRespond ONLY with JSON matching this schema:\n");
        prompt.push_str(PLAN_SCHEMA_DESCRIPTION.trim());
        prompt
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    fn name(&self) -> &str {
        "language-model"
    }

    async fn plan(&self, request: &str, trace: &[TraceEntry]) -> Result<PlanResponse> {
        let prompt = self.build_prompt(request, trace);
        let response = self.model.complete(&prompt, &self.options).await?;
        debug!(chars = response.text.len(), "planner model replied");
        extract_json(&response.text)
            .map(PlanResponse::new)
            .ok_or_else(|| anyhow!("model reply was not JSON: {}", response.text))
    }
}

/// Pulls a JSON value out of free-form model text: the outermost `{...}`
/// block first, then the whole text.
pub fn extract_json(text: &str) -> Option<Value> {
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                return Some(value);
            }
        }
    }
    serde_json::from_str(text.trim()).ok()
}

const PLAN_SCHEMA_DESCRIPTION: &str = r#"{
  "type": "object",
  "required": ["steps"],
  "properties": {
    "steps": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["target", "action"],
        "properties": {
          "target": { "type": "string", "enum": ["data", "response"] },
          "action": { "type": "string" },
          "args": { "type": "object" }
        }
      }
    },
    "note": {
      "type": "string",
      "description": "Short summary of what the plan does"
    }
  }
}"#;

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are the router of a customer service system with two capabilities:
- data: fetch {id}, update {id, fields}, history {id}, create-ticket {id, issue, priority}, list {status, limit}
- response: respond, which writes the final answer from everything gathered so far.
Rules:
- Always gather data before responding.
- Use as few steps as reasonably possible; customer ids are integers.
- End the plan with a single response step.
- Respond with strict JSON matching the provided schema. No markdown, comments or extra text."#;
