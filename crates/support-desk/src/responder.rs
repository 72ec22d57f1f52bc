use std::sync::Arc;

use async_trait::async_trait;
use plan_engine::{
    CapabilityError, DataAction, LanguageModelClient, ModelOptions, ResponseCapability,
    ResultFragment,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    pub greeting: String,
    pub no_information: String,
    pub limitations_heading: String,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            greeting: "Here's what I found for you:".to_string(),
            no_information: plan_engine::DEFAULT_NO_INFORMATION_ANSWER.to_string(),
            limitations_heading: "There were some things I couldn't do:".to_string(),
        }
    }
}

/// Deterministic responder that words the fragments into a short answer.
/// Findings come first; limitations are listed separately.
#[derive(Debug, Clone, Default)]
pub struct TemplateResponder {
    config: ResponderConfig,
}

impl TemplateResponder {
    pub fn new(mut config: ResponderConfig) -> Self {
        if config.no_information.trim().is_empty() {
            config.no_information = ResponderConfig::default().no_information;
        }
        Self { config }
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    pub fn render(&self, fragments: &[ResultFragment]) -> String {
        if fragments.is_empty() {
            return self.config.no_information.clone();
        }

        let mut findings = Vec::new();
        let mut limitations = Vec::new();
        for fragment in fragments {
            match fragment {
                ResultFragment::Note { text } => findings.push(text.clone()),
                ResultFragment::Record { action, value } => findings.push(describe(*action, value)),
                ResultFragment::Limitation { text } => limitations.push(text.clone()),
            }
        }

        let mut sections = Vec::new();
        if !findings.is_empty() {
            sections.push(format!("{}\n{}", self.config.greeting, findings.join("\n")));
        }
        if !limitations.is_empty() {
            let lines: Vec<String> = limitations.iter().map(|text| format!("- {}", text)).collect();
            sections.push(format!(
                "{}\n{}",
                self.config.limitations_heading,
                lines.join("\n")
            ));
        }
        sections.join("\n\n")
    }
}

#[async_trait]
impl ResponseCapability for TemplateResponder {
    async fn respond(
        &self,
        _request: &str,
        fragments: &[ResultFragment],
        guidance: Option<&str>,
    ) -> Result<String, CapabilityError> {
        if let Some(guidance) = guidance {
            debug!(guidance, "template responder ignores guidance");
        }
        Ok(self.render(fragments))
    }
}

fn describe(action: DataAction, value: &Value) -> String {
    match action {
        DataAction::Fetch => format!("- {}", describe_customer(value)),
        DataAction::Update => format!("- Updated your details. {}", describe_customer(value)),
        DataAction::History => match value.as_array() {
            Some(tickets) if tickets.is_empty() => "- There are no tickets on file.".to_string(),
            Some(tickets) => {
                let mut lines = vec![format!("- Ticket history ({} ticket(s), newest first):", tickets.len())];
                lines.extend(tickets.iter().map(|ticket| format!("  {}", describe_ticket(ticket))));
                lines.join("\n")
            }
            None => format!("- Ticket history: {}", value),
        },
        DataAction::CreateTicket => format!("- Opened a support ticket: {}", describe_ticket(value)),
        DataAction::List => match value.as_array() {
            Some(customers) if customers.is_empty() => {
                "- No customers matched that status.".to_string()
            }
            Some(customers) => {
                let mut lines = vec![format!("- {} matching customer(s):", customers.len())];
                lines.extend(
                    customers
                        .iter()
                        .map(|customer| format!("  {}", describe_customer(customer))),
                );
                lines.join("\n")
            }
            None => format!("- Customers: {}", value),
        },
    }
}

fn describe_customer(value: &Value) -> String {
    match (value.get("id"), value.get("name")) {
        (Some(id), Some(Value::String(name))) => format!(
            "Customer #{}: {} ({}, {}), status {}.",
            id,
            name,
            text(value, "email"),
            text(value, "phone"),
            text(value, "status")
        ),
        _ => value.to_string(),
    }
}

fn describe_ticket(value: &Value) -> String {
    match value.get("id") {
        Some(id) => format!(
            "#{} [{}, {} priority] {}",
            id,
            text(value, "status"),
            text(value, "priority"),
            text(value, "issue")
        ),
        None => value.to_string(),
    }
}

fn text<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("unknown")
}

/// Responder that asks a language model to write the answer. Model failures
/// are reported as unavailable so the engine falls back to its own rendering.
pub struct LlmResponder {
    model: Arc<dyn LanguageModelClient>,
    options: ModelOptions,
    no_information: String,
}

impl LlmResponder {
    pub fn new(model: Arc<dyn LanguageModelClient>) -> Self {
        let options = ModelOptions {
            system_prompt: Some(RESPONDER_SYSTEM_PROMPT.to_string()),
            temperature: 0.4,
            ..ModelOptions::default()
        };
        Self {
            model,
            options,
            no_information: plan_engine::DEFAULT_NO_INFORMATION_ANSWER.to_string(),
        }
    }

    pub fn with_config(mut self, config: &ResponderConfig) -> Self {
        if !config.no_information.trim().is_empty() {
            self.no_information = config.no_information.clone();
        }
        self
    }

    fn build_prompt(request: &str, fragments: &[ResultFragment], guidance: Option<&str>) -> String {
        let payload = json!({
            "request": request,
            "results": fragments,
            "guidance": guidance,
        });
        format!(
            "Write the reply to the customer using only these results.\n{}",
            payload
        )
    }
}

#[async_trait]
impl ResponseCapability for LlmResponder {
    async fn respond(
        &self,
        request: &str,
        fragments: &[ResultFragment],
        guidance: Option<&str>,
    ) -> Result<String, CapabilityError> {
        if fragments.is_empty() {
            return Ok(self.no_information.clone());
        }
        let prompt = Self::build_prompt(request, fragments, guidance);
        match self.model.complete(&prompt, &self.options).await {
            Ok(response) => Ok(response.text.trim().to_string()),
            Err(err) => {
                warn!(error = %err, "responder model failed");
                Err(CapabilityError::Unavailable(format!("responder model: {:#}", err)))
            }
        }
    }
}

const RESPONDER_SYSTEM_PROMPT: &str = r#"You are the support agent of a customer service desk. You receive the customer's request,
the results gathered for it and optional guidance on tone or focus.
- Explain what was done on the customer's behalf and present the key results.
- State plainly anything that could not be done.
- Never invent data that is not in the results.
- Be polite, warm and concise. Do not mention internal tool names."#;

#[cfg(test)]
mod tests {
    use super::*;
    use plan_engine::LanguageModelResponse;
    use serde_json::json;

    #[tokio::test]
    async fn empty_fragments_get_the_canned_message() {
        let responder = TemplateResponder::default();
        let answer = responder.respond("hello", &[], None).await.unwrap();
        assert_eq!(answer, plan_engine::DEFAULT_NO_INFORMATION_ANSWER);
    }

    #[tokio::test]
    async fn blank_no_information_text_keeps_the_default() {
        let responder = TemplateResponder::new(ResponderConfig {
            no_information: " ".to_string(),
            ..ResponderConfig::default()
        });
        let answer = responder.respond("hello", &[], None).await.unwrap();
        assert_eq!(answer, plan_engine::DEFAULT_NO_INFORMATION_ANSWER);
    }

    #[test]
    fn findings_and_limitations_are_separate() {
        let responder = TemplateResponder::default();
        let answer = responder.render(&[
            ResultFragment::record(
                DataAction::Fetch,
                json!({
                    "id": 5,
                    "name": "Charlie Brown",
                    "email": "charlie.brown@example.com",
                    "phone": "+1-555-0105",
                    "status": "active"
                }),
            ),
            ResultFragment::limitation("Could not complete history for customer 5: not found."),
        ]);

        assert_eq!(
            answer,
            "Here's what I found for you:\n\
             - Customer #5: Charlie Brown (charlie.brown@example.com, +1-555-0105), status active.\n\n\
             There were some things I couldn't do:\n\
             - Could not complete history for customer 5: not found."
        );
    }

    #[test]
    fn ticket_history_lists_each_ticket() {
        let answer = TemplateResponder::default().render(&[ResultFragment::record(
            DataAction::History,
            json!([
                { "id": 9, "status": "open", "priority": "high", "issue": "Charged twice" },
                { "id": 3, "status": "resolved", "priority": "low", "issue": "Invoice copy" }
            ]),
        )]);
        assert!(answer.contains("Ticket history (2 ticket(s), newest first):"));
        assert!(answer.contains("  #9 [open, high priority] Charged twice"));
        assert!(!answer.contains("couldn't do"));
    }

    struct BrokenModel;

    #[async_trait]
    impl LanguageModelClient for BrokenModel {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &ModelOptions,
        ) -> anyhow::Result<LanguageModelResponse> {
            Err(anyhow::anyhow!("quota exhausted"))
        }
    }

    #[test]
    fn responder_system_prompt_has_no_surrounding_whitespace() {
        let responder = LlmResponder::new(Arc::new(BrokenModel));
        let prompt = responder.options.system_prompt.as_deref().unwrap();
        assert_eq!(prompt, prompt.trim());
        assert!(prompt.starts_with("You are the support agent"));
    }

    #[tokio::test]
    async fn model_failure_is_reported_as_unavailable() {
        let responder = LlmResponder::new(Arc::new(BrokenModel));
        let err = responder
            .respond("hi", &[ResultFragment::note("something")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Unavailable(_)));
        assert!(err.to_string().contains("quota exhausted"));

        let answer = responder.respond("hi", &[], None).await.unwrap();
        assert_eq!(answer, plan_engine::DEFAULT_NO_INFORMATION_ANSWER);
    }
}
