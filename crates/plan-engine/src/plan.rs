use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::capabilities::{target_for_tool, CapabilityKind};
use crate::classifier;
use crate::planner::PlanResponse;
use crate::step::Step;

/// Reasons a planner reply cannot be turned into a plan. Any of these ends
/// the orchestration call early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("planner failed: {0}")]
    PlannerFailed(String),
    #[error("planner reply is not a JSON object")]
    NotAnObject,
    #[error("planner reply has neither `steps` nor a delegation decision")]
    UnrecognizedShape,
    #[error("`steps` must be a list")]
    StepsNotAList,
    #[error("step {index} is malformed: {reason}")]
    MalformedStep { index: usize, reason: String },
    #[error("`{0}` must be a string")]
    MalformedField(&'static str),
    #[error("delegation decision is malformed: {0}")]
    MalformedDelegation(String),
}

/// Ordered steps for one request plus the commentary the planner attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub note: Option<String>,
    pub limitations: Vec<String>,
    pub guidance: Option<String>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_limitation(mut self, limitation: impl Into<String>) -> Self {
        self.limitations.push(limitation.into());
        self
    }

    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = Some(guidance.into());
        self
    }

    pub fn ends_with_respond(&self) -> bool {
        self.steps.last().map(Step::is_respond).unwrap_or(false)
    }

    /// Serializes the plan in the `{"steps": [...]}` shape planners reply with.
    pub fn to_payload(&self) -> PlanResponse {
        let steps: Vec<Value> = self
            .steps
            .iter()
            .map(|step| {
                json!({
                    "target": step.target,
                    "action": step.action,
                    "args": Value::Object(step.args.clone()),
                })
            })
            .collect();
        let mut payload = Map::new();
        payload.insert("steps".to_string(), Value::Array(steps));
        if let Some(note) = &self.note {
            payload.insert("note".to_string(), json!(note));
        }
        if !self.limitations.is_empty() {
            payload.insert("limitations".to_string(), json!(self.limitations));
        }
        if let Some(guidance) = &self.guidance {
            payload.insert("guidance".to_string(), json!(guidance));
        }
        PlanResponse::new(Value::Object(payload))
    }

    /// Validates an untrusted planner reply. Accepts either a step list or a
    /// delegation decision; a delegation is expanded into data steps by the
    /// scenario classifier.
    pub fn from_response(response: &PlanResponse, request: &str) -> Result<Self, PlanError> {
        let object = response.as_value().as_object().ok_or(PlanError::NotAnObject)?;
        if let Some(steps) = object.get("steps") {
            return parse_step_plan(object, steps);
        }
        if object.contains_key("need_data") || object.contains_key("needsData") {
            let delegation = Delegation::parse(object)?;
            return Ok(delegation.into_plan(request));
        }
        Err(PlanError::UnrecognizedShape)
    }
}

/// Router-style decision: whether data work is needed and what each
/// capability should focus on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub needs_data: bool,
    pub data_instruction: String,
    pub response_instruction: String,
}

impl Delegation {
    fn parse(object: &Map<String, Value>) -> Result<Self, PlanError> {
        let needs_data = match field(object, &["need_data", "needsData"]) {
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(PlanError::MalformedDelegation("need_data must be a boolean".into())),
            None => return Err(PlanError::MalformedDelegation("need_data is missing".into())),
        };
        let data_instruction =
            required_text(object, &["data_instruction", "dataInstruction"], "data_instruction")?;
        let response_instruction = required_text(
            object,
            &["support_instruction", "responseInstruction", "response_instruction"],
            "support_instruction",
        )?;
        Ok(Self {
            needs_data,
            data_instruction,
            response_instruction,
        })
    }

    pub fn into_plan(self, request: &str) -> Plan {
        let mut plan = if self.needs_data {
            let instruction = if self.data_instruction.trim().is_empty() {
                request
            } else {
                self.data_instruction.as_str()
            };
            classifier::plan_for(instruction)
        } else {
            Plan::default()
        };
        if !self.response_instruction.trim().is_empty() {
            plan.guidance = Some(self.response_instruction.trim().to_string());
        }
        plan
    }
}

fn parse_step_plan(object: &Map<String, Value>, steps: &Value) -> Result<Plan, PlanError> {
    let items = steps.as_array().ok_or(PlanError::StepsNotAList)?;
    let steps = items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_step(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    let note = optional_text(object, "note")?;
    let guidance = optional_text(object, "guidance")?;
    let limitations = match object.get("limitations") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(values)) => values
            .iter()
            .map(|value| {
                value
                    .as_str()
                    .map(str::to_string)
                    .ok_or(PlanError::MalformedField("limitations"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(PlanError::MalformedField("limitations")),
    };

    Ok(Plan {
        steps,
        note,
        limitations,
        guidance,
    })
}

fn parse_step(index: usize, value: &Value) -> Result<Step, PlanError> {
    let malformed = |reason: &str| PlanError::MalformedStep {
        index,
        reason: reason.to_string(),
    };
    let object = value.as_object().ok_or_else(|| malformed("not an object"))?;

    let args = match object.get("args").or_else(|| object.get("arguments")) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(malformed("`args` must be an object")),
    };

    if let Some(tool) = object.get("tool") {
        let tool = tool.as_str().ok_or_else(|| malformed("`tool` must be a string"))?;
        let target = match object.get("target") {
            Some(Value::String(target)) => target.clone(),
            Some(_) => return Err(malformed("`target` must be a string")),
            None => target_for_tool(tool)
                .unwrap_or(CapabilityKind::Data)
                .as_str()
                .to_string(),
        };
        return Ok(Step {
            target,
            action: tool.to_string(),
            args,
        });
    }

    let target = match object.get("target") {
        Some(Value::String(target)) => target.clone(),
        Some(_) => return Err(malformed("`target` must be a string")),
        None => return Err(malformed("missing `target`")),
    };
    let action = match object.get("action") {
        Some(Value::String(action)) => action.clone(),
        Some(_) => return Err(malformed("`action` must be a string")),
        None => return Err(malformed("missing `action`")),
    };
    Ok(Step {
        target,
        action,
        args,
    })
}

fn field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| object.get(*key))
}

fn required_text(
    object: &Map<String, Value>,
    keys: &[&str],
    label: &'static str,
) -> Result<String, PlanError> {
    match field(object, keys) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(_) => Err(PlanError::MalformedDelegation(format!("{} must be a string", label))),
        None => Err(PlanError::MalformedDelegation(format!("{} is missing", label))),
    }
}

fn optional_text(object: &Map<String, Value>, key: &'static str) -> Result<Option<String>, PlanError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.trim().to_string())),
        Some(_) => Err(PlanError::MalformedField(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<Plan, PlanError> {
        Plan::from_response(&PlanResponse::new(value), "Get customer information for ID 5")
    }

    #[test]
    fn accepts_step_lists() {
        let plan = parse(json!({
            "steps": [
                { "target": "data", "action": "fetch", "args": { "id": 5 } },
                { "target": "response", "action": "respond" }
            ],
            "note": "looked up the profile"
        }))
        .unwrap();

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].args.get("id"), Some(&json!(5)));
        assert!(plan.ends_with_respond());
        assert_eq!(plan.note.as_deref(), Some("looked up the profile"));
    }

    #[test]
    fn accepts_tool_style_steps() {
        let plan = parse(json!({
            "steps": [ { "tool": "get_customer_history", "args": { "customer_id": 10 } } ],
            "note": ""
        }))
        .unwrap();

        assert_eq!(plan.steps[0].target, "data");
        assert_eq!(plan.steps[0].action, "get_customer_history");
        assert_eq!(plan.note, None);
    }

    #[test]
    fn unknown_pairs_survive_validation() {
        let plan = parse(json!({
            "steps": [ { "target": "data", "action": "teleport", "args": {} } ]
        }))
        .unwrap();
        assert_eq!(plan.steps[0].action, "teleport");
    }

    #[test]
    fn rejects_malformed_shapes() {
        assert_eq!(parse(json!({ "steps": "not-a-list" })), Err(PlanError::StepsNotAList));
        assert_eq!(parse(json!(["fetch"])), Err(PlanError::NotAnObject));
        assert_eq!(parse(json!({ "plan": [] })), Err(PlanError::UnrecognizedShape));
        assert!(matches!(
            parse(json!({ "steps": [ { "action": "fetch" } ] })),
            Err(PlanError::MalformedStep { index: 0, .. })
        ));
        assert!(matches!(
            parse(json!({ "steps": [ { "target": "data", "action": "fetch", "args": [5] } ] })),
            Err(PlanError::MalformedStep { index: 0, .. })
        ));
        assert!(matches!(
            parse(json!({ "steps": [ "fetch 5" ] })),
            Err(PlanError::MalformedStep { index: 0, .. })
        ));
        assert_eq!(
            parse(json!({ "steps": [], "limitations": "none" })),
            Err(PlanError::MalformedField("limitations"))
        );
    }

    #[test]
    fn expands_delegation_into_data_steps() {
        let plan = parse(json!({
            "need_data": true,
            "data_instruction": "Look up customer 10, update their email to new@email.com, then show their ticket history.",
            "support_instruction": "Confirm the email change and summarize open tickets."
        }))
        .unwrap();

        let actions: Vec<&str> = plan.steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["update", "history"]);
        assert_eq!(
            plan.guidance.as_deref(),
            Some("Confirm the email change and summarize open tickets.")
        );
    }

    #[test]
    fn delegation_without_data_has_no_steps() {
        let plan = parse(json!({
            "needsData": false,
            "dataInstruction": "",
            "responseInstruction": "Explain our opening hours."
        }))
        .unwrap();
        assert!(plan.steps.is_empty());
        assert_eq!(plan.guidance.as_deref(), Some("Explain our opening hours."));
    }

    #[test]
    fn delegation_requires_every_key() {
        assert!(matches!(
            parse(json!({ "need_data": true, "data_instruction": "fetch 5" })),
            Err(PlanError::MalformedDelegation(_))
        ));
        assert!(matches!(
            parse(json!({ "need_data": "yes", "data_instruction": "", "support_instruction": "" })),
            Err(PlanError::MalformedDelegation(_))
        ));
    }

    #[test]
    fn payload_round_trips_through_validation() {
        let plan = Plan::new(vec![Step::respond()])
            .with_note("nothing to look up")
            .with_limitation("no id given");
        assert_eq!(parse(plan.to_payload().0).unwrap(), plan);
    }
}
