use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::capabilities::{lookup_action, Action, CapabilityKind, DataAction};

/// Identifier of a customer record in the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub u64);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coerces a planner-supplied identifier. Accepts a non-negative JSON integer
/// or a non-empty string made only of ASCII digits; anything else is rejected.
pub fn coerce_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => {
            text.parse().ok()
        }
        _ => None,
    }
}

/// A plan step exactly as the planner named it. Resolution against the
/// action table happens at execution time so that a bad step only costs
/// itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub target: String,
    pub action: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Step {
    pub fn new(target: impl Into<String>, action: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            target: target.into(),
            action: action.into(),
            args,
        }
    }

    pub fn data(action: DataAction, args: Value) -> Self {
        Self::new(CapabilityKind::Data.as_str(), action.as_str(), args)
    }

    pub fn respond() -> Self {
        Self::new(CapabilityKind::Response.as_str(), "respond", json!({}))
    }

    /// Whether this step resolves to the terminating response action.
    pub fn is_respond(&self) -> bool {
        CapabilityKind::parse(&self.target)
            .and_then(|target| lookup_action(target, &self.action))
            .map(|action| action == Action::Respond)
            .unwrap_or(false)
    }
}

/// Why a step was skipped without calling any provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("unknown action target \"{0}\"")]
    UnknownTarget(String),
    #[error("unknown action \"{action}\" for the {target} capability")]
    UnknownAction { target: CapabilityKind, action: String },
    #[error("invalid {field} for {action}: {reason}")]
    InvalidArgument {
        action: DataAction,
        field: &'static str,
        reason: String,
    },
}

/// Defaults applied to `list` when the planner leaves arguments out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDefaults {
    pub status: String,
    pub limit: u32,
}

impl Default for ListDefaults {
    fn default() -> Self {
        Self {
            status: "active".to_string(),
            limit: 20,
        }
    }
}

/// A data step with validated, typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum DataCommand {
    Fetch {
        id: CustomerId,
    },
    Update {
        id: CustomerId,
        fields: Map<String, Value>,
    },
    History {
        id: CustomerId,
    },
    CreateTicket {
        id: CustomerId,
        issue: String,
        priority: Priority,
    },
    List {
        status: String,
        limit: u32,
    },
}

impl DataCommand {
    pub fn from_args(
        action: DataAction,
        args: &Map<String, Value>,
        defaults: &ListDefaults,
    ) -> Result<Self, StepError> {
        match action {
            DataAction::Fetch => Ok(Self::Fetch {
                id: required_id(action, args)?,
            }),
            DataAction::Update => {
                let id = required_id(action, args)?;
                let fields = match args.get("fields") {
                    Some(Value::Object(map)) => map.clone(),
                    other => {
                        return Err(invalid(action, "fields", "expected a mapping", other));
                    }
                };
                Ok(Self::Update { id, fields })
            }
            DataAction::History => Ok(Self::History {
                id: required_id(action, args)?,
            }),
            DataAction::CreateTicket => {
                let id = required_id(action, args)?;
                let issue = match args.get("issue") {
                    Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
                    other => {
                        return Err(invalid(action, "issue", "expected a description", other));
                    }
                };
                // An unrecognized priority rejects the step rather than being stored as-is.
                let priority = match args.get("priority") {
                    None | Some(Value::Null) => Priority::default(),
                    Some(Value::String(text)) => Priority::parse(text).ok_or_else(|| {
                        invalid(action, "priority", "expected low, medium or high", args.get("priority"))
                    })?,
                    other => {
                        return Err(invalid(action, "priority", "expected low, medium or high", other));
                    }
                };
                Ok(Self::CreateTicket {
                    id,
                    issue,
                    priority,
                })
            }
            DataAction::List => {
                let status = match args.get("status") {
                    Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
                    _ => defaults.status.clone(),
                };
                let limit = args
                    .get("limit")
                    .and_then(coerce_id)
                    .and_then(|limit| u32::try_from(limit).ok())
                    .unwrap_or(defaults.limit);
                Ok(Self::List { status, limit })
            }
        }
    }

    pub fn action(&self) -> DataAction {
        match self {
            Self::Fetch { .. } => DataAction::Fetch,
            Self::Update { .. } => DataAction::Update,
            Self::History { .. } => DataAction::History,
            Self::CreateTicket { .. } => DataAction::CreateTicket,
            Self::List { .. } => DataAction::List,
        }
    }

    /// Short human-readable form used in trace entries.
    pub fn describe(&self) -> String {
        match self {
            Self::Fetch { id } => format!("fetch customer {}", id),
            Self::Update { id, fields } => {
                let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
                format!("update customer {} ({})", id, keys.join(", "))
            }
            Self::History { id } => format!("history for customer {}", id),
            Self::CreateTicket { id, priority, .. } => {
                format!("create-ticket for customer {} (priority {})", id, priority)
            }
            Self::List { status, limit } => {
                format!("list customers with status {} (limit {})", status, limit)
            }
        }
    }
}

/// A step resolved against the action table.
#[derive(Debug, Clone, PartialEq)]
pub enum StepCommand {
    Data(DataCommand),
    Respond,
}

pub fn resolve(step: &Step, defaults: &ListDefaults) -> Result<StepCommand, StepError> {
    let target = CapabilityKind::parse(&step.target)
        .ok_or_else(|| StepError::UnknownTarget(step.target.clone()))?;
    let action = lookup_action(target, &step.action).ok_or_else(|| StepError::UnknownAction {
        target,
        action: step.action.clone(),
    })?;
    match action {
        Action::Data(data_action) => {
            DataCommand::from_args(data_action, &step.args, defaults).map(StepCommand::Data)
        }
        Action::Respond => Ok(StepCommand::Respond),
    }
}

fn required_id(action: DataAction, args: &Map<String, Value>) -> Result<CustomerId, StepError> {
    let raw = args.get("id").or_else(|| args.get("customer_id"));
    raw.and_then(coerce_id)
        .map(CustomerId)
        .ok_or_else(|| invalid(action, "id", "expected an integer customer id", raw))
}

fn invalid(action: DataAction, field: &'static str, expected: &str, got: Option<&Value>) -> StepError {
    let reason = match got {
        Some(value) => format!("{}, got {}", expected, value),
        None => format!("{}, got nothing", expected),
    };
    StepError::InvalidArgument {
        action,
        field,
        reason,
    }
}
