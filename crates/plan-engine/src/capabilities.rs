use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Capability providers a plan step can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityKind {
    #[serde(rename = "data")]
    Data,
    #[serde(rename = "response")]
    Response,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Response => "response",
        }
    }

    /// Participant name used for this provider in interaction traces.
    pub fn agent_name(&self) -> &'static str {
        match self {
            Self::Data => "CustomerDataAgent",
            Self::Response => "SupportAgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "data" | "customer_data" | "customerdataagent" | "data_agent" => Some(Self::Data),
            "response" | "support" | "supportagent" | "support_agent" => Some(Self::Response),
            _ => None,
        }
    }
}

impl FromStr for CapabilityKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or(())
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operations exposed by the data capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataAction {
    Fetch,
    Update,
    History,
    CreateTicket,
    List,
}

impl DataAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Update => "update",
            Self::History => "history",
            Self::CreateTicket => "create-ticket",
            Self::List => "list",
        }
    }
}

impl fmt::Display for DataAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved (target, action) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Data(DataAction),
    Respond,
}

impl Action {
    pub fn target(&self) -> CapabilityKind {
        match self {
            Action::Data(_) => CapabilityKind::Data,
            Action::Respond => CapabilityKind::Response,
        }
    }
}

/// One row of the dispatch table. `aliases` carries the tool names the
/// reference planners emit for the same operation.
#[derive(Debug, Clone, Copy)]
pub struct ActionSpec {
    pub target: CapabilityKind,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub action: Action,
}

pub const ACTION_TABLE: &[ActionSpec] = &[
    ActionSpec {
        target: CapabilityKind::Data,
        name: "fetch",
        aliases: &["get_customer"],
        action: Action::Data(DataAction::Fetch),
    },
    ActionSpec {
        target: CapabilityKind::Data,
        name: "update",
        aliases: &["update_customer"],
        action: Action::Data(DataAction::Update),
    },
    ActionSpec {
        target: CapabilityKind::Data,
        name: "history",
        aliases: &["get_customer_history"],
        action: Action::Data(DataAction::History),
    },
    ActionSpec {
        target: CapabilityKind::Data,
        name: "create-ticket",
        aliases: &["create_ticket"],
        action: Action::Data(DataAction::CreateTicket),
    },
    ActionSpec {
        target: CapabilityKind::Data,
        name: "list",
        aliases: &["list_customers"],
        action: Action::Data(DataAction::List),
    },
    ActionSpec {
        target: CapabilityKind::Response,
        name: "respond",
        aliases: &[],
        action: Action::Respond,
    },
];

/// Looks up an action allowed for `target`. Names match case-insensitively on
/// the canonical name or any alias.
pub fn lookup_action(target: CapabilityKind, name: &str) -> Option<Action> {
    let name = name.trim();
    ACTION_TABLE
        .iter()
        .filter(|spec| spec.target == target)
        .find(|spec| {
            spec.name.eq_ignore_ascii_case(name)
                || spec.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name))
        })
        .map(|spec| spec.action)
}

/// Finds the target for a bare tool name, as used by `{"tool": ..}` steps.
pub fn target_for_tool(name: &str) -> Option<CapabilityKind> {
    let name = name.trim();
    ACTION_TABLE
        .iter()
        .find(|spec| {
            spec.name.eq_ignore_ascii_case(name)
                || spec.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name))
        })
        .map(|spec| spec.target)
}

/// Canonical action names allowed for a target, in table order.
pub fn allowed_actions(target: CapabilityKind) -> Vec<&'static str> {
    ACTION_TABLE
        .iter()
        .filter(|spec| spec.target == target)
        .map(|spec| spec.name)
        .collect()
}
