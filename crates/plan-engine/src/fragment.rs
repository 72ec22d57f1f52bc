use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capabilities::DataAction;

/// Partial result accumulated while a plan executes. Only the response
/// capability consumes the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultFragment {
    /// Planner or scenario commentary.
    Note { text: String },
    /// Value returned by a data action.
    Record { action: DataAction, value: Value },
    /// Something the system could not do, worded for the user.
    Limitation { text: String },
}

impl ResultFragment {
    pub fn note(text: impl Into<String>) -> Self {
        Self::Note { text: text.into() }
    }

    pub fn record(action: DataAction, value: Value) -> Self {
        Self::Record { action, value }
    }

    pub fn limitation(text: impl Into<String>) -> Self {
        Self::Limitation { text: text.into() }
    }

    pub fn is_limitation(&self) -> bool {
        matches!(self, Self::Limitation { .. })
    }
}

/// Plain rendering used when no response capability answer is available.
pub fn render_plain(fragments: &[ResultFragment], empty_message: &str) -> String {
    if fragments.is_empty() {
        return empty_message.to_string();
    }
    fragments
        .iter()
        .map(|fragment| format!("- {}", fragment))
        .collect::<Vec<_>>()
        .join("\n")
}

impl fmt::Display for ResultFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note { text } | Self::Limitation { text } => write!(f, "{}", text),
            Self::Record { action, value } => write!(f, "{}: {}", action, value),
        }
    }
}
