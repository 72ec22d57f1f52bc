use std::fmt;

use serde::{Deserialize, Serialize};

pub const USER: &str = "User";
pub const ORCHESTRATOR: &str = "Orchestrator";

/// One directed message between participants of an orchestration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub sender: String,
    pub recipient: String,
    pub content: String,
}

impl TraceEntry {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            content: content.into(),
        }
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} → {}] {}", self.sender, self.recipient, self.content)
    }
}

/// Append-only interaction log for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceLog {
    entries: Vec<TraceEntry>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) {
        self.entries.push(TraceEntry::new(sender, recipient, content));
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }
}

impl fmt::Display for TraceLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render(&self.entries))
    }
}

/// Renders entries one per line in `[sender → recipient] content` form.
pub fn render(entries: &[TraceEntry]) -> String {
    entries
        .iter()
        .map(TraceEntry::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
