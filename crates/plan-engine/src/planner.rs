use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::trace::TraceEntry;

/// Untyped planner output. Nothing inside is trusted until
/// [`Plan::from_response`](crate::plan::Plan::from_response) accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanResponse(pub Value);

impl PlanResponse {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Strategy that proposes a plan for a request. Generative and rule-based
/// planners are interchangeable behind this trait.
#[async_trait]
pub trait Planner: Send + Sync {
    fn name(&self) -> &str;

    async fn plan(&self, request: &str, trace: &[TraceEntry]) -> Result<PlanResponse>;
}
