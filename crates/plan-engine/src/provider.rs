use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::fragment::ResultFragment;
use crate::step::{CustomerId, Priority};

/// Failure reported by a capability provider. The engine never propagates it;
/// it becomes a limitation fragment for the step that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("capability unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("no reply within {millis} ms")]
    Timeout { millis: u64 },
}

pub type CapabilityResult = Result<Value, CapabilityError>;

/// Record-store operations. Each method is called at most once per step.
#[async_trait]
pub trait DataCapability: Send + Sync {
    async fn fetch(&self, id: CustomerId) -> CapabilityResult;

    async fn update(&self, id: CustomerId, fields: &Map<String, Value>) -> CapabilityResult;

    async fn history(&self, id: CustomerId) -> CapabilityResult;

    async fn create_ticket(
        &self,
        id: CustomerId,
        issue: &str,
        priority: Priority,
    ) -> CapabilityResult;

    async fn list(&self, status: &str, limit: u32) -> CapabilityResult;
}

/// Turns the accumulated fragments into the final user-facing message.
/// Implementations must answer with a canned "no information" message when
/// `fragments` is empty.
#[async_trait]
pub trait ResponseCapability: Send + Sync {
    async fn respond(
        &self,
        request: &str,
        fragments: &[ResultFragment],
        guidance: Option<&str>,
    ) -> Result<String, CapabilityError>;
}
