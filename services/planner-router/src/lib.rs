use std::sync::Arc;

use anyhow::{anyhow, Result};
use plan_engine::{LanguageModelClient, LlmPlanner, Planner, ScenarioPlanner};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlannerKind {
    #[serde(rename = "language_model")]
    LanguageModel,
    #[serde(rename = "scenario_classifier")]
    ScenarioClassifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    #[serde(default = "RoutingPolicy::default_prefer_generative")]
    pub prefer_generative: bool,
    /// Never route to the language model, even when one is configured.
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub force_planner: Option<PlannerKind>,
}

impl RoutingPolicy {
    fn default_prefer_generative() -> bool {
        true
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            prefer_generative: true,
            offline: false,
            force_planner: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("requested planner is unavailable: {0:?}")]
    PlannerUnavailable(PlannerKind),
}

/// Picks the planner for a runtime: the language-model planner when a model
/// is configured and the policy allows it, the rule classifier otherwise.
#[derive(Clone, Default)]
pub struct PlannerRouter {
    model: Option<Arc<dyn LanguageModelClient>>,
}

impl PlannerRouter {
    pub fn new(model: Option<Arc<dyn LanguageModelClient>>) -> Self {
        Self { model }
    }

    pub fn route(&self, policy: &RoutingPolicy) -> Result<Arc<dyn Planner>> {
        let kind = match policy.force_planner {
            Some(kind) => {
                if !self.permits(kind, policy) {
                    return Err(anyhow!(RouterError::PlannerUnavailable(kind)));
                }
                kind
            }
            None if policy.prefer_generative
                && self.permits(PlannerKind::LanguageModel, policy) =>
            {
                PlannerKind::LanguageModel
            }
            None => PlannerKind::ScenarioClassifier,
        };
        debug!(planner = ?kind, "planner routed");

        match (kind, &self.model) {
            (PlannerKind::LanguageModel, Some(model)) => Ok(Arc::new(LlmPlanner::new(model.clone()))),
            (PlannerKind::LanguageModel, None) => {
                Err(anyhow!(RouterError::PlannerUnavailable(kind)))
            }
            (PlannerKind::ScenarioClassifier, _) => Ok(Arc::new(ScenarioPlanner::new())),
        }
    }

    pub fn is_planner_available(&self, kind: PlannerKind) -> bool {
        match kind {
            PlannerKind::LanguageModel => self.model.is_some(),
            PlannerKind::ScenarioClassifier => true,
        }
    }

    pub fn generative_available(&self) -> bool {
        self.is_planner_available(PlannerKind::LanguageModel)
    }

    fn permits(&self, kind: PlannerKind, policy: &RoutingPolicy) -> bool {
        match kind {
            PlannerKind::LanguageModel => !policy.offline && self.generative_available(),
            PlannerKind::ScenarioClassifier => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use plan_engine::{LanguageModelResponse, ModelOptions};

    struct StubModel;

    #[async_trait]
    impl LanguageModelClient for StubModel {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &ModelOptions,
        ) -> Result<LanguageModelResponse> {
            Ok(LanguageModelResponse::new("{\"steps\": []}"))
        }
    }

    fn with_model() -> PlannerRouter {
        PlannerRouter::new(Some(Arc::new(StubModel)))
    }

    #[test]
    fn prefers_the_model_when_configured() {
        let planner = with_model().route(&RoutingPolicy::default()).unwrap();
        assert_eq!(planner.name(), "language-model");
    }

    #[test]
    fn falls_back_to_the_classifier() {
        let router = PlannerRouter::new(None);
        assert!(!router.generative_available());
        let planner = router.route(&RoutingPolicy::default()).unwrap();
        assert_eq!(planner.name(), "scenario-classifier");

        let offline = RoutingPolicy {
            offline: true,
            ..RoutingPolicy::default()
        };
        let planner = with_model().route(&offline).unwrap();
        assert_eq!(planner.name(), "scenario-classifier");
    }

    #[test]
    fn forced_planner_must_be_available() {
        let policy = RoutingPolicy {
            force_planner: Some(PlannerKind::LanguageModel),
            ..RoutingPolicy::default()
        };
        let err = PlannerRouter::new(None).route(&policy).err().expect("routing should fail");
        assert!(err.to_string().contains("unavailable"));

        let policy = RoutingPolicy {
            force_planner: Some(PlannerKind::ScenarioClassifier),
            ..RoutingPolicy::default()
        };
        let planner = with_model().route(&policy).unwrap();
        assert_eq!(planner.name(), "scenario-classifier");
    }

    #[test]
    fn policy_reads_from_json() {
        let policy: RoutingPolicy =
            serde_json::from_str(r#"{ "force_planner": "scenario_classifier" }"#).unwrap();
        assert!(policy.prefer_generative);
        assert_eq!(policy.force_planner, Some(PlannerKind::ScenarioClassifier));
    }
}
