use std::sync::Arc;

use anyhow::Result;
use plan_engine::{
    DataCapability, EngineConfig, LanguageModelClient, Orchestration, Orchestrator, Planner,
    Request, ResponseCapability,
};
use planner_router::PlannerRouter;
use serde::Serialize;
use tracing::info;

use crate::audit::TraceAudit;
use crate::config::DeskConfig;
use crate::responder::{LlmResponder, TemplateResponder};
use crate::store::MemoryCustomerStore;

/// A ready-to-serve help desk: one planner, one data capability and one
/// responder behind the orchestration engine.
pub struct SupportRuntime {
    orchestrator: Orchestrator,
}

impl SupportRuntime {
    pub fn builder(planner: Arc<dyn Planner>) -> SupportRuntimeBuilder {
        SupportRuntimeBuilder::new(planner)
    }

    /// Routes a planner from `config.routing` and picks the matching
    /// responder. Data comes from the seeded in-memory store.
    pub fn from_config(
        config: &DeskConfig,
        model: Option<Arc<dyn LanguageModelClient>>,
    ) -> Result<Self> {
        let router = PlannerRouter::new(model.clone());
        let planner = router.route(&config.routing)?;
        let mut builder = Self::builder(planner)
            .with_engine_config(config.engine.clone())
            .with_responder(Arc::new(TemplateResponder::new(config.responder.clone())));
        if let Some(model) = model.filter(|_| !config.routing.offline) {
            builder = builder
                .with_responder(Arc::new(LlmResponder::new(model).with_config(&config.responder)));
        }
        Ok(builder.build())
    }

    pub fn planner_name(&self) -> &str {
        self.orchestrator.planner_name()
    }

    pub async fn handle(&self, request: &str) -> SupportRuntimeResult {
        self.handle_request(Request::new(request)).await
    }

    pub async fn handle_request(&self, request: Request) -> SupportRuntimeResult {
        let orchestration = self.orchestrator.run(request).await;
        let audit = TraceAudit::of(&orchestration.trace);
        info!(
            planner = self.planner_name(),
            trace = audit.entries,
            shape = audit.shape_digest.as_deref().unwrap_or("-"),
            "request handled"
        );
        SupportRuntimeResult {
            orchestration,
            audit,
        }
    }
}

pub struct SupportRuntimeBuilder {
    planner: Arc<dyn Planner>,
    data: Option<Arc<dyn DataCapability>>,
    responder: Option<Arc<dyn ResponseCapability>>,
    config: EngineConfig,
}

impl SupportRuntimeBuilder {
    fn new(planner: Arc<dyn Planner>) -> Self {
        Self {
            planner,
            data: None,
            responder: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_data(mut self, data: Arc<dyn DataCapability>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_responder(mut self, responder: Arc<dyn ResponseCapability>) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SupportRuntime {
        let data = self
            .data
            .unwrap_or_else(|| Arc::new(MemoryCustomerStore::with_sample_data()));
        let responder = self
            .responder
            .unwrap_or_else(|| Arc::new(TemplateResponder::default()));
        SupportRuntime {
            orchestrator: Orchestrator::new(self.planner, data, responder, self.config),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportRuntimeResult {
    pub orchestration: Orchestration,
    pub audit: TraceAudit,
}

impl SupportRuntimeResult {
    pub fn answer(&self) -> &str {
        &self.orchestration.answer
    }

    /// The trace rendered as the `A2A LOG` block.
    pub fn a2a_log(&self) -> String {
        format!(
            "A2A LOG\n{}",
            plan_engine::trace::render(&self.orchestration.trace)
        )
    }
}
