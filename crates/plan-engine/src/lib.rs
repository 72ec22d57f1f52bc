//! Plan-driven orchestration primitives for the help desk workspace.
//! A [`Planner`] turns a customer request into steps, the
//! [`Orchestrator`] runs them against a data capability and a response
//! capability, and every hop is recorded in an interaction trace.

pub mod capabilities;
pub mod classifier;
pub mod executor;
pub mod fragment;
pub mod language_model;
pub mod llm_planner;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod provider;
pub mod step;
pub mod trace;

pub use capabilities::{Action, CapabilityKind, DataAction};
pub use classifier::{plan_for, Scenario, ScenarioPlanner};
pub use executor::{ExecutionState, StepExecutor, StepOutcome};
pub use fragment::{render_plain, ResultFragment};
pub use language_model::{LanguageModelClient, LanguageModelResponse, ModelOptions};
pub use llm_planner::LlmPlanner;
pub use orchestrator::{EngineConfig, Orchestration, Orchestrator, Outcome, Phase, Request};
pub use plan::{Delegation, Plan, PlanError};
pub use planner::{PlanResponse, Planner};
pub use provider::{CapabilityError, CapabilityResult, DataCapability, ResponseCapability};
pub use step::{CustomerId, ListDefaults, Priority, Step, StepError};
pub use trace::{TraceEntry, TraceLog};

pub const DEFAULT_NO_INFORMATION_ANSWER: &str =
    "I'm sorry, I couldn't find any information for your request.";
