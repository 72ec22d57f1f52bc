use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::executor::{ExecutionState, StepExecutor, StepOutcome};
use crate::fragment::{render_plain, ResultFragment};
use crate::plan::{Plan, PlanError};
use crate::planner::Planner;
use crate::provider::{DataCapability, ResponseCapability};
use crate::step::{ListDefaults, Step};
use crate::trace::{TraceEntry, ORCHESTRATOR, USER};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub list_defaults: ListDefaults,
    /// Upper bound for a single capability call; `None` waits indefinitely.
    pub step_timeout_ms: Option<u64>,
    pub planning_failure_answer: String,
    pub no_information_answer: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            list_defaults: ListDefaults::default(),
            step_timeout_ms: None,
            planning_failure_answer: DEFAULT_PLANNING_FAILURE_ANSWER.to_string(),
            no_information_answer: crate::DEFAULT_NO_INFORMATION_ANSWER.to_string(),
        }
    }
}

impl EngineConfig {
    /// Replaces blank answer texts with the built-in ones; every call must
    /// end with a non-empty answer.
    pub fn with_answer_fallbacks(mut self) -> Self {
        if self.planning_failure_answer.trim().is_empty() {
            self.planning_failure_answer = DEFAULT_PLANNING_FAILURE_ANSWER.to_string();
        }
        if self.no_information_answer.trim().is_empty() {
            self.no_information_answer = crate::DEFAULT_NO_INFORMATION_ANSWER.to_string();
        }
        self
    }
}

/// Lifecycle of one orchestration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Received,
    Planning,
    Executing { step: usize },
    Completing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Answered,
    PlanningFailed { reason: String },
}

/// Incoming request text plus the trace of an earlier turn, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    text: String,
    context: Vec<TraceEntry>,
}

impl Request {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: Vec<TraceEntry>) -> Self {
        self.context = context;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn context(&self) -> &[TraceEntry] {
        &self.context
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orchestration {
    pub answer: String,
    pub trace: Vec<TraceEntry>,
    pub fragments: Vec<ResultFragment>,
    pub phases: Vec<Phase>,
    pub outcome: Outcome,
}

/// Plans a request, runs the plan step by step and always ends with a
/// response. Holds no per-request state, so one instance serves concurrent
/// calls.
pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    executor: StepExecutor,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        data: Arc<dyn DataCapability>,
        responder: Arc<dyn ResponseCapability>,
        config: EngineConfig,
    ) -> Self {
        let config = config.with_answer_fallbacks();
        let executor = StepExecutor::new(data, responder)
            .with_list_defaults(config.list_defaults.clone())
            .with_call_timeout(config.step_timeout_ms.map(Duration::from_millis))
            .with_no_information_answer(config.no_information_answer.clone());
        Self {
            planner,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn planner_name(&self) -> &str {
        self.planner.name()
    }

    pub async fn orchestrate(&self, request: &str) -> Orchestration {
        self.run(Request::new(request)).await
    }

    pub async fn run(&self, request: Request) -> Orchestration {
        let mut phases = vec![Phase::Received];
        let mut state = ExecutionState::new(request.text());
        state.trace.record(USER, ORCHESTRATOR, request.text());

        phases.push(Phase::Planning);
        let plan = match self.obtain_plan(&request, &state).await {
            Ok(plan) => plan,
            Err(err) => {
                warn!(planner = self.planner.name(), error = %err, "planning failed");
                phases.push(Phase::Done);
                return Orchestration {
                    answer: self.config.planning_failure_answer.clone(),
                    trace: state.trace.into_entries(),
                    fragments: vec![ResultFragment::limitation(format!(
                        "The request could not be planned: {}.",
                        err
                    ))],
                    phases,
                    outcome: Outcome::PlanningFailed {
                        reason: err.to_string(),
                    },
                };
            }
        };

        debug!(steps = plan.steps.len(), "plan accepted");
        let Plan {
            steps,
            note,
            limitations,
            guidance,
        } = plan;
        state.guidance = guidance;
        if let Some(note) = note {
            state.fragments.push(ResultFragment::note(note));
        }
        state
            .fragments
            .extend(limitations.into_iter().map(ResultFragment::limitation));

        for (index, step) in steps.iter().enumerate() {
            phases.push(Phase::Executing { step: index + 1 });
            debug!(index = index + 1, step_target = %step.target, action = %step.action, "executing step");
            if self.executor.execute(step, &mut state).await == StepOutcome::Responded {
                let discarded = steps.len() - index - 1;
                if discarded > 0 {
                    warn!(discarded, "respond step ended the plan early; discarding trailing steps");
                }
                break;
            }
        }

        phases.push(Phase::Completing);
        if state.answer.is_none() {
            debug!("plan has no respond step; synthesizing one");
            self.executor.execute(&Step::respond(), &mut state).await;
        }
        phases.push(Phase::Done);

        let answer = match state.answer.take() {
            Some(answer) => answer,
            None => render_plain(&state.fragments, &self.config.no_information_answer),
        };
        info!(
            planner = self.planner.name(),
            steps = steps.len(),
            fragments = state.fragments.len(),
            trace = state.trace.len(),
            "orchestration complete"
        );
        Orchestration {
            answer,
            trace: state.trace.into_entries(),
            fragments: state.fragments,
            phases,
            outcome: Outcome::Answered,
        }
    }

    async fn obtain_plan(&self, request: &Request, state: &ExecutionState) -> Result<Plan, PlanError> {
        let mut trace_so_far = request.context().to_vec();
        trace_so_far.extend(state.trace.entries().iter().cloned());
        let response = self
            .planner
            .plan(request.text(), &trace_so_far)
            .await
            .map_err(|err| PlanError::PlannerFailed(format!("{:#}", err)))?;
        Plan::from_response(&response, request.text())
    }
}

const DEFAULT_PLANNING_FAILURE_ANSWER: &str = "Sorry, I couldn't put together a plan for your request, \
     so nothing was looked up or changed. Please try rephrasing it, or contact a human support agent.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ScenarioPlanner, CLARIFYING_QUESTION};
    use crate::planner::PlanResponse;
    use crate::provider::{CapabilityError, CapabilityResult};
    use crate::step::{CustomerId, Priority};
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as TokioMutex;

    struct ScriptedPlanner {
        responses: TokioMutex<VecDeque<Value>>,
    }

    impl ScriptedPlanner {
        fn new(responses: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                responses: TokioMutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl Planner for ScriptedPlanner {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn plan(&self, _request: &str, _trace: &[TraceEntry]) -> anyhow::Result<PlanResponse> {
            let mut guard = self.responses.lock().await;
            let next = guard
                .pop_front()
                .expect("scripted planner ran out of responses");
            Ok(PlanResponse::new(next))
        }
    }

    struct FailingPlanner;

    #[async_trait]
    impl Planner for FailingPlanner {
        fn name(&self) -> &str {
            "failing"
        }

        async fn plan(&self, _request: &str, _trace: &[TraceEntry]) -> anyhow::Result<PlanResponse> {
            Err(anyhow::anyhow!("model endpoint unreachable"))
        }
    }

    #[derive(Default)]
    struct FakeData {
        calls: AtomicUsize,
    }

    impl FakeData {
        fn tick(&self) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    #[async_trait]
    impl DataCapability for FakeData {
        async fn fetch(&self, id: CustomerId) -> CapabilityResult {
            let call = self.tick();
            if id.0 == 404 {
                return Err(CapabilityError::NotFound(format!("customer {}", id)));
            }
            Ok(json!({ "id": id.0, "call": call }))
        }

        async fn update(&self, id: CustomerId, fields: &Map<String, Value>) -> CapabilityResult {
            self.tick();
            Ok(json!({ "id": id.0, "updated": fields }))
        }

        async fn history(&self, id: CustomerId) -> CapabilityResult {
            self.tick();
            Ok(json!([{ "customer_id": id.0, "issue": "login" }]))
        }

        async fn create_ticket(
            &self,
            id: CustomerId,
            issue: &str,
            priority: Priority,
        ) -> CapabilityResult {
            self.tick();
            Ok(json!({ "customer_id": id.0, "issue": issue, "priority": priority }))
        }

        async fn list(&self, status: &str, limit: u32) -> CapabilityResult {
            self.tick();
            Ok(json!({ "status": status, "limit": limit, "customers": [] }))
        }
    }

    struct CountingResponder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResponseCapability for CountingResponder {
        async fn respond(
            &self,
            _request: &str,
            fragments: &[ResultFragment],
            _guidance: Option<&str>,
        ) -> Result<String, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if fragments.is_empty() {
                return Ok("No information found.".to_string());
            }
            Ok(fragments
                .iter()
                .map(ResultFragment::to_string)
                .collect::<Vec<_>>()
                .join(" | "))
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        data: Arc<FakeData>,
        responder: Arc<CountingResponder>,
    }

    fn harness(planner: Arc<dyn Planner>) -> Harness {
        let data = Arc::new(FakeData::default());
        let responder = Arc::new(CountingResponder {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(
            planner,
            data.clone(),
            responder.clone(),
            EngineConfig::default(),
        );
        Harness {
            orchestrator,
            data,
            responder,
        }
    }

    fn participants(trace: &[TraceEntry]) -> Vec<(String, String)> {
        trace
            .iter()
            .map(|entry| (entry.sender.clone(), entry.recipient.clone()))
            .collect()
    }

    #[tokio::test]
    async fn steps_not_a_list_fails_fast() {
        let h = harness(ScriptedPlanner::new(vec![json!({ "steps": "not-a-list" })]));

        let result = h.orchestrator.orchestrate("Get customer information for ID 5").await;

        assert_eq!(result.answer, h.orchestrator.config().planning_failure_answer);
        assert_eq!(result.trace.len(), 1);
        assert_eq!(result.trace[0].sender, USER);
        assert_eq!(result.fragments.len(), 1);
        assert_eq!(
            result.phases,
            vec![Phase::Received, Phase::Planning, Phase::Done]
        );
        assert!(matches!(result.outcome, Outcome::PlanningFailed { .. }));
        assert_eq!(h.data.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.responder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_configured_answers_fall_back_to_defaults() {
        let config = EngineConfig {
            planning_failure_answer: "  ".to_string(),
            no_information_answer: String::new(),
            ..EngineConfig::default()
        };
        let data = Arc::new(FakeData::default());
        let responder = Arc::new(CountingResponder {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(
            ScriptedPlanner::new(vec![json!({ "steps": "not-a-list" })]),
            data,
            responder,
            config,
        );

        let result = orchestrator.orchestrate("hello").await;

        assert_eq!(result.answer, DEFAULT_PLANNING_FAILURE_ANSWER);
        assert_eq!(
            orchestrator.config().no_information_answer,
            crate::DEFAULT_NO_INFORMATION_ANSWER
        );
    }

    #[tokio::test]
    async fn blank_responder_reply_uses_the_default_no_information_answer() {
        struct BlankResponder;

        #[async_trait]
        impl ResponseCapability for BlankResponder {
            async fn respond(
                &self,
                _request: &str,
                _fragments: &[ResultFragment],
                _guidance: Option<&str>,
            ) -> Result<String, CapabilityError> {
                Ok(String::new())
            }
        }

        let config = EngineConfig {
            no_information_answer: String::new(),
            ..EngineConfig::default()
        };
        let orchestrator = Orchestrator::new(
            ScriptedPlanner::new(vec![json!({ "steps": [] })]),
            Arc::new(FakeData::default()),
            Arc::new(BlankResponder),
            config,
        );

        let result = orchestrator.orchestrate("hello").await;

        assert_eq!(result.answer, crate::DEFAULT_NO_INFORMATION_ANSWER);
    }

    #[tokio::test]
    async fn planner_error_is_a_planning_failure() {
        let h = harness(Arc::new(FailingPlanner));
        let result = h.orchestrator.orchestrate("anything").await;

        assert!(!result.answer.is_empty());
        assert_eq!(result.trace.len(), 1);
        match result.outcome {
            Outcome::PlanningFailed { reason } => assert!(reason.contains("unreachable")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn synthesizes_exactly_one_response_step() {
        let h = harness(ScriptedPlanner::new(vec![json!({
            "steps": [ { "target": "data", "action": "fetch", "args": { "id": 5 } } ]
        })]));

        let result = h.orchestrator.orchestrate("Get customer information for ID 5").await;

        assert_eq!(result.outcome, Outcome::Answered);
        assert_eq!(h.responder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.trace.len(), 4);
        assert_eq!(result.trace.last().unwrap().recipient, "SupportAgent");
        assert_eq!(
            result.phases,
            vec![
                Phase::Received,
                Phase::Planning,
                Phase::Executing { step: 1 },
                Phase::Completing,
                Phase::Done,
            ]
        );
    }

    #[tokio::test]
    async fn explicit_respond_is_not_duplicated() {
        let h = harness(ScriptedPlanner::new(vec![json!({
            "steps": [
                { "target": "data", "action": "fetch", "args": { "id": 5 } },
                { "target": "response", "action": "respond" }
            ]
        })]));

        let result = h.orchestrator.orchestrate("Get customer 5").await;

        assert_eq!(h.responder.calls.load(Ordering::SeqCst), 1);
        let to_support = result
            .trace
            .iter()
            .filter(|entry| entry.recipient == "SupportAgent")
            .count();
        assert_eq!(to_support, 1);
    }

    #[tokio::test]
    async fn respond_step_discards_trailing_steps() {
        let h = harness(ScriptedPlanner::new(vec![json!({
            "steps": [
                { "target": "response", "action": "respond" },
                { "target": "data", "action": "fetch", "args": { "id": 5 } }
            ]
        })]));

        let result = h.orchestrator.orchestrate("hello").await;

        assert_eq!(h.data.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.trace.len(), 2);
        assert_eq!(result.answer, "No information found.");
    }

    #[tokio::test]
    async fn bad_steps_do_not_stop_the_plan() {
        let h = harness(ScriptedPlanner::new(vec![json!({
            "steps": [
                { "target": "data", "action": "teleport", "args": {} },
                { "target": "data", "action": "fetch", "args": { "id": "abc" } },
                { "target": "billing", "action": "refund" },
                { "target": "data", "action": "fetch", "args": { "id": 404 } },
                { "target": "data", "action": "history", "args": { "id": "9" } }
            ]
        })]));

        let result = h.orchestrator.orchestrate("mixed bag").await;

        assert_eq!(h.data.calls.load(Ordering::SeqCst), 2);
        let texts: Vec<String> = result.fragments.iter().map(ToString::to_string).collect();
        assert_eq!(texts.len(), 5);
        assert!(texts[0].contains("unknown action"));
        assert!(texts[1].contains("invalid id"));
        assert!(texts[2].contains("unknown action target"));
        assert!(texts[3].contains("not found"));
        assert!(texts[4].starts_with("history:"));
        // 3 skipped steps (1 entry each) + 2 calls (2 entries each) + receipt + respond.
        assert_eq!(result.trace.len(), 9);
        assert_eq!(result.trace[3].recipient, "billing");
    }

    #[tokio::test]
    async fn replaying_a_plan_keeps_the_trace_shape() {
        let payload = json!({
            "steps": [
                { "target": "data", "action": "fetch", "args": { "id": 5 } },
                { "target": "data", "action": "teleport" }
            ]
        });
        let h = harness(ScriptedPlanner::new(vec![payload.clone(), payload]));

        let first = h.orchestrator.orchestrate("Get customer 5").await;
        let second = h.orchestrator.orchestrate("Get customer 5").await;

        assert_eq!(participants(&first.trace), participants(&second.trace));
        // The fake store numbers its calls, so content legitimately differs.
        assert_ne!(first.fragments, second.fragments);
    }

    #[tokio::test]
    async fn planner_sees_prior_context_then_current_trace() {
        struct RecordingPlanner {
            seen: TokioMutex<Vec<TraceEntry>>,
        }

        #[async_trait]
        impl Planner for RecordingPlanner {
            fn name(&self) -> &str {
                "recording"
            }

            async fn plan(&self, _request: &str, trace: &[TraceEntry]) -> anyhow::Result<PlanResponse> {
                self.seen.lock().await.extend_from_slice(trace);
                Ok(PlanResponse::new(json!({ "steps": [] })))
            }
        }

        let planner = Arc::new(RecordingPlanner {
            seen: TokioMutex::new(Vec::new()),
        });
        let h = harness(planner.clone());
        let prior = vec![TraceEntry::new(USER, ORCHESTRATOR, "I am customer 3")];

        let result = h
            .orchestrator
            .run(Request::new("and my tickets?").with_context(prior))
            .await;

        let seen = planner.seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].content, "I am customer 3");
        assert_eq!(seen[1].content, "and my tickets?");
        assert_eq!(result.answer, "No information found.");
    }

    #[tokio::test]
    async fn classifier_lookup_scenario() {
        let h = harness(Arc::new(ScenarioPlanner::new()));

        let result = h.orchestrator.orchestrate("Get customer information for ID 5").await;

        let data_entries = result
            .trace
            .iter()
            .filter(|e| e.sender == "CustomerDataAgent" || e.recipient == "CustomerDataAgent")
            .count();
        let response_entries = result
            .trace
            .iter()
            .filter(|e| e.recipient == "SupportAgent")
            .count();
        assert_eq!(data_entries, 2);
        assert_eq!(response_entries, 1);
        assert_eq!(result.trace[1].content, "fetch customer 5");
    }

    #[tokio::test]
    async fn classifier_asks_for_missing_id() {
        let h = harness(Arc::new(ScenarioPlanner::new()));

        let result = h.orchestrator.orchestrate("I need help with my account").await;

        assert_eq!(h.data.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.fragments, vec![ResultFragment::note(CLARIFYING_QUESTION)]);
        assert_eq!(result.answer, CLARIFYING_QUESTION);
        assert_eq!(result.trace.len(), 2);
    }
}
