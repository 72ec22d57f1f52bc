use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::capabilities::{CapabilityKind, DataAction};
use crate::fragment::{render_plain, ResultFragment};
use crate::provider::{CapabilityError, CapabilityResult, DataCapability, ResponseCapability};
use crate::step::{resolve, DataCommand, ListDefaults, Step, StepCommand, StepError};
use crate::trace::{TraceLog, ORCHESTRATOR};

/// Everything a step may read or append to while a plan runs.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub request: String,
    pub guidance: Option<String>,
    pub trace: TraceLog,
    pub fragments: Vec<ResultFragment>,
    pub answer: Option<String>,
}

impl ExecutionState {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            guidance: None,
            trace: TraceLog::new(),
            fragments: Vec::new(),
            answer: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continued,
    Responded,
}

/// Runs one step at a time against the capability providers. Every failure
/// is absorbed into a limitation fragment; nothing here returns an error.
#[derive(Clone)]
pub struct StepExecutor {
    data: Arc<dyn DataCapability>,
    responder: Arc<dyn ResponseCapability>,
    list_defaults: ListDefaults,
    call_timeout: Option<Duration>,
    no_information_answer: String,
}

impl StepExecutor {
    pub fn new(data: Arc<dyn DataCapability>, responder: Arc<dyn ResponseCapability>) -> Self {
        Self {
            data,
            responder,
            list_defaults: ListDefaults::default(),
            call_timeout: None,
            no_information_answer: crate::DEFAULT_NO_INFORMATION_ANSWER.to_string(),
        }
    }

    pub fn with_list_defaults(mut self, defaults: ListDefaults) -> Self {
        self.list_defaults = defaults;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Blank text keeps the built-in answer.
    pub fn with_no_information_answer(mut self, answer: impl Into<String>) -> Self {
        let answer = answer.into();
        if !answer.trim().is_empty() {
            self.no_information_answer = answer;
        }
        self
    }

    pub async fn execute(&self, step: &Step, state: &mut ExecutionState) -> StepOutcome {
        match resolve(step, &self.list_defaults) {
            Ok(StepCommand::Data(command)) => {
                self.run_data(command, state).await;
                StepOutcome::Continued
            }
            Ok(StepCommand::Respond) => {
                self.run_respond(state).await;
                StepOutcome::Responded
            }
            Err(err) => {
                skip(step, err, state);
                StepOutcome::Continued
            }
        }
    }

    async fn run_data(&self, command: DataCommand, state: &mut ExecutionState) {
        let agent = CapabilityKind::Data.agent_name();
        let action = command.action();
        let description = command.describe();
        debug!(step = %description, "calling data capability");
        state.trace.record(ORCHESTRATOR, agent, description.as_str());

        match self.call_data(&command).await {
            Ok(Value::Null) => {
                state
                    .trace
                    .record(agent, ORCHESTRATOR, format!("{} returned nothing", action));
                state.fragments.push(ResultFragment::limitation(format!(
                    "No data came back for {}.",
                    description
                )));
            }
            Ok(value) => {
                state
                    .trace
                    .record(agent, ORCHESTRATOR, summarize(action, &value));
                state.fragments.push(ResultFragment::record(action, value));
            }
            Err(err) => {
                warn!(step = %description, error = %err, "data capability call failed");
                state
                    .trace
                    .record(agent, ORCHESTRATOR, format!("{} failed: {}", action, err));
                state.fragments.push(ResultFragment::limitation(format!(
                    "Could not complete {}: {}.",
                    description, err
                )));
            }
        }
    }

    async fn call_data(&self, command: &DataCommand) -> CapabilityResult {
        let data = self.data.as_ref();
        match command {
            DataCommand::Fetch { id } => self.bounded(data.fetch(*id)).await,
            DataCommand::Update { id, fields } => self.bounded(data.update(*id, fields)).await,
            DataCommand::History { id } => self.bounded(data.history(*id)).await,
            DataCommand::CreateTicket {
                id,
                issue,
                priority,
            } => {
                self.bounded(data.create_ticket(*id, issue, *priority))
                    .await
            }
            DataCommand::List { status, limit } => self.bounded(data.list(status, *limit)).await,
        }
    }

    async fn run_respond(&self, state: &mut ExecutionState) {
        let agent = CapabilityKind::Response.agent_name();
        let mut content = format!("respond with {} result fragment(s)", state.fragments.len());
        if let Some(guidance) = &state.guidance {
            content.push_str(&format!("; guidance: {}", guidance));
        }
        state.trace.record(ORCHESTRATOR, agent, content);

        let reply = self
            .bounded(self.responder.respond(
                &state.request,
                &state.fragments,
                state.guidance.as_deref(),
            ))
            .await;
        let answer = match reply {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("response capability returned an empty answer; rendering fragments");
                render_plain(&state.fragments, &self.no_information_answer)
            }
            Err(err) => {
                warn!(error = %err, "response capability failed; rendering fragments");
                render_plain(&state.fragments, &self.no_information_answer)
            }
        };
        state.answer = Some(answer);
    }

    async fn bounded<F, T>(&self, call: F) -> Result<T, CapabilityError>
    where
        F: Future<Output = Result<T, CapabilityError>>,
    {
        match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::Timeout {
                    millis: limit.as_millis() as u64,
                }),
            },
            None => call.await,
        }
    }
}

fn skip(step: &Step, err: StepError, state: &mut ExecutionState) {
    let recipient = match &err {
        StepError::UnknownTarget(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
        StepError::UnknownTarget(_) => "unknown".to_string(),
        StepError::UnknownAction { target, .. } => target.agent_name().to_string(),
        StepError::InvalidArgument { .. } => CapabilityKind::Data.agent_name().to_string(),
    };
    warn!(step_target = %step.target, action = %step.action, error = %err, "skipping step");
    state
        .trace
        .record(ORCHESTRATOR, recipient, format!("skipped {}: {}", step.action, err));
    state.fragments.push(ResultFragment::limitation(format!(
        "Skipped a {} step: {}.",
        step.action, err
    )));
}

fn summarize(action: DataAction, value: &Value) -> String {
    match value {
        Value::Array(items) => format!("{} returned {} record(s)", action, items.len()),
        Value::Object(_) => format!("{} returned a record", action),
        other => format!("{} returned {}", action, other),
    }
}
