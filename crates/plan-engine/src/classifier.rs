//! Deterministic fallback planner. Requests are matched against an ordered
//! rule table; the first matching rule picks a hand-authored scenario whose
//! steps are parameterized by values pulled out of the request text.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::capabilities::DataAction;
use crate::plan::Plan;
use crate::planner::{PlanResponse, Planner};
use crate::step::{CustomerId, Priority, Step};
use crate::trace::TraceEntry;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern compiles")
});

static INTEGER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+\b").expect("integer pattern compiles"));

pub const CLARIFYING_QUESTION: &str =
    "Could you share your customer ID so I can look up your account?";

pub const AGGREGATE_LIMITATION: &str = "Matching every customer against their open tickets \
     isn't supported in a single request; share a customer ID to see that customer's ticket history.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Listing across many customers.
    Aggregate,
    /// Billing problems and other urgent complaints.
    Escalation,
    /// Contact change followed by ticket history.
    UpdateWithHistory,
    /// Upgrade or general account help for a known customer.
    AccountHelp,
    /// Catch-all.
    SimpleLookup,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggregate => "aggregate",
            Self::Escalation => "escalation",
            Self::UpdateWithHistory => "update_with_history",
            Self::AccountHelp => "account_help",
            Self::SimpleLookup => "simple_lookup",
        }
    }

    /// Builds the scenario's fixed step sequence. The engine appends the
    /// response step, so none of these end with one.
    pub fn plan(&self, features: &RequestFeatures) -> Plan {
        match (self, features.customer_id) {
            (Self::Aggregate, _) => {
                let mut args = json!({});
                if let Some(status) = features.status_filter() {
                    args["status"] = json!(status);
                }
                Plan::new(vec![Step::data(DataAction::List, args)])
                    .with_limitation(AGGREGATE_LIMITATION)
            }
            (Self::Escalation, Some(id)) => Plan::new(vec![
                Step::data(DataAction::Fetch, json!({ "id": id.0 })),
                Step::data(
                    DataAction::CreateTicket,
                    json!({
                        "id": id.0,
                        "issue": features.original,
                        "priority": Priority::High.as_str(),
                    }),
                ),
            ]),
            (Self::UpdateWithHistory, Some(id)) => {
                let email = features.email.clone().unwrap_or_default();
                Plan::new(vec![
                    Step::data(
                        DataAction::Update,
                        json!({ "id": id.0, "fields": { "email": email } }),
                    ),
                    Step::data(DataAction::History, json!({ "id": id.0 })),
                ])
            }
            (Self::AccountHelp, Some(id)) => Plan::new(vec![
                Step::data(DataAction::Fetch, json!({ "id": id.0 })),
                Step::data(
                    DataAction::CreateTicket,
                    json!({
                        "id": id.0,
                        "issue": features.original,
                        "priority": Priority::Medium.as_str(),
                    }),
                ),
            ]),
            (_, Some(id)) => Plan::new(vec![Step::data(DataAction::Fetch, json!({ "id": id.0 }))]),
            (_, None) => Plan::default().with_note(CLARIFYING_QUESTION),
        }
    }
}

/// Values the rules and scenarios read from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFeatures {
    pub original: String,
    pub words: Vec<String>,
    pub customer_id: Option<CustomerId>,
    pub email: Option<String>,
}

impl RequestFeatures {
    pub fn extract(request: &str) -> Self {
        let original = request.trim().to_string();
        let email = EMAIL_PATTERN
            .find(&original)
            .map(|found| found.as_str().to_string());
        // Digits inside an address must not be read as the customer id.
        let without_emails = EMAIL_PATTERN.replace_all(&original, " ");
        let customer_id = INTEGER_TOKEN
            .find_iter(&without_emails)
            .find_map(|found| found.as_str().parse().ok())
            .map(CustomerId);
        let words = without_emails
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .collect();
        Self {
            original,
            words,
            customer_id,
            email,
        }
    }

    pub fn mentions(&self, keywords: &[&str]) -> bool {
        self.words
            .iter()
            .any(|word| keywords.contains(&word.as_str()))
    }

    fn status_filter(&self) -> Option<&'static str> {
        if self.mentions(&["inactive", "disabled"]) {
            Some("disabled")
        } else if self.mentions(&["active"]) {
            Some("active")
        } else {
            None
        }
    }
}

/// One entry of the priority-ordered rule table.
#[derive(Clone, Copy)]
pub struct ScenarioRule {
    pub scenario: Scenario,
    pub matches: fn(&RequestFeatures) -> bool,
}

impl std::fmt::Debug for ScenarioRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioRule")
            .field("scenario", &self.scenario)
            .finish()
    }
}

/// Rules in evaluation order; the first match wins.
pub const SCENARIO_RULES: &[ScenarioRule] = &[
    ScenarioRule {
        scenario: Scenario::Aggregate,
        matches: is_aggregate,
    },
    ScenarioRule {
        scenario: Scenario::Escalation,
        matches: is_escalation,
    },
    ScenarioRule {
        scenario: Scenario::UpdateWithHistory,
        matches: is_update_with_email,
    },
    ScenarioRule {
        scenario: Scenario::AccountHelp,
        matches: is_account_help,
    },
    ScenarioRule {
        scenario: Scenario::SimpleLookup,
        matches: always,
    },
];

fn is_aggregate(features: &RequestFeatures) -> bool {
    features.mentions(&["all", "every"])
        && features.mentions(&["customers", "tickets", "accounts"])
}

fn is_escalation(features: &RequestFeatures) -> bool {
    features.customer_id.is_some()
        && features.mentions(&[
            "charged",
            "refund",
            "cancel",
            "billing",
            "dispute",
            "urgent",
            "immediately",
            "escalate",
        ])
}

fn is_update_with_email(features: &RequestFeatures) -> bool {
    features.customer_id.is_some()
        && features.email.is_some()
        && features.mentions(&["update", "change", "set"])
}

fn is_account_help(features: &RequestFeatures) -> bool {
    features.customer_id.is_some()
        && features.mentions(&["help", "upgrade", "account", "support", "assist"])
}

fn always(_: &RequestFeatures) -> bool {
    true
}

pub fn classify(features: &RequestFeatures) -> Scenario {
    SCENARIO_RULES
        .iter()
        .find(|rule| (rule.matches)(features))
        .map(|rule| rule.scenario)
        .unwrap_or(Scenario::SimpleLookup)
}

/// Classifies `request` and returns its scenario plan.
pub fn plan_for(request: &str) -> Plan {
    let features = RequestFeatures::extract(request);
    let scenario = classify(&features);
    debug!(
        scenario = scenario.as_str(),
        customer_id = ?features.customer_id,
        "classified request"
    );
    scenario.plan(&features)
}

/// [`Planner`] backed by the rule table. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScenarioPlanner;

impl ScenarioPlanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Planner for ScenarioPlanner {
    fn name(&self) -> &str {
        "scenario-classifier"
    }

    async fn plan(&self, request: &str, _trace: &[TraceEntry]) -> Result<PlanResponse> {
        Ok(plan_for(request).to_payload())
    }
}
