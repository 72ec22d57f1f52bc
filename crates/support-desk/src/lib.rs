//! Help desk runtime built on the plan engine: an in-memory customer store,
//! template and model-backed responders, trace auditing and file-based
//! configuration.

pub mod audit;
pub mod config;
pub mod responder;
pub mod runtime;
pub mod store;

pub use audit::TraceAudit;
pub use config::{ConfigError, DeskConfig};
pub use responder::{LlmResponder, ResponderConfig, TemplateResponder};
pub use runtime::{SupportRuntime, SupportRuntimeBuilder, SupportRuntimeResult};
pub use store::{Customer, MemoryCustomerStore, Ticket};

/// Reference queries exercised by the demo binary and the scenario tests.
pub const REFERENCE_QUERIES: [&str; 5] = [
    "Get customer information for ID 5",
    "I'm customer 12 and need help upgrade my account",
    "I've been charged twice, please cancel my subscription. My ID is 7",
    "Show me all active customers who have open tickets",
    "I am customer 10, update my email to new@email.com and show my ticket history",
];
