use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use indexmap::IndexMap;
use plan_engine::{CapabilityError, CapabilityResult, CustomerId, DataCapability, Priority};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

/// Fields an update may touch. Anything else in the update mapping is ignored.
pub const UPDATABLE_FIELDS: [&str; 4] = ["name", "email", "phone", "status"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub status: String,
}

impl Customer {
    pub fn new(id: u64, name: &str, email: &str, phone: &str, status: &str) -> Self {
        Self {
            id: CustomerId(id),
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            status: status.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: u64,
    pub customer_id: CustomerId,
    pub issue: String,
    pub status: String,
    pub priority: Priority,
    pub created_at_ms: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    customers: IndexMap<CustomerId, Customer>,
    tickets: Vec<Ticket>,
    next_ticket_id: u64,
}

impl StoreState {
    fn open_ticket(
        &mut self,
        customer_id: CustomerId,
        issue: &str,
        status: &str,
        priority: Priority,
    ) -> Ticket {
        self.next_ticket_id = self.next_ticket_id.saturating_add(1);
        let ticket = Ticket {
            id: self.next_ticket_id,
            customer_id,
            issue: issue.to_string(),
            status: status.to_string(),
            priority,
            created_at_ms: current_timestamp_ms(),
        };
        self.tickets.push(ticket.clone());
        ticket
    }
}

/// Customer and ticket records held in memory. Implements the data
/// capability the engine calls; safe to share across concurrent requests.
#[derive(Debug, Default)]
pub struct MemoryCustomerStore {
    state: Mutex<StoreState>,
}

impl MemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the customers and tickets the demo scenarios use.
    pub fn with_sample_data() -> Self {
        let mut state = StoreState::default();
        for customer in sample_customers() {
            state.customers.insert(customer.id, customer);
        }
        for (customer, issue, status, priority) in SAMPLE_TICKETS {
            state.open_ticket(CustomerId(*customer), issue, status, *priority);
        }
        Self {
            state: Mutex::new(state),
        }
    }

    pub async fn insert_customer(&self, customer: Customer) {
        let mut state = self.state.lock().await;
        state.customers.insert(customer.id, customer);
    }

    pub async fn customer(&self, id: CustomerId) -> Option<Customer> {
        let state = self.state.lock().await;
        state.customers.get(&id).cloned()
    }

    /// Tickets for `id`, newest first.
    pub async fn tickets_for(&self, id: CustomerId) -> Vec<Ticket> {
        let state = self.state.lock().await;
        state
            .tickets
            .iter()
            .rev()
            .filter(|ticket| ticket.customer_id == id)
            .cloned()
            .collect()
    }

    pub async fn customer_count(&self) -> usize {
        self.state.lock().await.customers.len()
    }
}

#[async_trait]
impl DataCapability for MemoryCustomerStore {
    async fn fetch(&self, id: CustomerId) -> CapabilityResult {
        let customer = self.customer(id).await.ok_or_else(|| missing(id))?;
        to_value(&customer)
    }

    async fn update(&self, id: CustomerId, fields: &Map<String, Value>) -> CapabilityResult {
        let mut changes = Vec::new();
        for (key, value) in fields {
            if !UPDATABLE_FIELDS.contains(&key.as_str()) {
                debug!(customer = %id, field = %key, "ignoring field outside the update whitelist");
                continue;
            }
            let text = value.as_str().ok_or_else(|| {
                CapabilityError::Rejected(format!("{} must be a string, got {}", key, value))
            })?;
            changes.push((key.as_str(), text.trim().to_string()));
        }
        if changes.is_empty() {
            return Err(CapabilityError::Rejected(format!(
                "no updatable fields; expected one of {}",
                UPDATABLE_FIELDS.join(", ")
            )));
        }

        let mut state = self.state.lock().await;
        let customer = state.customers.get_mut(&id).ok_or_else(|| missing(id))?;
        for (key, text) in changes {
            match key {
                "name" => customer.name = text,
                "email" => customer.email = text,
                "phone" => customer.phone = text,
                _ => customer.status = text,
            }
        }
        debug!(customer = %id, "customer updated");
        to_value(&*customer)
    }

    async fn history(&self, id: CustomerId) -> CapabilityResult {
        if self.customer(id).await.is_none() {
            return Err(missing(id));
        }
        to_value(&self.tickets_for(id).await)
    }

    async fn create_ticket(
        &self,
        id: CustomerId,
        issue: &str,
        priority: Priority,
    ) -> CapabilityResult {
        let mut state = self.state.lock().await;
        if !state.customers.contains_key(&id) {
            return Err(missing(id));
        }
        let ticket = state.open_ticket(id, issue, "open", priority);
        debug!(customer = %id, ticket = ticket.id, priority = %priority, "ticket opened");
        to_value(&ticket)
    }

    async fn list(&self, status: &str, limit: u32) -> CapabilityResult {
        let state = self.state.lock().await;
        let mut matching: Vec<&Customer> = state
            .customers
            .values()
            .filter(|customer| customer.status.eq_ignore_ascii_case(status))
            .collect();
        matching.sort_by_key(|customer| customer.id);
        matching.truncate(limit as usize);
        to_value(&matching)
    }
}

fn missing(id: CustomerId) -> CapabilityError {
    CapabilityError::NotFound(format!("customer {}", id))
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> CapabilityResult {
    serde_json::to_value(value)
        .map_err(|err| CapabilityError::Unavailable(format!("could not encode record: {}", err)))
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn sample_customers() -> Vec<Customer> {
    vec![
        Customer::new(1, "John Doe", "john.doe@example.com", "+1-555-0101", "active"),
        Customer::new(2, "Jane Smith", "jane.smith@example.com", "+1-555-0102", "active"),
        Customer::new(3, "Bob Johnson", "bob.johnson@example.com", "+1-555-0103", "disabled"),
        Customer::new(4, "Alice Williams", "alice.w@example.com", "+1-555-0104", "active"),
        Customer::new(5, "Charlie Brown", "charlie.brown@example.com", "+1-555-0105", "active"),
        Customer::new(6, "Diana Prince", "diana.prince@example.com", "+1-555-0106", "disabled"),
        Customer::new(7, "Edward Norton", "edward.norton@example.com", "+1-555-0107", "active"),
        Customer::new(8, "Fiona Green", "fiona.green@example.com", "+1-555-0108", "active"),
        Customer::new(9, "George Miller", "george.miller@example.com", "+1-555-0109", "disabled"),
        Customer::new(10, "Hannah Lee", "hannah.lee@example.com", "+1-555-0110", "active"),
        Customer::new(11, "Ian Malcolm", "ian.malcolm@example.com", "+1-555-0111", "active"),
        Customer::new(12, "Julia Roberts", "julia.roberts@example.com", "+1-555-0112", "active"),
    ]
}

const SAMPLE_TICKETS: &[(u64, &str, &str, Priority)] = &[
    (1, "Cannot log in after password reset", "open", Priority::High),
    (2, "Invoice shows the wrong billing address", "resolved", Priority::Low),
    (4, "Mobile app crashes on startup", "open", Priority::Medium),
    (5, "Requested a copy of last month's invoice", "resolved", Priority::Low),
    (7, "Payment method declined", "resolved", Priority::Medium),
    (10, "Two-factor codes arrive late", "resolved", Priority::Medium),
    (10, "Export to CSV times out", "open", Priority::Low),
    (12, "Question about premium plan features", "open", Priority::Low),
];
