use chrono::{DateTime, Utc};
use serde::Serialize;

/// Canonical status values shared by the warehouse and the report builders.
pub mod status {
    pub const DEAL_WON: &str = "WON";
    pub const DEAL_LOST: &str = "LOST";
    pub const DEAL_TERMINAL: &[&str] = &[DEAL_WON, DEAL_LOST];

    pub const TASK_COMPLETED: &str = "COMPLETED";
    pub const TASK_CANCELLED: &str = "CANCELLED";
    pub const TASK_CLOSED: &[&str] = &[TASK_COMPLETED, TASK_CANCELLED];

    pub const LEAD_CONVERTED: &str = "CONVERTED";
    pub const LEAD_LOST: &str = "LOST";
    pub const LEAD_UNQUALIFIED: &str = "UNQUALIFIED";
    pub const LEAD_TERMINAL: &[&str] = &[LEAD_CONVERTED, LEAD_LOST, LEAD_UNQUALIFIED];

    /// Label used when a record has no value for a grouping dimension.
    pub const UNSPECIFIED: &str = "UNSPECIFIED";
}

/// Kind of entity stored behind the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Lead,
    Deal,
    Task,
    Contact,
    Company,
    User,
}

impl EntityType {
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Lead => "leads",
            EntityType::Deal => "deals",
            EntityType::Task => "tasks",
            EntityType::Contact => "contacts",
            EntityType::Company => "companies",
            EntityType::User => "users",
        }
    }

    /// Column backing `field` for this entity, if it has one.
    pub fn column(&self, field: Field) -> Option<&'static str> {
        use EntityType::*;
        use Field::*;
        match (self, field) {
            (_, Id) => Some("id"),
            (_, CreatedAt) => Some("created_at"),
            (Deal | Task, Name) => Some("title"),
            (_, Name) => Some("name"),
            (Lead | Deal | Task, Status) => Some("status"),
            (Lead, Source) => Some("source"),
            (Task, Priority) => Some("priority"),
            (Lead | Deal | Task, Assignee) => Some("assignee_id"),
            (Lead, Value) => Some("estimated_value"),
            (Deal, Value) => Some("value"),
            (Lead, CompletedAt) => Some("converted_at"),
            (Deal, CompletedAt) => Some("actual_close_date"),
            (Task, CompletedAt) => Some("completed_at"),
            (Deal, TargetAt) => Some("expected_close_date"),
            (Task, TargetAt) => Some("due_date"),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table())
    }
}

/// Logical record field, independent of the physical column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Name,
    Status,
    Source,
    Priority,
    Assignee,
    Value,
    CreatedAt,
    CompletedAt,
    TargetAt,
}

/// Categorical dimension a record set can be partitioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Status,
    Source,
    Priority,
    Assignee,
}

impl Dimension {
    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Status => "status",
            Dimension::Source => "source",
            Dimension::Priority => "priority",
            Dimension::Assignee => "assignee",
        }
    }

    pub fn field(&self) -> Field {
        match self {
            Dimension::Status => Field::Status,
            Dimension::Source => Field::Source,
            Dimension::Priority => Field::Priority,
            Dimension::Assignee => Field::Assignee,
        }
    }
}

/// A lead, deal or task as read from the gateway.
///
/// `completed_at` is the entity's completion instant (deal close date, task
/// completion, lead conversion); `target_at` its target (expected close date,
/// due date). Fields outside a query's projection are left at their defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: String,
    pub entity: EntityType,
    pub name: String,
    pub status: String,
    pub source: Option<String>,
    pub priority: Option<String>,
    pub assignee_id: Option<String>,
    pub value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub target_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(entity: EntityType, id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            entity,
            name: String::new(),
            status: String::new(),
            source: None,
            priority: None,
            assignee_id: None,
            value: None,
            created_at,
            completed_at: None,
            target_at: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn priority(mut self, priority: &str) -> Self {
        self.priority = Some(priority.to_string());
        self
    }

    pub fn assignee(mut self, user_id: &str) -> Self {
        self.assignee_id = Some(user_id.to_string());
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn completed_at(mut self, ts: DateTime<Utc>) -> Self {
        self.completed_at = Some(ts);
        self
    }

    pub fn target_at(mut self, ts: DateTime<Utc>) -> Self {
        self.target_at = Some(ts);
        self
    }

    /// Value of a grouping dimension for this record.
    pub fn dimension(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Status => Some(self.status.as_str()).filter(|s| !s.is_empty()),
            Dimension::Source => self.source.as_deref(),
            Dimension::Priority => self.priority.as_deref(),
            Dimension::Assignee => self.assignee_id.as_deref(),
        }
    }
}
