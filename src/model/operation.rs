use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::resource::ResourceId;

/// Opaque operation identifier, stable across reschedules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Planned,
    InProgress,
    Completed,
    OnHold,
}

impl OperationStatus {
    pub fn label(self) -> &'static str {
        match self {
            OperationStatus::Planned => "Planned",
            OperationStatus::InProgress => "In Progress",
            OperationStatus::Completed => "Completed",
            OperationStatus::OnHold => "On Hold",
        }
    }
}

/// Scheduling urgency. Lower value = more urgent; 1 is the most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u32);

impl Priority {
    pub const DEFAULT: Priority = Priority(5);

    /// Priorities 1 and 2 are highlighted on the board.
    pub fn is_high(self) -> bool {
        self.0 <= 2
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Where and when an operation sits; `start == None` means unscheduled.
///
/// Kept as the pre-change snapshot for rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub resource_id: Option<ResourceId>,
    pub start: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
}

impl Slot {
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.start
            .and_then(|s| s.checked_add_signed(Duration::minutes(self.duration_minutes)))
    }
}

/// A single schedulable unit of production work.
///
/// `duration_minutes` is the source of truth; the end time is always derived
/// from it, so `end > start` holds whenever the duration is positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub name: String,
    pub resource_id: Option<ResourceId>,
    pub start: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub status: OperationStatus,
    pub priority: Priority,
    /// Progress from 0 to 100.
    pub completion_percentage: u8,
    /// Finish-to-start predecessors.
    #[serde(default)]
    pub predecessors: Vec<OperationId>,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    /// Manually scheduled; strategies leave it where it is.
    #[serde(default)]
    pub pinned: bool,
}

impl Operation {
    /// Create a planned, unscheduled operation with default priority.
    pub fn new(id: impl Into<String>, name: impl Into<String>, duration_minutes: i64) -> Self {
        Self {
            id: OperationId::new(id),
            name: name.into(),
            resource_id: None,
            start: None,
            duration_minutes,
            status: OperationStatus::Planned,
            priority: Priority::DEFAULT,
            completion_percentage: 0,
            predecessors: Vec::new(),
            due: None,
            pinned: false,
        }
    }

    pub fn on(mut self, resource: impl Into<String>) -> Self {
        self.resource_id = Some(ResourceId::new(resource));
        self
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Priority(priority);
        self
    }

    pub fn after(mut self, predecessor: impl Into<String>) -> Self {
        self.predecessors.push(OperationId::new(predecessor));
        self
    }

    pub fn due_by(mut self, due: DateTime<Utc>) -> Self {
        self.due = Some(due);
        self
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.start
            .and_then(|s| s.checked_add_signed(Duration::minutes(self.duration_minutes)))
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes)
    }

    pub fn is_scheduled(&self) -> bool {
        self.start.is_some()
    }

    /// Strategies never move fixed operations; they still occupy their resource.
    pub fn is_fixed(&self) -> bool {
        self.start.is_some()
            && (self.pinned
                || matches!(
                    self.status,
                    OperationStatus::InProgress | OperationStatus::Completed
                ))
    }

    pub fn slot(&self) -> Slot {
        Slot {
            resource_id: self.resource_id.clone(),
            start: self.start,
            duration_minutes: self.duration_minutes,
        }
    }

    pub fn restore(&mut self, slot: &Slot) {
        self.resource_id = slot.resource_id.clone();
        self.start = slot.start;
        self.duration_minutes = slot.duration_minutes;
    }

    /// Half-open interval intersection with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        match (self.start, self.end()) {
            (Some(s), Some(e)) => s < end && start < e,
            _ => false,
        }
    }
}
