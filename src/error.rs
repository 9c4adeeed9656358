use std::time::Duration;

use thiserror::Error;

use crate::model::{OperationId, ResourceId};

/// Longest duration a record may carry: one leap year.
pub const MAX_DURATION_MINUTES: i64 = 366 * 24 * 60;

/// Why a snapshot record was quarantined instead of loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record is not an object")]
    NotAnObject,
    #[error("record has no id")]
    MissingId,
    #[error("duplicate id {0}")]
    DuplicateId(String),
    #[error("record {0} has no name")]
    MissingName(String),
    #[error("record {id}: invalid {field} '{value}'")]
    InvalidTimestamp {
        id: String,
        field: &'static str,
        value: String,
    },
    #[error("record {0}: end time is not after start time")]
    EndBeforeStart(String),
    #[error("record {0}: duration must be positive")]
    NonPositiveDuration(String),
    #[error("record {id}: completion {value} is outside 0-100")]
    CompletionOutOfRange { id: String, value: String },
    #[error("record {0}: duration exceeds one year")]
    DurationTooLong(String),
    #[error("record {0}: start and end are not a whole number of minutes apart")]
    FractionalSpan(String),
    #[error("record {id}: {message}")]
    Malformed { id: String, message: String },
}

/// Fetching a snapshot from the backend failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot request failed: {0}")]
    Unavailable(String),
    #[error("snapshot payload is not a list of records")]
    NotAList,
    #[error("failed to read snapshot: {0}")]
    Io(String),
}

/// A locally detected reason to refuse a drop. Never sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("would overlap with {name} ({with})")]
    Overlap { with: OperationId, name: String },
    #[error("resource {0} is inactive")]
    InactiveResource(ResourceId),
    #[error("resource {0} does not exist")]
    UnknownResource(ResourceId),
    #[error("change is too small to reschedule")]
    NoSignificantChange,
    #[error("outside working hours")]
    OutsideWorkingHours,
}

impl RejectReason {
    /// A no-op drop, not an error worth surfacing as a rejection.
    pub fn is_no_op(&self) -> bool {
        matches!(self, RejectReason::NoSignificantChange)
    }
}

/// The backend did not confirm an optimistic change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitFailure {
    #[error("backend rejected the change: {0}")]
    Rejected(String),
    #[error("backend reports an overlap with {with}")]
    Conflict { with: OperationId },
    #[error("network error: {0}")]
    Network(String),
    #[error("no answer from the backend within {0:?}")]
    Timeout(Duration),
}

/// A strategy could not produce a valid schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{strategy} schedule is infeasible for {} operation(s): {reason}", .operations.len())]
pub struct AlgorithmInfeasible {
    pub strategy: &'static str,
    pub operations: Vec<OperationId>,
    pub reason: String,
}

/// A board request that could not even start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("board is busy; wait for the pending change to settle")]
    Busy,
    #[error("no drag in progress")]
    NotDragging,
    #[error("unknown operation {0}")]
    UnknownOperation(OperationId),
    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),
    #[error("operation {0} is not scheduled")]
    Unscheduled(OperationId),
    #[error("lane position {index} is out of range for {resource}")]
    OutOfRange { resource: ResourceId, index: usize },
}
