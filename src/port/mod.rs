//! Boundary to the backend: snapshot reads and reschedule writes.

mod memory;

pub use memory::MemoryBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CommitFailure, SnapshotError};
use crate::model::{Operation, OperationId, ResourceId};

/// One operation's new placement, as sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    /// Lets the backend de-duplicate retried requests.
    pub request_id: Uuid,
    pub operation_id: OperationId,
    pub resource_id: Option<ResourceId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl CommitRequest {
    /// Request for the operation's current placement. `None` if unscheduled.
    pub fn for_operation(op: &Operation) -> Option<Self> {
        Some(Self {
            request_id: Uuid::new_v4(),
            operation_id: op.id.clone(),
            resource_id: op.resource_id.clone(),
            start_time: op.start?,
            end_time: op.end()?,
        })
    }
}

/// A lane reorder: the new lane sequence plus any start times it shifted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceRequest {
    pub request_id: Uuid,
    pub resource_id: ResourceId,
    pub ordered: Vec<OperationId>,
    pub moves: Vec<CommitRequest>,
}

/// One failed entry of a batch commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub operation_id: OperationId,
    pub failure: CommitFailure,
}

/// Persists committed changes. Implementations talk to the network; every
/// call may suspend.
#[async_trait]
pub trait ReschedulePort: Send + Sync {
    async fn commit(&self, request: CommitRequest) -> Result<(), CommitFailure>;

    /// Entries that are not listed in the error were applied.
    async fn commit_batch(&self, requests: Vec<CommitRequest>) -> Result<(), Vec<BatchFailure>>;

    async fn commit_sequence(&self, request: SequenceRequest) -> Result<(), CommitFailure>;
}

/// Idempotent reads of the raw operation and resource records.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_operations(&self) -> Result<serde_json::Value, SnapshotError>;

    async fn fetch_resources(&self) -> Result<serde_json::Value, SnapshotError>;
}
