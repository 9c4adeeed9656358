use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{BatchFailure, CommitRequest, ReschedulePort, SequenceRequest, SnapshotSource};
use crate::error::{CommitFailure, SnapshotError};
use crate::io::snapshot;
use crate::model::{Operation, OperationId, Resource, ResourceId};

#[derive(Debug, Default)]
struct Store {
    operations: BTreeMap<OperationId, Operation>,
    resources: Vec<Resource>,
    sequences: BTreeMap<ResourceId, Vec<OperationId>>,
}

impl Store {
    fn resource(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    /// First operation outside `batch` that `request` would overlap with.
    fn collision(
        &self,
        request: &CommitRequest,
        batch: &BTreeMap<&OperationId, &CommitRequest>,
    ) -> Option<OperationId> {
        let rid = request.resource_id.as_ref()?;
        if self.resource(rid).is_some_and(|r| r.allow_parallel) {
            return None;
        }
        self.operations
            .values()
            .filter(|o| o.id != request.operation_id && !batch.contains_key(&o.id))
            .filter(|o| o.resource_id.as_ref() == Some(rid))
            .find(|o| o.overlaps(request.start_time, request.end_time))
            .map(|o| o.id.clone())
    }

    fn check(
        &self,
        request: &CommitRequest,
        batch: &BTreeMap<&OperationId, &CommitRequest>,
    ) -> Result<(), CommitFailure> {
        if !self.operations.contains_key(&request.operation_id) {
            return Err(CommitFailure::Rejected(format!(
                "unknown operation {}",
                request.operation_id
            )));
        }
        if request.end_time <= request.start_time {
            return Err(CommitFailure::Rejected("end must be after start".into()));
        }
        if let Some(rid) = &request.resource_id {
            match self.resource(rid) {
                None => return Err(CommitFailure::Rejected(format!("unknown resource {rid}"))),
                Some(r) if !r.is_active => {
                    return Err(CommitFailure::Rejected(format!("resource {rid} is inactive")))
                }
                Some(_) => {}
            }
        }
        match self.collision(request, batch) {
            Some(with) => Err(CommitFailure::Conflict { with }),
            None => Ok(()),
        }
    }

    fn apply(&mut self, request: &CommitRequest) {
        if let Some(op) = self.operations.get_mut(&request.operation_id) {
            op.resource_id = request.resource_id.clone();
            op.start = Some(request.start_time);
            op.duration_minutes = minutes_between(request.start_time, request.end_time);
        }
    }
}

fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes()
}

/// Authoritative in-process backend.
///
/// Rejects changes that would overlap an operation it knows about, which is
/// how concurrent edits from other clients show up as commit conflicts.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    store: Mutex<Store>,
}

impl MemoryBackend {
    pub fn new(operations: Vec<Operation>, resources: Vec<Resource>) -> Self {
        Self {
            store: Mutex::new(Store {
                operations: operations.into_iter().map(|o| (o.id.clone(), o)).collect(),
                resources,
                sequences: BTreeMap::new(),
            }),
        }
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace an operation, as another client would.
    pub fn upsert(&self, op: Operation) {
        self.store().operations.insert(op.id.clone(), op);
    }

    pub fn operation(&self, id: &OperationId) -> Option<Operation> {
        self.store().operations.get(id).cloned()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.store().operations.values().cloned().collect()
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.store().resources.clone()
    }

    pub fn sequence(&self, resource: &ResourceId) -> Option<Vec<OperationId>> {
        self.store().sequences.get(resource).cloned()
    }
}

#[async_trait]
impl ReschedulePort for MemoryBackend {
    async fn commit(&self, request: CommitRequest) -> Result<(), CommitFailure> {
        let mut store = self.store();
        store.check(&request, &BTreeMap::new())?;
        store.apply(&request);
        tracing::debug!(operation = %request.operation_id, "backend applied commit");
        Ok(())
    }

    async fn commit_batch(&self, requests: Vec<CommitRequest>) -> Result<(), Vec<BatchFailure>> {
        let mut store = self.store();
        let batch: BTreeMap<&OperationId, &CommitRequest> =
            requests.iter().map(|r| (&r.operation_id, r)).collect();

        let mut failures = Vec::new();
        let mut accepted = Vec::new();
        for request in &requests {
            match store.check(request, &batch) {
                Ok(()) => accepted.push(request),
                Err(failure) => failures.push(BatchFailure {
                    operation_id: request.operation_id.clone(),
                    failure,
                }),
            }
        }
        for request in accepted {
            store.apply(request);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }

    async fn commit_sequence(&self, request: SequenceRequest) -> Result<(), CommitFailure> {
        let mut store = self.store();
        let batch: BTreeMap<&OperationId, &CommitRequest> =
            request.moves.iter().map(|r| (&r.operation_id, r)).collect();
        for step in &request.moves {
            store.check(step, &batch)?;
        }
        let known: BTreeSet<&OperationId> = store.operations.keys().collect();
        if let Some(missing) = request.ordered.iter().find(|id| !known.contains(id)) {
            return Err(CommitFailure::Rejected(format!("unknown operation {missing}")));
        }
        for step in &request.moves {
            store.apply(step);
        }
        store
            .sequences
            .insert(request.resource_id.clone(), request.ordered.clone());
        Ok(())
    }
}

#[async_trait]
impl SnapshotSource for MemoryBackend {
    async fn fetch_operations(&self) -> Result<serde_json::Value, SnapshotError> {
        let store = self.store();
        Ok(serde_json::Value::Array(
            store.operations.values().map(snapshot::operation_record).collect(),
        ))
    }

    async fn fetch_resources(&self) -> Result<serde_json::Value, SnapshotError> {
        let store = self.store();
        Ok(serde_json::Value::Array(
            store.resources.iter().map(snapshot::resource_record).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn request(id: &str, resource: &str, start: DateTime<Utc>, minutes: i64) -> CommitRequest {
        CommitRequest {
            request_id: Uuid::new_v4(),
            operation_id: OperationId::new(id),
            resource_id: Some(ResourceId::new(resource)),
            start_time: start,
            end_time: start + chrono::Duration::minutes(minutes),
        }
    }

    fn backend() -> MemoryBackend {
        MemoryBackend::new(
            vec![
                Operation::new("a", "A", 60).on("R1").starting_at(at(8, 0)),
                Operation::new("b", "B", 60).on("R1").starting_at(at(9, 0)),
            ],
            vec![Resource::new("R1", "Saw"), Resource::new("R2", "Idle").inactive()],
        )
    }

    #[tokio::test]
    async fn commit_rejects_overlap_with_known_operation() {
        let backend = backend();
        let err = backend.commit(request("b", "R1", at(8, 30), 60)).await.unwrap_err();
        assert_eq!(err, CommitFailure::Conflict { with: OperationId::new("a") });
        assert_eq!(backend.operation(&OperationId::new("b")).unwrap().start, Some(at(9, 0)));
    }

    #[tokio::test]
    async fn commit_rejects_inactive_resource() {
        let backend = backend();
        let err = backend.commit(request("a", "R2", at(8, 0), 60)).await.unwrap_err();
        assert!(matches!(err, CommitFailure::Rejected(_)));
    }

    #[tokio::test]
    async fn batch_swaps_are_judged_on_final_positions() {
        let backend = backend();
        let result = backend
            .commit_batch(vec![request("a", "R1", at(9, 0), 60), request("b", "R1", at(8, 0), 60)])
            .await;
        assert!(result.is_ok());
        assert_eq!(backend.operation(&OperationId::new("a")).unwrap().start, Some(at(9, 0)));
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_records() {
        let backend = backend();
        let records = backend.fetch_operations().await.unwrap();
        let parsed = snapshot::parse_operations(&records).unwrap();
        assert!(parsed.quarantined.is_empty());
        assert_eq!(parsed.accepted, backend.operations());
    }
}
