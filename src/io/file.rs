use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::snapshot::{self, Snapshot};
use crate::error::{CommitFailure, SnapshotError};
use crate::model::{Operation, Resource};
use crate::port::{BatchFailure, CommitRequest, MemoryBackend, ReschedulePort, SequenceRequest, SnapshotSource};

/// Save operations and resources as a JSON snapshot file.
pub fn save_snapshot(operations: &[Operation], resources: &[Resource], path: &Path) -> Result<(), String> {
    let document = json!({
        "operations": operations.iter().map(snapshot::operation_record).collect::<Vec<_>>(),
        "resources": resources.iter().map(snapshot::resource_record).collect::<Vec<_>>(),
    });
    let json = serde_json::to_string_pretty(&document).map_err(|e| e.to_string())?;
    std::fs::write(path, json).map_err(|e| e.to_string())
}

/// Load and validate a JSON snapshot file.
pub fn load_snapshot(path: &Path) -> Result<Snapshot, String> {
    let json = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let document: Value = serde_json::from_str(&json).map_err(|e| e.to_string())?;
    let section = |key: &str| document.get(key).cloned().unwrap_or_else(|| json!([]));
    Ok(Snapshot {
        operations: snapshot::parse_operations(&section("operations")).map_err(|e| e.to_string())?,
        resources: snapshot::parse_resources(&section("resources")).map_err(|e| e.to_string())?,
    })
}

/// Backend that keeps the schedule in memory and writes every confirmed
/// change back to a snapshot file.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    inner: MemoryBackend,
}

impl JsonFileBackend {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, String> {
        let path = path.into();
        let snapshot = load_snapshot(&path)?;
        if snapshot.quarantined() > 0 {
            tracing::warn!(
                path = %path.display(),
                quarantined = snapshot.quarantined(),
                "snapshot file has invalid records"
            );
        }
        Ok(Self {
            inner: MemoryBackend::new(snapshot.operations.accepted, snapshot.resources.accepted),
            path,
        })
    }

    /// Start a new file from existing data.
    pub fn create(path: impl Into<PathBuf>, operations: Vec<Operation>, resources: Vec<Resource>) -> Result<Self, String> {
        let backend = Self {
            path: path.into(),
            inner: MemoryBackend::new(operations, resources),
        };
        backend.save()?;
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<(), String> {
        save_snapshot(&self.inner.operations(), &self.inner.resources(), &self.path)
    }

    fn persist(&self) -> Result<(), CommitFailure> {
        self.save().map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "failed to write snapshot file");
            CommitFailure::Rejected(format!("could not write {}: {e}", self.path.display()))
        })
    }
}

#[async_trait]
impl ReschedulePort for JsonFileBackend {
    async fn commit(&self, request: CommitRequest) -> Result<(), CommitFailure> {
        self.inner.commit(request).await?;
        self.persist()
    }

    async fn commit_batch(&self, requests: Vec<CommitRequest>) -> Result<(), Vec<BatchFailure>> {
        let ids: Vec<_> = requests.iter().map(|r| r.operation_id.clone()).collect();
        let result = self.inner.commit_batch(requests).await;
        if let Err(failure) = self.persist() {
            return Err(ids
                .into_iter()
                .map(|operation_id| BatchFailure {
                    operation_id,
                    failure: failure.clone(),
                })
                .collect());
        }
        result
    }

    async fn commit_sequence(&self, request: SequenceRequest) -> Result<(), CommitFailure> {
        self.inner.commit_sequence(request).await?;
        self.persist()
    }
}

#[async_trait]
impl SnapshotSource for JsonFileBackend {
    async fn fetch_operations(&self) -> Result<Value, SnapshotError> {
        self.inner.fetch_operations().await
    }

    async fn fetch_resources(&self) -> Result<Value, SnapshotError> {
        self.inner.fetch_resources().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    use crate::model::{OperationId, ResourceId};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("resource-gantt-{}-{name}.json", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn confirmed_commits_reach_the_file() {
        let path = temp_path("commit");
        let backend = JsonFileBackend::create(
            &path,
            vec![Operation::new("a", "A", 60).on("R1").starting_at(at(8, 0))],
            vec![Resource::new("R1", "Saw")],
        )
        .unwrap();

        backend
            .commit(CommitRequest {
                request_id: Uuid::new_v4(),
                operation_id: OperationId::new("a"),
                resource_id: Some(ResourceId::new("R1")),
                start_time: at(10, 0),
                end_time: at(10, 0) + Duration::minutes(90),
            })
            .await
            .unwrap();

        let reloaded = load_snapshot(&path).unwrap();
        let op = &reloaded.operations.accepted[0];
        assert_eq!(op.start, Some(at(10, 0)));
        assert_eq!(op.duration_minutes, 90);
        assert_eq!(reloaded.resources.accepted[0].name, "Saw");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_sections_load_empty() {
        let path = temp_path("empty");
        std::fs::write(&path, "{}").unwrap();
        let snapshot = load_snapshot(&path).unwrap();
        assert!(snapshot.operations.accepted.is_empty());
        assert!(snapshot.resources.accepted.is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
