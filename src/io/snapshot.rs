//! Validated parse step between loose backend records and the strict
//! `Operation` / `Resource` shapes. Malformed records are quarantined with a
//! reason; nothing half-parsed reaches the board.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{RecordError, SnapshotError, MAX_DURATION_MINUTES};
use crate::model::{Operation, OperationId, OperationStatus, Priority, Resource, ResourceId};
use crate::port::SnapshotSource;

/// Used when a record has neither an end time nor a duration.
pub const DEFAULT_DURATION_MINUTES: i64 = 120;

#[derive(Debug, Clone, PartialEq)]
pub struct Quarantined {
    /// Position of the record in the payload.
    pub index: usize,
    pub error: RecordError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub accepted: Vec<T>,
    pub quarantined: Vec<Quarantined>,
}

/// Both halves of a backend snapshot after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub operations: Parsed<Operation>,
    pub resources: Parsed<Resource>,
}

impl Snapshot {
    pub fn quarantined(&self) -> usize {
        self.operations.quarantined.len() + self.resources.quarantined.len()
    }
}

/// Fetch and validate a full snapshot. Safe to repeat for a hard refresh.
pub async fn fetch(source: &dyn SnapshotSource) -> Result<Snapshot, SnapshotError> {
    let resources = parse_resources(&source.fetch_resources().await?)?;
    let operations = parse_operations(&source.fetch_operations().await?)?;
    Ok(Snapshot {
        operations,
        resources,
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s.trim().to_string(),
            RawId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperation {
    id: Option<RawId>,
    #[serde(alias = "operationName")]
    name: Option<String>,
    #[serde(alias = "assignedResourceId", alias = "workCenterId")]
    resource_id: Option<RawId>,
    start_time: Option<String>,
    end_time: Option<String>,
    #[serde(alias = "duration")]
    duration_minutes: Option<f64>,
    status: Option<String>,
    priority: Option<u32>,
    #[serde(alias = "percentDone")]
    completion_percentage: Option<f64>,
    on_hold: Option<bool>,
    #[serde(alias = "predecessors")]
    predecessor_ids: Option<Vec<RawId>>,
    #[serde(alias = "needDate")]
    due_date: Option<String>,
    #[serde(alias = "pinned")]
    manually_scheduled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResource {
    id: Option<RawId>,
    name: Option<String>,
    #[serde(rename = "type", alias = "category")]
    kind: Option<String>,
    #[serde(alias = "drum")]
    is_bottleneck: Option<bool>,
    is_active: Option<bool>,
    allow_parallel: Option<bool>,
}

pub fn parse_operations(payload: &Value) -> Result<Parsed<Operation>, SnapshotError> {
    parse_list(payload, parse_operation)
}

pub fn parse_resources(payload: &Value) -> Result<Parsed<Resource>, SnapshotError> {
    parse_list(payload, parse_resource)
}

fn parse_list<T>(
    payload: &Value,
    parse_one: fn(&Value) -> Result<(String, T), RecordError>,
) -> Result<Parsed<T>, SnapshotError> {
    let records = payload.as_array().ok_or(SnapshotError::NotAList)?;
    let mut seen = BTreeSet::new();
    let mut parsed = Parsed {
        accepted: Vec::with_capacity(records.len()),
        quarantined: Vec::new(),
    };

    for (index, record) in records.iter().enumerate() {
        let result = parse_one(record).and_then(|(id, item)| {
            if seen.insert(id.clone()) {
                Ok(item)
            } else {
                Err(RecordError::DuplicateId(id))
            }
        });
        match result {
            Ok(item) => parsed.accepted.push(item),
            Err(error) => {
                tracing::warn!(index, %error, "quarantined snapshot record");
                parsed.quarantined.push(Quarantined { index, error });
            }
        }
    }
    Ok(parsed)
}

fn record_id(record: &Value) -> String {
    match record.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "?".to_string(),
    }
}

fn parse_operation(record: &Value) -> Result<(String, Operation), RecordError> {
    if !record.is_object() {
        return Err(RecordError::NotAnObject);
    }
    let raw: RawOperation =
        serde_json::from_value(record.clone()).map_err(|e| RecordError::Malformed {
            id: record_id(record),
            message: e.to_string(),
        })?;

    let id = raw
        .id
        .map(RawId::into_string)
        .filter(|s| !s.is_empty())
        .ok_or(RecordError::MissingId)?;
    let name = raw
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RecordError::MissingName(id.clone()))?;

    let start = parse_opt_timestamp(&id, "startTime", raw.start_time.as_deref())?;
    let end = parse_opt_timestamp(&id, "endTime", raw.end_time.as_deref())?;
    let due = parse_opt_timestamp(&id, "dueDate", raw.due_date.as_deref())?;

    let duration_minutes = match (start, end, raw.duration_minutes) {
        (Some(s), Some(e), _) => {
            if e <= s {
                return Err(RecordError::EndBeforeStart(id));
            }
            let span = e - s;
            if span.num_seconds() % 60 != 0 || span.subsec_nanos() != 0 {
                return Err(RecordError::FractionalSpan(id));
            }
            span.num_minutes()
        }
        (_, _, Some(d)) => {
            if !d.is_finite() || d.round() <= 0.0 {
                return Err(RecordError::NonPositiveDuration(id));
            }
            if d.round() > MAX_DURATION_MINUTES as f64 {
                return Err(RecordError::DurationTooLong(id));
            }
            d.round() as i64
        }
        _ => DEFAULT_DURATION_MINUTES,
    };
    if duration_minutes > MAX_DURATION_MINUTES {
        return Err(RecordError::DurationTooLong(id));
    }

    let completion = raw.completion_percentage.unwrap_or(0.0);
    if !(0.0..=100.0).contains(&completion) {
        return Err(RecordError::CompletionOutOfRange {
            id,
            value: completion.to_string(),
        });
    }

    let mut status = raw
        .status
        .as_deref()
        .map(parse_status)
        .unwrap_or(OperationStatus::Planned);
    if raw.on_hold == Some(true) {
        status = OperationStatus::OnHold;
    }

    let op = Operation {
        id: OperationId::new(id.clone()),
        name,
        resource_id: raw
            .resource_id
            .map(RawId::into_string)
            .filter(|s| !s.is_empty())
            .map(ResourceId::new),
        start,
        duration_minutes,
        status,
        priority: raw.priority.map(Priority).unwrap_or_default(),
        completion_percentage: completion.round() as u8,
        predecessors: raw
            .predecessor_ids
            .unwrap_or_default()
            .into_iter()
            .map(|p| OperationId::new(p.into_string()))
            .collect(),
        due,
        pinned: raw.manually_scheduled.unwrap_or(false),
    };
    Ok((id, op))
}

fn parse_resource(record: &Value) -> Result<(String, Resource), RecordError> {
    if !record.is_object() {
        return Err(RecordError::NotAnObject);
    }
    let raw: RawResource =
        serde_json::from_value(record.clone()).map_err(|e| RecordError::Malformed {
            id: record_id(record),
            message: e.to_string(),
        })?;
    let id = raw
        .id
        .map(RawId::into_string)
        .filter(|s| !s.is_empty())
        .ok_or(RecordError::MissingId)?;
    let name = raw
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("Resource {id}"));

    let resource = Resource {
        id: ResourceId::new(id.clone()),
        name,
        kind: raw.kind.unwrap_or_else(|| "default".to_string()),
        is_bottleneck: raw.is_bottleneck.unwrap_or(false),
        is_active: raw.is_active.unwrap_or(true),
        allow_parallel: raw.allow_parallel.unwrap_or(false),
    };
    Ok((id, resource))
}

pub fn parse_status(s: &str) -> OperationStatus {
    match s.trim().to_lowercase().as_str() {
        "in_progress" | "in progress" | "in-progress" | "active" | "started" => {
            OperationStatus::InProgress
        }
        "completed" | "complete" | "finished" | "done" => OperationStatus::Completed,
        "on_hold" | "on hold" | "on-hold" | "paused" | "hold" => OperationStatus::OnHold,
        _ => OperationStatus::Planned,
    }
}

fn parse_opt_timestamp(
    id: &str,
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, RecordError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_timestamp(s)
            .map(Some)
            .ok_or_else(|| RecordError::InvalidTimestamp {
                id: id.to_string(),
                field,
                value: s.to_string(),
            }),
    }
}

/// RFC 3339, or a naive date-time taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc());
        }
    }
    None
}

/// Backend wire shape of an operation.
pub fn operation_record(op: &Operation) -> Value {
    json!({
        "id": op.id,
        "name": op.name,
        "resourceId": op.resource_id,
        "startTime": op.start.map(|t| t.to_rfc3339()),
        "endTime": op.end().map(|t| t.to_rfc3339()),
        "durationMinutes": op.duration_minutes,
        "status": op.status,
        "priority": op.priority,
        "completionPercentage": op.completion_percentage,
        "predecessorIds": op.predecessors,
        "dueDate": op.due.map(|t| t.to_rfc3339()),
        "manuallyScheduled": op.pinned,
    })
}

/// Backend wire shape of a resource.
pub fn resource_record(r: &Resource) -> Value {
    json!({
        "id": r.id,
        "name": r.name,
        "type": r.kind,
        "isBottleneck": r.is_bottleneck,
        "isActive": r.is_active,
        "allowParallel": r.allow_parallel,
    })
}
