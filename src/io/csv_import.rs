use std::path::Path;

use serde_json::{Map, Value};

use super::snapshot::{parse_operations, Parsed};
use crate::model::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Id,
    Name,
    Resource,
    Start,
    End,
    Duration,
    Status,
    Priority,
    Completion,
    Due,
    Predecessors,
    Pinned,
}

/// Detect delimiter by checking the first line for common separators.
fn detect_delimiter(first_line: &str) -> u8 {
    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    let tabs = first_line.matches('\t').count();

    if semicolons >= commas && semicolons >= tabs && semicolons > 0 {
        b';'
    } else if tabs > commas {
        b'\t'
    } else {
        b','
    }
}

/// Normalize a header string to a canonical column key.
fn normalize_header(h: &str) -> String {
    h.trim().to_lowercase().replace([' ', '-', '_'], "")
}

fn header_to_col(normalized: &str) -> Option<Column> {
    match normalized {
        "id" | "operationid" | "opid" | "ref" => Some(Column::Id),

        "name" | "operation" | "operationname" | "task" | "taskname" | "label" | "title" => {
            Some(Column::Name)
        }

        "resource" | "resourceid" | "machine" | "workcenter" | "workcenterid"
        | "assignedresourceid" | "line" => Some(Column::Resource),

        "start" | "starttime" | "startdate" | "from" | "begin" => Some(Column::Start),

        "end" | "endtime" | "enddate" | "to" | "finish" => Some(Column::End),

        "duration" | "durationminutes" | "minutes" | "durationmin" => Some(Column::Duration),

        "status" | "state" | "stage" => Some(Column::Status),

        "priority" | "pri" | "importance" => Some(Column::Priority),

        "progress" | "completion" | "completionpercentage" | "percentdone" | "done%" => {
            Some(Column::Completion)
        }

        "due" | "duedate" | "needdate" | "deadline" => Some(Column::Due),

        "predecessors" | "predecessorids" | "after" | "dependson" => Some(Column::Predecessors),

        "pinned" | "manuallyscheduled" | "locked" => Some(Column::Pinned),

        _ => None,
    }
}

/// Priority words map onto the 1 (most urgent) to 9 scale.
fn priority_value(s: &str) -> Value {
    if let Ok(n) = s.parse::<u32>() {
        return Value::from(n);
    }
    match s.to_lowercase().as_str() {
        "critical" | "urgent" => Value::from(1),
        "high" => Value::from(2),
        "medium" | "med" | "normal" => Value::from(5),
        "low" => Value::from(8),
        _ => Value::from(s),
    }
}

/// Numbers stay numbers so the record validator can range-check them.
fn number_value(s: &str) -> Value {
    s.trim_end_matches('%')
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(s))
}

fn bool_value(s: &str) -> Value {
    Value::Bool(matches!(s.to_lowercase().as_str(), "true" | "yes" | "1" | "x"))
}

/// Turn CSV text into the loose backend record shape.
///
/// Rows without an id column get `row-<line>` ids. Returns the records and
/// the number of unreadable rows.
fn records_from_csv(content: &str) -> Result<(Vec<Value>, usize), String> {
    let first_line = content.lines().next().unwrap_or("");
    let delimiter = detect_delimiter(first_line);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| format!("Failed to read CSV headers: {}", e))?
        .clone();
    let col_map: Vec<Option<Column>> = headers
        .iter()
        .map(|h| header_to_col(&normalize_header(h)))
        .collect();

    if !col_map.contains(&Some(Column::Name)) {
        let found: Vec<&str> = headers.iter().collect();
        return Err(format!(
            "CSV is missing a name column. Found headers: {:?}.",
            found
        ));
    }

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (i, result) in reader.records().enumerate() {
        let line = i + 2;
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(line, error = %e, "skipping unreadable CSV row");
                skipped += 1;
                continue;
            }
        };

        let mut record = Map::new();
        for (field, column) in row.iter().zip(&col_map) {
            let Some(column) = column else { continue };
            if field.is_empty() {
                continue;
            }
            let (key, value) = match column {
                Column::Id => ("id", Value::from(field)),
                Column::Name => ("name", Value::from(field)),
                Column::Resource => ("resourceId", Value::from(field)),
                Column::Start => ("startTime", Value::from(field)),
                Column::End => ("endTime", Value::from(field)),
                Column::Duration => ("durationMinutes", number_value(field)),
                Column::Status => ("status", Value::from(field)),
                Column::Priority => ("priority", priority_value(field)),
                Column::Completion => ("completionPercentage", number_value(field)),
                Column::Due => ("dueDate", Value::from(field)),
                Column::Predecessors => (
                    "predecessorIds",
                    field
                        .split(['|', ' ', ','])
                        .filter(|p| !p.is_empty())
                        .map(Value::from)
                        .collect(),
                ),
                Column::Pinned => ("manuallyScheduled", bool_value(field)),
            };
            record.insert(key.to_string(), value);
        }
        record
            .entry("id")
            .or_insert_with(|| Value::from(format!("row-{line}")));
        records.push(Value::Object(record));
    }

    if records.is_empty() {
        return Err("CSV file is empty or has no data rows".to_string());
    }
    Ok((records, skipped))
}

/// Import operations from CSV text through the snapshot validator.
pub fn read_operations(content: &str) -> Result<(Parsed<Operation>, usize), String> {
    let (records, skipped) = records_from_csv(content)?;
    let parsed = parse_operations(&Value::Array(records)).map_err(|e| e.to_string())?;
    Ok((parsed, skipped))
}

/// Import operations from a CSV file.
///
/// Auto-detects delimiter (comma, semicolon, tab) and matches column headers
/// flexibly ("Work Center", "Start Time", ...). Returns the validated
/// operations and the count of unreadable rows.
pub fn import_csv(path: &Path) -> Result<(Parsed<Operation>, usize), String> {
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read file: {}", e))?;
    read_operations(&content)
}
