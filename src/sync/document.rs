use crate::ledger::{coerce_goal, Ledger};
use crate::models::{LedgerSnapshot, LogEntry, Settings, Task};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Subject used when importing the old single-counter schema
pub const LEGACY_IMPORT_SUBJECT: &str = "Imported";

/// Документ не является JSON-объектом - применяются значения по умолчанию целиком
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentError(pub String);

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Malformed document: {}", self.0)
    }
}

impl std::error::Error for DocumentError {}

/// Result of decoding a stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub ledger: Ledger,
    /// One line per field or element that fell back to its default
    pub warnings: Vec<String>,
    /// True when a legacy `total_seconds` counter was turned into a log entry
    pub legacy_imported: bool,
}

pub fn serialize(snapshot: &LedgerSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(snapshot)
}

/// Разбор документа с откатом к значениям по умолчанию для каждого поля.
/// Отсутствующие поля не являются ошибкой (старые документы без `logs`).
/// `today` датирует запись, импортированную из старой схемы.
pub fn decode(text: &str, today: NaiveDate) -> Result<Decoded, DocumentError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Decoded {
            ledger: Ledger::new(),
            warnings: Vec::new(),
            legacy_imported: false,
        });
    }
    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| DocumentError(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| DocumentError("top level is not an object".into()))?;

    let mut warnings = Vec::new();
    let settings = decode_settings(object, &mut warnings);
    let tasks = match object.get("tasks") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => decode_tasks(items, &mut warnings),
        Some(_) => {
            warnings.push("tasks: not an array, using empty list".into());
            Vec::new()
        }
    };

    let mut legacy_imported = false;
    let logs = match object.get("logs") {
        None | Some(Value::Null) => match legacy_total(object) {
            Some(seconds) => {
                legacy_imported = true;
                vec![LogEntry {
                    date: today,
                    subject: LEGACY_IMPORT_SUBJECT.to_string(),
                    seconds,
                }]
            }
            None => Vec::new(),
        },
        Some(Value::Array(items)) => decode_logs(items, &mut warnings),
        Some(_) => {
            warnings.push("logs: not an array, using empty list".into());
            Vec::new()
        }
    };

    Ok(Decoded {
        ledger: Ledger::from_snapshot(LedgerSnapshot {
            settings,
            tasks,
            logs,
        }),
        warnings,
        legacy_imported,
    })
}

fn decode_settings(object: &Map<String, Value>, warnings: &mut Vec<String>) -> Settings {
    let mut settings = Settings::default();

    match object.get("school") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => settings.target_label = s.clone(),
        Some(_) => warnings.push("school: not a string, using empty label".into()),
    }
    match object.get("date") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => settings.target_date = s.trim().to_string(),
        Some(_) => warnings.push("date: not a string, target date unset".into()),
    }
    match object.get("daily_goal") {
        None | Some(Value::Null) => {}
        Some(v) => match v.as_f64().and_then(coerce_goal) {
            Some(goal) => settings.daily_goal_seconds = goal,
            None => warnings.push(format!(
                "daily_goal: {} is not a positive number, using {}s",
                v, settings.daily_goal_seconds
            )),
        },
    }
    settings
}

fn decode_tasks(items: &[Value], warnings: &mut Vec<String>) -> Vec<Task> {
    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let task: Task = match serde_json::from_value(item.clone()) {
            Ok(t) => t,
            Err(e) => {
                warnings.push(format!("tasks[{}]: {}", idx, e));
                continue;
            }
        };
        if task.title.trim().is_empty() {
            warnings.push(format!("tasks[{}]: empty title", idx));
            continue;
        }
        if !seen.insert(task.id) {
            warnings.push(format!("tasks[{}]: duplicate id {}", idx, task.id));
            continue;
        }
        tasks.push(task);
    }
    tasks
}

fn decode_logs(items: &[Value], warnings: &mut Vec<String>) -> Vec<LogEntry> {
    let mut logs = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        match serde_json::from_value::<LogEntry>(item.clone()) {
            Ok(entry) if entry.seconds > 0 => logs.push(entry),
            Ok(_) => warnings.push(format!("logs[{}]: non-positive duration", idx)),
            Err(e) => warnings.push(format!("logs[{}]: {}", idx, e)),
        }
    }
    logs
}

/// Старая схема: только общий счетчик `total_seconds`
fn legacy_total(object: &Map<String, Value>) -> Option<u64> {
    let total = object.get("total_seconds")?.as_f64()?;
    if total.is_finite() && total >= 1.0 {
        Some(total.floor() as u64)
    } else {
        None
    }
}
