use crate::models::{LedgerSnapshot, LogEntry, Settings, SettingsPatch, Task};
use chrono::NaiveDate;
use tracing::debug;

/// Ledger - единственный источник истины для настроек, задач и журнала занятий.
/// Журнал только дополняется: записи никогда не изменяются и не удаляются.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    settings: Settings,
    tasks: Vec<Task>,
    logs: Vec<LogEntry>,
    /// Последний выданный id задачи (id строго возрастают)
    last_task_id: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from an already validated snapshot.
    /// The id generator is moved past every loaded task id.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        let last_task_id = snapshot.tasks.iter().map(|t| t.id).max().unwrap_or(0);
        Self {
            settings: snapshot.settings,
            tasks: snapshot.tasks,
            logs: snapshot.logs,
            last_task_id,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    /// Добавить задачу. Пустой заголовок - no-op.
    /// `now_ms` is the creation timestamp the id is derived from; ids stay unique even
    /// when two tasks share a millisecond or the clock goes backwards.
    pub fn add_task(&mut self, title: &str, now_ms: u64) -> Option<u64> {
        let title = title.trim();
        if title.is_empty() {
            debug!("[LEDGER] Ignoring task with empty title");
            return None;
        }
        let id = now_ms.max(self.last_task_id.saturating_add(1));
        self.last_task_id = id;
        self.tasks.push(Task {
            id,
            title: title.to_string(),
            done: false,
        });
        Some(id)
    }

    /// Returns false when no task has this id
    pub fn set_task_done(&mut self, id: u64, done: bool) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.done = done;
                true
            }
            None => false,
        }
    }

    pub fn remove_task(&mut self, id: u64) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    /// Дописать запись в журнал. `seconds <= 0` - no-op.
    pub fn append_log(&mut self, date: NaiveDate, subject: &str, seconds: i64) -> bool {
        if seconds <= 0 {
            debug!(
                "[LEDGER] Ignoring non-positive duration {}s for {}",
                seconds, subject
            );
            return false;
        }
        self.logs.push(LogEntry {
            date,
            subject: subject.to_string(),
            seconds: seconds as u64,
        });
        true
    }

    /// Apply a partial settings update. An invalid daily goal keeps the current value.
    pub fn update_settings(&mut self, patch: SettingsPatch) {
        if let Some(label) = patch.target_label {
            self.settings.target_label = label;
        }
        if let Some(date) = patch.target_date {
            self.settings.target_date = date.trim().to_string();
        }
        if let Some(goal) = patch.daily_goal_seconds {
            match coerce_goal(goal) {
                Some(seconds) => self.settings.daily_goal_seconds = seconds,
                None => debug!(
                    "[LEDGER] Rejected daily goal {}, keeping {}s",
                    goal, self.settings.daily_goal_seconds
                ),
            }
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            settings: self.settings.clone(),
            tasks: self.tasks.clone(),
            logs: self.logs.clone(),
        }
    }

    /// Заменить содержимое целиком (используется при pull)
    pub(crate) fn replace_with(&mut self, other: Ledger) {
        *self = other;
    }
}

/// Positive finite goal, rounded to whole seconds (at least one second)
pub(crate) fn coerce_goal(value: f64) -> Option<u64> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    Some((value.round() as u64).max(1))
}
