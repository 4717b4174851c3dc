use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Дневная цель по умолчанию: 5 часов
pub const DEFAULT_DAILY_GOAL_SECONDS: u64 = 5 * 60 * 60;

/// Пользовательские настройки (цель, дата экзамена, дневная норма)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Free-form label for the goal (school name, exam name). Empty means unset.
    #[serde(rename = "school", default)]
    pub target_label: String,
    /// `YYYY-MM-DD` or empty. Stored verbatim; parsed only by the countdown.
    #[serde(rename = "date", default)]
    pub target_date: String,
    #[serde(rename = "daily_goal", default = "default_daily_goal")]
    pub daily_goal_seconds: u64,
}

fn default_daily_goal() -> u64 {
    DEFAULT_DAILY_GOAL_SECONDS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_label: String::new(),
            target_date: String::new(),
            daily_goal_seconds: DEFAULT_DAILY_GOAL_SECONDS,
        }
    }
}

impl Settings {
    /// Target date if one is set and parseable
    pub fn target_day(&self) -> Option<NaiveDate> {
        let raw = self.target_date.trim();
        if raw.is_empty() {
            return None;
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    }
}

/// Partial settings update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub target_label: Option<String>,
    pub target_date: Option<String>,
    /// Raw user input in seconds; validated by the ledger
    pub daily_goal_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub done: bool,
}

/// One closed study session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub date: NaiveDate,
    pub subject: String,
    pub seconds: u64,
}

/// Immutable copy of the whole persisted document.
/// Field names follow the stored JSON schema.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(flatten)]
    pub settings: Settings,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// One cell of the monthly activity calendar
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarCell {
    /// Placeholder before the first weekday of the month
    Blank,
    Day {
        day: u32,
        seconds: u64,
        /// `None` when nothing was logged that day
        intensity: Option<f64>,
    },
}

/// Countdown to the target date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "days", rename_all = "snake_case")]
pub enum Countdown {
    NoTarget,
    Remaining(i64),
    Today,
    Passed,
}

impl std::fmt::Display for Countdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Countdown::NoTarget => write!(f, "no target set"),
            Countdown::Remaining(1) => write!(f, "1 day remaining"),
            Countdown::Remaining(days) => write!(f, "{} days remaining", days),
            Countdown::Today => write!(f, "today"),
            Countdown::Passed => write!(f, "goal date passed"),
        }
    }
}
