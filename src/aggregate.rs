//! Derived views over the study log: daily totals, progress, calendar heatmap, countdown.
//! Everything here is a pure function of its arguments.

use crate::models::{CalendarCell, Countdown, LogEntry, Task};
use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;

/// Subjects offered before anything is logged
pub const DEFAULT_SUBJECTS: [&str; 6] = ["Math", "English", "Physics", "Chemistry", "Japanese", "Other"];

/// Нижняя граница яркости для дня с хоть какой-то активностью
const MIN_FILLED_INTENSITY: f64 = 0.2;

/// Seconds per subject for one day, in first-seen order
pub fn daily_totals(logs: &[LogEntry], day: NaiveDate) -> IndexMap<String, u64> {
    let mut totals: IndexMap<String, u64> = IndexMap::new();
    for entry in logs.iter().filter(|e| e.date == day) {
        *totals.entry(entry.subject.clone()).or_insert(0) += entry.seconds;
    }
    totals
}

pub fn total_for_day(logs: &[LogEntry], day: NaiveDate) -> u64 {
    logs.iter()
        .filter(|e| e.date == day)
        .map(|e| e.seconds)
        .sum()
}

/// Sum over an inclusive date range
pub fn total_between(logs: &[LogEntry], from: NaiveDate, to: NaiveDate) -> u64 {
    logs.iter()
        .filter(|e| e.date >= from && e.date <= to)
        .map(|e| e.seconds)
        .sum()
}

/// Whole-log breakdown per subject, first-seen order
pub fn subject_totals(logs: &[LogEntry]) -> IndexMap<String, u64> {
    let mut totals: IndexMap<String, u64> = IndexMap::new();
    for entry in logs {
        *totals.entry(entry.subject.clone()).or_insert(0) += entry.seconds;
    }
    totals
}

/// Доля выполнения дневной цели в диапазоне [0, 1]
pub fn progress_ratio(today_total_seconds: u64, daily_goal_seconds: u64) -> f64 {
    if daily_goal_seconds == 0 {
        return if today_total_seconds > 0 { 1.0 } else { 0.0 };
    }
    (today_total_seconds as f64 / daily_goal_seconds as f64).clamp(0.0, 1.0)
}

/// Calendar cells for one month on a Monday-first 7-column grid.
/// Leading `Blank` cells pad the days before the 1st; an invalid month yields no cells.
pub fn calendar_heat(
    logs: &[LogEntry],
    year: i32,
    month: u32,
    daily_goal_seconds: u64,
) -> Vec<CalendarCell> {
    let first = match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(d) => d,
        None => return Vec::new(),
    };
    let days = days_in_month(first);
    let goal = daily_goal_seconds.max(1) as f64;

    let mut per_day = vec![0u64; days as usize];
    for entry in logs {
        if entry.date.year() == year && entry.date.month() == month {
            per_day[(entry.date.day() - 1) as usize] += entry.seconds;
        }
    }

    let leading = first.weekday().number_from_monday() - 1;
    let mut cells = Vec::with_capacity(leading as usize + days as usize);
    cells.extend((0..leading).map(|_| CalendarCell::Blank));
    for (idx, seconds) in per_day.into_iter().enumerate() {
        let intensity = if seconds > 0 {
            Some((MIN_FILLED_INTENSITY + seconds as f64 / goal).clamp(0.0, 1.0))
        } else {
            None
        };
        cells.push(CalendarCell::Day {
            day: idx as u32 + 1,
            seconds,
            intensity,
        });
    }
    cells
}

fn days_in_month(first: NaiveDate) -> u32 {
    let (y, m) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|next| next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

pub fn countdown(target_date: Option<NaiveDate>, today: NaiveDate) -> Countdown {
    let target = match target_date {
        Some(t) => t,
        None => return Countdown::NoTarget,
    };
    // Обе даты - полночь по локальному времени, разница всегда целая
    let days = (target - today).num_days();
    match days {
        d if d > 0 => Countdown::Remaining(d),
        0 => Countdown::Today,
        _ => Countdown::Passed,
    }
}

/// `HH:MM:SS`, hours are not wrapped at 24
pub fn format_hms(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Incomplete tasks first, insertion order otherwise
pub fn tasks_for_display(tasks: &[Task]) -> Vec<Task> {
    let mut sorted = tasks.to_vec();
    sorted.sort_by_key(|t| t.done);
    sorted
}

/// Default subjects plus anything already present in the log
pub fn known_subjects(logs: &[LogEntry]) -> Vec<String> {
    let mut subjects: Vec<String> = DEFAULT_SUBJECTS.iter().map(|s| s.to_string()).collect();
    for entry in logs {
        if !subjects.iter().any(|s| s == &entry.subject) {
            subjects.push(entry.subject.clone());
        }
    }
    subjects
}
