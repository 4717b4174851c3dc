use crate::clock::Clock;
use crate::Database;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
mod core;
mod db;

/// Сессия таймера - строгая FSM Idle/Running.
/// Прошедшее время вычисляется из разницы меток при stop, а не тиками интервала.
pub struct TimerSession {
    pub(crate) state: TimerState,
    pub(crate) clock: Arc<dyn Clock>,
    /// Local cache used to survive process restarts while running
    pub(crate) db: Option<Arc<Database>>,
}

/// Состояние таймера
#[derive(Debug, Clone, PartialEq)]
pub enum TimerState {
    Idle,
    Running {
        subject: String,
        /// Wall-clock start; the entry date and elapsed time derive from it
        started_at: DateTime<Local>,
        /// Monotonic start, only known within the process that called `start`
        started_at_instant: Option<Instant>,
    },
}

/// Read-only view for the periodic display refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerDisplay {
    #[serde(flatten)]
    pub state: TimerStateForAPI,
    pub elapsed_seconds: u64,
    /// `HH:MM:SS`
    pub formatted: String,
}

/// Упрощенная версия TimerState для отображения (без Instant)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(tag = "state")]
pub enum TimerStateForAPI {
    Idle,
    Running { subject: String, started_at_ms: i64 },
}

impl TimerSession {
    /// Таймер без локального кэша (тесты, одноразовые вызовы)
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: TimerState::Idle,
            clock,
            db: None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }
}
