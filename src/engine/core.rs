use crate::aggregate::format_hms;
use crate::engine::TimerSession;
use crate::engine::TimerState;
use crate::engine::{TimerDisplay, TimerStateForAPI};
use crate::ledger::Ledger;
use crate::models::LogEntry;
use chrono::{DateTime, Local};
use std::time::Instant;
use tracing::{error, info, warn};

impl TimerSession {
    /// Переход: Idle → Running.
    /// Running → Running - no-op (идемпотентно), возвращает false.
    pub fn start(&mut self, subject: &str) -> bool {
        match &self.state {
            TimerState::Idle => {
                let started_at = self.clock.now();
                self.state = TimerState::Running {
                    subject: subject.to_string(),
                    started_at,
                    started_at_instant: Some(self.clock.instant()),
                };
                info!("[TIMER] Started session for {}", subject);

                if let Err(e) = self.save_state() {
                    error!("[TIMER] Failed to save state after start: {}", e);
                }
                true
            }
            TimerState::Running { subject: current, .. } => {
                warn!(
                    "[FSM] Ignoring start({}): already running for {}",
                    subject, current
                );
                false
            }
        }
    }

    /// Переход: Running → Idle. Каждый stop - точка фиксации:
    /// при elapsed > 0 в журнал добавляется запись за текущий локальный день.
    /// Idle → Idle - no-op.
    pub fn stop(&mut self, ledger: &mut Ledger) -> Option<LogEntry> {
        let (subject, started_at, started_at_instant) = match &self.state {
            TimerState::Running {
                subject,
                started_at,
                started_at_instant,
            } => (subject.clone(), *started_at, *started_at_instant),
            TimerState::Idle => {
                warn!("[FSM] Ignoring stop: timer is idle");
                return None;
            }
        };

        let elapsed = self.session_elapsed(started_at, started_at_instant);
        let today = self.clock.today();
        self.state = TimerState::Idle;

        if let Err(e) = self.clear_saved_state() {
            error!("[TIMER] Failed to clear saved state after stop: {}", e);
        }

        if ledger.append_log(today, &subject, elapsed as i64) {
            info!("[TIMER] Stopped {}: {}s logged for {}", subject, elapsed, today);
            ledger.logs().last().cloned()
        } else {
            info!("[TIMER] Stopped {} with zero elapsed time, nothing logged", subject);
            None
        }
    }

    /// Seconds in the current session, 0 when idle. Pure read.
    pub fn elapsed_seconds(&self) -> u64 {
        match &self.state {
            TimerState::Running {
                started_at,
                started_at_instant,
                ..
            } => self.session_elapsed(*started_at, *started_at_instant),
            TimerState::Idle => 0,
        }
    }

    /// Снимок для периодического обновления экрана. Ничего не меняет.
    pub fn display(&self) -> TimerDisplay {
        let elapsed_seconds = self.elapsed_seconds();
        let state = match &self.state {
            TimerState::Idle => TimerStateForAPI::Idle,
            TimerState::Running {
                subject,
                started_at,
                ..
            } => TimerStateForAPI::Running {
                subject: subject.clone(),
                started_at_ms: started_at.timestamp_millis(),
            },
        };
        TimerDisplay {
            state,
            elapsed_seconds,
            formatted: format_hms(elapsed_seconds),
        }
    }

    /// floor(now - start) по настенным часам.
    /// Если часы переведены назад за момент старта - берем монотонное время (если оно есть).
    fn session_elapsed(
        &self,
        started_at: DateTime<Local>,
        started_at_instant: Option<Instant>,
    ) -> u64 {
        let wall_ms = (self.clock.now() - started_at).num_milliseconds();
        if wall_ms >= 0 {
            return (wall_ms / 1000) as u64;
        }
        match started_at_instant {
            Some(instant) => self.clock.instant().duration_since(instant).as_secs(),
            None => {
                warn!(
                    "[TIMER] Clock skew detected: now is {}ms before session start, elapsed treated as 0",
                    -wall_ms
                );
                0
            }
        }
    }
}
