use crate::clock::Clock;
use crate::engine::TimerSession;
use crate::engine::TimerState;
use crate::Database;
use chrono::{Local, TimeZone};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Сессия старше суток при восстановлении считается брошенной
const MAX_RESTORED_SESSION_SECS: i64 = 24 * 60 * 60;

impl TimerSession {
    /// Инициализация с локальным кэшем: восстанавливает запущенную сессию
    pub fn with_db(clock: Arc<dyn Clock>, db: Arc<Database>) -> Self {
        let mut session = Self {
            state: TimerState::Idle,
            clock,
            db: Some(db),
        };

        if let Err(e) = session.restore_state() {
            error!("[TIMER] Failed to restore state from DB: {}", e);
        }

        session
    }

    /// Сохранить запущенную сессию в БД (Idle очищает запись)
    pub fn save_state(&self) -> Result<(), String> {
        let db = match &self.db {
            Some(db) => db,
            None => return Ok(()),
        };

        match &self.state {
            TimerState::Running {
                subject,
                started_at,
                ..
            } => db
                .save_timer_session(subject, started_at.timestamp_millis())
                .map_err(|e| format!("Failed to save state to DB: {}", e)),
            TimerState::Idle => self.clear_saved_state(),
        }
    }

    pub(crate) fn clear_saved_state(&self) -> Result<(), String> {
        let db = match &self.db {
            Some(db) => db,
            None => return Ok(()),
        };
        db.clear_timer_session()
            .map_err(|e| format!("Failed to clear state in DB: {}", e))
    }

    /// Восстановить состояние из БД.
    /// GUARD: никогда не падаем на ошибке восстановления - остаемся в Idle.
    fn restore_state(&mut self) -> Result<(), String> {
        let db = match &self.db {
            Some(db) => db.clone(),
            None => return Ok(()),
        };

        match db.load_timer_session() {
            Ok(Some((subject, started_at_ms))) => {
                let started_at = match Local.timestamp_millis_opt(started_at_ms).single() {
                    Some(ts) => ts,
                    None => {
                        warn!(
                            "[RECOVERY] Invalid saved start timestamp {}, discarding session",
                            started_at_ms
                        );
                        return self.clear_saved_state();
                    }
                };

                let age = (self.clock.now() - started_at).num_seconds();
                if age > MAX_RESTORED_SESSION_SECS {
                    warn!(
                        "[RECOVERY] Saved session for {} is {}h old, discarding without logging",
                        subject,
                        age / 3600
                    );
                    return self.clear_saved_state();
                }

                info!(
                    "[RECOVERY] Restored running session: subject={}, started_at={}",
                    subject, started_at
                );
                self.state = TimerState::Running {
                    subject,
                    started_at,
                    // Монотонная метка не переживает перезапуск процесса
                    started_at_instant: None,
                };
            }
            Ok(None) => {
                info!("[RECOVERY] No saved session found, starting idle");
            }
            Err(e) => {
                error!(
                    "[RECOVERY] Failed to load session from DB: {}. Starting idle.",
                    e
                );
            }
        }

        Ok(())
    }
}
