use crate::aggregate;
use crate::auth::AuthManager;
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::engine::{TimerDisplay, TimerSession};
use crate::ipc::{StatusChannel, SyncStatus};
use crate::ledger::Ledger;
use crate::models::{CalendarCell, Countdown, LogEntry, SettingsPatch, Task};
use crate::network::{DocumentStore, GistStore};
use crate::sync::{PullOutcome, PushOutcome, SyncConfig, SyncEngine, SyncError};
use crate::Database;
use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Everything the rendering layer needs for one screen
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub today: NaiveDate,
    pub target_label: String,
    pub countdown: Countdown,
    pub tasks: Vec<Task>,
    pub today_totals: IndexMap<String, u64>,
    pub today_total_seconds: u64,
    pub daily_goal_seconds: u64,
    pub progress: f64,
    pub calendar: Vec<CalendarCell>,
    pub timer: TimerDisplay,
    pub status: SyncStatus,
}

/// Controller: связывает действия пользователя с Ledger, таймером и синхронизацией.
/// Единственный владелец Ledger. Ошибки удаленного хранилища не возвращаются как Err,
/// а публикуются в StatusChannel.
pub struct Controller {
    ledger: Ledger,
    timer: TimerSession,
    sync: SyncEngine,
    db: Option<Arc<Database>>,
    clock: Arc<dyn Clock>,
    status: StatusChannel,
    /// Ledger был загружен из удаленного документа (или документ создан) в этом процессе.
    /// До этого push не выполняется: иначе пустой Ledger перезапишет настоящий документ.
    hydrated: bool,
}

impl Controller {
    /// Production wiring: SQLite cache in the data dir, HTTP store, system clock
    pub async fn open(config: &AppConfig) -> Result<Self, String> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            format!(
                "Failed to create data directory {}: {}",
                config.data_dir.display(),
                e
            )
        })?;
        let db = Database::open_in(&config.data_dir)
            .map_err(|e| format!("Failed to initialize database: {}", e))?;
        let store: Arc<dyn DocumentStore> = Arc::new(GistStore::new(config.store.clone()));
        Ok(Self::with_parts(
            store,
            Some(Arc::new(db)),
            Arc::new(SystemClock),
            config.sync.clone(),
        )
        .await)
    }

    /// Wire a controller from explicit parts. Cached credential and document id are
    /// loaded from `db` when present.
    pub async fn with_parts(
        store: Arc<dyn DocumentStore>,
        db: Option<Arc<Database>>,
        clock: Arc<dyn Clock>,
        sync_config: SyncConfig,
    ) -> Self {
        let auth_manager = AuthManager::new();
        let sync = SyncEngine::new(store, auth_manager.clone(), sync_config);

        let timer = match &db {
            Some(db) => {
                match db.load_credential() {
                    Ok(credential) => auth_manager.set_credential(credential).await,
                    Err(e) => warn!("[AUTH] Failed to load cached credential: {}", e),
                }
                match db.load_document_id() {
                    Ok(id) => sync.set_document_id(id).await,
                    Err(e) => warn!("[AUTH] Failed to load cached document id: {}", e),
                }
                TimerSession::with_db(clock.clone(), db.clone())
            }
            None => TimerSession::new(clock.clone()),
        };

        Self {
            ledger: Ledger::new(),
            timer,
            sync,
            db,
            clock,
            status: StatusChannel::default(),
            hydrated: false,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn timer(&self) -> &TimerSession {
        &self.timer
    }

    pub fn status(&self) -> SyncStatus {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_syncing()
    }

    pub async fn is_connected(&self) -> bool {
        self.sync.auth_manager.has_credential().await && self.sync.document_id().await.is_some()
    }

    // ============================================
    // CONNECTION
    // ============================================

    /// Запомнить credential и подключиться к документу.
    /// Без id документа используется закэшированный, а если его нет - создается новый документ.
    pub async fn login(&mut self, credential: &str, document_id: Option<String>) -> SyncStatus {
        let credential = credential.trim();
        if credential.is_empty() {
            warn!("[AUTH] Empty credential, ignoring login");
            return self.publish(SyncStatus::NeedsLogin);
        }
        info!("[AUTH] login: credential length={}", credential.len());

        self.sync
            .auth_manager
            .set_credential(Some(credential.to_string()))
            .await;
        if let Some(db) = &self.db {
            if let Err(e) = db.save_credential(credential) {
                error!("[AUTH] Failed to cache credential: {}", e);
            }
        }

        if let Some(id) = document_id.filter(|id| !id.trim().is_empty()) {
            let id = id.trim().to_string();
            self.sync.set_document_id(Some(id.clone())).await;
            self.cache_document_id(&id);
        }

        if self.sync.document_id().await.is_some() {
            return self.pull().await;
        }

        // Документа нет: создаем новый с текущим (пустым или локальным) Ledger
        match self.sync.create_remote_store(&self.ledger.snapshot()).await {
            Ok(id) => {
                self.cache_document_id(&id);
                self.hydrated = true;
                self.publish(SyncStatus::Synced)
            }
            Err(e) => self.report_failure("create", e).await,
        }
    }

    /// Logout: очистить локальный кэш целиком и сбросить состояние в памяти
    pub async fn logout(&mut self) {
        if let Some(db) = &self.db {
            if let Err(e) = db.clear_user_data() {
                error!("[AUTH] Failed to clear local cache on logout: {}", e);
            }
        }
        self.sync.auth_manager.set_credential(None).await;
        self.sync.set_document_id(None).await;
        // Сессия в БД уже удалена, with_db восстановит Idle
        self.timer = match &self.db {
            Some(db) => TimerSession::with_db(self.clock.clone(), db.clone()),
            None => TimerSession::new(self.clock.clone()),
        };
        self.ledger = Ledger::new();
        self.hydrated = false;
        info!("[AUTH] Logged out, local cache cleared");
        self.publish(SyncStatus::NeedsLogin);
    }

    /// Startup: загрузить документ в Ledger
    pub async fn startup(&mut self) -> SyncStatus {
        self.pull().await
    }

    pub async fn pull(&mut self) -> SyncStatus {
        let today = self.clock.today();
        match self.sync.pull(&mut self.ledger, today).await {
            Ok(PullOutcome {
                warnings,
                legacy_imported,
            }) => {
                self.hydrated = true;
                if legacy_imported {
                    // Переписать документ в новой схеме, чтобы импорт не повторился
                    return self.commit().await;
                }
                if warnings.is_empty() {
                    self.publish(SyncStatus::Synced)
                } else {
                    self.publish(SyncStatus::Recovered(warnings))
                }
            }
            Err(e) => self.report_failure("pull", e).await,
        }
    }

    // ============================================
    // TIMER
    // ============================================

    pub fn start_timer(&mut self, subject: &str) -> bool {
        let subject = subject.trim();
        if subject.is_empty() {
            warn!("[TIMER] Ignoring start with empty subject");
            return false;
        }
        self.timer.start(subject)
    }

    /// Stop и фиксация: запись в журнал и push (если было что записать)
    pub async fn stop_timer(&mut self) -> Option<LogEntry> {
        let entry = self.timer.stop(&mut self.ledger)?;
        self.commit().await;
        Some(entry)
    }

    pub fn timer_display(&self) -> TimerDisplay {
        self.timer.display()
    }

    // ============================================
    // TASKS & SETTINGS
    // ============================================

    pub async fn add_task(&mut self, title: &str) -> Option<u64> {
        let id = self.ledger.add_task(title, self.clock.now_ms())?;
        self.commit().await;
        Some(id)
    }

    pub async fn set_task_done(&mut self, id: u64, done: bool) -> bool {
        if !self.ledger.set_task_done(id, done) {
            return false;
        }
        self.commit().await;
        true
    }

    pub async fn remove_task(&mut self, id: u64) -> bool {
        if !self.ledger.remove_task(id) {
            return false;
        }
        self.commit().await;
        true
    }

    pub async fn update_settings(&mut self, patch: SettingsPatch) {
        self.ledger.update_settings(patch);
        self.commit().await;
    }

    // ============================================
    // VIEWS
    // ============================================

    pub fn dashboard(&self) -> Dashboard {
        let today = self.clock.today();
        let settings = self.ledger.settings();
        let logs = self.ledger.logs();
        let today_totals = aggregate::daily_totals(logs, today);
        let today_total_seconds = today_totals.values().sum();

        Dashboard {
            today,
            target_label: settings.target_label.clone(),
            countdown: aggregate::countdown(settings.target_day(), today),
            tasks: aggregate::tasks_for_display(self.ledger.tasks()),
            today_totals,
            today_total_seconds,
            daily_goal_seconds: settings.daily_goal_seconds,
            progress: aggregate::progress_ratio(today_total_seconds, settings.daily_goal_seconds),
            calendar: aggregate::calendar_heat(
                logs,
                today.year(),
                today.month(),
                settings.daily_goal_seconds,
            ),
            timer: self.timer.display(),
            status: self.status.current(),
        }
    }

    pub fn subjects(&self) -> Vec<String> {
        aggregate::known_subjects(self.ledger.logs())
    }

    // ============================================
    // INTERNAL
    // ============================================

    /// Один push на одну сохраняемую мутацию. Мутация остается примененной локально
    /// даже при ошибке записи (at-most-once, без повторов).
    async fn commit(&mut self) -> SyncStatus {
        if !self.hydrated {
            warn!("[SYNC] Remote document not loaded in this session, change kept locally only");
            return self.publish(SyncStatus::Offline(
                "remote document not loaded".to_string(),
            ));
        }
        match self.sync.push(self.ledger.snapshot()).await {
            Ok(PushOutcome::Sent) => self.publish(SyncStatus::Synced),
            Ok(PushOutcome::Superseded) => self.publish(SyncStatus::Superseded),
            Err(e) => self.report_failure("push", e).await,
        }
    }

    async fn report_failure(&mut self, operation: &str, e: SyncError) -> SyncStatus {
        let status = match e {
            SyncError::AuthenticationMissing => {
                info!("[SYNC] {} skipped: not connected", operation);
                SyncStatus::NeedsLogin
            }
            SyncError::Unauthorized => {
                warn!("[SYNC] {} failed: credential rejected", operation);
                SyncStatus::NeedsReauth
            }
            SyncError::RemoteNotFound => {
                warn!(
                    "[SYNC] {} failed: document not found, clearing cached connection",
                    operation
                );
                if let Some(db) = &self.db {
                    if let Err(e) = db.clear_connection() {
                        error!("[SYNC] Failed to clear cached connection: {}", e);
                    }
                }
                self.sync.auth_manager.set_credential(None).await;
                self.sync.set_document_id(None).await;
                self.hydrated = false;
                SyncStatus::DocumentMissing
            }
            SyncError::RemoteUnavailable(msg)
            | SyncError::MalformedDocument(msg)
            | SyncError::Serialize(msg) => {
                warn!("[SYNC] {} failed: {}", operation, msg);
                SyncStatus::Offline(msg)
            }
        };
        self.publish(status)
    }

    fn publish(&self, status: SyncStatus) -> SyncStatus {
        self.status.publish(status.clone());
        status
    }

    fn cache_document_id(&self, id: &str) {
        if let Some(db) = &self.db {
            if let Err(e) = db.save_document_id(id) {
                error!("[AUTH] Failed to cache document id: {}", e);
            }
        }
    }
}
