use crate::auth::AuthManager;
use crate::ledger::Ledger;
use crate::models::LedgerSnapshot;
use crate::network::{DocumentStore, StoreError};
use chrono::NaiveDate;
use scopeguard::guard;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod document;

/// Ошибки синхронизации (для разбора и логирования)
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// No credential (or no document id) cached: the user has to connect
    AuthenticationMissing,
    /// Credential rejected by the store: the user has to log in again
    Unauthorized,
    /// Transport failure or timeout
    RemoteUnavailable(String),
    /// Cached document id is stale or deleted
    RemoteNotFound,
    /// The store answered, but not with a readable document blob
    MalformedDocument(String),
    Serialize(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::AuthenticationMissing => write!(f, "Not connected: no credential cached"),
            SyncError::Unauthorized => write!(f, "Credential rejected by the document store"),
            SyncError::RemoteUnavailable(s) => write!(f, "Remote unavailable: {}", s),
            SyncError::RemoteNotFound => write!(f, "Remote document not found"),
            SyncError::MalformedDocument(s) => write!(f, "Malformed document: {}", s),
            SyncError::Serialize(s) => write!(f, "Serialize: {}", s),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unauthorized => SyncError::Unauthorized,
            StoreError::NotFound => SyncError::RemoteNotFound,
            StoreError::Network(s) => SyncError::RemoteUnavailable(s),
            StoreError::Http { status, message } => {
                SyncError::RemoteUnavailable(format!("HTTP {}: {}", status, message))
            }
            StoreError::Malformed(s) => SyncError::MalformedDocument(s),
        }
    }
}

/// Конфигурация синхронизации
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Upper bound for one remote operation; a hung request counts as unavailable
    pub op_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { op_timeout_secs: 45 }
    }
}

/// What happened to the snapshot handed to `push`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// This call wrote the newest snapshot to the store
    Sent,
    /// This call's changes reached the store inside a newer snapshot written by this
    /// or another call
    Superseded,
}

/// Result of a successful pull
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullOutcome {
    /// Fields or elements that fell back to defaults
    pub warnings: Vec<String>,
    pub legacy_imported: bool,
}

/// Слот ожидающей отправки: очередь глубины 1, новый снимок вытесняет старый
#[derive(Default)]
struct PendingPush {
    generation: u64,
    snapshot: Option<(u64, LedgerSnapshot)>,
    /// Highest generation that reached the store
    written: u64,
    /// Error of the last failed write and the generation it carried
    last_failure: Option<(u64, SyncError)>,
}

impl PendingPush {
    /// Outcome for a caller whose snapshot was taken by another push.
    /// A snapshot carries every earlier mutation, so a newer write covers this generation too.
    fn settled(&self, generation: u64) -> Result<PushOutcome, SyncError> {
        if self.written >= generation {
            return Ok(PushOutcome::Superseded);
        }
        match &self.last_failure {
            Some((failed, e)) if *failed >= generation => Err(e.clone()),
            _ => Err(SyncError::RemoteUnavailable(format!(
                "snapshot {} was not written",
                generation
            ))),
        }
    }
}

/// Read-modify-write of the whole ledger document.
/// Policy: last writer wins, every push overwrites the full document.
/// Pull and push share one async lock, so they never interleave within a process.
#[derive(Clone)]
pub struct SyncEngine {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) auth_manager: AuthManager,
    document_id: Arc<tokio::sync::RwLock<Option<String>>>,
    pending: Arc<Mutex<PendingPush>>,
    io_lock: Arc<tokio::sync::Mutex<()>>,
    /// True while a write is in flight (for a "saving…" indicator)
    is_syncing: Arc<AtomicBool>,
    op_timeout: Duration,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn DocumentStore>, auth_manager: AuthManager, config: SyncConfig) -> Self {
        Self {
            store,
            auth_manager,
            document_id: Arc::new(tokio::sync::RwLock::new(None)),
            pending: Arc::new(Mutex::new(PendingPush::default())),
            io_lock: Arc::new(tokio::sync::Mutex::new(())),
            is_syncing: Arc::new(AtomicBool::new(false)),
            op_timeout: Duration::from_secs(config.op_timeout_secs),
        }
    }

    pub async fn set_document_id(&self, document_id: Option<String>) {
        *self.document_id.write().await = document_id.filter(|id| !id.trim().is_empty());
    }

    pub async fn document_id(&self) -> Option<String> {
        self.document_id.read().await.clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::Acquire)
    }

    async fn credentials(&self) -> Result<(String, String), SyncError> {
        let credential = self
            .auth_manager
            .get_credential()
            .await
            .map_err(|_| SyncError::AuthenticationMissing)?;
        let document_id = self
            .document_id()
            .await
            .ok_or(SyncError::AuthenticationMissing)?;
        Ok((credential, document_id))
    }

    async fn with_timeout<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, SyncError> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::RemoteUnavailable(format!(
                "{} timed out after {}s",
                what,
                self.op_timeout.as_secs()
            ))),
        }
    }

    /// Загрузить документ и заменить им Ledger целиком.
    /// При любой ошибке Ledger остается как был.
    /// Содержимое, которое не разбирается как объект, или документ без файла Ledger
    /// дают Ledger по умолчанию с предупреждением.
    pub async fn pull(&self, ledger: &mut Ledger, today: NaiveDate) -> Result<PullOutcome, SyncError> {
        let _io = self.io_lock.lock().await;
        let (credential, document_id) = self.credentials().await?;

        let text = self
            .with_timeout("pull", self.store.fetch(&credential, &document_id))
            .await?;

        let outcome = match text {
            None => {
                warn!("[SYNC] Document {} holds no ledger, using defaults", document_id);
                ledger.replace_with(Ledger::new());
                PullOutcome {
                    warnings: vec!["document holds no ledger file, starting from defaults".into()],
                    legacy_imported: false,
                }
            }
            Some(text) => {
                debug!("[SYNC] Pulled {} bytes from {}", text.len(), document_id);
                match document::decode(&text, today) {
                    Ok(decoded) => {
                        ledger.replace_with(decoded.ledger);
                        PullOutcome {
                            warnings: decoded.warnings,
                            legacy_imported: decoded.legacy_imported,
                        }
                    }
                    Err(e) => {
                        warn!("[SYNC] {}. Falling back to defaults.", e);
                        ledger.replace_with(Ledger::new());
                        PullOutcome {
                            warnings: vec![e.to_string()],
                            legacy_imported: false,
                        }
                    }
                }
            }
        };

        for w in &outcome.warnings {
            warn!("[SYNC] Document field fell back to default: {}", w);
        }
        if outcome.legacy_imported {
            info!("[SYNC] Imported legacy total_seconds counter as a single log entry");
        }
        info!(
            "[SYNC] Pull complete: {} tasks, {} log entries",
            ledger.tasks().len(),
            ledger.logs().len()
        );
        Ok(outcome)
    }

    /// Перезаписать удаленный документ снимком.
    /// Одна запись в полете; ожидающий снимок вытесняется более новым,
    /// так что старый снимок никогда не перезапишет новый.
    /// `Superseded` означает, что изменения записаны в составе более нового снимка;
    /// если этот снимок не дошел до хранилища, возвращается ошибка той записи.
    pub async fn push(&self, snapshot: LedgerSnapshot) -> Result<PushOutcome, SyncError> {
        let my_generation = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.generation += 1;
            let generation = pending.generation;
            pending.snapshot = Some((generation, snapshot));
            generation
        };

        let _io = self.io_lock.lock().await;

        let next = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.snapshot.take() {
                Some(next) => next,
                None => {
                    let outcome = pending.settled(my_generation);
                    debug!(
                        "[SYNC] Snapshot {} was taken by another push: {:?}",
                        my_generation, outcome
                    );
                    return outcome;
                }
            }
        };
        let (generation, snapshot) = next;

        self.is_syncing.store(true, Ordering::Release);
        let _guard = guard((), |_| {
            self.is_syncing.store(false, Ordering::Release);
        });

        let result = self.write_snapshot(&snapshot).await;

        // Итог записывается до освобождения io_lock: ожидающие вызовы читают его сразу
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(bytes) => {
                pending.written = pending.written.max(generation);
                info!(
                    "[SYNC] Pushed snapshot {} ({} bytes, {} log entries)",
                    generation,
                    bytes,
                    snapshot.logs.len()
                );
                if generation == my_generation {
                    Ok(PushOutcome::Sent)
                } else {
                    Ok(PushOutcome::Superseded)
                }
            }
            Err(e) => {
                warn!("[SYNC] Push of snapshot {} failed: {}", generation, e);
                pending.last_failure = Some((generation, e.clone()));
                Err(e)
            }
        }
    }

    /// One overwrite of the whole document; returns the size written
    async fn write_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<usize, SyncError> {
        let (credential, document_id) = self.credentials().await?;
        let content =
            document::serialize(snapshot).map_err(|e| SyncError::Serialize(e.to_string()))?;
        self.with_timeout(
            "push",
            self.store.overwrite(&credential, &document_id, &content),
        )
        .await?;
        Ok(content.len())
    }

    /// Создать новый удаленный документ с данным снимком; возвращает его id.
    /// Новый id сразу становится текущим; кэшировать его - задача вызывающего.
    pub async fn create_remote_store(&self, snapshot: &LedgerSnapshot) -> Result<String, SyncError> {
        let _io = self.io_lock.lock().await;
        let credential = self
            .auth_manager
            .get_credential()
            .await
            .map_err(|_| SyncError::AuthenticationMissing)?;
        let content =
            document::serialize(snapshot).map_err(|e| SyncError::Serialize(e.to_string()))?;

        let id = self
            .with_timeout("create", self.store.create(&credential, &content))
            .await?;
        info!("[SYNC] Created remote document {}", id);
        *self.document_id.write().await = Some(id.clone());
        Ok(id)
    }
}
