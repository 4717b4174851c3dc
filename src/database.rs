use rusqlite::{params, Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::auth::TokenEncryption;

pub const DB_FILE_NAME: &str = "hygge.db";

const META_CREDENTIAL: &str = "credential";
const META_DOCUMENT_ID: &str = "document_id";

/// Log IO-related DB errors for easier diagnosis (disk full, permission denied).
/// Does not change error propagation — caller still returns Err.
fn log_io_error_if_any(context: &str, e: &rusqlite::Error) {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = e {
        match ffi_err.code {
            ErrorCode::DiskFull => {
                error!("[DB] {}: Disk full. Free space on drive or check the data directory.", context);
            }
            ErrorCode::ReadOnly | ErrorCode::CannotOpen => {
                error!(
                    "[DB] {}: Permission denied or read-only. Check the data directory is writable.",
                    context
                );
            }
            ErrorCode::SystemIoFailure => {
                error!("[DB] {}: I/O error. Check disk and permissions.", context);
            }
            _ => {}
        }
    }
}

use rusqlite::Error::InvalidParameterName;

/// Локальный кэш: учетные данные, id документа, запущенная сессия таймера.
/// Сам журнал здесь не хранится - он живет в удаленном документе.
pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
    pub(crate) encryption: Arc<TokenEncryption>,
}

impl Database {
    /// Безопасная блокировка соединения с обработкой poisoned mutex
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, rusqlite::Error> {
        self.conn.lock().map_err(|e| {
            InvalidParameterName(format!(
                "Database mutex poisoned: {}. A panic occurred while holding the lock.",
                e
            ))
        })
    }

    pub fn new(db_path: &Path) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        // GUARD: Integrity check on startup — detect corruption before init
        let integrity: String = conn
            .query_row("PRAGMA integrity_check", [], |r| r.get(0))
            .map_err(|e| InvalidParameterName(format!("Integrity check failed: {}", e)))?;
        if integrity.to_lowercase() != "ok" {
            return Err(InvalidParameterName(format!(
                "Database corruption detected: {}",
                integrity
            )));
        }

        // WAL для защиты от corruption; не критично, если не получилось
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!(
                "[DB] Failed to enable WAL mode: {}. Continuing with default journal mode.",
                e
            );
        }
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");

        let encryption =
            TokenEncryption::new(db_path.parent()).map_err(InvalidParameterName)?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            encryption: Arc::new(encryption),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Открыть БД в каталоге данных.
    /// Auto-recovery: при corruption старый файл переименовывается и создается новый.
    pub fn open_in(data_dir: &Path) -> SqliteResult<Self> {
        let db_path = data_dir.join(DB_FILE_NAME);
        match Database::new(&db_path) {
            Ok(db) => Ok(db),
            Err(e) => {
                let err_str = e.to_string();
                let is_corruption = err_str.contains("corruption")
                    || err_str.contains("integrity")
                    || err_str.contains("not a database");
                if !is_corruption || !db_path.exists() {
                    return Err(e);
                }
                let backup_path = data_dir.join(format!(
                    "{}.corrupted.{}",
                    DB_FILE_NAME,
                    chrono::Utc::now().timestamp()
                ));
                if let Err(rename_e) = std::fs::rename(&db_path, &backup_path) {
                    warn!(
                        "[DB] Failed to rename corrupted DB to {:?}: {}",
                        backup_path, rename_e
                    );
                    return Err(e);
                }
                info!(
                    "[DB] Corrupted DB backed up to {:?}, starting fresh",
                    backup_path
                );
                Database::new(&db_path)
            }
        }
    }

    /// Current schema version (PRAGMA user_version). Bump when adding migrations.
    const SCHEMA_VERSION: i32 = 2;

    fn run_migrations(&self) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        let current: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

        if current < 1 {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS app_meta (key TEXT PRIMARY KEY, value TEXT)",
                [],
            )?;
        }
        // Migration 2: running timer session (single row)
        if current < 2 {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS timer_session (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                subject TEXT NOT NULL,
                started_at_ms INTEGER NOT NULL
            )",
                [],
            )?;
        }

        conn.pragma_update(None, "user_version", Self::SCHEMA_VERSION)?;
        Ok(())
    }

    pub fn get_app_meta(&self, key: &str) -> SqliteResult<Option<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT value FROM app_meta WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            return Ok(row.get(0)?);
        }
        Ok(None)
    }

    pub fn set_app_meta(&self, key: &str, value: &str) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO app_meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )
        .map_err(|e| {
            log_io_error_if_any("set_app_meta", &e);
            e
        })?;
        Ok(())
    }

    pub fn delete_app_meta(&self, key: &str) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM app_meta WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Сохранить credential в зашифрованном виде
    pub fn save_credential(&self, credential: &str) -> SqliteResult<()> {
        let encrypted = self
            .encryption
            .encrypt(credential)
            .map_err(InvalidParameterName)?;
        self.set_app_meta(META_CREDENTIAL, &encrypted)
    }

    /// Credential, если он есть и расшифровывается текущим ключом
    pub fn load_credential(&self) -> SqliteResult<Option<String>> {
        let encrypted = match self.get_app_meta(META_CREDENTIAL)? {
            Some(v) if !v.is_empty() => v,
            _ => return Ok(None),
        };
        match self.encryption.decrypt(&encrypted) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                // Ключ сменился или запись повреждена - считаем, что входа не было
                warn!("[DB] Cached credential cannot be decrypted: {}", e);
                Ok(None)
            }
        }
    }

    pub fn save_document_id(&self, document_id: &str) -> SqliteResult<()> {
        self.set_app_meta(META_DOCUMENT_ID, document_id)
    }

    pub fn load_document_id(&self) -> SqliteResult<Option<String>> {
        Ok(self
            .get_app_meta(META_DOCUMENT_ID)?
            .filter(|id| !id.trim().is_empty()))
    }

    pub fn save_timer_session(&self, subject: &str, started_at_ms: i64) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO timer_session (id, subject, started_at_ms) VALUES (1, ?1, ?2)
     ON CONFLICT(id) DO UPDATE SET subject = ?1, started_at_ms = ?2",
            params![subject, started_at_ms],
        )
        .map_err(|e| {
            log_io_error_if_any("save_timer_session", &e);
            e
        })?;
        Ok(())
    }

    pub fn load_timer_session(&self) -> SqliteResult<Option<(String, i64)>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT subject, started_at_ms FROM timer_session WHERE id = 1")?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            return Ok(Some((row.get(0)?, row.get(1)?)));
        }
        Ok(None)
    }

    pub fn clear_timer_session(&self) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM timer_session", [])?;
        Ok(())
    }

    /// Забыть подключение (credential и id документа); сессия таймера остается
    pub fn clear_connection(&self) -> SqliteResult<()> {
        self.delete_app_meta(META_CREDENTIAL)?;
        self.delete_app_meta(META_DOCUMENT_ID)
    }

    /// Logout: удалить credential, id документа и запущенную сессию
    pub fn clear_user_data(&self) -> SqliteResult<()> {
        self.clear_connection()?;
        self.clear_timer_session()
    }
}
