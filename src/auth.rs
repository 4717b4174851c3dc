use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use std::path::Path;
use std::sync::Arc;

/// Хранит credential (bearer-строку) для запросов к хранилищу документа.
/// Сам credential получается вне приложения; здесь он только предъявляется.
#[derive(Clone, Default)]
pub struct AuthManager {
    credential: Arc<tokio::sync::RwLock<Option<String>>>,
}

impl AuthManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Установить или сбросить credential (пустая строка = сброс)
    pub async fn set_credential(&self, credential: Option<String>) {
        *self.credential.write().await = credential.filter(|c| !c.trim().is_empty());
    }

    /// Получить credential
    pub async fn get_credential(&self) -> Result<String, String> {
        self.credential
            .read()
            .await
            .clone()
            .ok_or_else(|| "Credential not set. Run login first.".to_string())
    }

    pub async fn has_credential(&self) -> bool {
        self.credential.read().await.is_some()
    }
}

// ============================================
// CREDENTIAL ENCRYPTION
// ============================================

/// Key file created next to the database when no key is supplied via the environment
pub const KEY_FILE_NAME: &str = "cache.key";
pub const KEY_ENV_VAR: &str = "HYGGE_ENCRYPTION_KEY";

/// Шифрование credential перед сохранением в SQLite (AES-256-GCM)
pub struct TokenEncryption {
    cipher: Aes256Gcm,
}

impl TokenEncryption {
    /// Ключ: hex из HYGGE_ENCRYPTION_KEY, иначе файл ключа в каталоге данных
    /// (создается при первом запуске), иначе одноразовый ключ в памяти.
    pub fn new(key_dir: Option<&Path>) -> Result<Self, String> {
        let key = match std::env::var(KEY_ENV_VAR).ok().filter(|k| !k.is_empty()) {
            Some(hex_key) => {
                hex::decode(hex_key.trim()).map_err(|e| format!("{} is not hex: {}", KEY_ENV_VAR, e))?
            }
            None => match key_dir {
                Some(dir) if !dir.as_os_str().is_empty() => load_or_create_key_file(dir)?,
                _ => random_key().to_vec(),
            },
        };

        Self::from_key(&key)
    }

    pub fn from_key(key: &[u8]) -> Result<Self, String> {
        let key_array: [u8; 32] = key
            .try_into()
            .map_err(|_| "Encryption key must be 32 bytes".to_string())?;
        let cipher = Aes256Gcm::new(&key_array.into());
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, token: &str) -> Result<String, String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, token.as_bytes())
            .map_err(|e| format!("Encryption failed: {}", e))?;

        // nonce + ciphertext, base64 для хранения в SQLite
        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);

        use base64::{engine::general_purpose, Engine as _};
        Ok(general_purpose::STANDARD.encode(&result))
    }

    pub fn decrypt(&self, encrypted: &str) -> Result<String, String> {
        use base64::{engine::general_purpose, Engine as _};
        let data = general_purpose::STANDARD
            .decode(encrypted)
            .map_err(|e| format!("Base64 decode failed: {}", e))?;

        if data.len() < 12 {
            return Err("Invalid encrypted data length".to_string());
        }

        // Первые 12 байт - nonce, остальное - ciphertext
        let nonce = Nonce::from_slice(&data[..12]);
        let ciphertext = &data[12..];

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| format!("Decryption failed: {}", e))?;

        String::from_utf8(plaintext).map_err(|e| format!("UTF-8 decode failed: {}", e))
    }
}

fn random_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

fn load_or_create_key_file(dir: &Path) -> Result<Vec<u8>, String> {
    let path = dir.join(KEY_FILE_NAME);
    match std::fs::read_to_string(&path) {
        Ok(contents) => hex::decode(contents.trim())
            .map_err(|e| format!("Key file {} is corrupt: {}", path.display(), e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let key = random_key();
            std::fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
            std::fs::write(&path, hex::encode(key))
                .map_err(|e| format!("Failed to write key file {}: {}", path.display(), e))?;
            restrict_permissions(&path);
            Ok(key.to_vec())
        }
        Err(e) => Err(format!("Failed to read key file {}: {}", path.display(), e)),
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        tracing::warn!("[AUTH] Failed to restrict key file permissions: {}", e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
