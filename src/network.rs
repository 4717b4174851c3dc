//! HTTP access to the remote document store (gist-style API).
//! One resource per user, addressed by an opaque id, holding the ledger as a named text file.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Ошибки транспорта хранилища документа
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// 401/403: credential rejected
    Unauthorized,
    /// 404: the document id is stale or was deleted
    NotFound,
    Network(String),
    Http { status: u16, message: String },
    /// Response arrived but is not the expected shape
    Malformed(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unauthorized => write!(f, "Unauthorized"),
            StoreError::NotFound => write!(f, "Document not found"),
            StoreError::Network(s) => write!(f, "Network: {}", s),
            StoreError::Http { status, message } => write!(f, "HTTP {}: {}", status, message),
            StoreError::Malformed(s) => write!(f, "Malformed response: {}", s),
        }
    }
}

impl std::error::Error for StoreError {}

/// Удаленное хранилище одного JSON-документа
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Serialized ledger text of the document.
    /// `None` when the document exists but holds no ledger yet.
    async fn fetch(
        &self,
        credential: &str,
        document_id: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Replace the whole serialized ledger
    async fn overwrite(
        &self,
        credential: &str,
        document_id: &str,
        content: &str,
    ) -> Result<(), StoreError>;

    /// Create a new document seeded with `content`, returning its id
    async fn create(&self, credential: &str, content: &str) -> Result<String, StoreError>;
}

/// Конфигурация HTTP-хранилища
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub api_base_url: String,
    /// Name of the file inside the document that holds the ledger
    pub file_name: String,
    pub http_timeout_secs: u64,
    /// Sent as User-Agent (the API rejects requests without one)
    pub user_agent: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            file_name: "hygge_study.json".to_string(),
            http_timeout_secs: 30,
            user_agent: format!("hygge-study/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Deserialize)]
struct GistFile {
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    raw_url: Option<String>,
}

#[derive(Deserialize)]
struct GistResponse {
    id: Option<String>,
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

pub struct GistStore {
    client: Client,
    config: StoreConfig,
}

impl GistStore {
    pub fn new(config: StoreConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    fn document_url(&self, document_id: &str) -> String {
        format!(
            "{}/gists/{}",
            self.config.api_base_url.trim_end_matches('/'),
            document_id
        )
    }

    fn authorized(&self, builder: RequestBuilder, credential: &str) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", credential))
            .header("Accept", "application/vnd.github+json")
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_to_error(status, body))
    }
}

pub(crate) fn status_to_error(status: StatusCode, body: String) -> StoreError {
    match status.as_u16() {
        401 | 403 => StoreError::Unauthorized,
        404 => StoreError::NotFound,
        code => {
            let message = if body.is_empty() {
                status.canonical_reason().unwrap_or("Unknown").into()
            } else {
                body
            };
            StoreError::Http {
                status: code,
                message,
            }
        }
    }
}

/// Тело PATCH/POST: `{ "files": { name: { "content": ... } } }`
pub(crate) fn files_payload(file_name: &str, content: &str) -> serde_json::Value {
    serde_json::json!({
        "files": {
            file_name: { "content": content }
        }
    })
}

#[async_trait]
impl DocumentStore for GistStore {
    async fn fetch(
        &self,
        credential: &str,
        document_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let url = self.document_url(document_id);
        debug!("[STORE] GET {}", url);
        let response = self
            .send(self.authorized(self.client.get(&url), credential))
            .await?;
        let gist: GistResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        // Документ без нашего файла (чужой gist или удаленный файл) - начинаем с нуля,
        // следующий PATCH добавит файл
        let file = match gist.files.get(&self.config.file_name) {
            Some(file) => file,
            None => {
                warn!(
                    "[STORE] Document {} has no file {}",
                    document_id, self.config.file_name
                );
                return Ok(None);
            }
        };

        if file.truncated {
            if let Some(raw_url) = &file.raw_url {
                debug!("[STORE] Content truncated, fetching raw {}", raw_url);
                let raw = self
                    .send(self.authorized(self.client.get(raw_url), credential))
                    .await?;
                return raw
                    .text()
                    .await
                    .map(Some)
                    .map_err(|e| StoreError::Network(e.to_string()));
            }
        }

        if file.content.is_none() {
            warn!(
                "[STORE] File {} in document {} has no content",
                self.config.file_name, document_id
            );
        }
        Ok(file.content.clone())
    }

    async fn overwrite(
        &self,
        credential: &str,
        document_id: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let url = self.document_url(document_id);
        debug!("[STORE] PATCH {} ({} bytes)", url, content.len());
        self.send(
            self.authorized(self.client.patch(&url), credential)
                .json(&files_payload(&self.config.file_name, content)),
        )
        .await?;
        Ok(())
    }

    async fn create(&self, credential: &str, content: &str) -> Result<String, StoreError> {
        let url = format!("{}/gists", self.config.api_base_url.trim_end_matches('/'));
        let mut body = files_payload(&self.config.file_name, content);
        body["description"] = serde_json::json!("Hygge Study data");
        body["public"] = serde_json::json!(false);

        debug!("[STORE] POST {}", url);
        let response = self
            .send(self.authorized(self.client.post(&url), credential).json(&body))
            .await?;
        let gist: GistResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        gist.id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::Malformed("create response has no id".into()))
    }
}
