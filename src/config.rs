use crate::network::StoreConfig;
use crate::sync::SyncConfig;
use std::env;
use std::path::PathBuf;

pub const APP_DIR_NAME: &str = "hygge-study";

/// Runtime configuration. Defaults, then environment, then CLI flags.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Holds the SQLite cache and the key file
    pub data_dir: PathBuf,
    pub store: StoreConfig,
    pub sync: SyncConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let data_dir = match env::var("HYGGE_DATA_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_data_dir()?,
        };

        let mut store = StoreConfig::default();
        if let Ok(url) = env::var("HYGGE_API_URL") {
            if !url.is_empty() {
                store.api_base_url = url;
            }
        }
        if let Some(secs) = env::var("HYGGE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
        {
            store.http_timeout_secs = secs;
        }

        let sync = SyncConfig {
            // Таймаут операции чуть больше HTTP-таймаута, чтобы сработал первым reqwest
            op_timeout_secs: store.http_timeout_secs + 15,
        };

        Ok(Self {
            data_dir,
            store,
            sync,
        })
    }

    pub fn with_data_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.data_dir = dir;
        }
        self
    }

    pub fn with_api_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.is_empty()) {
            self.store.api_base_url = url;
        }
        self
    }
}

/// `$XDG_STATE_HOME/hygge-study`, `$HOME/.local/state/hygge-study` or `%APPDATA%\hygge-study`
pub fn default_data_dir() -> Result<PathBuf, String> {
    #[cfg(windows)]
    {
        let mut path = env::var("APPDATA")
            .map(PathBuf::from)
            .map_err(|_| "APPDATA is not set".to_string())?;
        path.push(APP_DIR_NAME);
        Ok(path)
    }
    #[cfg(not(windows))]
    {
        let mut path = env::var("XDG_STATE_HOME")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME").ok().map(|home| {
                    let mut path = PathBuf::from(home);
                    path.push(".local/state");
                    path
                })
            })
            .ok_or_else(|| "Couldn't find neither XDG_STATE_HOME nor HOME".to_string())?;
        path.push(APP_DIR_NAME);
        Ok(path)
    }
}
