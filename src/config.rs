//! Configuration module.
//!
//! Server settings come from environment variables with sensible defaults.
//! The endpoint list lives in a JSON file managed by [`EndpointRegistry`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db::Endpoint;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the query API (default: 8081)
    pub http_port: u16,
    /// Directory holding the check and incident logs (default: "data")
    pub data_dir: PathBuf,
    /// Endpoint configuration file (default: "config.json")
    pub config_path: PathBuf,
    /// Seconds between check cycles (default: 60)
    pub check_interval_secs: u64,
    /// Days of history kept on disk (default: 7)
    pub retention_days: u32,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8081,
            data_dir: PathBuf::from("data"),
            config_path: PathBuf::from("config.json"),
            check_interval_secs: 60,
            retention_days: 7,
            telegram_bot_token: None,
            telegram_chat_id: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPTIME_HTTP_PORT`: HTTP port (default: 8081)
    /// - `UPTIME_DATA_DIR`: data directory (default: "data")
    /// - `UPTIME_CONFIG`: endpoint config file (default: "config.json")
    /// - `UPTIME_CHECK_INTERVAL`: seconds between cycles (default: 60)
    /// - `UPTIME_RETENTION_DAYS`: days of history to keep (default: 7)
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`: alert destination
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = lookup("UPTIME_HTTP_PORT").and_then(|s| s.parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(dir) = lookup("UPTIME_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }

        if let Some(path) = lookup("UPTIME_CONFIG") {
            cfg.config_path = PathBuf::from(path);
        }

        if let Some(secs) = lookup("UPTIME_CHECK_INTERVAL").and_then(|s| s.parse::<u64>().ok()) {
            if secs > 0 {
                cfg.check_interval_secs = secs;
            }
        }

        if let Some(days) = lookup("UPTIME_RETENTION_DAYS").and_then(|s| s.parse::<u32>().ok()) {
            if days > 0 {
                cfg.retention_days = days;
            }
        }

        cfg.telegram_bot_token = lookup("TELEGRAM_BOT_TOKEN").filter(|s| !s.is_empty());
        cfg.telegram_chat_id = lookup("TELEGRAM_CHAT_ID").filter(|s| !s.is_empty());

        cfg
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Bot token and chat id, when both are set.
    pub fn telegram(&self) -> Option<(&str, &str)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) => Some((token.as_str(), chat.as_str())),
            _ => None,
        }
    }
}

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("endpoint already exists: {0}")]
    Duplicate(String),
    #[error("endpoint not found: {0}")]
    NotFound(String),
    #[error("invalid endpoint: {0}")]
    Invalid(String),
}

/// On-disk layout of the endpoint config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_interval_seconds: Option<u64>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            endpoints: vec![Endpoint {
                name: Some("httpbin-test".to_string()),
                ..Endpoint::new("https://httpbin.org/status/200")
            }],
            check_interval_seconds: Some(60),
        }
    }
}

/// Reject endpoints whose durations cannot work.
pub fn validate_endpoint(endpoint: &Endpoint) -> Result<(), ConfigError> {
    if endpoint.url.trim().is_empty() {
        return Err(ConfigError::Invalid("url is empty".to_string()));
    }
    if endpoint.timeout_ms == 0 {
        return Err(ConfigError::Invalid(format!("{}: timeout_ms must be positive", endpoint.url)));
    }
    if endpoint.degraded_threshold_ms == 0 {
        return Err(ConfigError::Invalid(format!(
            "{}: degraded_threshold_ms must be positive",
            endpoint.url
        )));
    }
    if endpoint.degraded_threshold_ms > endpoint.timeout_ms {
        tracing::warn!(
            "Endpoint {} has degraded threshold {}ms above its timeout {}ms",
            endpoint.url,
            endpoint.degraded_threshold_ms,
            endpoint.timeout_ms
        );
    }
    Ok(())
}

/// Current endpoint list, backed by the JSON config file.
pub struct EndpointRegistry {
    path: PathBuf,
    endpoints: RwLock<Vec<Endpoint>>,
}

impl EndpointRegistry {
    /// Load the registry, writing a default config file if none exists.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            tracing::info!("Config file {} not found, writing default", path.display());
            write_config_file(&path, &ConfigFile::default())?;
        }

        let endpoints = read_endpoints(&path)?;
        Ok(Self {
            path,
            endpoints: RwLock::new(endpoints),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current endpoint list.
    pub async fn snapshot(&self) -> Vec<Endpoint> {
        self.endpoints.read().await.clone()
    }

    pub async fn urls(&self) -> Vec<String> {
        self.endpoints.read().await.iter().map(|e| e.url.clone()).collect()
    }

    /// Re-read the config file. Returns the endpoint count.
    pub async fn reload(&self) -> Result<usize, ConfigError> {
        let fresh = read_endpoints(&self.path)?;
        let count = fresh.len();
        *self.endpoints.write().await = fresh;
        Ok(count)
    }

    /// Add an endpoint to the config file and reload.
    pub async fn add(&self, endpoint: Endpoint) -> Result<usize, ConfigError> {
        validate_endpoint(&endpoint)?;

        let mut guard = self.endpoints.write().await;
        let mut file = read_config_file(&self.path)?;
        if file.endpoints.iter().any(|e| e.url == endpoint.url) {
            return Err(ConfigError::Duplicate(endpoint.url));
        }

        tracing::info!("Adding endpoint {}", endpoint.url);
        file.endpoints.push(endpoint);
        write_config_file(&self.path, &file)?;

        *guard = file.endpoints;
        Ok(guard.len())
    }

    /// Remove an endpoint from the config file and reload.
    pub async fn remove(&self, url: &str) -> Result<usize, ConfigError> {
        let mut guard = self.endpoints.write().await;
        let mut file = read_config_file(&self.path)?;

        let before = file.endpoints.len();
        file.endpoints.retain(|e| e.url != url);
        if file.endpoints.len() == before {
            return Err(ConfigError::NotFound(url.to_string()));
        }

        tracing::info!("Removing endpoint {}", url);
        write_config_file(&self.path, &file)?;

        *guard = file.endpoints;
        Ok(guard.len())
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

fn read_endpoints(path: &Path) -> Result<Vec<Endpoint>, ConfigError> {
    let file = read_config_file(path)?;
    {
        let mut seen = HashSet::new();
        for endpoint in &file.endpoints {
            validate_endpoint(endpoint)?;
            if !seen.insert(endpoint.url.as_str()) {
                return Err(ConfigError::Duplicate(endpoint.url.clone()));
            }
        }
    }
    Ok(file.endpoints)
}

fn write_config_file(path: &Path, file: &ConfigFile) -> Result<(), ConfigError> {
    let io_err = |e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    // Write then rename so readers never see a half-written file.
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(file)?).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8081);
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.check_interval(), Duration::from_secs(60));
        assert!(cfg.telegram().is_none());
    }

    #[test]
    fn test_config_from_env_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("UPTIME_HTTP_PORT", "9000"),
            ("UPTIME_DATA_DIR", "/var/lib/uptime"),
            ("UPTIME_CHECK_INTERVAL", "0"),
            ("UPTIME_RETENTION_DAYS", "3"),
            ("TELEGRAM_BOT_TOKEN", "tok"),
            ("TELEGRAM_CHAT_ID", "42"),
        ]);
        let cfg = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.http_port, 9000);
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/uptime"));
        assert_eq!(cfg.check_interval_secs, 60);
        assert_eq!(cfg.retention_days, 3);
        assert_eq!(cfg.telegram(), Some(("tok", "42")));
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint(&Endpoint::new("https://a.example")).is_ok());

        let zero_timeout = Endpoint {
            timeout_ms: 0,
            ..Endpoint::new("https://a.example")
        };
        assert!(matches!(validate_endpoint(&zero_timeout), Err(ConfigError::Invalid(_))));

        // Misconfigured but accepted.
        let inverted = Endpoint {
            timeout_ms: 1000,
            degraded_threshold_ms: 5000,
            ..Endpoint::new("https://a.example")
        };
        assert!(validate_endpoint(&inverted).is_ok());
    }

    #[tokio::test]
    async fn test_registry_writes_default_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let registry = EndpointRegistry::load(&path).unwrap();
        assert!(path.exists());

        let endpoints = registry.snapshot().await;
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].display_name(), "httpbin-test");
    }

    #[tokio::test]
    async fn test_registry_add_remove_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"endpoints": [{"url": "https://a.example", "timeout_ms": 5000}]}"#,
        )
        .unwrap();

        let registry = EndpointRegistry::load(&path).unwrap();
        assert_eq!(registry.snapshot().await[0].timeout_ms, 5000);

        assert_eq!(registry.add(Endpoint::new("https://b.example")).await.unwrap(), 2);
        assert!(matches!(
            registry.add(Endpoint::new("https://b.example")).await,
            Err(ConfigError::Duplicate(_))
        ));

        assert_eq!(registry.remove("https://a.example").await.unwrap(), 1);
        assert!(matches!(
            registry.remove("https://a.example").await,
            Err(ConfigError::NotFound(_))
        ));

        // The file is the source of truth.
        let reloaded = EndpointRegistry::load(&path).unwrap();
        assert_eq!(reloaded.urls().await, vec!["https://b.example".to_string()]);
        assert_eq!(registry.reload().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_registry_rejects_duplicate_urls_in_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let duplicated = r#"{"endpoints": [
            {"url": "https://a.example"},
            {"url": "https://b.example"},
            {"url": "https://a.example", "timeout_ms": 2000}
        ]}"#;
        std::fs::write(&path, duplicated).unwrap();

        match EndpointRegistry::load(&path) {
            Err(ConfigError::Duplicate(url)) => assert_eq!(url, "https://a.example"),
            other => panic!("expected duplicate error, got {:?}", other.map(|_| ())),
        }

        std::fs::write(&path, r#"{"endpoints": [{"url": "https://a.example"}]}"#).unwrap();
        let registry = EndpointRegistry::load(&path).unwrap();

        // A bad edit on disk leaves the current list untouched.
        std::fs::write(&path, duplicated).unwrap();
        assert!(matches!(registry.reload().await, Err(ConfigError::Duplicate(_))));
        assert_eq!(registry.urls().await, vec!["https://a.example".to_string()]);
    }

    #[test]
    fn test_registry_rejects_bad_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(EndpointRegistry::load(&path), Err(ConfigError::Parse(_))));
    }
}
