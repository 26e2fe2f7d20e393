//! Configuration management with layered hierarchy
//!
//! Layers, lowest to highest priority: built-in defaults, the global user config
//! (`~/.config/mastoc/config.yaml`), an explicit `--config` file, then `MASTOC_*`
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::remote::{
    BackendKind, BackendRouter, LegacyService, ManagedService, RemoteError, RemoteSource,
};

pub const DEFAULT_LEGACY_URL: &str = "https://www.sostokt.com";
pub const DEFAULT_MANAGED_URL: &str = "https://mastoc-production.up.railway.app";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SOCIAL_DELAY_MS: u64 = 1000;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("Cannot read config file {path}")]
    #[diagnostic(code(mastoc::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    #[diagnostic(code(mastoc::config::parse))]
    Parse { path: PathBuf, message: String },

    #[error("The legacy source needs a gym id")]
    #[diagnostic(
        code(mastoc::config::missing_gym),
        help("set `gym_id` in config.yaml or MASTOC_GYM_ID")
    )]
    MissingGymId,

    #[error("Invalid value {value:?} for {key}")]
    #[diagnostic(code(mastoc::config::invalid_value))]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Remote(#[from] RemoteError),
}

/// Settings for the legacy service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LegacySettings {
    pub url: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Settings for the managed service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManagedSettings {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// mastoc configuration with layered hierarchy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Active remote source
    pub source: Option<BackendKind>,

    /// Retry failed reads on the other source
    pub fallback: Option<bool>,

    /// HTTP timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Gym whose walls the legacy service lists
    pub gym_id: Option<String>,

    /// Restrict syncs to a single face
    pub face_id: Option<String>,

    /// Directory holding the per-source databases
    pub data_dir: Option<PathBuf>,

    /// Pause between remote calls during a social refresh
    pub social_refresh_delay_ms: Option<u64>,

    pub legacy: LegacySettings,

    pub managed: ManagedSettings,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config; unreadable files are ignored
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                match Self::from_file(&global_path) {
                    Ok(global) => config.merge(global),
                    Err(err) => tracing::warn!(error = %err, "ignoring global config"),
                }
            }
        }

        // 3. Explicit config file
        if let Some(path) = config_file {
            config.merge(Self::from_file(path)?);
        }

        // 4. Environment variables
        config.apply_env(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yml::from_str::<Config>(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "mastoc")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Overlay `MASTOC_*` variables read through `lookup`
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(source) = var("MASTOC_SOURCE") {
            self.source = Some(
                <BackendKind as clap::ValueEnum>::from_str(&source, true).map_err(|_| {
                    ConfigError::InvalidValue {
                        key: "MASTOC_SOURCE".to_string(),
                        value: source.clone(),
                    }
                })?,
            );
        }
        if let Some(url) = var("MASTOC_LEGACY_URL") {
            self.legacy.url = Some(url);
        }
        if let Some(token) = var("MASTOC_LEGACY_TOKEN") {
            self.legacy.token = Some(token);
        }
        if let Some(username) = var("MASTOC_LEGACY_USERNAME") {
            self.legacy.username = Some(username);
        }
        if let Some(password) = var("MASTOC_LEGACY_PASSWORD") {
            self.legacy.password = Some(password);
        }
        if let Some(url) = var("MASTOC_MANAGED_URL") {
            self.managed.url = Some(url);
        }
        if let Some(api_key) = var("MASTOC_API_KEY") {
            self.managed.api_key = Some(api_key);
        }
        if let Some(gym_id) = var("MASTOC_GYM_ID") {
            self.gym_id = Some(gym_id);
        }
        if let Some(face_id) = var("MASTOC_FACE_ID") {
            self.face_id = Some(face_id);
        }
        if let Some(data_dir) = var("MASTOC_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(data_dir));
        }
        Ok(())
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.source.is_some() {
            self.source = other.source;
        }
        if other.fallback.is_some() {
            self.fallback = other.fallback;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.gym_id.is_some() {
            self.gym_id = other.gym_id;
        }
        if other.face_id.is_some() {
            self.face_id = other.face_id;
        }
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if other.social_refresh_delay_ms.is_some() {
            self.social_refresh_delay_ms = other.social_refresh_delay_ms;
        }

        let legacy = other.legacy;
        if legacy.url.is_some() {
            self.legacy.url = legacy.url;
        }
        if legacy.token.is_some() {
            self.legacy.token = legacy.token;
        }
        if legacy.username.is_some() {
            self.legacy.username = legacy.username;
        }
        if legacy.password.is_some() {
            self.legacy.password = legacy.password;
        }

        let managed = other.managed;
        if managed.url.is_some() {
            self.managed.url = managed.url;
        }
        if managed.api_key.is_some() {
            self.managed.api_key = managed.api_key;
        }
        if managed.username.is_some() {
            self.managed.username = managed.username;
        }
        if managed.password.is_some() {
            self.managed.password = managed.password;
        }
    }

    pub fn source(&self) -> BackendKind {
        self.source.unwrap_or_default()
    }

    pub fn fallback(&self) -> bool {
        self.fallback.unwrap_or(false)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn social_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.social_refresh_delay_ms.unwrap_or(DEFAULT_SOCIAL_DELAY_MS))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| {
                directories::ProjectDirs::from("", "", "mastoc")
                    .map(|dirs| dirs.data_dir().to_path_buf())
            })
            .unwrap_or_else(|| PathBuf::from(".mastoc"))
    }

    /// Each source keeps its own database
    pub fn store_path(&self, kind: BackendKind) -> PathBuf {
        self.data_dir().join(format!("{}.db", kind))
    }

    /// Where `mastoc login` keeps the session token of a source
    pub fn session_token_path(&self, kind: BackendKind) -> PathBuf {
        self.data_dir().join(format!("{}.token", kind))
    }

    fn session_token(&self, kind: BackendKind) -> Option<String> {
        std::fs::read_to_string(self.session_token_path(kind))
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Whether any credential is configured for `kind`
    pub fn has_credentials(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Legacy => {
                self.legacy.token.is_some()
                    || self.legacy.username.is_some()
                    || self.session_token(kind).is_some()
            }
            BackendKind::Managed => {
                self.managed.api_key.is_some()
                    || self.managed.username.is_some()
                    || self.session_token(kind).is_some()
            }
        }
    }

    /// Build an unauthenticated-or-token-authenticated client for `kind`
    pub fn build_source(&self, kind: BackendKind) -> Result<Box<dyn RemoteSource>, ConfigError> {
        match kind {
            BackendKind::Legacy => {
                let gym_id = self.gym_id.as_deref().ok_or(ConfigError::MissingGymId)?;
                let url = self.legacy.url.as_deref().unwrap_or(DEFAULT_LEGACY_URL);
                let token = self.legacy.token.clone().or_else(|| self.session_token(kind));
                Ok(Box::new(
                    LegacyService::new(url, gym_id, self.timeout())?.with_token(token),
                ))
            }
            BackendKind::Managed => {
                let url = self.managed.url.as_deref().unwrap_or(DEFAULT_MANAGED_URL);
                let mut service =
                    ManagedService::new(url, self.timeout())?.with_api_key(self.managed.api_key.clone());
                if !service.is_authenticated() {
                    if let Some(token) = self.session_token(kind) {
                        service.authenticate(&crate::remote::Credentials::Token(token))?;
                    }
                }
                Ok(Box::new(service))
            }
        }
    }

    /// Router with the configured source as primary and, when credentials exist
    /// for it, the other source as secondary
    pub fn build_router(&self) -> Result<BackendRouter, ConfigError> {
        let primary_kind = self.source();
        let mut router = BackendRouter::new(self.build_source(primary_kind)?);

        let other = match primary_kind {
            BackendKind::Legacy => BackendKind::Managed,
            BackendKind::Managed => BackendKind::Legacy,
        };
        if self.has_credentials(other) {
            match self.build_source(other) {
                Ok(secondary) => router = router.with_secondary(secondary, self.fallback()),
                Err(err) => tracing::debug!(source = %other, error = %err, "no secondary source"),
            }
        }

        Ok(router)
    }
}
