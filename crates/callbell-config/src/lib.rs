//! Station settings for the call-bell workspace.
//!
//! TOML settings file, `CALLBELL_` environment overrides, platform data
//! paths, credential resolution (env + keyring + plaintext), and
//! translation to `callbell_core::Configuration`.

mod keyring_store;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use callbell_core::config::{PLACEHOLDER_BASE_URL, PLACEHOLDER_FACILITY_ID};
use callbell_core::secrets::API_KEY_KEY;
use callbell_core::{Configuration, RetryPolicy};

pub use keyring_store::{KEYRING_SERVICE, KeyringSecretStore};

const DEVICE_ID_FILE: &str = "device_id";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API key configured")]
    NoCredentials,

    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("settings loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML settings structs ───────────────────────────────────────────

/// Top-level settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

/// How to reach the nurse-call backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_facility_id")]
    pub facility_id: String,

    /// Stable station identifier. Generated on first start when unset.
    pub device_id: Option<String>,

    pub room_number: Option<String>,

    /// Per-call timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// API key (plaintext -- prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            facility_id: default_facility_id(),
            device_id: None,
            room_number: None,
            timeout: default_timeout(),
            api_key: None,
            api_key_env: None,
        }
    }
}

fn default_base_url() -> String {
    PLACEHOLDER_BASE_URL.into()
}
fn default_facility_id() -> String {
    PLACEHOLDER_FACILITY_ID.into()
}
fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_delay() -> u64 {
    2
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Where the pending queue and audit log live. Platform data dir
    /// when unset.
    pub data_dir: Option<PathBuf>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "callbell", "callbell")
}

fn home_fallback(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.extend(parts);
    p
}

/// Resolve the settings file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".config", "callbell", "config.toml"]),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory holding the pending queue, audit log, and device id.
pub fn data_dir(settings: &Settings) -> PathBuf {
    if let Some(ref dir) = settings.storage.data_dir {
        return dir.clone();
    }
    project_dirs().map_or_else(
        || home_fallback(&[".local", "share", "callbell"]),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load settings from the canonical path + environment.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(&config_path())
}

/// Defaults, then the TOML file at `path` (if present), then
/// `CALLBELL_SECTION__KEY` environment variables.
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CALLBELL_").split("__"));

    let settings: Settings = figment.extract()?;
    Ok(settings)
}

/// Load settings, returning defaults if anything goes wrong.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_default()
}

// ── Saving ──────────────────────────────────────────────────────────

/// Serialize settings to TOML and write to the canonical path.
pub fn save_settings(settings: &Settings) -> Result<(), ConfigError> {
    save_settings_to(settings, &config_path())
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(settings)?;
    fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the API key: named env var, then system keyring, then the
/// plaintext setting.
pub fn resolve_api_key(settings: &Settings) -> Result<SecretString, ConfigError> {
    let connection = &settings.connection;

    // 1. api_key_env → env var lookup
    if let Some(ref env_name) = connection.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, API_KEY_KEY) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in settings
    if let Some(ref key) = connection.api_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials)
}

/// The configured device id, or the one persisted in `data_dir`, or a
/// freshly generated one that is persisted for next time.
pub fn resolve_device_id(settings: &Settings, data_dir: &Path) -> Result<String, ConfigError> {
    if let Some(ref id) = settings.connection.device_id {
        if !id.trim().is_empty() {
            return Ok(id.trim().to_owned());
        }
    }

    let path = data_dir.join(DEVICE_ID_FILE);
    if let Ok(existing) = fs::read_to_string(&path) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return Ok(existing.to_owned());
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    fs::create_dir_all(data_dir)?;
    fs::write(&path, &id)?;
    debug!(path = %path.display(), "generated station device id");
    Ok(id)
}

// ── Translation to core types ───────────────────────────────────────

/// Build a `Configuration` from settings, resolving the API key.
pub fn to_configuration(settings: &Settings, device_id: &str) -> Result<Configuration, ConfigError> {
    let connection = &settings.connection;

    let base_url: url::Url = connection
        .base_url
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "base_url".into(),
            reason: format!("invalid URL: {}", connection.base_url),
        })?;

    if connection.timeout == 0 {
        return Err(ConfigError::Validation {
            field: "timeout".into(),
            reason: "must be at least one second".into(),
        });
    }

    let api_key = resolve_api_key(settings)?;

    Ok(Configuration {
        base_url,
        api_key,
        device_id: device_id.to_owned(),
        facility_id: connection.facility_id.trim().to_owned(),
        room_number: connection.room_number.clone(),
        timeout: Duration::from_secs(connection.timeout),
    })
}

pub fn retry_policy(settings: &Settings) -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_secs(settings.retry.base_delay_secs),
        max_retries: settings.retry.max_retries,
    }
}
