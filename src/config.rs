//! Configuration loading for AgentMesh.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::memory::DEFAULT_CAPACITY;

/// Get the AgentMesh home directory (~/.agentmesh).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".agentmesh"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.agentmesh/settings.json
pub fn load_settings() -> Result<Settings> {
    let path = get_settings_path()?;
    let mut settings = load_settings_from(&path)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    validate_settings(&settings)?;
    Ok(settings)
}

/// Parse a settings file without environment overrides.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// `FLIGHT_API_*` and `HOTEL_API_*` variables take precedence over the file.
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("FLIGHT_API_URL").filter(|v| !v.is_empty()) {
        settings.flight.api_url = url;
    }
    if let Some(key) = lookup("FLIGHT_API_KEY").filter(|v| !v.is_empty()) {
        settings.flight.api_key = Some(key);
    }
    if let Some(url) = lookup("HOTEL_API_URL").filter(|v| !v.is_empty()) {
        settings.hotel.api_url = url;
    }
    if let Some(key) = lookup("HOTEL_API_KEY").filter(|v| !v.is_empty()) {
        settings.hotel.api_key = Some(key);
    }
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.memory.capacity == 0 {
        return Err(Error::Config("memory.capacity must be at least 1".to_string()));
    }
    if settings.coordinator.memory_capacity == 0 {
        return Err(Error::Config(
            "coordinator.memory_capacity must be at least 1".to_string(),
        ));
    }
    if settings.flight.timeout_seconds == 0 {
        return Err(Error::Config("flight.timeout_seconds must be positive".to_string()));
    }
    if settings.hotel.timeout_seconds == 0 {
        return Err(Error::Config("hotel.timeout_seconds must be positive".to_string()));
    }
    if settings.coordinator.response_timeout_seconds == 0 {
        return Err(Error::Config(
            "coordinator.response_timeout_seconds must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Load settings or return default if not found.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        let mut settings = Settings::default();
        apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
        settings
    })
}

/// Conversation memory configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MemorySettings {
    #[serde(default = "default_memory_capacity")]
    pub capacity: usize,
}

fn default_memory_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            capacity: default_memory_capacity(),
        }
    }
}

/// Flight search backend configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FlightSettings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_api_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_api_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_api_timeout_seconds() -> u64 {
    25
}

impl Default for FlightSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            timeout_seconds: default_api_timeout_seconds(),
        }
    }
}

/// Hotel search backend configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HotelSettings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_api_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for HotelSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            timeout_seconds: default_api_timeout_seconds(),
        }
    }
}

/// Trip coordinator configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CoordinatorSettings {
    #[serde(default = "default_response_timeout_seconds")]
    pub response_timeout_seconds: u64,
    #[serde(default = "default_origin")]
    pub default_origin: String,
    #[serde(default = "default_coordinator_memory_capacity")]
    pub memory_capacity: usize,
}

fn default_response_timeout_seconds() -> u64 {
    30
}

fn default_origin() -> String {
    "NYC".to_string()
}

fn default_coordinator_memory_capacity() -> usize {
    15
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            response_timeout_seconds: default_response_timeout_seconds(),
            default_origin: default_origin(),
            memory_capacity: default_coordinator_memory_capacity(),
        }
    }
}

/// AgentMesh settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub memory: MemorySettings,

    #[serde(default)]
    pub flight: FlightSettings,

    #[serde(default)]
    pub hotel: HotelSettings,

    #[serde(default)]
    pub coordinator: CoordinatorSettings,
}
