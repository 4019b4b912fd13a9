use crate::error::{AppError, Result};
use crate::provider::ProviderType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "bucket-navigator";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// The persisted configuration record, written wholesale on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub project_id: String,
    pub credentials_file: String,
    #[serde(default)]
    pub theme: Theme,
}

/// The part of the configuration the core actually depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub project_id: String,
    pub credentials_file: PathBuf,
}

impl AppConfig {
    pub fn validated(&self) -> Result<ValidatedConfig> {
        if self.project_id.trim().is_empty() {
            return Err(AppError::Configuration("Project ID is not set".into()));
        }
        if self.credentials_file.trim().is_empty() {
            return Err(AppError::Configuration(
                "Credentials file is not set".into(),
            ));
        }
        Ok(ValidatedConfig {
            project_id: self.project_id.clone(),
            credentials_file: PathBuf::from(&self.credentials_file),
        })
    }
}

/// Loads and saves the single configuration document.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store at the platform config directory.
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            AppError::Configuration("Could not determine config directory".to_string())
        })?;
        Ok(Self::at(config_dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME)))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `Ok(None)` when nothing has been saved yet. A document of any
    /// other shape is a configuration error.
    pub fn load(&self) -> Result<Option<AppConfig>> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::Configuration(format!(
                    "Failed to read config: {}",
                    e
                )))
            }
        };

        let config: AppConfig = serde_json::from_str(&json)
            .map_err(|e| AppError::Configuration(format!("Failed to parse config: {}", e)))?;
        Ok(Some(config))
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Configuration(format!("Failed to create config directory: {}", e))
            })?;
        }
        let json = serde_json::to_string(config)?;
        std::fs::write(&self.path, json)
            .map_err(|e| AppError::Configuration(format!("Failed to write config: {}", e)))?;
        log::info!("Configuration saved to {:?}", self.path);
        Ok(())
    }
}

/// Contents of the credentials file the configuration points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Credentials {
    #[serde(default)]
    pub provider: ProviderType,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub region: Option<String>,
}

impl S3Credentials {
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("Cannot read credentials file {:?}: {}", path, e))
        })?;
        let creds: S3Credentials = serde_json::from_str(&json).map_err(|e| {
            AppError::Configuration(format!("Failed to parse credentials file: {}", e))
        })?;
        if creds.access_key_id.is_empty() || creds.secret_access_key.is_empty() {
            return Err(AppError::Configuration(
                "Credentials file is missing access keys".into(),
            ));
        }
        Ok(creds)
    }

    /// Explicit endpoint, else the provider default, else empty (SDK default).
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .or(self.provider.default_endpoint())
            .unwrap_or("")
    }
}
