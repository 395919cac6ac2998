//! Server settings
//!
//! Read from a JSON file (missing file = defaults), then overridden by
//! environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Environment variable naming the settings file
pub const SETTINGS_ENV: &str = "GRAVITY_GARDEN_SETTINGS";
/// Settings file used when the variable is unset
pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Where the session snapshot lives (None disables persistence)
    pub snapshot_path: Option<PathBuf>,
    /// Score freshly generated puzzles in the background
    pub solver_enabled: bool,
    /// Difficulty of the very first puzzle
    pub start_difficulty: u32,
    /// Chat messages longer than this are dropped
    pub max_chat_len: usize,
    /// Fixed seed for the puzzle seed sequence (random when None)
    pub seed: Option<u64>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            snapshot_path: Some(PathBuf::from("gravity-garden.json")),
            solver_enabled: true,
            start_difficulty: 1,
            max_chat_len: 500,
            seed: None,
        }
    }
}

impl ServerSettings {
    /// Load settings from the file named by `GRAVITY_GARDEN_SETTINGS`
    /// (or `settings.json`), then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var(SETTINGS_ENV).unwrap_or_else(|_| DEFAULT_SETTINGS_FILE.into());
        let mut settings = Self::from_file(&path)?;
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Parse a settings file; a missing file yields defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => {
                let settings = serde_json::from_str(&json).map_err(|e| {
                    ServerError::Settings(format!("{}: {}", path.display(), e))
                })?;
                log::info!("Loaded settings from {}", path.display());
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No settings file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply `HOST`, `PORT` and `SNAPSHOT_PATH` overrides
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = var("HOST") {
            self.host = host;
        }
        if let Some(port) = var("PORT") {
            self.port = port
                .parse()
                .map_err(|_| ServerError::Settings(format!("invalid PORT: {port}")))?;
        }
        if let Some(path) = var("SNAPSHOT_PATH") {
            self.snapshot_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: ServerSettings = serde_json::from_str(r#"{"port": 4010}"#).unwrap();
        assert_eq!(settings.port, 4010);
        assert_eq!(settings.host, "0.0.0.0");
        assert!(settings.solver_enabled);
    }

    #[test]
    fn test_missing_file_is_default() {
        let settings = ServerSettings::from_file("/nonexistent/gravity-garden/settings.json").unwrap();
        assert_eq!(settings, ServerSettings::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = ServerSettings::default();
        settings
            .apply_env(|key| match key {
                "PORT" => Some("8080".into()),
                "SNAPSHOT_PATH" => Some(String::new()),
                _ => None,
            })
            .unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.snapshot_path, None);
        assert_eq!(settings.address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_bad_port_rejected() {
        let mut settings = ServerSettings::default();
        let result = settings.apply_env(|key| (key == "PORT").then(|| "ninety".to_string()));
        assert!(matches!(result, Err(ServerError::Settings(_))));
    }
}
