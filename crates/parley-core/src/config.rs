use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};

/// Top-level configuration for the Parley relay.
///
/// Loaded from `~/.parley/config.toml` by default. Each section corresponds
/// to a bounded context or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ParleyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// API server port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.parley/data".to_string(),
            log_level: "info".to_string(),
            port: 5001,
        }
    }
}

/// Which webhook base path the workflow engine call targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookMode {
    /// n8n test-mode webhook path.
    Test,
    /// n8n activated-workflow webhook path (default).
    #[default]
    Production,
}

/// Workflow-engine webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Which base URL to call.
    pub mode: WebhookMode,
    /// Webhook URL used in test mode.
    pub url_test: String,
    /// Webhook URL used in production mode.
    pub url_production: String,
    /// Request timeout in seconds. The webhook call fails rather than hangs.
    pub timeout_secs: u64,
}

impl WebhookConfig {
    /// The URL selected by the configured mode.
    pub fn url(&self) -> &str {
        match self.mode {
            WebhookMode::Test => &self.url_test,
            WebhookMode::Production => &self.url_production,
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            mode: WebhookMode::Production,
            url_test: "http://n8n:5678/webhook-test/returning-user".to_string(),
            url_production: "http://n8n:5678/webhook/returning-user".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Chat relay behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum inbound message length in characters.
    pub max_message_length: usize,
    /// Reject new messages appended to a session whose end timestamp is set.
    pub reject_after_end: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: 2000,
            reject_after_end: false,
        }
    }
}
