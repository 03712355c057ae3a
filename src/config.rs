use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::llm::{ChatMode, ChatSettings};

/// Environment variable holding the API key when the config file has none
pub const API_KEY_ENV: &str = "ANYCHAT_API_KEY";

/// Environment variable overriding the anychat home directory
pub const HOME_ENV: &str = "ANYCHAT_HOME";

const CONFIG_FILE: &str = "config.toml";
const STORE_FILE: &str = "conversations.json";
const LOG_FILE: &str = "anychat.log";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bearer token for the AnythingLLM API
    pub api_key: Option<String>,

    /// Server root, e.g. http://localhost:3001
    pub base_url: String,

    /// Workspace that answers prompts
    pub workspace_slug: String,

    /// Default chat mode
    pub mode: ChatMode,

    /// Request timeout in seconds (0 disables the timeout)
    pub request_timeout_secs: u64,

    /// UI preferences
    pub ui: UiConfig,

    /// anychat home directory
    #[serde(skip)]
    pub anychat_home: PathBuf,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Delay between typed words, in milliseconds
    pub typing_delay_ms: u64,
    pub show_timestamps: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            typing_delay_ms: 20,
            show_timestamps: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: None,
            base_url: "http://localhost:3001".to_string(),
            workspace_slug: "my-workspace".to_string(),
            mode: ChatMode::Chat,
            request_timeout_secs: 120,
            ui: UiConfig::default(),
            anychat_home: default_home(),
        }
    }
}

/// `$ANYCHAT_HOME`, else `~/.anychat`
pub fn default_home() -> PathBuf {
    if let Ok(home) = std::env::var(HOME_ENV) {
        PathBuf::from(home)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".anychat")
    } else {
        PathBuf::from(".anychat")
    }
}

impl Config {
    /// Load configuration from the default home directory
    pub fn load() -> Result<Self> {
        Self::load_from(&default_home())
    }

    /// Load configuration from `home`, creating the directory if needed
    pub fn load_from(home: &Path) -> Result<Self> {
        fs::create_dir_all(home).context("Failed to create anychat home directory")?;

        let config_path = home.join(CONFIG_FILE);
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            toml::from_str(&content)
                .context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config.anychat_home = home.to_path_buf();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.anychat_home)
            .context("Failed to create anychat home directory")?;
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(self.config_path(), content)
            .context("Failed to write config file")?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.anychat_home.join(CONFIG_FILE)
    }

    /// Where conversations are persisted
    pub fn store_path(&self) -> PathBuf {
        self.anychat_home.join(STORE_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.anychat_home.join(LOG_FILE)
    }

    /// Get API key from config or environment
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
    }

    pub fn has_api_key(&self) -> bool {
        self.get_api_key().is_some()
    }

    /// Update API key
    pub fn set_api_key(&mut self, key: String) {
        self.api_key = Some(key);
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Request settings handed to the exchange on each turn
    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            base_url: self.base_url.clone(),
            api_key: self.get_api_key().unwrap_or_default(),
            workspace_slug: self.workspace_slug.clone(),
            mode: self.mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_from(temp.path()).unwrap();

        assert_eq!(config.base_url, "http://localhost:3001");
        assert_eq!(config.mode, ChatMode::Chat);
        assert_eq!(config.store_path(), temp.path().join("conversations.json"));
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn save_and_reload() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::load_from(temp.path()).unwrap();
        config.set_api_key("abc".to_string());
        config.workspace_slug = "research".to_string();
        config.mode = ChatMode::Query;
        config.save().unwrap();

        let reloaded = Config::load_from(temp.path()).unwrap();
        assert_eq!(reloaded.api_key.as_deref(), Some("abc"));
        assert_eq!(reloaded.workspace_slug, "research");
        assert_eq!(reloaded.mode, ChatMode::Query);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("config.toml"),
            "workspace_slug = \"notes\"\nrequest_timeout_secs = 0\n\n[ui]\ntyping_delay_ms = 0\n",
        )
        .unwrap();

        let config = Config::load_from(temp.path()).unwrap();
        assert_eq!(config.workspace_slug, "notes");
        assert_eq!(config.base_url, "http://localhost:3001");
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.ui.typing_delay_ms, 0);
        assert!(config.ui.show_timestamps);
    }

    #[test]
    fn chat_settings_carry_request_fields() {
        let mut config = Config::default();
        config.set_api_key("token".to_string());
        config.workspace_slug = "docs".to_string();

        let settings = config.chat_settings();
        assert_eq!(settings.api_key, "token");
        assert_eq!(settings.endpoint(), "http://localhost:3001/api/v1/workspace/docs/chat");
    }
}
