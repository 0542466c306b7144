//! Configuration loading and types for pushtype
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/pushtype/config.toml)
//! 3. Environment variables (PUSHTYPE_*)
//! 4. CLI arguments (highest priority)
//!
//! The Azure API key is deliberately absent from this file; see the
//! secret module.

use crate::error::PushtypeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Pushtype Configuration
#
# Location: ~/.config/pushtype/config.toml
# All settings can be overridden via CLI flags
#
# The Azure API key does NOT live here. Set it with `pushtype set-key`
# or the PUSHTYPE_API_KEY environment variable.

# Push-to-talk combo: optional Ctrl/Alt/Shift modifiers plus one key,
# joined with '+'. The modifier state must match exactly; holding an
# extra modifier blocks the match.
# Examples: "F8", "Ctrl+Alt+Space", "Ctrl+Shift+F12"
hotkey = "Ctrl+Alt+Space"

# State file for external integrations (Waybar, polybar, etc.)
# "auto" for $XDG_RUNTIME_DIR/pushtype/state, a custom path, or
# "disabled" to turn off. The daemon writes the current state
# ("idle", "recording", "transcribing") whenever it changes.
state_file = "auto"

[audio]
# Audio input device ("default" uses system default)
# List devices with: pactl list sources short
device = "default"

# Maximum recording duration in seconds (safety limit)
max_duration_secs = 120

[audio.feedback]
# Walkie-talkie chirps when recording starts and stops
enabled = true

# Volume level (0.0 to 1.0)
volume = 0.7

[azure]
# Azure OpenAI resource endpoint
# Example: "https://my-resource.openai.azure.com"
endpoint = ""

# Whisper deployment name on that resource
deployment = "whisper"

# Azure OpenAI API version
api_version = "2024-02-01"

# Optional ISO 639-1 language hint ("en", "pt", ...)
# Omit for auto-detection
# language = "en"
"#;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Push-to-talk combo, e.g. "Ctrl+Alt+Space"
    #[serde(default = "default_hotkey")]
    pub hotkey: String,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub azure: AzureConfig,

    /// Optional path to state file for external integrations.
    /// "auto" resolves under XDG_RUNTIME_DIR; "disabled" turns it off.
    #[serde(default = "default_state_file")]
    pub state_file: Option<String>,
}

/// Audio capture configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// PipeWire/PulseAudio device name, or "default"
    #[serde(default = "default_device")]
    pub device: String,

    /// Maximum recording duration in seconds (safety limit)
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u32,

    /// Audio cue settings
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

/// Audio cue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedbackConfig {
    /// Play chirps when recording starts/stops
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Volume level (0.0 to 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
}

/// Azure OpenAI transcription configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AzureConfig {
    /// Resource endpoint, e.g. "https://my-resource.openai.azure.com"
    #[serde(default)]
    pub endpoint: String,

    /// Whisper deployment name
    #[serde(default = "default_deployment")]
    pub deployment: String,

    /// API version query parameter
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Optional language hint (ISO 639-1)
    #[serde(default)]
    pub language: Option<String>,
}

/// CLI overrides that outrank the file and environment layers.
///
/// Held by the daemon so a SIGHUP reload re-applies them; a flag given
/// at launch stays in force until the process exits.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub hotkey: Option<String>,
    pub device: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref hotkey) = self.hotkey {
            config.hotkey = hotkey.clone();
        }
        if let Some(ref device) = self.device {
            config.audio.device = device.clone();
        }
    }
}

fn default_hotkey() -> String {
    "Ctrl+Alt+Space".to_string()
}

fn default_device() -> String {
    "default".to_string()
}

fn default_max_duration() -> u32 {
    120
}

fn default_volume() -> f32 {
    0.7
}

fn default_deployment() -> String {
    "whisper".to_string()
}

fn default_api_version() -> String {
    "2024-02-01".to_string()
}

fn default_state_file() -> Option<String> {
    Some("auto".to_string())
}

fn default_true() -> bool {
    true
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            max_duration_secs: default_max_duration(),
            feedback: FeedbackConfig::default(),
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: default_volume(),
        }
    }
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            deployment: default_deployment(),
            api_version: default_api_version(),
            language: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: default_hotkey(),
            audio: AudioConfig::default(),
            azure: AzureConfig::default(),
            state_file: default_state_file(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pushtype"))
    }

    /// Get the runtime directory for ephemeral files (state, pid)
    pub fn runtime_dir() -> PathBuf {
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join("pushtype")
    }

    /// Resolve the state file path from config.
    /// Returns None when unset or explicitly disabled.
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        self.state_file.as_ref().and_then(|path| {
            match path.to_lowercase().as_str() {
                "disabled" | "none" | "off" | "false" => None,
                "auto" => Some(Self::runtime_dir().join("state")),
                _ => Some(PathBuf::from(path)),
            }
        })
    }

    /// Ensure the config directory exists
    pub fn ensure_directories() -> std::io::Result<()> {
        if let Some(config_dir) = Self::config_dir() {
            std::fs::create_dir_all(&config_dir)?;
            tracing::debug!("Ensured config directory exists: {:?}", config_dir);
        }
        Ok(())
    }
}

/// Write the default config template when no file exists yet.
/// An existing file is never touched.
pub fn ensure_config_file(path: &Path) -> Result<(), PushtypeError> {
    if path.exists() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| PushtypeError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, DEFAULT_CONFIG)
        .map_err(|e| PushtypeError::Config(format!("Failed to write config: {}", e)))?;
    tracing::info!("Created default config file: {:?}", path);
    Ok(())
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, PushtypeError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| PushtypeError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| PushtypeError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Override from environment variables
    if let Ok(combo) = std::env::var("PUSHTYPE_HOTKEY") {
        config.hotkey = combo;
    }
    if let Ok(endpoint) = std::env::var("PUSHTYPE_ENDPOINT") {
        config.azure.endpoint = endpoint;
    }
    if let Ok(device) = std::env::var("PUSHTYPE_DEVICE") {
        config.audio.device = device;
    }

    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &Config, path: &Path) -> Result<(), PushtypeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| PushtypeError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    let contents = toml::to_string_pretty(config)
        .map_err(|e| PushtypeError::Config(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, contents)
        .map_err(|e| PushtypeError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hotkey, "Ctrl+Alt+Space");
        assert_eq!(config.audio.device, "default");
        assert_eq!(config.audio.max_duration_secs, 120);
        assert!(config.audio.feedback.enabled);
        assert_eq!(config.azure.deployment, "whisper");
        assert_eq!(config.azure.api_version, "2024-02-01");
        assert!(config.azure.language.is_none());
    }

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.hotkey, "Ctrl+Alt+Space");
        assert_eq!(config.state_file.as_deref(), Some("auto"));
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
            hotkey = "Ctrl+Shift+F12"

            [audio]
            device = "hw:1"
            max_duration_secs = 30

            [audio.feedback]
            enabled = false

            [azure]
            endpoint = "https://my-resource.openai.azure.com"
            deployment = "whisper-eu"
            language = "pt"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.hotkey, "Ctrl+Shift+F12");
        assert_eq!(config.audio.device, "hw:1");
        assert_eq!(config.audio.max_duration_secs, 30);
        assert!(!config.audio.feedback.enabled);
        assert_eq!(config.azure.endpoint, "https://my-resource.openai.azure.com");
        assert_eq!(config.azure.deployment, "whisper-eu");
        assert_eq!(config.azure.api_version, "2024-02-01"); // default
        assert_eq!(config.azure.language.as_deref(), Some("pt"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(r#"hotkey = "F8""#).unwrap();
        assert_eq!(config.hotkey, "F8");
        assert_eq!(config.audio.device, "default");
        assert_eq!(config.azure.deployment, "whisper");
    }

    #[test]
    fn test_resolve_state_file() {
        let mut config = Config::default();

        config.state_file = Some("disabled".to_string());
        assert!(config.resolve_state_file().is_none());

        config.state_file = Some("/tmp/custom-state".to_string());
        assert_eq!(
            config.resolve_state_file(),
            Some(PathBuf::from("/tmp/custom-state"))
        );

        config.state_file = Some("auto".to_string());
        let auto = config.resolve_state_file().unwrap();
        assert!(auto.ends_with("pushtype/state"));
    }

    #[test]
    fn test_overrides_outrank_loaded_values() {
        let mut config: Config = toml::from_str(r#"hotkey = "F8""#).unwrap();
        let overrides = Overrides {
            hotkey: Some("Ctrl+F9".to_string()),
            device: Some("hw:1".to_string()),
        };

        overrides.apply(&mut config);
        assert_eq!(config.hotkey, "Ctrl+F9");
        assert_eq!(config.audio.device, "hw:1");

        // Empty overrides leave the config alone
        Overrides::default().apply(&mut config);
        assert_eq!(config.hotkey, "Ctrl+F9");
        assert_eq!(config.audio.device, "hw:1");
    }

    #[test]
    fn test_ensure_config_file_writes_template_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        ensure_config_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);

        // A second call must not clobber user edits
        std::fs::write(&path, r#"hotkey = "F8""#).unwrap();
        ensure_config_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"hotkey = "F8""#);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.hotkey = "Alt+F5".to_string();
        config.azure.endpoint = "https://x.openai.azure.com".to_string();
        save_config(&config, &path).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.hotkey, "Alt+F5");
        assert_eq!(loaded.azure.endpoint, "https://x.openai.azure.com");
    }
}
