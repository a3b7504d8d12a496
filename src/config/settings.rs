//! Configuration settings for Hark.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub api: ApiSettings,
    pub audio: AudioSettings,
    pub summarize: SummarizeSettings,
    pub retry: RetrySettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for application data (database lives here).
    pub data_dir: String,
    /// Root directory for episode artifacts (audio, transcripts, summaries).
    pub storage_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.hark".to_string(),
            storage_dir: "~/.hark/storage".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Provider API settings.
///
/// Any OpenAI-compatible endpoint works; the default targets Groq.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Speech-to-text model.
    pub transcription_model: String,
    /// Chat model used for summarization.
    pub summarization_model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            transcription_model: "whisper-large-v3".to_string(),
            summarization_model: "llama-3.3-70b-versatile".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Audio conditioning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Maximum upload size in MB. Kept under the provider's 25MB ceiling.
    pub max_upload_mb: f64,
    /// Re-encode bitrate in kbps. 64k is sufficient for speech.
    pub bitrate_kbps: u32,
    /// Re-encode sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            max_upload_mb: 24.0,
            bitrate_kbps: 64,
            sample_rate: 16_000,
        }
    }
}

/// Summarization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizeSettings {
    /// Estimated-token threshold above which the chunked path is used.
    pub direct_token_limit: usize,
    /// Estimated-token ceiling for a single transcript chunk.
    pub chunk_token_limit: usize,
    /// Sampling temperature for section generation.
    pub temperature: f32,
    /// Max completion tokens per section call.
    pub max_tokens: u32,
}

impl Default for SummarizeSettings {
    fn default() -> Self {
        Self {
            direct_token_limit: 24_000,
            chunk_token_limit: 8_000,
            temperature: 0.3,
            max_tokens: 2048,
        }
    }
}

/// Rate-limit retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum attempts per provider call.
    pub max_retries: u32,
    /// Safety buffer added to the provider's disclosed wait, in seconds.
    pub buffer_secs: u64,
    /// Wait when the provider message has no parseable duration, in seconds.
    pub default_wait_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            buffer_secs: 5,
            default_wait_secs: 120,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::HarkError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hark")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded storage root path.
    pub fn storage_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.storage_dir)
    }

    /// Get the episode database path.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("episodes.db")
    }

    /// Read the provider API key from the configured environment variable.
    pub fn api_key(&self) -> crate::error::Result<String> {
        std::env::var(&self.api.api_key_env).map_err(|_| {
            crate::error::HarkError::Config(format!(
                "API key not set; export {}",
                self.api.api_key_env
            ))
        })
    }
}
