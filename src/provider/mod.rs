//! Clients for the external transcription and language-model APIs.
//!
//! Both clients speak to an OpenAI-compatible provider and surface rate
//! limits as `HarkError::RateLimited` so the retry controller can honor
//! the provider's disclosed reset window.

mod chat;
mod transcription;

pub use chat::ChatClient;
pub use transcription::TranscriptionClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

/// One transcribed segment with timestamps.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionSegment {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub text: String,
}

/// Result of transcribing one audio file.
///
/// Field presence varies by provider code path, so everything beyond the
/// text carries an explicit default rather than being probed at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptionSegment>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub duration: Option<f64>,
}

fn default_language() -> String {
    "en".to_string()
}

/// Speech-to-text API.
#[async_trait]
pub trait TranscriptionApi: Send + Sync {
    /// Transcribe one audio file (already under the provider size ceiling).
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult>;
}

/// Text-generation API.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate text from a prompt, optionally with a system prompt.
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let result: TranscriptionResult =
            serde_json::from_str(r#"{"text": "hello world"}"#).unwrap();
        assert_eq!(result.text, "hello world");
        assert!(result.segments.is_empty());
        assert_eq!(result.language, "en");
        assert_eq!(result.duration, None);
    }

    #[test]
    fn verbose_response_parses_segments() {
        let json = r#"{
            "text": "hello",
            "language": "no",
            "duration": 12.5,
            "segments": [{"start": 0.0, "end": 2.0, "text": "hello"}]
        }"#;
        let result: TranscriptionResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.language, "no");
        assert_eq!(result.duration, Some(12.5));
        assert_eq!(result.segments.len(), 1);
    }
}
