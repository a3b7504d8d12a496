//! Speech-to-text client for OpenAI-compatible audio endpoints.

use super::{TranscriptionApi, TranscriptionResult};
use crate::config::ApiSettings;
use crate::error::{HarkError, Result};
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

/// Client for the provider's `/audio/transcriptions` endpoint.
///
/// Uses reqwest directly rather than an SDK: the endpoint is a plain
/// multipart upload, and the raw 429 body is needed to recover the
/// provider's disclosed rate-limit reset window.
pub struct TranscriptionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

/// Error body shape for OpenAI-compatible providers.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl TranscriptionClient {
    pub fn new(settings: &ApiSettings, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.transcription_model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }
}

#[async_trait]
impl TranscriptionApi for TranscriptionClient {
    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult> {
        debug!("Uploading audio for transcription");

        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();
        let file_bytes = tokio::fs::read(audio_path).await?;

        let form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(file_bytes)
                    .file_name(file_name)
                    .mime_str("audio/mpeg")
                    .map_err(|e| HarkError::Transcription(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| HarkError::Transcription(format!("Request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let result = response
                .json::<TranscriptionResult>()
                .await
                .map_err(|e| HarkError::Transcription(format!("Invalid response: {e}")))?;
            debug!("Transcribed {} characters", result.text.len());
            return Ok(result);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(HarkError::RateLimited(message))
        } else {
            Err(HarkError::Api(format!("Transcription failed ({status}): {message}")))
        }
    }
}
