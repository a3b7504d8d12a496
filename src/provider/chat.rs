//! Chat-completion client used for summarization.

use super::LanguageModel;
use crate::config::ApiSettings;
use crate::error::{HarkError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Language-model client over an OpenAI-compatible chat endpoint.
pub struct ChatClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatClient {
    pub fn new(
        settings: &ApiSettings,
        api_key: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        let config = OpenAIConfig::new()
            .with_api_base(settings.base_url.trim_end_matches('/'))
            .with_api_key(api_key);

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
            model: settings.summarization_model.clone(),
            temperature,
            max_tokens,
        })
    }
}

/// Map a typed SDK error into the Hark taxonomy.
///
/// Rate limits become `RateLimited` with the provider's message intact so
/// the retry controller can parse the disclosed reset window; everything
/// else is a non-retryable `Api` error.
fn map_openai_error(err: OpenAIError) -> HarkError {
    match err {
        OpenAIError::ApiError(api) => {
            let is_rate_limit = api
                .code
                .as_deref()
                .is_some_and(|c| c == "rate_limit_exceeded")
                || api.message.to_lowercase().contains("rate limit");
            if is_rate_limit {
                HarkError::RateLimited(api.message)
            } else {
                HarkError::Api(api.message)
            }
        }
        other => HarkError::Api(other.to_string()),
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);

        if let Some(system) = system_prompt {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|e| HarkError::Summarization(e.to_string()))?
                    .into(),
            );
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| HarkError::Summarization(e.to_string()))?
                .into(),
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| HarkError::Summarization(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| HarkError::Api("Empty response from language model".to_string()))?
            .trim()
            .to_string();

        debug!("Generated {} characters", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;

    fn api_error(message: &str, code: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: message.to_string(),
            r#type: None,
            param: None,
            code: code.map(|c| c.to_string()),
        })
    }

    #[test]
    fn rate_limit_code_maps_to_rate_limited() {
        let err = map_openai_error(api_error(
            "Please try again in 1m59.5s",
            Some("rate_limit_exceeded"),
        ));
        assert!(err.is_rate_limit());
        assert!(err.to_string().contains("try again in 1m59.5s"));
    }

    #[test]
    fn rate_limit_message_without_code_is_detected() {
        let err = map_openai_error(api_error("Rate limit reached for model", None));
        assert!(err.is_rate_limit());
    }

    #[test]
    fn other_api_errors_are_not_retryable() {
        let err = map_openai_error(api_error("invalid request", Some("invalid_request_error")));
        assert!(!err.is_rate_limit());
    }
}
