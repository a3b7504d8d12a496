//! Transcript summarization.
//!
//! Produces four structured sections from a transcript. Short transcripts
//! are summarized directly; long ones go through a map-reduce flow where
//! each section is generated per chunk and then merged with one combine
//! call. The direct/chunked decision is made once per transcript and
//! applied uniformly to all four sections.

pub mod prompts;

use crate::config::SummarizeSettings;
use crate::error::Result;
use crate::provider::LanguageModel;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// The four summary sections, generated independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    ExecutiveSummary,
    KeyThemes,
    NotableQuotes,
    ActionableInsights,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::ExecutiveSummary,
        Section::KeyThemes,
        Section::NotableQuotes,
        Section::ActionableInsights,
    ];
}

/// Episode context threaded into prompts and summary metadata.
#[derive(Debug, Clone, Default)]
pub struct EpisodeContext {
    pub podcast: Option<String>,
    pub episode: Option<String>,
    pub host: Option<String>,
    pub date: Option<String>,
}

impl EpisodeContext {
    /// Header lines prepended to the system prompt.
    fn metadata_header(&self) -> String {
        let mut header = String::new();
        if let Some(podcast) = &self.podcast {
            header.push_str(&format!("Podcast: {podcast}\n"));
        }
        if let Some(episode) = &self.episode {
            header.push_str(&format!("Episode: {episode}\n"));
        }
        if let Some(host) = &self.host {
            header.push_str(&format!("Host: {host}\n"));
        }
        if let Some(date) = &self.date {
            header.push_str(&format!("Date: {date}\n"));
        }
        header
    }
}

/// Metadata block stored with every summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryMetadata {
    pub podcast: String,
    pub episode: String,
    pub host: String,
    pub date: String,
    pub prompt_version: String,
}

/// A complete episode summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub metadata: SummaryMetadata,
    pub executive_summary: String,
    pub key_themes: String,
    pub notable_quotes: String,
    pub actionable_insights: String,
}

impl Summary {
    /// Render the summary as readable plain text for CLI display.
    pub fn to_display_text(&self) -> String {
        let rule = "-".repeat(72);
        format!(
            "EPISODE INFORMATION\n{rule}\nPodcast: {}\nEpisode: {}\nHost: {}\nDate: {}\n\n\
             EXECUTIVE SUMMARY\n{rule}\n{}\n\n\
             KEY THEMES\n{rule}\n{}\n\n\
             NOTABLE QUOTES\n{rule}\n{}\n\n\
             ACTIONABLE INSIGHTS\n{rule}\n{}",
            self.metadata.podcast,
            self.metadata.episode,
            self.metadata.host,
            self.metadata.date,
            self.executive_summary,
            self.key_themes,
            self.notable_quotes,
            self.actionable_insights,
        )
    }
}

/// Character-based token estimate: ~4 characters per token.
///
/// Avoids requiring a real tokenizer; only used for threshold decisions.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Split text into ordered word-count-based chunks.
pub fn split_words(text: &str, words_per_chunk: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    words
        .chunks(words_per_chunk.max(1))
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Summarizer over an injected language model.
pub struct Summarizer {
    llm: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    settings: SummarizeSettings,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LanguageModel>, retry: RetryPolicy, settings: SummarizeSettings) -> Self {
        Self { llm, retry, settings }
    }

    /// Whether a transcript needs the chunked map-reduce path.
    pub fn needs_chunking(&self, transcript: &str) -> bool {
        estimate_tokens(transcript) > self.settings.direct_token_limit
    }

    /// Words per transcript chunk, derived from the per-chunk token ceiling.
    fn words_per_chunk(&self) -> usize {
        (self.settings.chunk_token_limit as f64 * 0.75) as usize
    }

    /// Generate all four sections for a transcript.
    ///
    /// A failure in any section aborts the whole summary; a completed
    /// episode always carries all four sections.
    #[instrument(skip_all, fields(transcript_len = transcript.len()))]
    pub async fn summarize(&self, transcript: &str, context: &EpisodeContext) -> Result<Summary> {
        let chunked = self.needs_chunking(transcript);
        info!(
            estimated_tokens = estimate_tokens(transcript),
            chunked, "Generating summary"
        );

        let system = prompts::system_prompt(&context.metadata_header());

        let mut sections = Vec::with_capacity(Section::ALL.len());
        for section in Section::ALL {
            let text = if chunked {
                self.generate_chunked(section, transcript, &system).await?
            } else {
                self.generate_direct(section, transcript, &system).await?
            };
            sections.push(text);
        }

        let mut iter = sections.into_iter();
        Ok(Summary {
            metadata: SummaryMetadata {
                podcast: context.podcast.clone().unwrap_or_else(unknown),
                episode: context.episode.clone().unwrap_or_else(unknown),
                host: context.host.clone().unwrap_or_else(unknown),
                date: context.date.clone().unwrap_or_else(unknown),
                prompt_version: prompts::PROMPT_VERSION.to_string(),
            },
            executive_summary: iter.next().unwrap_or_default(),
            key_themes: iter.next().unwrap_or_default(),
            notable_quotes: iter.next().unwrap_or_default(),
            actionable_insights: iter.next().unwrap_or_default(),
        })
    }

    /// Direct path: one call with the full transcript embedded.
    async fn generate_direct(
        &self,
        section: Section,
        transcript: &str,
        system: &str,
    ) -> Result<String> {
        let prompt = prompts::direct_prompt(section, transcript);
        self.retry
            .run(|| self.llm.generate(&prompt, Some(system)))
            .await
    }

    /// Chunked map-reduce path: one partial call per chunk in order, then
    /// one combine call. A single chunk falls back to the direct path,
    /// which avoids a pointless combine call.
    async fn generate_chunked(
        &self,
        section: Section,
        transcript: &str,
        system: &str,
    ) -> Result<String> {
        let chunks = split_words(transcript, self.words_per_chunk());
        if chunks.len() <= 1 {
            return self.generate_direct(section, transcript, system).await;
        }

        debug!(chunks = chunks.len(), ?section, "Map-reduce section generation");

        let total = chunks.len();
        let mut partials = Vec::with_capacity(total);
        for (index, chunk) in chunks.iter().enumerate() {
            let prompt = prompts::partial_prompt(section, chunk, index, total);
            let partial = self
                .retry
                .run(|| self.llm.generate(&prompt, Some(system)))
                .await?;
            partials.push(partial);
        }

        let combined_input = partials.join(prompts::PARTIAL_DELIMITER);
        let prompt = prompts::combine_prompt(section, &combined_input);
        self.retry.run(|| self.llm.generate(&prompt, Some(system))).await
    }
}

fn unknown() -> String {
    "Unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarkError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fake model that records prompts and replies with canned text.
    struct FakeModel {
        prompts: Mutex<Vec<String>>,
        fail_on_call: Option<usize>,
    }

    impl FakeModel {
        fn new() -> Self {
            Self { prompts: Mutex::new(Vec::new()), fail_on_call: None }
        }

        fn failing_on(call: usize) -> Self {
            Self { prompts: Mutex::new(Vec::new()), fail_on_call: Some(call) }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl crate::provider::LanguageModel for FakeModel {
        async fn generate(&self, prompt: &str, _system: Option<&str>) -> Result<String> {
            let mut prompts = self.prompts.lock().unwrap();
            let call = prompts.len();
            prompts.push(prompt.to_string());
            if self.fail_on_call == Some(call) {
                return Err(HarkError::Api("model unavailable".to_string()));
            }
            Ok(format!("response-{call}"))
        }
    }

    fn summarizer(llm: Arc<dyn crate::provider::LanguageModel>) -> Summarizer {
        let retry = RetryPolicy { max_retries: 3, buffer_secs: 0, default_wait_secs: 0 };
        Summarizer::new(llm, retry, SummarizeSettings::default())
    }

    fn small_settings() -> SummarizeSettings {
        // Tiny limits so tests exercise chunking with short inputs.
        SummarizeSettings {
            direct_token_limit: 20,
            chunk_token_limit: 16,
            ..SummarizeSettings::default()
        }
    }

    #[test]
    fn token_estimate_is_length_over_four() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(96_000)), 24_000);
    }

    #[test]
    fn threshold_boundary_is_deterministic() {
        // Exactly at the threshold takes the direct path; one past it
        // takes the chunked path.
        let s = summarizer(Arc::new(FakeModel::new()));
        let at_threshold = "x".repeat(24_000 * 4);
        let past_threshold = "x".repeat(24_000 * 4 + 4);
        assert!(!s.needs_chunking(&at_threshold));
        assert!(s.needs_chunking(&past_threshold));
    }

    #[test]
    fn word_chunks_preserve_order_and_content() {
        // Rejoining chunks in order reproduces the original text.
        let text = (0..100).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = split_words(&text, 30);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.join(" "), text);
        assert!(chunks[0].starts_with("w0 "));
        assert!(chunks[3].ends_with("w99"));
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_words("", 100).is_empty());
        assert!(split_words("   ", 100).is_empty());
    }

    #[tokio::test]
    async fn short_transcript_uses_one_call_per_section() {
        let model = Arc::new(FakeModel::new());
        let s = summarizer(model.clone());

        let summary = s
            .summarize("a short transcript", &EpisodeContext::default())
            .await
            .unwrap();

        assert_eq!(model.prompts().len(), 4);
        assert_eq!(summary.executive_summary, "response-0");
        assert_eq!(summary.actionable_insights, "response-3");
        assert_eq!(summary.metadata.prompt_version, prompts::PROMPT_VERSION);
        assert_eq!(summary.metadata.podcast, "Unknown");
    }

    #[tokio::test]
    async fn long_transcript_maps_then_combines_per_section() {
        let model = Arc::new(FakeModel::new());
        let retry = RetryPolicy { max_retries: 3, buffer_secs: 0, default_wait_secs: 0 };
        let s = Summarizer::new(model.clone(), retry, small_settings());

        // 36 words -> 3 chunks of 12 words with chunk_token_limit 16.
        let transcript = (0..36).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        assert!(s.needs_chunking(&transcript));

        s.summarize(&transcript, &EpisodeContext::default()).await.unwrap();

        // Per section: 3 partial calls + 1 combine call.
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 4 * 4);
        assert!(prompts[0].contains("part 1 of 3"));
        assert!(prompts[1].contains("part 2 of 3"));
        assert!(prompts[2].contains("part 3 of 3"));
        // Combine call sees the partials in chunk order.
        let combine = &prompts[3];
        assert!(combine.contains("response-0"));
        assert!(
            combine.find("response-0").unwrap() < combine.find("response-2").unwrap(),
            "partials must be combined in chunk order"
        );
    }

    #[tokio::test]
    async fn single_chunk_skips_the_combine_call() {
        let model = Arc::new(FakeModel::new());
        let retry = RetryPolicy { max_retries: 3, buffer_secs: 0, default_wait_secs: 0 };
        // Past the direct threshold but small enough for a single chunk.
        let settings = SummarizeSettings {
            direct_token_limit: 4,
            chunk_token_limit: 4_000,
            ..SummarizeSettings::default()
        };
        let s = Summarizer::new(model.clone(), retry, settings);

        s.summarize("just a few words here", &EpisodeContext::default())
            .await
            .unwrap();

        // Falls back to direct generation: one call per section.
        assert_eq!(model.prompts().len(), 4);
        assert!(!model.prompts()[0].contains("part 1 of"));
    }

    #[tokio::test]
    async fn section_failure_aborts_the_whole_summary() {
        // Third section fails; the whole summarize call errors out.
        let model = Arc::new(FakeModel::failing_on(2));
        let s = summarizer(model.clone());

        let result = s.summarize("short", &EpisodeContext::default()).await;
        assert!(result.is_err());
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn metadata_flows_into_summary() {
        let model = Arc::new(FakeModel::new());
        let s = summarizer(model);

        let context = EpisodeContext {
            podcast: Some("Deep Questions".to_string()),
            episode: Some("On Focus".to_string()),
            host: Some("Cal".to_string()),
            date: Some("2026-01-05".to_string()),
        };
        let summary = s.summarize("short", &context).await.unwrap();

        assert_eq!(summary.metadata.podcast, "Deep Questions");
        assert_eq!(summary.metadata.date, "2026-01-05");

        let rendered = summary.to_display_text();
        assert!(rendered.contains("EXECUTIVE SUMMARY"));
        assert!(rendered.contains("Deep Questions"));
    }
}
