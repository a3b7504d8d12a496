//! The episode processing pipeline.
//!
//! Drives one episode through download, conditioning, transcription, and
//! summarization, persisting every status transition so observers can poll
//! progress. Dispatch claims the episode atomically in the store; the work
//! itself runs in a background task and records its outcome (completed or
//! failed with the triggering message) rather than raising.

use crate::audio::{AudioFetcher, ConditionedAudio, Conditioner, FfmpegConditioner, HttpFetcher};
use crate::config::Settings;
use crate::error::{HarkError, Result};
use crate::provider::{LanguageModel, TranscriptionApi};
use crate::retry::RetryPolicy;
use crate::storage::StorageRoot;
use crate::store::{Episode, EpisodeStatus, Podcast, SqliteStore};
use crate::summarize::{EpisodeContext, Summarizer};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Result of asking the pipeline to process an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The episode was claimed and a background run started.
    Started,
    /// Another run already holds the claim.
    AlreadyProcessing,
    /// The episode finished previously; nothing to do.
    AlreadyCompleted,
}

/// Episode processor with injected providers.
pub struct Pipeline {
    store: Arc<SqliteStore>,
    storage: StorageRoot,
    fetcher: Arc<dyn AudioFetcher>,
    conditioner: Arc<dyn Conditioner>,
    transcriber: Arc<dyn TranscriptionApi>,
    llm: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    settings: Settings,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<SqliteStore>,
        storage: StorageRoot,
        fetcher: Arc<dyn AudioFetcher>,
        conditioner: Arc<dyn Conditioner>,
        transcriber: Arc<dyn TranscriptionApi>,
        llm: Arc<dyn LanguageModel>,
        settings: Settings,
    ) -> Self {
        let retry = RetryPolicy::from(&settings.retry);
        Self {
            store,
            storage,
            fetcher,
            conditioner,
            transcriber,
            llm,
            retry,
            settings,
        }
    }

    /// Wire up the production pipeline from configuration.
    ///
    /// Opens the episode store, reads the API key from the environment, and
    /// installs the HTTP fetcher, ffmpeg conditioner, and provider clients.
    pub fn from_settings(settings: Settings) -> Result<Arc<Self>> {
        let store = Arc::new(SqliteStore::new(&settings.db_path())?);
        let storage = StorageRoot::new(settings.storage_dir());
        let api_key = settings.api_key()?;

        let fetcher = Arc::new(HttpFetcher::new(settings.api.timeout_secs));
        let conditioner = Arc::new(FfmpegConditioner::new(settings.audio.clone()));
        let transcriber = Arc::new(crate::provider::TranscriptionClient::new(
            &settings.api,
            api_key.clone(),
        )?);
        let llm = Arc::new(crate::provider::ChatClient::new(
            &settings.api,
            api_key,
            settings.summarize.temperature,
            settings.summarize.max_tokens,
        )?);

        Ok(Arc::new(Self::new(
            store, storage, fetcher, conditioner, transcriber, llm, settings,
        )))
    }

    /// Handle to the underlying episode store.
    pub fn store(&self) -> Arc<SqliteStore> {
        Arc::clone(&self.store)
    }

    /// Claim an episode and start processing it in the background.
    ///
    /// The claim is a single store update, so concurrent dispatches for the
    /// same episode resolve to exactly one `Started`.
    pub fn dispatch(self: &Arc<Self>, episode_id: i64) -> Result<DispatchOutcome> {
        let episode = self
            .store
            .get_episode(episode_id)?
            .ok_or_else(|| HarkError::NotFound(format!("Episode {episode_id}")))?;

        if episode.status == EpisodeStatus::Completed {
            return Ok(DispatchOutcome::AlreadyCompleted);
        }

        if !self.store.claim_for_processing(episode_id)? {
            return Ok(DispatchOutcome::AlreadyProcessing);
        }

        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.run(episode_id).await;
        });

        Ok(DispatchOutcome::Started)
    }

    /// Process a claimed episode to a terminal state.
    ///
    /// Every error lands in the store as a `failed` status with the message
    /// verbatim; nothing escapes to the caller.
    #[instrument(skip(self))]
    pub async fn run(&self, episode_id: i64) {
        let outcome = self.process(episode_id).await;

        match outcome {
            Ok(()) => info!("Episode {} completed", episode_id),
            Err(e) => {
                let message = e.to_string();
                error!("Episode {} failed: {}", episode_id, message);
                if let Err(store_err) = self.store.mark_failed(episode_id, &message) {
                    error!("Could not record failure for episode {}: {}", episode_id, store_err);
                }
            }
        }
    }

    async fn process(&self, episode_id: i64) -> Result<()> {
        let episode = self
            .store
            .get_episode(episode_id)?
            .ok_or_else(|| HarkError::NotFound(format!("Episode {episode_id}")))?;
        let podcast = self
            .store
            .get_podcast(episode.podcast_id)?
            .ok_or_else(|| HarkError::NotFound(format!("Podcast {}", episode.podcast_id)))?;

        let work_dir = self.storage.episode_dir(&podcast.slug, episode.id);
        self.storage.ensure_dir(&work_dir)?;

        // Download. The claim already set the status.
        let audio_path = work_dir.join("audio.mp3");
        self.fetcher.fetch(&episode.audio_url, &audio_path).await?;
        self.store
            .set_audio_path(episode.id, &self.storage.relativize(&audio_path)?)?;

        // Condition under the upload ceiling.
        let conditioned = self.conditioner.condition(&audio_path, &work_dir).await?;

        // Transcribe.
        let transcript = match conditioned {
            ConditionedAudio::Single(path) => {
                self.store.set_status(episode.id, &EpisodeStatus::Transcribing)?;
                let result = self
                    .retry
                    .run(|| self.transcriber.transcribe(&path))
                    .await?;
                result.text.trim().to_string()
            }
            ConditionedAudio::Chunks(paths) => {
                let result = self.transcribe_chunks(episode.id, &paths).await;
                // Chunk files are intermediate; drop them whether or not
                // transcription succeeded.
                if let Some(chunks_dir) = paths.first().and_then(|p| p.parent()) {
                    if let Err(e) = std::fs::remove_dir_all(chunks_dir) {
                        warn!("Could not remove chunk directory: {}", e);
                    }
                }
                result?
            }
        };

        let transcript_path = work_dir.join("transcript.txt");
        std::fs::write(&transcript_path, &transcript)?;
        self.store.set_transcript(
            episode.id,
            &self.storage.relativize(&transcript_path)?,
            &transcript,
        )?;

        // Summarize.
        self.store.set_status(episode.id, &EpisodeStatus::Summarizing)?;
        let summarizer = Summarizer::new(
            Arc::clone(&self.llm),
            self.retry,
            self.settings.summarize.clone(),
        );
        let context = episode_context(&podcast, &episode);
        let summary = summarizer.summarize(&transcript, &context).await?;

        let summary_json = serde_json::to_string_pretty(&summary)?;
        let summary_path = work_dir.join("summary.json");
        std::fs::write(&summary_path, &summary_json)?;
        self.store.set_summary(
            episode.id,
            &self.storage.relativize(&summary_path)?,
            &summary_json,
        )?;

        self.store.mark_completed(episode.id)?;
        Ok(())
    }

    /// Transcribe chunk files sequentially, surfacing per-chunk progress.
    ///
    /// Chunk texts are joined with a single space, in chunk order.
    async fn transcribe_chunks(&self, episode_id: i64, paths: &[std::path::PathBuf]) -> Result<String> {
        let total = paths.len();
        let mut texts = Vec::with_capacity(total);

        for (index, path) in paths.iter().enumerate() {
            self.store.set_status(
                episode_id,
                &EpisodeStatus::TranscribingChunk { current: index + 1, total },
            )?;
            let result = self.retry.run(|| self.transcriber.transcribe(path)).await?;
            texts.push(result.text.trim().to_string());
        }

        Ok(texts.join(" "))
    }
}

fn episode_context(podcast: &Podcast, episode: &Episode) -> EpisodeContext {
    EpisodeContext {
        podcast: Some(podcast.title.clone()),
        episode: Some(episode.title.clone()),
        host: podcast.author.clone(),
        date: episode.published.map(|dt| dt.format("%Y-%m-%d").to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TranscriptionResult;
    use crate::store::NewEpisode;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeFetcher {
        fail: bool,
    }

    #[async_trait]
    impl AudioFetcher for FakeFetcher {
        async fn fetch(&self, _url: &str, dest: &Path) -> Result<()> {
            if self.fail {
                return Err(HarkError::Download("Server returned 404".to_string()));
            }
            std::fs::write(dest, b"fake audio")?;
            Ok(())
        }
    }

    /// Conditioner producing a single compressed file or N chunk files.
    struct FakeConditioner {
        chunks: usize,
    }

    #[async_trait]
    impl Conditioner for FakeConditioner {
        async fn condition(&self, _source: &Path, work_dir: &Path) -> Result<ConditionedAudio> {
            if self.chunks <= 1 {
                let path = work_dir.join("audio_compressed.mp3");
                std::fs::write(&path, b"compressed")?;
                return Ok(ConditionedAudio::Single(path));
            }
            let chunks_dir = work_dir.join("chunks");
            std::fs::create_dir_all(&chunks_dir)?;
            let mut paths = Vec::new();
            for idx in 0..self.chunks {
                let path = chunks_dir.join(format!("chunk_{idx}.mp3"));
                std::fs::write(&path, b"chunk")?;
                paths.push(path);
            }
            Ok(ConditionedAudio::Chunks(paths))
        }
    }

    /// Transcriber that records the episode's stored status at each call.
    struct FakeTranscriber {
        store: Arc<SqliteStore>,
        episode_id: i64,
        observed: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl TranscriptionApi for FakeTranscriber {
        async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult> {
            if self.fail {
                return Err(HarkError::Transcription("decode failure".to_string()));
            }
            let status = self
                .store
                .get_episode(self.episode_id)
                .unwrap()
                .unwrap()
                .status
                .to_string();
            self.observed.lock().unwrap().push(status);

            let name = audio_path.file_stem().unwrap().to_string_lossy().into_owned();
            Ok(TranscriptionResult {
                text: format!("text from {name} "),
                segments: Vec::new(),
                language: "en".to_string(),
                duration: None,
            })
        }
    }

    struct FakeLlm;

    #[async_trait]
    impl LanguageModel for FakeLlm {
        async fn generate(&self, _prompt: &str, _system: Option<&str>) -> Result<String> {
            Ok("generated section".to_string())
        }
    }

    struct Fixture {
        pipeline: Arc<Pipeline>,
        store: Arc<SqliteStore>,
        episode_id: i64,
        transcriber: Arc<FakeTranscriber>,
        _dir: TempDir,
    }

    fn fixture(chunks: usize, fetch_fails: bool, transcribe_fails: bool) -> Fixture {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let podcast = store
            .upsert_podcast("Test Cast", "https://example.com/feed.xml", Some("Host"), None, "test-cast")
            .unwrap();
        let episode = store
            .insert_episode(&NewEpisode {
                podcast_id: podcast.id,
                guid: "guid-1".to_string(),
                title: "Episode One".to_string(),
                description: None,
                audio_url: "https://example.com/1.mp3".to_string(),
                published: None,
                duration: Some(2400),
            })
            .unwrap();

        let dir = TempDir::new().unwrap();
        let transcriber = Arc::new(FakeTranscriber {
            store: Arc::clone(&store),
            episode_id: episode.id,
            observed: Mutex::new(Vec::new()),
            fail: transcribe_fails,
        });

        let mut settings = Settings::default();
        settings.retry.buffer_secs = 0;
        settings.retry.default_wait_secs = 0;

        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&store),
            StorageRoot::new(dir.path().to_path_buf()),
            Arc::new(FakeFetcher { fail: fetch_fails }),
            Arc::new(FakeConditioner { chunks }),
            transcriber.clone(),
            Arc::new(FakeLlm),
            settings,
        ));

        Fixture { pipeline, store, episode_id: episode.id, transcriber, _dir: dir }
    }

    #[tokio::test]
    async fn single_file_episode_runs_to_completion() {
        let f = fixture(1, false, false);

        assert!(f.store.claim_for_processing(f.episode_id).unwrap());
        f.pipeline.run(f.episode_id).await;

        let episode = f.store.get_episode(f.episode_id).unwrap().unwrap();
        assert_eq!(episode.status, EpisodeStatus::Completed);
        assert!(episode.completed_at.is_some());
        assert!(episode.error_message.is_none());
        assert_eq!(episode.transcript_text.as_deref(), Some("text from audio_compressed"));
        assert!(episode.audio_path.is_some());
        assert!(episode.summary_json.unwrap().contains("generated section"));
        assert_eq!(f.transcriber.observed.lock().unwrap().as_slice(), ["transcribing"]);
    }

    #[tokio::test]
    async fn chunked_episode_reports_progress_and_joins_texts() {
        let f = fixture(3, false, false);

        assert!(f.store.claim_for_processing(f.episode_id).unwrap());
        f.pipeline.run(f.episode_id).await;

        let episode = f.store.get_episode(f.episode_id).unwrap().unwrap();
        assert_eq!(episode.status, EpisodeStatus::Completed);
        // Chunk texts joined with a single space, in chunk order.
        assert_eq!(
            episode.transcript_text.as_deref(),
            Some("text from chunk_0 text from chunk_1 text from chunk_2")
        );
        assert_eq!(
            f.transcriber.observed.lock().unwrap().as_slice(),
            ["transcribing (1/3)", "transcribing (2/3)", "transcribing (3/3)"]
        );
    }

    #[tokio::test]
    async fn chunk_files_are_removed_after_transcription() {
        let f = fixture(2, false, false);
        let episode = f.store.get_episode(f.episode_id).unwrap().unwrap();
        assert!(f.store.claim_for_processing(f.episode_id).unwrap());
        f.pipeline.run(f.episode_id).await;

        let chunks_dir = f
            .pipeline
            .storage
            .episode_dir("test-cast", episode.id)
            .join("chunks");
        assert!(!chunks_dir.exists());
    }

    #[tokio::test]
    async fn chunk_files_are_removed_even_when_transcription_fails() {
        let f = fixture(2, false, true);
        let episode = f.store.get_episode(f.episode_id).unwrap().unwrap();
        assert!(f.store.claim_for_processing(f.episode_id).unwrap());
        f.pipeline.run(f.episode_id).await;

        let chunks_dir = f
            .pipeline
            .storage
            .episode_dir("test-cast", episode.id)
            .join("chunks");
        assert!(!chunks_dir.exists());

        let episode = f.store.get_episode(f.episode_id).unwrap().unwrap();
        assert_eq!(episode.status, EpisodeStatus::Failed);
    }

    #[tokio::test]
    async fn failure_is_recorded_with_the_message_verbatim() {
        let f = fixture(1, true, false);

        assert!(f.store.claim_for_processing(f.episode_id).unwrap());
        f.pipeline.run(f.episode_id).await;

        let episode = f.store.get_episode(f.episode_id).unwrap().unwrap();
        assert_eq!(episode.status, EpisodeStatus::Failed);
        assert!(episode.error_message.unwrap().contains("Server returned 404"));
    }

    #[tokio::test]
    async fn dispatch_claims_exactly_once() {
        let f = fixture(1, false, false);

        let first = f.pipeline.dispatch(f.episode_id).unwrap();
        let second = f.pipeline.dispatch(f.episode_id).unwrap();
        assert_eq!(first, DispatchOutcome::Started);
        assert_eq!(second, DispatchOutcome::AlreadyProcessing);

        // The background run reaches a terminal state.
        for _ in 0..200 {
            let episode = f.store.get_episode(f.episode_id).unwrap().unwrap();
            if episode.status.is_terminal() {
                assert_eq!(episode.status, EpisodeStatus::Completed);
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("episode never reached a terminal state");
    }

    #[tokio::test]
    async fn completed_episodes_are_not_reprocessed() {
        let f = fixture(1, false, false);
        f.store.mark_completed(f.episode_id).unwrap();

        let outcome = f.pipeline.dispatch(f.episode_id).unwrap();
        assert_eq!(outcome, DispatchOutcome::AlreadyCompleted);
    }

    #[tokio::test]
    async fn failed_episode_can_be_dispatched_again() {
        let f = fixture(1, false, true);
        assert!(f.store.claim_for_processing(f.episode_id).unwrap());
        f.pipeline.run(f.episode_id).await;
        assert_eq!(
            f.store.get_episode(f.episode_id).unwrap().unwrap().status,
            EpisodeStatus::Failed
        );

        // A failed episode is claimable again; the claim clears the prior
        // error before the rerun starts.
        let outcome = f.pipeline.dispatch(f.episode_id).unwrap();
        assert_eq!(outcome, DispatchOutcome::Started);
    }

    #[tokio::test]
    async fn dispatching_a_missing_episode_is_an_error() {
        let f = fixture(1, false, false);
        assert!(matches!(
            f.pipeline.dispatch(9999),
            Err(HarkError::NotFound(_))
        ));
    }
}
