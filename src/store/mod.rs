//! Persisted records: podcasts and episodes.

mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of an episode.
///
/// Transitions are monotonic forward; only `failed` or an explicit retry
/// reset to `pending` break forward movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeStatus {
    Pending,
    Downloading,
    Transcribing,
    /// Chunked transcription progress, 1-based.
    TranscribingChunk { current: usize, total: usize },
    Summarizing,
    Completed,
    Failed,
}

impl EpisodeStatus {
    /// Whether processing has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EpisodeStatus::Completed | EpisodeStatus::Failed)
    }

    /// Whether a processing run is currently in flight.
    pub fn is_processing(&self) -> bool {
        !self.is_terminal() && *self != EpisodeStatus::Pending
    }
}

impl std::fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EpisodeStatus::Pending => write!(f, "pending"),
            EpisodeStatus::Downloading => write!(f, "downloading"),
            EpisodeStatus::Transcribing => write!(f, "transcribing"),
            EpisodeStatus::TranscribingChunk { current, total } => {
                write!(f, "transcribing ({current}/{total})")
            }
            EpisodeStatus::Summarizing => write!(f, "summarizing"),
            EpisodeStatus::Completed => write!(f, "completed"),
            EpisodeStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for EpisodeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EpisodeStatus::Pending),
            "downloading" => Ok(EpisodeStatus::Downloading),
            "transcribing" => Ok(EpisodeStatus::Transcribing),
            "summarizing" => Ok(EpisodeStatus::Summarizing),
            "completed" => Ok(EpisodeStatus::Completed),
            "failed" => Ok(EpisodeStatus::Failed),
            other => {
                // "transcribing (i/N)"
                if let Some(progress) = other
                    .strip_prefix("transcribing (")
                    .and_then(|r| r.strip_suffix(')'))
                {
                    if let Some((current, total)) = progress.split_once('/') {
                        if let (Ok(current), Ok(total)) = (current.parse(), total.parse()) {
                            return Ok(EpisodeStatus::TranscribingChunk { current, total });
                        }
                    }
                }
                Err(format!("Unknown episode status: {other}"))
            }
        }
    }
}

/// A subscribed podcast feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Podcast {
    pub id: i64,
    pub title: String,
    pub rss_url: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// One podcast episode tracked through the processing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub podcast_id: i64,
    /// External feed identifier; immutable.
    pub guid: String,
    pub title: String,
    pub description: Option<String>,
    pub audio_url: String,
    pub published: Option<DateTime<Utc>>,
    /// Feed-reported duration in seconds.
    pub duration: Option<i64>,
    pub status: EpisodeStatus,
    pub error_message: Option<String>,
    /// Artifact locations, relative to the storage root.
    pub audio_path: Option<String>,
    pub transcript_path: Option<String>,
    pub summary_path: Option<String>,
    /// Materialized content kept alongside the files as a fast path.
    pub transcript_text: Option<String>,
    pub summary_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields for inserting a new episode from a feed item.
#[derive(Debug, Clone)]
pub struct NewEpisode {
    pub podcast_id: i64,
    pub guid: String,
    pub title: String,
    pub description: Option<String>,
    pub audio_url: String,
    pub published: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_roundtrip() {
        let statuses = [
            EpisodeStatus::Pending,
            EpisodeStatus::Downloading,
            EpisodeStatus::Transcribing,
            EpisodeStatus::TranscribingChunk { current: 2, total: 3 },
            EpisodeStatus::Summarizing,
            EpisodeStatus::Completed,
            EpisodeStatus::Failed,
        ];
        for status in statuses {
            let parsed: EpisodeStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn chunk_progress_renders_one_based() {
        let status = EpisodeStatus::TranscribingChunk { current: 1, total: 5 };
        assert_eq!(status.to_string(), "transcribing (1/5)");
    }

    #[test]
    fn processing_states_are_neither_pending_nor_terminal() {
        assert!(!EpisodeStatus::Pending.is_processing());
        assert!(EpisodeStatus::Downloading.is_processing());
        assert!(EpisodeStatus::TranscribingChunk { current: 1, total: 2 }.is_processing());
        assert!(EpisodeStatus::Summarizing.is_processing());
        assert!(!EpisodeStatus::Completed.is_processing());
        assert!(!EpisodeStatus::Failed.is_processing());
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("paused".parse::<EpisodeStatus>().is_err());
        assert!("transcribing (x/y)".parse::<EpisodeStatus>().is_err());
    }
}
