//! Podcast RSS feed fetching and parsing.

use crate::error::{HarkError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

/// Feed-level podcast metadata.
#[derive(Debug, Clone, Serialize)]
pub struct PodcastFeed {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
}

/// One episode entry from a feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedEpisode {
    pub guid: String,
    pub title: String,
    pub description: Option<String>,
    pub audio_url: String,
    pub published: Option<DateTime<Utc>>,
    /// Reported duration in seconds, when the feed carries one.
    pub duration: Option<i64>,
}

/// Fetch and parse a podcast RSS feed.
///
/// Entries without an audio enclosure are skipped; a feed with no usable
/// entries is still returned (the caller decides whether that's an error).
#[instrument(skip_all, fields(url = %url))]
pub async fn fetch_feed(url: &str) -> Result<(PodcastFeed, Vec<FeedEpisode>)> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| HarkError::Feed(format!("Failed to fetch feed: {e}")))?;

    if !response.status().is_success() {
        return Err(HarkError::Feed(format!(
            "Feed server returned {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| HarkError::Feed(format!("Failed to read feed body: {e}")))?;

    parse_feed(&bytes)
}

/// Parse raw feed bytes into podcast metadata and episode entries.
pub fn parse_feed(bytes: &[u8]) -> Result<(PodcastFeed, Vec<FeedEpisode>)> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| HarkError::Feed(format!("Invalid feed: {e}")))?;

    let podcast = PodcastFeed {
        title: feed
            .title
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_else(|| "Untitled Podcast".to_string()),
        author: feed.authors.first().map(|a| a.name.clone()),
        description: feed.description.as_ref().map(|d| d.content.clone()),
    };

    let episodes: Vec<FeedEpisode> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            // Podcast audio arrives as an enclosure link in the media blocks.
            let audio_url = entry
                .media
                .iter()
                .flat_map(|m| m.content.iter())
                .find_map(|c| c.url.as_ref().map(|u| u.to_string()))?;

            let duration = entry
                .media
                .iter()
                .find_map(|m| m.duration)
                .map(|d| d.as_secs() as i64);

            Some(FeedEpisode {
                guid: entry.id,
                title: entry
                    .title
                    .map(|t| t.content)
                    .unwrap_or_else(|| "Untitled Episode".to_string()),
                description: entry.summary.map(|s| s.content),
                audio_url,
                published: entry.published,
                duration,
            })
        })
        .collect();

    debug!("Parsed feed with {} audio entries", episodes.len());
    Ok((podcast, episodes))
}
