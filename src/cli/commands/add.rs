//! Add command - subscribe to a podcast feed.

use crate::cli::Output;
use crate::config::Settings;
use crate::feed::fetch_feed;
use crate::storage::podcast_slug;
use crate::store::{NewEpisode, SqliteStore};
use anyhow::Result;

/// Fetch a feed, register the podcast, and insert its episodes.
pub async fn run_add(rss_url: &str, limit: Option<usize>, settings: Settings) -> Result<()> {
    Output::info(&format!("Fetching feed {}", rss_url));
    let (feed, entries) = fetch_feed(rss_url).await?;

    let store = SqliteStore::new(&settings.db_path())?;
    let slug = podcast_slug(&feed.title);
    let podcast = store.upsert_podcast(
        &feed.title,
        rss_url,
        feed.author.as_deref(),
        feed.description.as_deref(),
        &slug,
    )?;

    let mut added = 0usize;
    let mut skipped = 0usize;
    for entry in entries.into_iter().take(limit.unwrap_or(usize::MAX)) {
        if store.get_episode_by_guid(&entry.guid)?.is_some() {
            skipped += 1;
            continue;
        }
        store.insert_episode(&NewEpisode {
            podcast_id: podcast.id,
            guid: entry.guid,
            title: entry.title,
            description: entry.description,
            audio_url: entry.audio_url,
            published: entry.published,
            duration: entry.duration,
        })?;
        added += 1;
    }

    Output::header(&podcast.title);
    if let Some(author) = &podcast.author {
        Output::kv("Author", author);
    }
    Output::kv("Podcast ID", &podcast.id.to_string());
    Output::kv("New episodes", &added.to_string());
    if skipped > 0 {
        Output::kv("Already tracked", &skipped.to_string());
    }
    println!();
    Output::info("Process an episode with 'hark process <episode-id>'.");

    Ok(())
}
