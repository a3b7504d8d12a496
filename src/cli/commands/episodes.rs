//! Episodes command - list tracked episodes.

use crate::cli::Output;
use crate::config::Settings;
use crate::store::{EpisodeStatus, SqliteStore};
use anyhow::Result;

/// List episodes, optionally filtered by status or podcast.
pub fn run_episodes(
    status: Option<&str>,
    limit: usize,
    podcast: Option<i64>,
    settings: Settings,
) -> Result<()> {
    if let Some(status) = status {
        // Reject typos up front instead of silently matching nothing.
        status
            .parse::<EpisodeStatus>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }

    let store = SqliteStore::new(&settings.db_path())?;
    let mut episodes = match podcast {
        Some(podcast_id) => store.episodes_for_podcast(podcast_id)?,
        None => store.list_episodes(status, limit)?,
    };
    if podcast.is_some() {
        if let Some(status) = status {
            episodes.retain(|e| e.status.to_string() == status);
        }
        episodes.truncate(limit);
    }

    if episodes.is_empty() {
        Output::info("No episodes found. Subscribe with 'hark add <rss-url>'.");
        return Ok(());
    }

    Output::header("Episodes");
    for episode in &episodes {
        Output::episode_row(episode);
        if episode.status == EpisodeStatus::Failed {
            if let Some(message) = &episode.error_message {
                let friendly = crate::error_format::format_for_user(message);
                println!("      {}", console::style(&friendly.friendly_message).red());
            }
        }
    }
    println!();
    Output::info(&format!("{} episode(s)", episodes.len()));

    Ok(())
}
