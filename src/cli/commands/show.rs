//! Show command - episode details and summary.

use crate::cli::output::format_duration;
use crate::cli::Output;
use crate::config::Settings;
use crate::error_format::format_for_user;
use crate::store::{EpisodeStatus, SqliteStore};
use crate::summarize::Summary;
use anyhow::Result;

/// Show one episode's metadata, status, and summary.
pub fn run_show(episode_id: i64, settings: Settings) -> Result<()> {
    let store = SqliteStore::new(&settings.db_path())?;
    let episode = store
        .get_episode(episode_id)?
        .ok_or_else(|| anyhow::anyhow!("Episode {} not found", episode_id))?;
    let podcast = store.get_podcast(episode.podcast_id)?;

    Output::header(&episode.title);
    if let Some(podcast) = &podcast {
        Output::kv("Podcast", &podcast.title);
    }
    Output::kv("Status", &episode.status.to_string());
    if let Some(published) = episode.published {
        Output::kv("Published", &published.format("%Y-%m-%d").to_string());
    }
    if let Some(duration) = episode.duration {
        Output::kv("Duration", &format_duration(duration as f64));
    }
    if let Some(completed_at) = episode.completed_at {
        Output::kv("Completed", &completed_at.format("%Y-%m-%d %H:%M UTC").to_string());
    }

    match episode.status {
        EpisodeStatus::Failed => {
            let message = episode.error_message.unwrap_or_default();
            let friendly = format_for_user(&message);
            println!();
            Output::error(&friendly.friendly_message);
            Output::kv("Details", &friendly.original_error);
            Output::info(&format!("Retry with 'hark retry {}'.", episode_id));
        }
        EpisodeStatus::Completed => {
            if let Some(summary_json) = &episode.summary_json {
                let summary: Summary = serde_json::from_str(summary_json)?;
                println!("\n{}", summary.to_display_text());
            } else {
                Output::warning("Episode is completed but has no stored summary.");
            }
        }
        EpisodeStatus::Pending => {
            println!();
            Output::info(&format!("Not processed yet. Run 'hark process {}'.", episode_id));
        }
        _ => {
            println!();
            Output::info("Processing is in progress; check back shortly.");
        }
    }

    Ok(())
}
