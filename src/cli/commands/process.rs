//! Process command - run one episode through the pipeline.

use crate::cli::Output;
use crate::config::Settings;
use crate::error_format::format_for_user;
use crate::pipeline::{DispatchOutcome, Pipeline};
use crate::store::{EpisodeStatus, SqliteStore};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Dispatch an episode and follow it to a terminal state.
pub async fn run_process(episode_id: i64, settings: Settings) -> Result<()> {
    let pipeline = Pipeline::from_settings(settings)?;

    match pipeline.dispatch(episode_id)? {
        DispatchOutcome::Started => {
            Output::info(&format!("Processing episode {}", episode_id));
            follow(&pipeline.store(), episode_id).await?;
        }
        DispatchOutcome::AlreadyProcessing => {
            Output::warning("This episode is already being processed.");
        }
        DispatchOutcome::AlreadyCompleted => {
            Output::info("This episode is already completed. Use 'hark show' to see the summary.");
        }
    }

    Ok(())
}

/// Poll the store until the episode reaches a terminal state, reporting
/// every status change along the way.
pub(super) async fn follow(store: &Arc<SqliteStore>, episode_id: i64) -> Result<()> {
    let mut last_status = String::new();

    loop {
        let episode = store
            .get_episode(episode_id)?
            .ok_or_else(|| anyhow::anyhow!("Episode {} disappeared", episode_id))?;

        let status = episode.status.to_string();
        if status != last_status {
            Output::info(&format!("Status: {}", status));
            last_status = status;
        }

        match episode.status {
            EpisodeStatus::Completed => {
                println!();
                Output::success("Episode completed.");
                Output::info(&format!("View the summary with 'hark show {}'.", episode_id));
                return Ok(());
            }
            EpisodeStatus::Failed => {
                let message = episode.error_message.unwrap_or_default();
                let friendly = format_for_user(&message);
                println!();
                Output::error(&friendly.friendly_message);
                Output::kv("Details", &friendly.original_error);
                Output::info(&format!("Retry with 'hark retry {}'.", episode_id));
                return Ok(());
            }
            _ => tokio::time::sleep(Duration::from_secs(2)).await,
        }
    }
}
