//! Retry command - reprocess a failed episode from scratch.

use crate::cli::Output;
use crate::config::Settings;
use crate::pipeline::{DispatchOutcome, Pipeline};
use crate::store::EpisodeStatus;
use anyhow::Result;

/// Reset a failed episode and run it through the pipeline again.
pub async fn run_retry(episode_id: i64, settings: Settings) -> Result<()> {
    let pipeline = Pipeline::from_settings(settings)?;
    let store = pipeline.store();

    let episode = store
        .get_episode(episode_id)?
        .ok_or_else(|| anyhow::anyhow!("Episode {} not found", episode_id))?;

    match episode.status {
        EpisodeStatus::Failed | EpisodeStatus::Pending => {
            store.reset_to_pending(episode_id)?;
        }
        EpisodeStatus::Completed => {
            Output::info("This episode is already completed; nothing to retry.");
            return Ok(());
        }
        _ => {
            Output::warning("This episode is currently being processed; wait for it to finish.");
            return Ok(());
        }
    }

    match pipeline.dispatch(episode_id)? {
        DispatchOutcome::Started => {
            Output::info(&format!("Retrying episode {}", episode_id));
            super::process::follow(&store, episode_id).await?;
        }
        DispatchOutcome::AlreadyProcessing => {
            Output::warning("Another run claimed this episode first.");
        }
        DispatchOutcome::AlreadyCompleted => {
            Output::info("This episode is already completed.");
        }
    }

    Ok(())
}
