//! CLI module for Hark.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Hark - Podcast Transcription and Summarization
///
/// Subscribe to podcast feeds, then turn episodes into transcripts and
/// structured summaries using an OpenAI-compatible provider.
#[derive(Parser, Debug)]
#[command(name = "hark")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Hark and verify system requirements
    Init,

    /// Subscribe to a podcast RSS feed and register its episodes
    Add {
        /// RSS feed URL
        rss_url: String,

        /// Only register the N most recent episodes
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List tracked episodes
    Episodes {
        /// Filter by status (pending, completed, failed, ...)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of episodes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only show episodes of one podcast
        #[arg(short, long)]
        podcast: Option<i64>,
    },

    /// Process an episode: download, transcribe, and summarize
    Process {
        /// Episode ID (see 'hark episodes')
        episode_id: i64,
    },

    /// Show an episode's details, transcript status, and summary
    Show {
        /// Episode ID
        episode_id: i64,
    },

    /// Retry a failed episode from scratch
    Retry {
        /// Episode ID
        episode_id: i64,
    },

    /// Start HTTP API server for integration with other systems
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
