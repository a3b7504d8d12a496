//! Hark - Podcast Transcription and Summarization
//!
//! Subscribe to podcast RSS feeds and turn episodes into transcripts and
//! structured summaries using an OpenAI-compatible provider.
//!
//! # Overview
//!
//! Hark allows you to:
//! - Subscribe to podcast feeds and track their episodes
//! - Download and condition episode audio under provider upload limits
//! - Transcribe audio, splitting long episodes into chunks
//! - Generate four-section summaries (executive summary, key themes,
//!   notable quotes, actionable insights)
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `feed` - RSS feed fetching and parsing
//! - `audio` - Audio download and conditioning (compression, chunking)
//! - `provider` - Transcription and language-model API clients
//! - `retry` - Rate-limit-aware retry controller
//! - `summarize` - Map-reduce transcript summarization
//! - `store` - SQLite-backed podcast and episode records
//! - `storage` - Filesystem layout for episode artifacts
//! - `pipeline` - Episode processing state machine
//!
//! # Example
//!
//! ```rust,no_run
//! use hark::config::Settings;
//! use hark::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pipeline = Pipeline::from_settings(settings)?;
//!
//!     // Download, transcribe, and summarize episode 1 in the background.
//!     pipeline.dispatch(1)?;
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod error_format;
pub mod feed;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod storage;
pub mod store;
pub mod summarize;

pub use error::{HarkError, Result};
