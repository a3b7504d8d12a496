//! Audio acquisition and conditioning.
//!
//! `downloader` fetches episode audio over HTTP; `conditioner` recompresses
//! it under the provider's upload ceiling, splitting into ordered time
//! chunks when compression alone is not enough.

mod conditioner;
mod downloader;

pub use conditioner::{
    chunk_offsets, condition_audio, ConditionedAudio, Conditioner, FfmpegConditioner,
};
pub use downloader::{download_audio, AudioFetcher, HttpFetcher};

/// File size in megabytes.
pub fn file_size_mb(path: &std::path::Path) -> crate::error::Result<f64> {
    let bytes = std::fs::metadata(path)?.len();
    Ok(bytes as f64 / (1024.0 * 1024.0))
}
