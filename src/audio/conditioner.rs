//! Audio conditioning: recompress under the upload ceiling, chunk if needed.
//!
//! The provider caps uploads (~25MB), so source audio is first re-encoded
//! at a low speech-appropriate bitrate. When even the recompressed file
//! exceeds the ceiling, it is split into consecutive time chunks with a
//! fast stream copy; each chunk is transcribed independently and the texts
//! are joined in chunk order.

use crate::audio::file_size_mb;
use crate::config::AudioSettings;
use crate::error::{HarkError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Outcome of conditioning a source audio file.
#[derive(Debug)]
pub enum ConditionedAudio {
    /// One compressed file under the ceiling.
    Single(PathBuf),
    /// Ordered chunk files, each estimated to sit under the ceiling.
    Chunks(Vec<PathBuf>),
}

/// Prepares downloaded audio for upload to the transcription provider.
#[async_trait]
pub trait Conditioner: Send + Sync {
    async fn condition(&self, source: &Path, work_dir: &Path) -> Result<ConditionedAudio>;
}

/// ffmpeg-backed conditioner used in production.
pub struct FfmpegConditioner {
    settings: AudioSettings,
}

impl FfmpegConditioner {
    pub fn new(settings: AudioSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Conditioner for FfmpegConditioner {
    async fn condition(&self, source: &Path, work_dir: &Path) -> Result<ConditionedAudio> {
        condition_audio(source, work_dir, &self.settings).await
    }
}

/// Condition `source` for upload: recompress, then chunk if still too large.
///
/// `work_dir` receives `audio_compressed.mp3` and, when chunking triggers,
/// a `chunks/` subdirectory. Subprocess failure is fatal for the episode;
/// it signals a corrupt or unsupported source, not a transient condition.
#[instrument(skip_all, fields(source = %source.display()))]
pub async fn condition_audio(
    source: &Path,
    work_dir: &Path,
    settings: &AudioSettings,
) -> Result<ConditionedAudio> {
    let compressed = work_dir.join("audio_compressed.mp3");
    compress(source, &compressed, settings).await?;

    let compressed_mb = file_size_mb(&compressed)?;
    info!("Compressed to {:.1} MB at {}k", compressed_mb, settings.bitrate_kbps);

    if compressed_mb <= settings.max_upload_mb {
        return Ok(ConditionedAudio::Single(compressed));
    }

    let duration_secs = probe_duration(&compressed).await?;
    let chunk_secs = chunk_duration_secs(settings.max_upload_mb, compressed_mb, duration_secs);
    info!(
        "Still {:.1} MB, splitting {:.1} min into {} min chunks",
        compressed_mb,
        duration_secs / 60.0,
        chunk_secs / 60
    );

    let chunks_dir = work_dir.join("chunks");
    std::fs::create_dir_all(&chunks_dir)?;

    let mut chunk_paths = Vec::new();
    for (idx, offset) in chunk_offsets(duration_secs, chunk_secs).into_iter().enumerate() {
        let chunk_path = chunks_dir.join(format!("chunk_{idx}.mp3"));
        extract_chunk(&compressed, &chunk_path, offset, chunk_secs).await?;
        debug!("Created chunk {} at offset {:.0}s", idx, offset);
        chunk_paths.push(chunk_path);
    }

    Ok(ConditionedAudio::Chunks(chunk_paths))
}

/// Uniform chunk duration estimated to keep every chunk under the ceiling.
///
/// `floor((ceiling_mb / compressed_mb) * duration_minutes)` minutes. An
/// estimate, not a guarantee: the bitrate is roughly but not exactly
/// constant.
fn chunk_duration_secs(ceiling_mb: f64, compressed_mb: f64, duration_secs: f64) -> u64 {
    let duration_minutes = duration_secs / 60.0;
    let chunk_minutes = ((ceiling_mb / compressed_mb) * duration_minutes).floor() as u64;
    chunk_minutes.max(1) * 60
}

/// Chunk start offsets covering `[0, duration)` with no gaps or overlaps.
///
/// Offsets advance by `chunk_secs`; the final chunk may be shorter.
pub fn chunk_offsets(duration_secs: f64, chunk_secs: u64) -> Vec<f64> {
    let mut offsets = Vec::new();
    let mut current = 0.0;
    while current < duration_secs {
        offsets.push(current);
        current += chunk_secs as f64;
    }
    offsets
}

/// Re-encode to mono MP3 at the configured bitrate and sample rate.
async fn compress(source: &Path, dest: &Path, settings: &AudioSettings) -> Result<()> {
    let result = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i").arg(source)
        .arg("-b:a").arg(format!("{}k", settings.bitrate_kbps))
        .arg("-ar").arg(settings.sample_rate.to_string())
        .arg("-ac").arg("1")
        .arg("-loglevel").arg("error")
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    match result {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => {
            let err = String::from_utf8_lossy(&out.stderr);
            Err(HarkError::AudioProcessing(format!("ffmpeg compression failed: {err}")))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(HarkError::ToolNotFound("ffmpeg".into()))
        }
        Err(e) => Err(HarkError::AudioProcessing(format!("ffmpeg error: {e}"))),
    }
}

/// Extract one time chunk with a stream copy (no re-encoding).
async fn extract_chunk(source: &Path, dest: &Path, start: f64, length_secs: u64) -> Result<()> {
    let result = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i").arg(source)
        .arg("-ss").arg(format!("{start:.3}"))
        .arg("-t").arg(length_secs.to_string())
        .arg("-c").arg("copy")
        .arg("-loglevel").arg("error")
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    match result {
        Ok(out) if out.status.success() && dest.exists() => Ok(()),
        Ok(out) => {
            let err = String::from_utf8_lossy(&out.stderr);
            Err(HarkError::AudioProcessing(format!("Chunk extraction failed: {err}")))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(HarkError::ToolNotFound("ffmpeg".into()))
        }
        Err(e) => Err(HarkError::AudioProcessing(format!("ffmpeg error: {e}"))),
    }
}

/// Query audio duration in seconds via ffprobe.
async fn probe_duration(path: &Path) -> Result<f64> {
    let result = Command::new("ffprobe")
        .arg("-v").arg("error")
        .arg("-show_entries").arg("format=duration")
        .arg("-of").arg("default=noprint_wrappers=1:nokey=1")
        .arg(path)
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HarkError::ToolNotFound("ffprobe".into()));
        }
        Err(e) => {
            return Err(HarkError::AudioProcessing(format!("ffprobe failed: {e}")));
        }
    };

    if !output.status.success() {
        return Err(HarkError::AudioProcessing("ffprobe returned error".into()));
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|_| HarkError::AudioProcessing("Could not determine audio duration".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_cover_duration_without_gaps() {
        // Boundaries cover [0, D) stepping by C; only the final chunk
        // is short.
        let duration = 10_000.0;
        let chunk = 4800u64;
        let offsets = chunk_offsets(duration, chunk);

        assert_eq!(offsets, vec![0.0, 4800.0, 9600.0]);
        for pair in offsets.windows(2) {
            assert_eq!(pair[1] - pair[0], chunk as f64);
        }
        // Full coverage within one chunk of rounding.
        let last = *offsets.last().unwrap();
        assert!(last < duration && last + chunk as f64 >= duration);
    }

    #[test]
    fn three_hour_episode_splits_into_three_chunks() {
        // 180 min compressed to 54MB with a 24MB ceiling gives
        // floor((24/54)*180) = 80 minute chunks.
        let duration_secs = 180.0 * 60.0;
        let chunk_secs = chunk_duration_secs(24.0, 54.0, duration_secs);
        assert_eq!(chunk_secs, 80 * 60);

        let offsets = chunk_offsets(duration_secs, chunk_secs);
        assert_eq!(offsets.len(), 3);
        assert_eq!(offsets[1], 4800.0);
        assert_eq!(offsets[2], 9600.0);
        // Final chunk is the 20-minute remainder.
        assert_eq!(duration_secs - offsets[2], 20.0 * 60.0);
    }

    #[test]
    fn exact_multiple_has_no_empty_trailing_chunk() {
        let offsets = chunk_offsets(600.0, 300);
        assert_eq!(offsets, vec![0.0, 300.0]);
    }

    #[test]
    fn tiny_ratio_still_yields_progress() {
        // Degenerate ratios must not produce a zero-length chunk loop.
        assert_eq!(chunk_duration_secs(24.0, 10_000.0, 3600.0), 60);
    }
}
