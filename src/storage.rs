//! Filesystem layout for episode artifacts.
//!
//! Artifacts live under `storage_root/<podcast-slug>/<episode-id>/`. The
//! database records paths relative to the storage root so the root can be
//! relocated without invalidating records.

use crate::error::{HarkError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Root of the artifact tree. All persisted paths are relative to this.
#[derive(Debug, Clone)]
pub struct StorageRoot {
    root: PathBuf,
}

impl StorageRoot {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a relative artifact path to an absolute one.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Directory owned by one episode's processing run.
    pub fn episode_dir(&self, podcast_slug: &str, episode_id: i64) -> PathBuf {
        self.root.join(podcast_slug).join(episode_id.to_string())
    }

    /// Create a directory (and parents) under the root.
    pub fn ensure_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    /// Express an absolute path relative to the storage root.
    pub fn relativize(&self, absolute: &Path) -> Result<String> {
        absolute
            .strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().into_owned())
            .map_err(|_| {
                HarkError::InvalidInput(format!(
                    "Path {} is outside the storage root",
                    absolute.display()
                ))
            })
    }
}

/// Create a filesystem-safe slug for a podcast title.
///
/// Lowercases, strips special characters, collapses whitespace and
/// underscores to single hyphens, caps the length at 40 characters.
pub fn podcast_slug(title: &str) -> String {
    slugify(title, 40, "podcast")
}

fn slugify(text: &str, max_len: usize, fallback: &str) -> String {
    static STRIP: OnceLock<Regex> = OnceLock::new();
    static HYPHENATE: OnceLock<Regex> = OnceLock::new();
    static COLLAPSE: OnceLock<Regex> = OnceLock::new();

    let strip = STRIP.get_or_init(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
    let hyphenate = HYPHENATE.get_or_init(|| Regex::new(r"[\s_]+").expect("valid regex"));
    let collapse = COLLAPSE.get_or_init(|| Regex::new(r"-+").expect("valid regex"));

    let slug = text.to_lowercase();
    let slug = strip.replace_all(&slug, "");
    let slug = hyphenate.replace_all(&slug, "-");
    let slug = collapse.replace_all(&slug, "-");
    let slug = slug.trim_matches('-');

    let truncated: String = slug.chars().take(max_len).collect();
    let truncated = truncated.trim_end_matches('-');

    if truncated.is_empty() {
        fallback.to_string()
    } else {
        truncated.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_filesystem_safe() {
        assert_eq!(podcast_slug("10% Happier with Dan Harris"), "10-happier-with-dan-harris");
        assert_eq!(podcast_slug("  The  Daily!!  "), "the-daily");
        assert_eq!(podcast_slug("a_b_c"), "a-b-c");
    }

    #[test]
    fn slug_length_is_capped() {
        let long = "x".repeat(100);
        assert_eq!(podcast_slug(&long).len(), 40);
    }

    #[test]
    fn empty_title_falls_back() {
        assert_eq!(podcast_slug("!!!"), "podcast");
    }

    #[test]
    fn resolve_and_relativize_roundtrip() {
        let root = StorageRoot::new(PathBuf::from("/data/storage"));
        let dir = root.episode_dir("the-daily", 7);
        assert_eq!(dir, PathBuf::from("/data/storage/the-daily/7"));

        let rel = root.relativize(&dir.join("audio.mp3")).unwrap();
        assert_eq!(rel, "the-daily/7/audio.mp3");
        assert_eq!(root.resolve(&rel), dir.join("audio.mp3"));
    }

    #[test]
    fn relativize_rejects_paths_outside_root() {
        let root = StorageRoot::new(PathBuf::from("/data/storage"));
        assert!(root.relativize(Path::new("/elsewhere/audio.mp3")).is_err());
    }
}
