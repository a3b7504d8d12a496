//! SQLite-backed podcast and episode store.

use super::{Episode, EpisodeStatus, NewEpisode, Podcast};
use crate::error::{HarkError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS podcasts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    rss_url TEXT NOT NULL UNIQUE,
    author TEXT,
    description TEXT,
    slug TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS episodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    podcast_id INTEGER NOT NULL REFERENCES podcasts(id),
    guid TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT,
    audio_url TEXT NOT NULL,
    published TEXT,
    duration INTEGER,
    status TEXT NOT NULL DEFAULT 'pending',
    error_message TEXT,
    audio_path TEXT,
    transcript_path TEXT,
    summary_path TEXT,
    transcript_text TEXT,
    summary_json TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_episodes_podcast_id ON episodes(podcast_id);
CREATE INDEX IF NOT EXISTS idx_episodes_status ON episodes(status);
"#;

/// SQLite store for podcasts and episodes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened episode store at {:?}", path);
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| HarkError::Config(format!("Store lock poisoned: {e}")))
    }

    // === Podcasts ===

    /// Insert a podcast, or return the existing record for the same feed URL.
    pub fn upsert_podcast(
        &self,
        title: &str,
        rss_url: &str,
        author: Option<&str>,
        description: Option<&str>,
        slug: &str,
    ) -> Result<Podcast> {
        let conn = self.lock()?;

        if let Some(existing) = conn
            .query_row(
                "SELECT id, title, rss_url, author, description, slug, created_at
                 FROM podcasts WHERE rss_url = ?1",
                params![rss_url],
                podcast_from_row,
            )
            .optional()?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO podcasts (title, rss_url, author, description, slug, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![title, rss_url, author, description, slug, now.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Created podcast {} ({})", id, title);

        Ok(Podcast {
            id,
            title: title.to_string(),
            rss_url: rss_url.to_string(),
            author: author.map(String::from),
            description: description.map(String::from),
            slug: slug.to_string(),
            created_at: now,
        })
    }

    pub fn get_podcast(&self, id: i64) -> Result<Option<Podcast>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id, title, rss_url, author, description, slug, created_at
                 FROM podcasts WHERE id = ?1",
                params![id],
                podcast_from_row,
            )
            .optional()?)
    }

    pub fn list_podcasts(&self) -> Result<Vec<Podcast>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, rss_url, author, description, slug, created_at
             FROM podcasts ORDER BY created_at DESC",
        )?;
        let podcasts = stmt
            .query_map([], podcast_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(podcasts)
    }

    // === Episodes ===

    /// Insert a new episode in `pending` status.
    pub fn insert_episode(&self, new: &NewEpisode) -> Result<Episode> {
        let conn = self.lock()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO episodes
             (podcast_id, guid, title, description, audio_url, published, duration,
              status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)",
            params![
                new.podcast_id,
                new.guid,
                new.title,
                new.description,
                new.audio_url,
                new.published.map(|dt| dt.to_rfc3339()),
                new.duration,
                now.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Created episode {} ({})", id, new.title);
        drop(conn);

        self.get_episode(id)?
            .ok_or_else(|| HarkError::NotFound(format!("Episode {id} after insert")))
    }

    pub fn get_episode(&self, id: i64) -> Result<Option<Episode>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("{EPISODE_SELECT} WHERE id = ?1"),
                params![id],
                episode_from_row,
            )
            .optional()?)
    }

    pub fn get_episode_by_guid(&self, guid: &str) -> Result<Option<Episode>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("{EPISODE_SELECT} WHERE guid = ?1"),
                params![guid],
                episode_from_row,
            )
            .optional()?)
    }

    /// List recent episodes, optionally filtered by status string.
    pub fn list_episodes(&self, status: Option<&str>, limit: usize) -> Result<Vec<Episode>> {
        let conn = self.lock()?;
        let episodes = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "{EPISODE_SELECT} WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![status, limit as i64], episode_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{EPISODE_SELECT} ORDER BY created_at DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit as i64], episode_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(episodes)
    }

    pub fn episodes_for_podcast(&self, podcast_id: i64) -> Result<Vec<Episode>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{EPISODE_SELECT} WHERE podcast_id = ?1 ORDER BY created_at DESC"
        ))?;
        let episodes = stmt
            .query_map(params![podcast_id], episode_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(episodes)
    }

    /// Atomically claim an episode for processing.
    ///
    /// The compound update transitions `pending|failed -> downloading` and
    /// clears any prior error in one statement; a concurrent dispatcher
    /// that lost the race affects zero rows and returns false. This is the
    /// sole defense against duplicate runs, so it must not be split into a
    /// read followed by a write.
    pub fn claim_for_processing(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE episodes SET status = 'downloading', error_message = NULL
             WHERE id = ?1 AND status IN ('pending', 'failed')",
            params![id],
        )?;
        Ok(updated == 1)
    }

    /// Persist a status transition.
    pub fn set_status(&self, id: i64, status: &EpisodeStatus) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE episodes SET status = ?1 WHERE id = ?2",
            params![status.to_string(), id],
        )?;
        Ok(())
    }

    /// Reset a terminal or stuck episode back to `pending` for retry.
    pub fn reset_to_pending(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE episodes SET status = 'pending', error_message = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Record terminal failure with the triggering error's message verbatim.
    pub fn mark_failed(&self, id: i64, error_message: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE episodes SET status = 'failed', error_message = ?1 WHERE id = ?2",
            params![error_message, id],
        )?;
        Ok(())
    }

    /// Record completion; sets `completed_at` exactly once.
    pub fn mark_completed(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE episodes SET status = 'completed',
             completed_at = COALESCE(completed_at, ?1)
             WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn set_audio_path(&self, id: i64, audio_path: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE episodes SET audio_path = ?1 WHERE id = ?2",
            params![audio_path, id],
        )?;
        Ok(())
    }

    pub fn set_transcript(&self, id: i64, transcript_path: &str, text: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE episodes SET transcript_path = ?1, transcript_text = ?2 WHERE id = ?3",
            params![transcript_path, text, id],
        )?;
        Ok(())
    }

    pub fn set_summary(&self, id: i64, summary_path: &str, summary_json: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE episodes SET summary_path = ?1, summary_json = ?2 WHERE id = ?3",
            params![summary_path, summary_json, id],
        )?;
        Ok(())
    }
}

const EPISODE_SELECT: &str = "SELECT id, podcast_id, guid, title, description, audio_url,
    published, duration, status, error_message, audio_path, transcript_path,
    summary_path, transcript_text, summary_json, created_at, completed_at
    FROM episodes";

fn podcast_from_row(row: &Row<'_>) -> rusqlite::Result<Podcast> {
    Ok(Podcast {
        id: row.get(0)?,
        title: row.get(1)?,
        rss_url: row.get(2)?,
        author: row.get(3)?,
        description: row.get(4)?,
        slug: row.get(5)?,
        created_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

fn episode_from_row(row: &Row<'_>) -> rusqlite::Result<Episode> {
    let status_str: String = row.get(8)?;
    let status = status_str.parse::<EpisodeStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;

    Ok(Episode {
        id: row.get(0)?,
        podcast_id: row.get(1)?,
        guid: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        audio_url: row.get(5)?,
        published: row.get::<_, Option<String>>(6)?.map(parse_datetime),
        duration: row.get(7)?,
        status,
        error_message: row.get(9)?,
        audio_path: row.get(10)?,
        transcript_path: row.get(11)?,
        summary_path: row.get(12)?,
        transcript_text: row.get(13)?,
        summary_json: row.get(14)?,
        created_at: parse_datetime(row.get::<_, String>(15)?),
        completed_at: row.get::<_, Option<String>>(16)?.map(parse_datetime),
    })
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_episode() -> (SqliteStore, i64) {
        let store = SqliteStore::in_memory().unwrap();
        let podcast = store
            .upsert_podcast("Test Cast", "https://example.com/feed.xml", None, None, "test-cast")
            .unwrap();
        let episode = store
            .insert_episode(&NewEpisode {
                podcast_id: podcast.id,
                guid: "guid-1".to_string(),
                title: "Episode One".to_string(),
                description: None,
                audio_url: "https://example.com/1.mp3".to_string(),
                published: None,
                duration: Some(2400),
            })
            .unwrap();
        (store, episode.id)
    }

    #[test]
    fn upsert_podcast_is_idempotent_on_feed_url() {
        let store = SqliteStore::in_memory().unwrap();
        let first = store
            .upsert_podcast("Cast", "https://example.com/feed.xml", Some("Host"), None, "cast")
            .unwrap();
        let second = store
            .upsert_podcast("Cast Renamed", "https://example.com/feed.xml", None, None, "x")
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "Cast");
    }

    #[test]
    fn new_episodes_start_pending() {
        let (store, id) = store_with_episode();
        let episode = store.get_episode(id).unwrap().unwrap();
        assert_eq!(episode.status, EpisodeStatus::Pending);
        assert!(episode.audio_path.is_none());
        assert!(episode.completed_at.is_none());
    }

    #[test]
    fn claim_succeeds_once_until_terminal() {
        let (store, id) = store_with_episode();

        assert!(store.claim_for_processing(id).unwrap());
        // A second dispatch while in flight loses the claim race.
        assert!(!store.claim_for_processing(id).unwrap());

        let episode = store.get_episode(id).unwrap().unwrap();
        assert_eq!(episode.status, EpisodeStatus::Downloading);
    }

    #[test]
    fn claim_clears_prior_error_on_failed_retry() {
        let (store, id) = store_with_episode();
        store.mark_failed(id, "boom").unwrap();

        assert!(store.claim_for_processing(id).unwrap());
        let episode = store.get_episode(id).unwrap().unwrap();
        assert_eq!(episode.status, EpisodeStatus::Downloading);
        assert!(episode.error_message.is_none());
    }

    #[test]
    fn completed_episodes_cannot_be_claimed() {
        let (store, id) = store_with_episode();
        store.mark_completed(id).unwrap();
        assert!(!store.claim_for_processing(id).unwrap());
    }

    #[test]
    fn completed_at_is_set_exactly_once() {
        let (store, id) = store_with_episode();
        store.mark_completed(id).unwrap();
        let first = store.get_episode(id).unwrap().unwrap().completed_at.unwrap();

        store.mark_completed(id).unwrap();
        let second = store.get_episode(id).unwrap().unwrap().completed_at.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn chunk_progress_status_roundtrips_through_db() {
        let (store, id) = store_with_episode();
        store
            .set_status(id, &EpisodeStatus::TranscribingChunk { current: 2, total: 3 })
            .unwrap();
        let episode = store.get_episode(id).unwrap().unwrap();
        assert_eq!(
            episode.status,
            EpisodeStatus::TranscribingChunk { current: 2, total: 3 }
        );
    }

    #[test]
    fn artifacts_persist() {
        let (store, id) = store_with_episode();
        store.set_audio_path(id, "test-cast/1/audio.mp3").unwrap();
        store.set_transcript(id, "test-cast/1/transcript.txt", "hello").unwrap();
        store.set_summary(id, "test-cast/1/summary.json", "{}").unwrap();

        let episode = store.get_episode(id).unwrap().unwrap();
        assert_eq!(episode.audio_path.as_deref(), Some("test-cast/1/audio.mp3"));
        assert_eq!(episode.transcript_text.as_deref(), Some("hello"));
        assert_eq!(episode.summary_json.as_deref(), Some("{}"));
    }

    #[test]
    fn list_filters_by_status() {
        let (store, id) = store_with_episode();
        store.mark_failed(id, "boom").unwrap();

        assert_eq!(store.list_episodes(Some("failed"), 10).unwrap().len(), 1);
        assert_eq!(store.list_episodes(Some("completed"), 10).unwrap().len(), 0);
        assert_eq!(store.list_episodes(None, 10).unwrap().len(), 1);
    }
}
