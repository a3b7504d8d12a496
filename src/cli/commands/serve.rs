//! HTTP API server for integration with other systems.
//!
//! Exposes podcast subscription, episode status, and processing dispatch
//! over REST. Processing runs in background tasks; clients poll episode
//! status to observe progress.

use crate::cli::Output;
use crate::config::Settings;
use crate::error_format::{format_for_user, UserFacingError};
use crate::feed::fetch_feed;
use crate::pipeline::{DispatchOutcome, Pipeline};
use crate::storage::podcast_slug;
use crate::store::{Episode, EpisodeStatus, NewEpisode, Podcast, SqliteStore};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared application state.
struct AppState {
    pipeline: Arc<Pipeline>,
    store: Arc<SqliteStore>,
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_settings(settings)?;
    let store = pipeline.store();

    let state = Arc::new(AppState { pipeline, store });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/podcasts", get(list_podcasts).post(add_podcast))
        .route("/podcasts/{podcast_id}/episodes", get(podcast_episodes))
        .route("/episodes", get(list_episodes))
        .route("/episodes/{episode_id}", get(get_episode))
        .route("/episodes/{episode_id}/process", post(process_episode))
        .route("/episodes/{episode_id}/retry", post(retry_episode))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Hark API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("List Podcasts", "GET  /podcasts");
    Output::kv("Add Podcast", "POST /podcasts");
    Output::kv("Podcast Episodes", "GET  /podcasts/:id/episodes");
    Output::kv("List Episodes", "GET  /episodes");
    Output::kv("Get Episode", "GET  /episodes/:id");
    Output::kv("Process Episode", "POST /episodes/:id/process");
    Output::kv("Retry Episode", "POST /episodes/:id/retry");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct AddPodcastRequest {
    rss_url: String,
    /// Only register the N most recent episodes
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct AddPodcastResponse {
    podcast: PodcastInfo,
    episodes_added: usize,
}

#[derive(Serialize)]
struct PodcastInfo {
    id: i64,
    title: String,
    rss_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<String>,
}

#[derive(Serialize)]
struct PodcastListResponse {
    podcasts: Vec<PodcastInfo>,
    total: usize,
}

#[derive(Deserialize)]
struct EpisodesQuery {
    status: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
struct EpisodeListResponse {
    episodes: Vec<EpisodeInfo>,
    total: usize,
}

#[derive(Serialize)]
struct EpisodeInfo {
    id: i64,
    podcast_id: i64,
    title: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    published: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_seconds: Option<i64>,
    has_transcript: bool,
    has_summary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<UserFacingError>,
}

#[derive(Serialize)]
struct EpisodeDetailResponse {
    #[serde(flatten)]
    info: EpisodeInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ProcessResponse {
    episode_id: i64,
    dispatched: bool,
    status: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl EpisodeInfo {
    fn from_episode(episode: &Episode) -> Self {
        Self {
            id: episode.id,
            podcast_id: episode.podcast_id,
            title: episode.title.clone(),
            status: episode.status.to_string(),
            published: episode.published.map(|dt| dt.to_rfc3339()),
            duration_seconds: episode.duration,
            has_transcript: episode.transcript_text.is_some(),
            has_summary: episode.summary_json.is_some(),
            error: episode.error_message.as_deref().map(format_for_user),
        }
    }
}

impl PodcastInfo {
    fn from_podcast(podcast: &Podcast) -> Self {
        Self {
            id: podcast.id,
            title: podcast.title.clone(),
            rss_url: podcast.rss_url.clone(),
            author: podcast.author.clone(),
        }
    }
}

fn internal_error(e: impl std::fmt::Display) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: e.to_string() }),
    )
        .into_response()
}

fn not_found(what: String) -> axum::response::Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: what })).into_response()
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_podcasts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.list_podcasts() {
        Ok(podcasts) => Json(PodcastListResponse {
            total: podcasts.len(),
            podcasts: podcasts.iter().map(PodcastInfo::from_podcast).collect(),
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

async fn add_podcast(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddPodcastRequest>,
) -> impl IntoResponse {
    let (feed, entries) = match fetch_feed(&req.rss_url).await {
        Ok(parsed) => parsed,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse { error: e.to_string() }),
            )
                .into_response()
        }
    };

    let slug = podcast_slug(&feed.title);
    let podcast = match state.store.upsert_podcast(
        &feed.title,
        &req.rss_url,
        feed.author.as_deref(),
        feed.description.as_deref(),
        &slug,
    ) {
        Ok(podcast) => podcast,
        Err(e) => return internal_error(e),
    };

    let mut added = 0usize;
    for entry in entries.into_iter().take(req.limit.unwrap_or(usize::MAX)) {
        match state.store.get_episode_by_guid(&entry.guid) {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(e) => return internal_error(e),
        }
        let result = state.store.insert_episode(&NewEpisode {
            podcast_id: podcast.id,
            guid: entry.guid,
            title: entry.title,
            description: entry.description,
            audio_url: entry.audio_url,
            published: entry.published,
            duration: entry.duration,
        });
        match result {
            Ok(_) => added += 1,
            Err(e) => return internal_error(e),
        }
    }

    Json(AddPodcastResponse {
        podcast: PodcastInfo::from_podcast(&podcast),
        episodes_added: added,
    })
    .into_response()
}

async fn podcast_episodes(
    State(state): State<Arc<AppState>>,
    Path(podcast_id): Path<i64>,
) -> impl IntoResponse {
    match state.store.get_podcast(podcast_id) {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(format!("Podcast not found: {}", podcast_id)),
        Err(e) => return internal_error(e),
    }

    match state.store.episodes_for_podcast(podcast_id) {
        Ok(episodes) => Json(EpisodeListResponse {
            total: episodes.len(),
            episodes: episodes.iter().map(EpisodeInfo::from_episode).collect(),
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

async fn list_episodes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EpisodesQuery>,
) -> impl IntoResponse {
    if let Some(status) = &query.status {
        if status.parse::<EpisodeStatus>().is_err() {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("Unknown status filter: {}", status),
                }),
            )
                .into_response();
        }
    }

    match state.store.list_episodes(query.status.as_deref(), query.limit) {
        Ok(episodes) => Json(EpisodeListResponse {
            total: episodes.len(),
            episodes: episodes.iter().map(EpisodeInfo::from_episode).collect(),
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_episode(
    State(state): State<Arc<AppState>>,
    Path(episode_id): Path<i64>,
) -> impl IntoResponse {
    let episode = match state.store.get_episode(episode_id) {
        Ok(Some(episode)) => episode,
        Ok(None) => return not_found(format!("Episode not found: {}", episode_id)),
        Err(e) => return internal_error(e),
    };

    let summary = episode
        .summary_json
        .as_deref()
        .and_then(|json| serde_json::from_str(json).ok());

    Json(EpisodeDetailResponse {
        info: EpisodeInfo::from_episode(&episode),
        transcript: episode.transcript_text,
        summary,
    })
    .into_response()
}

async fn process_episode(
    State(state): State<Arc<AppState>>,
    Path(episode_id): Path<i64>,
) -> impl IntoResponse {
    dispatch_response(&state, episode_id, false)
}

async fn retry_episode(
    State(state): State<Arc<AppState>>,
    Path(episode_id): Path<i64>,
) -> impl IntoResponse {
    dispatch_response(&state, episode_id, true)
}

/// Dispatch an episode and render the outcome.
///
/// A retry resets a failed episode first so the run starts from scratch.
fn dispatch_response(
    state: &Arc<AppState>,
    episode_id: i64,
    reset_first: bool,
) -> axum::response::Response {
    let episode = match state.store.get_episode(episode_id) {
        Ok(Some(episode)) => episode,
        Ok(None) => return not_found(format!("Episode not found: {}", episode_id)),
        Err(e) => return internal_error(e),
    };

    if reset_first
        && matches!(episode.status, EpisodeStatus::Failed | EpisodeStatus::Pending)
    {
        if let Err(e) = state.store.reset_to_pending(episode_id) {
            return internal_error(e);
        }
    }

    match state.pipeline.dispatch(episode_id) {
        Ok(DispatchOutcome::Started) => Json(ProcessResponse {
            episode_id,
            dispatched: true,
            status: EpisodeStatus::Downloading.to_string(),
        })
        .into_response(),
        Ok(DispatchOutcome::AlreadyProcessing) => (
            StatusCode::CONFLICT,
            Json(ProcessResponse {
                episode_id,
                dispatched: false,
                status: episode.status.to_string(),
            }),
        )
            .into_response(),
        Ok(DispatchOutcome::AlreadyCompleted) => Json(ProcessResponse {
            episode_id,
            dispatched: false,
            status: EpisodeStatus::Completed.to_string(),
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}
