use axum::{Extension, Form, response::Html};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, COVER_DOWNLOAD_FAILED, COVER_NOT_FOUND, GENERATION_FAILED},
    info,
    server::AppState,
    spotify::{SpotifyError, artwork},
    success,
    types::{GenerateForm, VideoResult},
    video::GenerationJob,
    views, warning,
};

pub const DEFAULT_ART_STYLE: &str = "cinematic";

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Turns the cover of one song into a video.
///
/// Walks through artwork lookup, download and generation; any failure ends
/// the request on the error page; nothing is retried.
pub async fn generate_video(
    Extension(state): Extension<AppState>,
    session: Session,
    Form(form): Form<GenerateForm>,
) -> AppResult<Html<String>> {
    let Some(client) = state.auth.client(&session).await? else {
        return Err(AppError::Unauthenticated);
    };

    let song_id = non_empty(form.song_id).ok_or_else(|| AppError::page("No song selected"))?;
    let art_style = non_empty(form.art_style).unwrap_or_else(|| DEFAULT_ART_STYLE.to_string());
    let request_id = Uuid::new_v4();

    let track = match client.track(&song_id).await {
        Ok(track) => track,
        Err(SpotifyError::Unauthorized) => {
            state.auth.forget_token(&session).await?;
            return Err(AppError::Unauthenticated);
        }
        Err(e) => {
            warning!("Track lookup for {} failed: {}", song_id, e);
            return Err(AppError::page(COVER_NOT_FOUND));
        }
    };

    let Some(album_cover_url) = artwork::album_cover_url(&track) else {
        return Err(AppError::page(COVER_NOT_FOUND));
    };

    let image_path =
        match artwork::download_image(&state.http, &album_cover_url, &state.storage, request_id)
            .await
        {
            Ok(Some(path)) => path,
            Ok(None) => return Err(AppError::page(COVER_DOWNLOAD_FAILED)),
            Err(e) => {
                warning!("Cover download failed: {}", e);
                return Err(AppError::page(COVER_DOWNLOAD_FAILED));
            }
        };

    let artist_name = track.first_artist().unwrap_or("Unknown Artist").to_string();
    let prompt = state
        .generator
        .compose_prompt(&track.name, &artist_name, &art_style);

    info!(
        "Generating {} video for \"{}\" by {} (request {})",
        art_style, track.name, artist_name, request_id
    );

    let job = GenerationJob {
        request_id,
        image_path,
        prompt,
    };

    match state.generator.generate(&job).await {
        Ok(output) => {
            success!("Video ready for request {}", request_id);
            Ok(views::video_result(&VideoResult {
                video_url: output.location,
                song_name: track.name,
                artist_name,
                album_cover_url,
            }))
        }
        Err(e) => {
            warning!("Video generation for request {} failed: {}", request_id, e);
            Err(AppError::page(GENERATION_FAILED))
        }
    }
}
