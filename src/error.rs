//! Errors surfaced by the HTTP handlers.

use axum::response::{IntoResponse, Redirect, Response};
use thiserror::Error;

use crate::{spotify::SpotifyError, views, warning};

pub const COVER_NOT_FOUND: &str = "Could not retrieve album cover";
pub const COVER_DOWNLOAD_FAILED: &str = "Failed to download album cover";
pub const GENERATION_FAILED: &str = "Video generation failed";
pub const LOGIN_FAILED: &str = "Spotify login failed";
pub const SPOTIFY_UNAVAILABLE: &str = "Could not load your music from Spotify";

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// No usable token in the session; the user is sent back to `/`.
    #[error("not logged in")]
    Unauthenticated,

    /// A failure the user sees as a message on the error page.
    #[error("{0}")]
    Page(String),

    #[error("session store error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("Spotify error: {0}")]
    Spotify(#[from] SpotifyError),
}

impl AppError {
    pub fn page(msg: impl Into<String>) -> Self {
        Self::Page(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthenticated => Redirect::to("/").into_response(),
            AppError::Page(message) => views::error(&message).into_response(),
            AppError::Session(e) => {
                warning!("Session store error: {}", e);
                views::error("Your session could not be read, please log in again").into_response()
            }
            AppError::Spotify(e) => {
                warning!("Spotify request failed: {}", e);
                views::error(SPOTIFY_UNAVAILABLE).into_response()
            }
        }
    }
}
