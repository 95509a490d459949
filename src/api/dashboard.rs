use axum::{Extension, response::Html};
use tower_sessions::Session;

use crate::{
    error::{AppError, AppResult},
    server::AppState,
    spotify::{SpotifyError, catalog},
    views,
};

/// Playlists and liked songs of the logged-in user.
pub async fn dashboard(
    Extension(state): Extension<AppState>,
    session: Session,
) -> AppResult<Html<String>> {
    let Some(client) = state.auth.client(&session).await? else {
        return Err(AppError::Unauthenticated);
    };

    match catalog::load_library(&client).await {
        Ok(library) => Ok(views::dashboard(&library)),
        Err(SpotifyError::Unauthorized) => {
            state.auth.forget_token(&session).await?;
            Err(AppError::Unauthenticated)
        }
        Err(e) => Err(e.into()),
    }
}
