use axum::{
    Extension,
    extract::Query,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::{
    error::{AppError, AppResult, LOGIN_FAILED},
    server::AppState,
    success,
    types::CallbackParams,
    utils, views, warning,
};

/// Login page, or straight to the dashboard when a token is in the session.
pub async fn index(Extension(state): Extension<AppState>, session: Session) -> AppResult<Response> {
    if state.auth.is_logged_in(&session).await? {
        Ok(Redirect::to("/dashboard").into_response())
    } else {
        Ok(views::login().into_response())
    }
}

/// Sends the user to Spotify's consent screen.
pub async fn login(Extension(state): Extension<AppState>, session: Session) -> AppResult<Redirect> {
    let csrf_state = utils::generate_state();
    state.auth.begin_login(&session, &csrf_state).await?;
    let auth_url = state.auth.oauth().authorize_url(&csrf_state)?;
    Ok(Redirect::to(&auth_url))
}

/// Completes the authorization code flow.
pub async fn callback(
    Extension(state): Extension<AppState>,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> AppResult<Redirect> {
    if let Some(reason) = params.error {
        warning!("Spotify authorization was not granted: {}", reason);
        return Err(AppError::page(format!("{}: {}", LOGIN_FAILED, reason)));
    }

    let Some(code) = params.code else {
        return Ok(Redirect::to("/"));
    };

    if !state
        .auth
        .verify_state(&session, params.state.as_deref())
        .await?
    {
        warning!("OAuth state mismatch on callback");
        return Err(AppError::page(LOGIN_FAILED));
    }

    let token = match state.auth.oauth().exchange_code(&code).await {
        Ok(token) => token,
        Err(e) => {
            warning!("Token exchange failed: {}", e);
            return Err(AppError::page(LOGIN_FAILED));
        }
    };

    session.cycle_id().await?;
    state.auth.store_token(&session, &token).await?;
    success!("Spotify login completed");

    Ok(Redirect::to("/dashboard"))
}

pub async fn logout(Extension(state): Extension<AppState>, session: Session) -> AppResult<Redirect> {
    state.auth.logout(&session).await?;
    Ok(Redirect::to("/"))
}
