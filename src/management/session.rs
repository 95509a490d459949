use reqwest::Client;
use tower_sessions::{Session, session};

use crate::{
    management::TokenManager,
    spotify::{OAuthClient, SpotifyClient},
    types::Token,
    warning,
};

pub const TOKEN_KEY: &str = "token_info";
pub const STATE_KEY: &str = "oauth_state";

/// Bridges the per-user session store and the Spotify client.
///
/// The session only ever holds the token bundle and, between `/login` and
/// `/callback`, the pending OAuth state.
#[derive(Debug, Clone)]
pub struct SessionAuth {
    oauth: OAuthClient,
    http: Client,
    api_url: String,
}

impl SessionAuth {
    pub fn new(oauth: OAuthClient, http: Client, api_url: &str) -> Self {
        Self {
            oauth,
            http,
            api_url: api_url.to_string(),
        }
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    pub async fn is_logged_in(&self, session: &Session) -> Result<bool, session::Error> {
        Ok(session.get::<Token>(TOKEN_KEY).await?.is_some())
    }

    /// Returns an authenticated catalog handle, or `None` without a session token.
    ///
    /// An expired token is refreshed first and the new one written back to the
    /// session. If the refresh fails the token is dropped from the session and
    /// the caller is treated as logged out.
    pub async fn client(&self, session: &Session) -> Result<Option<SpotifyClient>, session::Error> {
        let Some(token) = session.get::<Token>(TOKEN_KEY).await? else {
            return Ok(None);
        };

        let mut manager = TokenManager::new(token);
        match manager.ensure_fresh(&self.oauth).await {
            Ok(true) => session.insert(TOKEN_KEY, manager.current_token()).await?,
            Ok(false) => {}
            Err(e) => {
                warning!("Token refresh failed, logging out: {}", e);
                self.forget_token(session).await?;
                return Ok(None);
            }
        }

        let token = manager.into_token();
        Ok(Some(SpotifyClient::new(
            self.http.clone(),
            &self.api_url,
            &token.access_token,
        )))
    }

    pub async fn store_token(&self, session: &Session, token: &Token) -> Result<(), session::Error> {
        session.insert(TOKEN_KEY, token).await
    }

    pub async fn forget_token(&self, session: &Session) -> Result<(), session::Error> {
        session.remove::<Token>(TOKEN_KEY).await?;
        Ok(())
    }

    /// Generates and remembers the state for a new authorization request.
    pub async fn begin_login(&self, session: &Session, state: &str) -> Result<(), session::Error> {
        session.insert(STATE_KEY, state).await
    }

    /// Consumes the pending state and compares it with the one echoed back.
    pub async fn verify_state(
        &self,
        session: &Session,
        returned: Option<&str>,
    ) -> Result<bool, session::Error> {
        let expected = session.remove::<String>(STATE_KEY).await?;
        Ok(match (expected, returned) {
            (Some(expected), Some(returned)) => expected == returned,
            _ => false,
        })
    }

    pub async fn logout(&self, session: &Session) -> Result<(), session::Error> {
        session.flush().await
    }
}
