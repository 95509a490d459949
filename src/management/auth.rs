use chrono::Utc;

use crate::{
    spotify::{OAuthClient, SpotifyError},
    types::Token,
};

/// Seconds before the actual expiry at which a token is treated as expired.
pub const EXPIRY_MARGIN_SECS: u64 = 60;

pub struct TokenManager {
    token: Token,
}

impl TokenManager {
    pub fn new(token: Token) -> Self {
        TokenManager { token }
    }

    /// Refreshes the token if it is expired.
    ///
    /// Returns `true` when a new token was obtained, so the caller knows it has
    /// to write it back. A failed refresh leaves the old token untouched.
    pub async fn ensure_fresh(&mut self, oauth: &OAuthClient) -> Result<bool, SpotifyError> {
        if !self.is_expired() {
            return Ok(false);
        }

        self.token = oauth.refresh(&self.token.refresh_token).await?;
        Ok(true)
    }

    pub fn is_expired(&self) -> bool {
        let now = Utc::now().timestamp() as u64;
        now + EXPIRY_MARGIN_SECS >= self.token.expires_at()
    }

    pub fn current_token(&self) -> &Token {
        &self.token
    }

    pub fn into_token(self) -> Token {
        self.token
    }
}
