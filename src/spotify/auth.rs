use chrono::Utc;
use reqwest::{Client, Url};

use crate::{
    config::SpotifyConfig,
    spotify::SpotifyError,
    types::{Token, TokenResponse},
};

/// OAuth 2.0 authorization code client for Spotify's accounts service.
///
/// The client secret never leaves the server: it is sent with HTTP basic
/// authentication on the token endpoint only.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scope: String,
    auth_url: String,
    token_url: String,
}

impl OAuthClient {
    /// Creates a client from the Spotify section of the configuration.
    ///
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client used for token requests
    /// * `config` - Client credentials, redirect URI, scope and endpoint URLs
    pub fn new(http: Client, config: &SpotifyConfig) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scope: config.scope.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
        }
    }

    /// Builds the URL the user is sent to in order to grant access.
    ///
    /// The URL carries the client ID, `response_type=code`, the redirect URI,
    /// the requested scope and the given state.
    ///
    /// # Arguments
    ///
    /// * `state` - Random value echoed back on the callback; it must be
    ///   compared with the one stored in the session there
    ///
    /// # Returns
    ///
    /// The full authorization URL as a string.
    ///
    /// # Errors
    ///
    /// Returns [`SpotifyError::Auth`] if the configured authorization
    /// endpoint is not a valid URL.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let url = oauth.authorize_url("f3a9c2")?;
    /// assert!(url.contains("state=f3a9c2"));
    /// ```
    pub fn authorize_url(&self, state: &str) -> Result<String, SpotifyError> {
        let url = Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", self.scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| SpotifyError::Auth(format!("invalid authorize url: {}", e)))?;

        Ok(url.into())
    }

    /// Exchanges an authorization code received on the callback for a token.
    ///
    /// Posts `grant_type=authorization_code` to the token endpoint with the
    /// client credentials in a basic `Authorization` header.
    ///
    /// # Arguments
    ///
    /// * `code` - The `code` query parameter Spotify redirected back with
    ///
    /// # Returns
    ///
    /// A [`Token`] stamped with the current time. When Spotify omits the
    /// scope, the requested scope is recorded instead.
    ///
    /// # Errors
    ///
    /// * [`SpotifyError::Auth`] - the token endpoint answered with a non-2xx
    ///   status, or the response carried no refresh token
    /// * [`SpotifyError::Http`] - the request failed or the body was not a
    ///   token response
    pub async fn exchange_code(&self, code: &str) -> Result<Token, SpotifyError> {
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await?;

        let refresh_token = response
            .refresh_token
            .clone()
            .ok_or_else(|| SpotifyError::Auth("no refresh token in response".to_string()))?;

        Ok(self.into_token(response, refresh_token))
    }

    /// Exchanges a refresh token for a fresh access token.
    ///
    /// Spotify does not always rotate refresh tokens; when the response carries
    /// none, the one passed in is kept.
    ///
    /// # Errors
    ///
    /// Same as [`OAuthClient::exchange_code`], except that a missing refresh
    /// token in the response is not an error.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token, SpotifyError> {
        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;

        let rotated = response
            .refresh_token
            .clone()
            .unwrap_or_else(|| refresh_token.to_string());

        Ok(self.into_token(response, rotated))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, SpotifyError> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SpotifyError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        Ok(response.json::<TokenResponse>().await?)
    }

    fn into_token(&self, response: TokenResponse, refresh_token: String) -> Token {
        Token {
            access_token: response.access_token,
            refresh_token,
            scope: response.scope.unwrap_or_else(|| self.scope.clone()),
            expires_in: response.expires_in,
            obtained_at: Utc::now().timestamp() as u64,
        }
    }
}
