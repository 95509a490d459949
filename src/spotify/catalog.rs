use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    spotify::SpotifyError,
    types::{Library, Paging, PlaylistSummary, PlaylistView, Track, TrackItem, TrackView},
    utils,
};

/// Page size used for every collection request. Only the first page is read.
pub const CATALOG_PAGE_LIMIT: u32 = 50;

/// An authenticated handle to the Spotify Web API.
///
/// Cheap to build; one is created per request from the session token.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: Client,
    api_url: String,
    access_token: String,
}

impl SpotifyClient {
    pub fn new(http: Client, api_url: &str, access_token: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, SpotifyError> {
        let api_url = format!("{uri}{endpoint}", uri = self.api_url, endpoint = endpoint);
        let response = self
            .http
            .get(&api_url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<T>().await?),
            StatusCode::UNAUTHORIZED => Err(SpotifyError::Unauthorized),
            status => Err(SpotifyError::Status {
                status,
                endpoint: endpoint.to_string(),
            }),
        }
    }

    /// `GET /me/playlists`, first page.
    ///
    /// # Arguments
    ///
    /// * `limit` - Maximum number of playlists to return (Spotify caps it at 50)
    ///
    /// # Errors
    ///
    /// Returns [`SpotifyError::Unauthorized`] when the access token is
    /// rejected and [`SpotifyError::Status`] for any other non-200 answer.
    pub async fn current_user_playlists(
        &self,
        limit: u32,
    ) -> Result<Vec<PlaylistSummary>, SpotifyError> {
        let page: Paging<PlaylistSummary> = self
            .get("/me/playlists", &[("limit", limit.to_string())])
            .await?;
        Ok(page.items)
    }

    /// `GET /playlists/{id}/tracks`, first page with the API's default size.
    ///
    /// Items whose track is `null` (removed or unavailable) are skipped.
    pub async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, SpotifyError> {
        let page: Paging<TrackItem> = self
            .get(&format!("/playlists/{}/tracks", playlist_id), &[])
            .await?;
        Ok(page.items.into_iter().filter_map(|i| i.track).collect())
    }

    /// `GET /me/tracks` (liked songs), first page.
    pub async fn saved_tracks(&self, limit: u32) -> Result<Vec<Track>, SpotifyError> {
        let page: Paging<TrackItem> = self
            .get("/me/tracks", &[("limit", limit.to_string())])
            .await?;
        Ok(page.items.into_iter().filter_map(|i| i.track).collect())
    }

    /// `GET /tracks/{id}`.
    pub async fn track(&self, track_id: &str) -> Result<Track, SpotifyError> {
        self.get(&format!("/tracks/{}", track_id), &[]).await
    }
}

/// Loads everything the dashboard shows: up to 50 playlists with their
/// tracks and up to 50 liked songs.
///
/// Playlists are fetched one after another, then the liked songs. Tracks
/// without an ID (local files) are dropped, and each remaining track keeps
/// the URL of its album's first image, if any.
///
/// # Arguments
///
/// * `client` - Authenticated catalog handle for the current session
///
/// # Returns
///
/// A [`Library`] ready for the dashboard template.
///
/// # Errors
///
/// The first failing request aborts the whole load. A rejected token
/// surfaces as [`SpotifyError::Unauthorized`] so the caller can send the
/// user back to log in.
pub async fn load_library(client: &SpotifyClient) -> Result<Library, SpotifyError> {
    let mut playlists = Vec::new();
    for playlist in client.current_user_playlists(CATALOG_PAGE_LIMIT).await? {
        let tracks = client.playlist_tracks(&playlist.id).await?;
        playlists.push(PlaylistView {
            name: playlist.name,
            tracks: project(&tracks),
        });
    }

    let liked = client.saved_tracks(CATALOG_PAGE_LIMIT).await?;

    Ok(Library {
        playlists,
        liked_songs: project(&liked),
    })
}

fn project(tracks: &[Track]) -> Vec<TrackView> {
    tracks.iter().filter_map(utils::track_view).collect()
}
