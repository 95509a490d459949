use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub expires_in: u64,
    pub obtained_at: u64,
}

impl Token {
    pub fn expires_at(&self) -> u64 {
        self.obtained_at.saturating_add(self.expires_in)
    }
}

/// Body of the accounts service token endpoint, for both the
/// `authorization_code` and the `refresh_token` grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackArtist {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

/// A track as returned by the Web API.
///
/// `id` is null for local files and `album` is missing for podcast episodes
/// that show up in playlists, so both are optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<TrackArtist>,
    #[serde(default)]
    pub album: Option<Album>,
}

impl Track {
    pub fn first_artist(&self) -> Option<&str> {
        self.artists.first().map(|a| a.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paging<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
}

/// Entry of `/playlists/{id}/tracks` and `/me/tracks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackItem {
    #[serde(default)]
    pub track: Option<Track>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackView {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album_cover: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistView {
    pub name: String,
    pub tracks: Vec<TrackView>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Library {
    pub playlists: Vec<PlaylistView>,
    pub liked_songs: Vec<TrackView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateForm {
    #[serde(default)]
    pub song_id: Option<String>,
    #[serde(default)]
    pub art_style: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Everything the video result page shows.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoResult {
    pub video_url: String,
    pub song_name: String,
    pub artist_name: String,
    pub album_cover_url: String,
}
