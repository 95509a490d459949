//! # Spotify Integration Module
//!
//! Everything that talks to Spotify lives here:
//!
//! - [`auth`] - OAuth 2.0 authorization code flow: authorize URL, code exchange and
//!   token refresh against the accounts service.
//! - [`catalog`] - Read-only Web API calls (playlists, playlist tracks, saved tracks,
//!   single track) and the dashboard projection built from them.
//! - [`artwork`] - Album cover selection and download into per-request storage.
//!
//! ```text
//! HTTP handlers (api)
//!          ↓
//! Session/Auth adapter (management)
//!          ↓
//! Spotify Integration Layer
//!     ├── Authentication (authorization code + refresh)
//!     ├── Catalog (playlists, liked songs, tracks)
//!     └── Artwork (cover URL, download)
//!          ↓
//! HTTP Layer (reqwest, JSON)
//! ```
//!
//! ## Limits
//!
//! The catalog reader only ever asks for the first page of each collection
//! (`limit=50`). Users with more playlists or saved tracks only see the first
//! fifty; callers must not assume more items are ever returned.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

pub mod artwork;
pub mod auth;
pub mod catalog;

pub use auth::OAuthClient;
pub use catalog::SpotifyClient;

#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("access token was rejected")]
    Unauthorized,

    #[error("unexpected status {status} from {endpoint}")]
    Status { status: StatusCode, endpoint: String },

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("could not write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
