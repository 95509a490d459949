//! # API Module
//!
//! HTTP route handlers of the web application.
//!
//! ## Endpoints
//!
//! ### Authentication
//!
//! - [`index`] - `GET /`: login page, or redirect to `/dashboard` when logged in.
//! - [`login`] - `GET /login`: redirect to Spotify's authorization page.
//! - [`callback`] - `GET /callback`: exchanges the authorization code for a token
//!   and stores it in the session.
//! - [`logout`] - `GET /logout`: clears the session.
//!
//! ### Music and videos
//!
//! - [`dashboard`] - `GET /dashboard`: playlists and liked songs.
//! - [`generate_video`] - `POST /generate_video`: form fields `song_id` and
//!   `art_style` (default `cinematic`), renders the video or the error page.
//!
//! ### Monitoring
//!
//! - [`health`] - `GET /health`: status, version and active video backend.
//!
//! Handlers that need Spotify go through [`crate::management::SessionAuth`];
//! without a usable token they answer with a redirect to `/` rather than an
//! error page.

mod auth;
mod dashboard;
mod generate;
mod health;

pub use auth::{callback, index, login, logout};
pub use dashboard::dashboard;
pub use generate::{DEFAULT_ART_STYLE, generate_video};
pub use health::health;
