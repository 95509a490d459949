//! Album Art Video Generator Library
//!
//! This library powers `coverreel`, a small web application that lets a Spotify
//! user pick one of their songs, fetches its album artwork and hands that artwork
//! together with a style prompt to an image-to-video backend. Once the video is
//! rendered it is shown in the browser next to the song.
//!
//! # Modules
//!
//! - `api` - HTTP route handlers (login, callback, dashboard, generation)
//! - `cli` - Command-line entry points (`serve`, `completions`)
//! - `config` - Environment loading and the explicit [`config::Config`] struct
//! - `error` - The HTTP-facing error type and its response mapping
//! - `management` - Token lifecycle, session-backed authentication and scratch storage
//! - `server` - Router construction and the serve loop
//! - `spotify` - Spotify Web API client (OAuth, catalog, artwork)
//! - `types` - Wire types and view models
//! - `utils` - Small helpers shared across modules
//! - `video` - The video generator trait and its two backends
//! - `views` - HTML rendering of the five pages
//!
//! # Example
//!
//! ```
//! use coverreel::{config, server};
//!
//! #[tokio::main]
//! async fn main() -> coverreel::Res<()> {
//!     config::load_env().await?;
//!     let config = config::Config::from_env()?;
//!     server::start_server(config, false).await
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod management;
pub mod server;
pub mod spotify;
pub mod types;
pub mod utils;
pub mod video;
pub mod views;

/// A convenient Result type alias for operations that may fail.
///
/// Used for top-level plumbing (startup, serving) where the concrete error
/// type does not matter to the caller. Module-level operations return their
/// own `thiserror` enums instead.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational message with a blue bullet point.
///
/// # Example
///
/// ```
/// info!("Listening on {}", addr);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
///
/// # Example
///
/// ```
/// success!("Video ready for {}", track_name);
/// ```
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Only meant for fatal startup errors. Request handlers never call this;
/// they log with [`warning!`] and render the error view instead.
///
/// # Example
///
/// ```
/// error!("Missing required environment variable: {}", var_name);
/// // Program exits here
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// Used for recoverable problems, e.g. a failed token refresh or a video
/// generation that ended in a failure state.
///
/// # Example
///
/// ```
/// warning!("Token refresh failed: {}", e);
/// ```
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
