//! Configuration management for the album art video generator.
//!
//! This module loads `.env` files and builds the explicit [`Config`] struct that
//! is handed to every component at construction time. Nothing in the crate reads
//! the process environment after startup.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. `.env` file in the working directory
//! 4. Application defaults (where applicable)

use std::{env, path::PathBuf, time::Duration};

use clap::ValueEnum;
use thiserror::Error;

pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:5000";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5000/callback";
pub const DEFAULT_SCOPE: &str = "user-library-read playlist-read-private";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_RUNWAY_API_URL: &str = "https://api.dev.runwayml.com/v1";
pub const DEFAULT_RUNWAY_MODEL: &str = "gen3a_turbo";
pub const DEFAULT_PIPELINE_MODEL: &str = "ali-vilab/i2vgen-xl";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Which video generation backend the server uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Local image-to-video diffusion pipeline
    Local,
    /// Hosted Runway image-to-video API
    Hosted,
}

impl Backend {
    pub fn parse(value: &str) -> Option<Backend> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "pipeline" => Some(Backend::Local),
            "hosted" | "runway" => Some(Backend::Hosted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Local => "local",
            Backend::Hosted => "hosted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct RunwayConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

/// Fixed-interval polling settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Wait before the first status request.
    pub initial_delay: Duration,
    /// Wait between two status requests.
    pub interval: Duration,
    /// Upper bound for the whole wait, measured from submission.
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(600),
        }
    }
}

/// Settings of the local image-to-video pipeline worker.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub program: String,
    pub args: Vec<String>,
    pub model: String,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub seed: u64,
    pub fps: u32,
    /// How long a freshly started worker may take to load the model.
    pub ready_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["pipeline/i2vgen_worker.py".to_string()],
            model: DEFAULT_PIPELINE_MODEL.to_string(),
            num_inference_steps: 50,
            guidance_scale: 9.0,
            seed: 8888,
            fps: 10,
            ready_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub static_dir: PathBuf,
    pub backend: Backend,
    pub spotify: SpotifyConfig,
    /// Only present when an API key is configured.
    pub runway: Option<RunwayConfig>,
    pub poll: PollConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset. The Runway API key is only required
    /// when the hosted backend is selected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let backend = match get("VIDEO_BACKEND") {
            Some(value) => Backend::parse(&value).ok_or(ConfigError::Invalid {
                key: "VIDEO_BACKEND",
                value,
            })?,
            None => Backend::Hosted,
        };

        let spotify = SpotifyConfig {
            client_id: get("SPOTIFY_API_AUTH_CLIENT_ID")
                .ok_or(ConfigError::Missing("SPOTIFY_API_AUTH_CLIENT_ID"))?,
            client_secret: get("SPOTIFY_API_AUTH_CLIENT_SECRET")
                .ok_or(ConfigError::Missing("SPOTIFY_API_AUTH_CLIENT_SECRET"))?,
            redirect_uri: or("SPOTIFY_API_REDIRECT_URI", DEFAULT_REDIRECT_URI),
            scope: or("SPOTIFY_API_AUTH_SCOPE", DEFAULT_SCOPE),
            auth_url: or("SPOTIFY_API_AUTH_URL", DEFAULT_AUTH_URL),
            token_url: or("SPOTIFY_API_TOKEN_URL", DEFAULT_TOKEN_URL),
            api_url: trim_slash(or("SPOTIFY_API_URL", DEFAULT_API_URL)),
        };

        let runway = get("RUNWAYML_API_KEY").map(|api_key| RunwayConfig {
            api_key,
            api_url: trim_slash(or("RUNWAYML_API_URL", DEFAULT_RUNWAY_API_URL)),
            model: or("RUNWAYML_MODEL", DEFAULT_RUNWAY_MODEL),
        });
        if backend == Backend::Hosted && runway.is_none() {
            return Err(ConfigError::Missing("RUNWAYML_API_KEY"));
        }

        let defaults = PollConfig::default();
        let poll = PollConfig {
            initial_delay: secs(&get, "POLL_INITIAL_DELAY_SECS", defaults.initial_delay)?,
            interval: secs(&get, "POLL_INTERVAL_SECS", defaults.interval)?,
            max_wait: secs(&get, "POLL_MAX_WAIT_SECS", defaults.max_wait)?,
        };

        let mut pipeline = PipelineConfig::default();
        if let Some(program) = get("LOCAL_PIPELINE_PROGRAM") {
            pipeline.program = program;
        }
        if let Some(args) = get("LOCAL_PIPELINE_ARGS") {
            pipeline.args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(model) = get("LOCAL_PIPELINE_MODEL") {
            pipeline.model = model;
        }
        pipeline.ready_timeout = secs(
            &get,
            "LOCAL_PIPELINE_READY_TIMEOUT_SECS",
            pipeline.ready_timeout,
        )?;

        Ok(Config {
            server_address: or("SERVER_ADDRESS", DEFAULT_SERVER_ADDRESS),
            static_dir: PathBuf::from(or("STATIC_DIR", "static")),
            backend,
            spotify,
            runway,
            poll,
            pipeline,
        })
    }

    /// Session cookies are only marked `Secure` when the app is served over https.
    pub fn secure_cookies(&self) -> bool {
        self.spotify.redirect_uri.starts_with("https://")
    }
}

fn secs<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Loads environment variables from `.env` files.
///
/// Looks for `coverreel/.env` in the platform-specific local data directory
/// (creating the directory if needed, `build.rs` drops a `.env.example` there)
/// and then for a `.env` in the working directory. Missing files are fine;
/// variables already set in the environment always win.
///
/// # Directory Structure
///
/// - Linux: `~/.local/share/coverreel/.env`
/// - macOS: `~/Library/Application Support/coverreel/.env`
/// - Windows: `%LOCALAPPDATA%/coverreel/.env`
pub async fn load_env() -> Result<(), String> {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("coverreel/.env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    }
    dotenv::dotenv().ok();
    Ok(())
}
