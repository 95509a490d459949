//! # CLI Module
//!
//! Entry points behind the `coverreel` subcommands.
//!
//! - [`serve`] - Builds the [`Config`] from the environment, applies command-line
//!   overrides and runs the web server until Ctrl-C.
//!
//! Fatal setup problems (missing credentials, unparsable address) end the
//! process through the crate's `error!` macro.

use std::env;

use crate::{
    config::{self, Backend, Config},
    error, server, warning,
};

/// Starts the web application.
///
/// # Arguments
///
/// * `addr` - Overrides `SERVER_ADDRESS`
/// * `backend` - Overrides `VIDEO_BACKEND`
/// * `open` - Opens the app in the default browser once the server is listening
pub async fn serve(addr: Option<String>, backend: Option<Backend>, open: bool) {
    if let Err(e) = config::load_env().await {
        warning!("Cannot load .env file. Err: {}", e);
    }

    let config = Config::from_lookup(|key| match (key, backend, &addr) {
        ("VIDEO_BACKEND", Some(backend), _) => Some(backend.as_str().to_string()),
        ("SERVER_ADDRESS", _, Some(addr)) => Some(addr.clone()),
        _ => env::var(key).ok(),
    });

    let config = match config {
        Ok(config) => config,
        Err(e) => error!("Invalid configuration: {}", e),
    };

    if let Err(e) = server::start_server(config, open).await {
        error!("Server stopped with an error: {}", e);
    }
}
