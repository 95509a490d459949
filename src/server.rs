use std::{net::SocketAddr, str::FromStr, sync::Arc};

use axum::{
    Extension, Router,
    routing::{get, post},
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_sessions::{
    Expiry, MemoryStore, SessionManagerLayer,
    cookie::{SameSite, time::Duration},
};

use crate::{
    Res, api,
    config::{Config, ConfigError},
    info,
    management::{STATIC_ROUTE, ScratchStorage, SessionAuth},
    spotify::OAuthClient,
    video::{self, VideoGenerator},
    warning,
};

/// Sessions idle for longer than this are treated as logged out.
pub const SESSION_IDLE: Duration = Duration::hours(1);

/// Shared by every handler through an `Extension` layer.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http: Client,
    pub auth: SessionAuth,
    pub storage: ScratchStorage,
    pub generator: Arc<dyn VideoGenerator>,
}

impl AppState {
    /// Builds the state with the generator selected in `config`.
    pub fn new(config: Config, cancel: CancellationToken) -> Result<Self, ConfigError> {
        let http = Client::new();
        let storage = ScratchStorage::new(config.static_dir.clone());
        let generator = video::build_generator(&config, http.clone(), storage.clone(), cancel)?;
        Ok(Self::assemble(config, http, storage, generator))
    }

    pub fn with_generator(config: Config, http: Client, generator: Arc<dyn VideoGenerator>) -> Self {
        let storage = ScratchStorage::new(config.static_dir.clone());
        Self::assemble(config, http, storage, generator)
    }

    fn assemble(
        config: Config,
        http: Client,
        storage: ScratchStorage,
        generator: Arc<dyn VideoGenerator>,
    ) -> Self {
        let oauth = OAuthClient::new(http.clone(), &config.spotify);
        let auth = SessionAuth::new(oauth, http.clone(), &config.spotify.api_url);

        Self {
            config: Arc::new(config),
            http,
            auth,
            storage,
            generator,
        }
    }
}

pub fn router(state: AppState) -> Router {
    // expired records are rejected on load but stay in memory until restart
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(state.config.secure_cookies())
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(SESSION_IDLE));

    Router::new()
        .route("/", get(api::index))
        .route("/login", get(api::login))
        .route("/callback", get(api::callback))
        .route("/dashboard", get(api::dashboard))
        .route("/generate_video", post(api::generate_video))
        .route("/logout", get(api::logout))
        .route("/health", get(api::health))
        .nest_service(STATIC_ROUTE, ServeDir::new(state.storage.root()))
        .layer(Extension(state))
        .layer(session_layer)
}

/// Serves the application until Ctrl-C.
///
/// On shutdown, pending Runway polls are cancelled and the local pipeline
/// worker (if any) is stopped.
pub async fn start_server(config: Config, open_browser: bool) -> Res<()> {
    let addr = SocketAddr::from_str(&config.server_address)?;
    let cancel = CancellationToken::new();
    let state = AppState::new(config, cancel.clone())?;
    let generator = Arc::clone(&state.generator);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let url = format!("http://{}/", addr);
    info!("Serving on {} with the {} video backend", url, generator.name());

    if open_browser && webbrowser::open(&url).is_err() {
        warning!("Failed to open browser. Please navigate to {} manually", url);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warning!("Cannot listen for Ctrl-C: {}", e);
            }
            info!("Shutting down");
            cancel.cancel();
        })
        .await?;

    generator.shutdown().await;
    Ok(())
}
