//! # Video Generation
//!
//! One [`VideoGenerator`] trait with two implementations, picked by
//! configuration at startup:
//!
//! - [`local::LocalPipeline`] runs an image-to-video diffusion model in a
//!   long-lived worker process on this machine and writes an mp4 into the
//!   scratch storage.
//! - [`runway::RunwayGenerator`] submits the cover to Runway's hosted
//!   image-to-video API and polls the task until it reaches a terminal state.
//!
//! Both receive a [`GenerationJob`] built by the `/generate_video` handler and
//! return the location of the finished video.

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::{Backend, Config, ConfigError},
    management::ScratchStorage,
};

pub mod local;
pub mod runway;

pub use local::LocalPipeline;
pub use runway::RunwayGenerator;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("could not read source image {}: {source}", path.display())]
    Source {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not convert source image: {0}")]
    Image(#[from] image::ImageError),

    #[error("video API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("video API returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("video generation failed: {0}")]
    Failed(String),

    #[error("pipeline worker error: {0}")]
    Worker(String),

    #[error("gave up waiting for task {task_id} after {waited:?}")]
    TimedOut { task_id: String, waited: Duration },

    #[error("generation was cancelled")]
    Cancelled,
}

/// Everything a backend needs to render one video.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub request_id: Uuid,
    pub image_path: PathBuf,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoOutput {
    /// Either a remote URL or a path below `/static`.
    pub location: String,
}

#[async_trait]
pub trait VideoGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prompt handed to the model for a song and a style label.
    fn compose_prompt(&self, song: &str, artist: &str, style: &str) -> String;

    async fn generate(&self, job: &GenerationJob) -> Result<VideoOutput, GenerationError>;

    /// Releases resources held between requests.
    async fn shutdown(&self) {}
}

/// Builds the generator selected by `config.backend`.
///
/// `cancel` is triggered on server shutdown and aborts in-flight waits of
/// either backend.
pub fn build_generator(
    config: &Config,
    http: Client,
    storage: ScratchStorage,
    cancel: CancellationToken,
) -> Result<Arc<dyn VideoGenerator>, ConfigError> {
    match config.backend {
        Backend::Local => Ok(Arc::new(LocalPipeline::new(
            config.pipeline.clone(),
            storage,
            cancel,
        ))),
        Backend::Hosted => {
            let runway = config
                .runway
                .clone()
                .ok_or(ConfigError::Missing("RUNWAYML_API_KEY"))?;
            Ok(Arc::new(RunwayGenerator::new(
                http,
                runway,
                config.poll.clone(),
                cancel,
            )))
        }
    }
}
