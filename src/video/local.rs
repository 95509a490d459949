use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::PipelineConfig,
    info,
    management::ScratchStorage,
    success,
    video::{GenerationError, GenerationJob, VideoGenerator, VideoOutput},
    warning,
};

/// One line sent to the worker per video.
#[derive(Debug, Serialize)]
struct PipelineRequest<'a> {
    image: &'a Path,
    prompt: &'a str,
    num_inference_steps: u32,
    guidance_scale: f32,
    seed: u64,
    fps: u32,
    output: &'a Path,
}

#[derive(Debug, Deserialize)]
struct PipelineResponse {
    ok: bool,
    #[serde(default)]
    frames: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadyLine {
    ready: bool,
    #[serde(default)]
    model: Option<String>,
}

/// A running worker process with the model loaded.
///
/// The worker speaks one JSON object per line on stdin/stdout. It prints a
/// `{"ready": true}` line once the model is loaded and answers every request
/// line with exactly one response line.
struct PipelineWorker {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl PipelineWorker {
    async fn spawn(config: &PipelineConfig) -> Result<Self, GenerationError> {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .arg("--model")
            .arg(&config.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GenerationError::Worker(format!("cannot start {}: {}", config.program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GenerationError::Worker("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GenerationError::Worker("worker stdout unavailable".to_string()))?;

        let mut worker = PipelineWorker {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        let line = tokio::time::timeout(config.ready_timeout, worker.read_line())
            .await
            .map_err(|_| {
                GenerationError::Worker(format!(
                    "worker did not load {} within {:?}",
                    config.model, config.ready_timeout
                ))
            })??;
        let ready: ReadyLine = serde_json::from_str(&line)
            .map_err(|e| GenerationError::Worker(format!("bad ready line {:?}: {}", line, e)))?;
        if !ready.ready {
            return Err(GenerationError::Worker("worker failed to load the model".to_string()));
        }

        success!(
            "Loaded image-to-video model {}",
            ready.model.as_deref().unwrap_or(&config.model)
        );
        Ok(worker)
    }

    async fn call(&mut self, request: &PipelineRequest<'_>) -> Result<PipelineResponse, GenerationError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| GenerationError::Worker(format!("cannot encode request: {}", e)))?;
        line.push('\n');

        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| GenerationError::Worker(format!("cannot write to worker: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| GenerationError::Worker(format!("cannot write to worker: {}", e)))?;

        let reply = self.read_line().await?;
        serde_json::from_str(&reply)
            .map_err(|e| GenerationError::Worker(format!("bad response {:?}: {}", reply, e)))
    }

    async fn read_line(&mut self) -> Result<String, GenerationError> {
        match self.stdout.next_line().await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(GenerationError::Worker("worker exited".to_string())),
            Err(e) => Err(GenerationError::Worker(format!("cannot read from worker: {}", e))),
        }
    }

    async fn stop(mut self) {
        drop(self.stdin);
        if let Err(e) = self.child.kill().await {
            warning!("Failed to stop pipeline worker: {}", e);
        }
    }
}

/// Image-to-video diffusion pipeline running on this machine.
///
/// The model is loaded once per process, the first time a video is
/// requested, and kept until [`VideoGenerator::shutdown`]. Requests are
/// rendered one at a time. Sampling uses a fixed seed, step count and
/// guidance scale, so the same cover and prompt render the same frames.
///
/// When `cancel` fires, a render or model load in progress is abandoned and
/// the worker is killed, so server shutdown never waits for the model.
pub struct LocalPipeline {
    config: PipelineConfig,
    storage: ScratchStorage,
    cancel: CancellationToken,
    worker: Mutex<Option<PipelineWorker>>,
}

impl LocalPipeline {
    pub fn new(config: PipelineConfig, storage: ScratchStorage, cancel: CancellationToken) -> Self {
        Self {
            config,
            storage,
            cancel,
            worker: Mutex::new(None),
        }
    }

    pub async fn is_loaded(&self) -> bool {
        self.worker.lock().await.is_some()
    }
}

/// Decodes the cover (format sniffed from content) and stores it as RGB8 PNG.
async fn prepare_source(src: &Path, dst: &Path) -> Result<(), GenerationError> {
    let bytes = async_fs::read(src)
        .await
        .map_err(|source| GenerationError::Source {
            path: src.to_path_buf(),
            source,
        })?;
    ScratchStorage::ensure_parent(dst)
        .await
        .map_err(|source| GenerationError::Source {
            path: dst.to_path_buf(),
            source,
        })?;

    let dst: PathBuf = dst.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), GenerationError> {
        let rgb = image::load_from_memory(&bytes)?.to_rgb8();
        rgb.save_with_format(&dst, image::ImageFormat::Png)?;
        Ok(())
    })
    .await
    .map_err(|e| GenerationError::Worker(format!("image conversion panicked: {}", e)))?
}

#[async_trait]
impl VideoGenerator for LocalPipeline {
    fn name(&self) -> &'static str {
        "local"
    }

    fn compose_prompt(&self, song: &str, artist: &str, style: &str) -> String {
        format!(
            "Transform the album art of {} by {} into a {} style video. \
             Smooth, cinematic movement revealing musical essence.",
            song, artist, style
        )
    }

    async fn generate(&self, job: &GenerationJob) -> Result<VideoOutput, GenerationError> {
        let source = self.storage.source_frame_path(job.request_id);
        let output = self.storage.video_path(job.request_id);
        prepare_source(&job.image_path, &source).await?;

        let request = PipelineRequest {
            image: &source,
            prompt: &job.prompt,
            num_inference_steps: self.config.num_inference_steps,
            guidance_scale: self.config.guidance_scale,
            seed: self.config.seed,
            fps: self.config.fps,
            output: &output,
        };

        let mut guard = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(GenerationError::Cancelled),
            guard = self.worker.lock() => guard,
        };
        if guard.is_none() {
            info!("Starting pipeline worker for {}", self.config.model);
            // dropping an unfinished spawn kills the child
            let worker = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(GenerationError::Cancelled),
                worker = PipelineWorker::spawn(&self.config) => worker,
            }?;
            *guard = Some(worker);
        }
        let Some(worker) = guard.as_mut() else {
            return Err(GenerationError::Worker("worker not running".to_string()));
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GenerationError::Cancelled),
            response = worker.call(&request) => response,
        };
        if result.is_err() {
            // the worker is in an unknown state, start a fresh one next time
            if let Some(worker) = guard.take() {
                worker.stop().await;
            }
        }
        drop(guard);

        let response = result?;
        if !response.ok {
            let reason = response.error.unwrap_or_else(|| "unknown error".to_string());
            warning!("Video generation error: {}", reason);
            return Err(GenerationError::Failed(reason));
        }

        let written = async_fs::metadata(&output)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !written {
            return Err(GenerationError::Failed(format!(
                "worker reported success but {} is empty",
                output.display()
            )));
        }

        info!(
            "Rendered {} frames at {} fps for request {}",
            response.frames.unwrap_or_default(),
            self.config.fps,
            job.request_id
        );

        let location = self
            .storage
            .public_url(&output)
            .ok_or_else(|| GenerationError::Failed("output outside static dir".to_string()))?;
        Ok(VideoOutput { location })
    }

    async fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().await.take() {
            info!("Unloading image-to-video model");
            worker.stop().await;
        }
    }
}
