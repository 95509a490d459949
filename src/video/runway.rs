use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{PollConfig, RunwayConfig},
    info, utils,
    video::{GenerationError, GenerationJob, VideoGenerator, VideoOutput},
    warning,
};

pub const RUNWAY_API_VERSION: &str = "2024-11-06";

/// Task id reported when the deadline passes before Runway assigned one.
const UNSUBMITTED: &str = "(not yet submitted)";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageToVideoRequest<'a> {
    model: &'a str,
    prompt_image: String,
    prompt_text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Throttled,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Only these two end the polling loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

#[derive(Debug, Deserialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub output: Option<Vec<String>>,
    #[serde(default)]
    pub failure: Option<String>,
}

/// Runway's hosted image-to-video API.
pub struct RunwayGenerator {
    http: Client,
    config: RunwayConfig,
    poll: PollConfig,
    cancel: CancellationToken,
}

impl RunwayGenerator {
    pub fn new(
        http: Client,
        config: RunwayConfig,
        poll: PollConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            config,
            poll,
            cancel,
        }
    }

    /// Submits a task and returns its id.
    pub async fn submit(&self, prompt_image: String, prompt_text: &str) -> Result<String, GenerationError> {
        let body = ImageToVideoRequest {
            model: &self.config.model,
            prompt_image,
            prompt_text,
        };

        let response = self
            .http
            .post(format!("{}/image_to_video", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .header("X-Runway-Version", RUNWAY_API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, body });
        }

        Ok(response.json::<CreatedTask>().await?.id)
    }

    pub async fn retrieve(&self, task_id: &str) -> Result<Task, GenerationError> {
        let response = self
            .http
            .get(format!("{}/tasks/{}", self.config.api_url, task_id))
            .bearer_auth(&self.config.api_key)
            .header("X-Runway-Version", RUNWAY_API_VERSION)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, body });
        }

        Ok(response.json::<Task>().await?)
    }

    /// Polls a task at a fixed interval until it is `SUCCEEDED` or `FAILED`.
    ///
    /// Waits `initial_delay` before the first request and `interval` between
    /// requests. Gives up once `max_wait` has elapsed since `started`, and
    /// returns early when the cancellation token fires. Both bounds apply to
    /// the status requests as well as to the waits between them.
    pub async fn wait_for_task(&self, task_id: &str, started: Instant) -> Result<Task, GenerationError> {
        self.pause(self.poll.initial_delay, task_id, started).await?;
        let mut task = self
            .bounded(task_id, started, self.retrieve(task_id))
            .await?;

        while !task.status.is_terminal() {
            info!(
                "Task {} is {:?} ({}s elapsed)",
                task_id,
                task.status,
                started.elapsed().as_secs()
            );
            self.pause(self.poll.interval, task_id, started).await?;
            task = self
                .bounded(task_id, started, self.retrieve(task_id))
                .await?;
        }

        Ok(task)
    }

    async fn pause(&self, wait: Duration, task_id: &str, started: Instant) -> Result<(), GenerationError> {
        self.bounded(task_id, started, async {
            tokio::time::sleep(wait).await;
            Ok(())
        })
        .await
    }

    /// Runs `fut` until it completes, the deadline passes or the token fires.
    ///
    /// Cancellation wins over the deadline when both apply.
    async fn bounded<T, F>(&self, task_id: &str, started: Instant, fut: F) -> Result<T, GenerationError>
    where
        F: Future<Output = Result<T, GenerationError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        let remaining = self.poll.max_wait.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(self.timed_out(task_id, started));
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GenerationError::Cancelled),
            result = tokio::time::timeout(remaining, fut) => match result {
                Ok(result) => result,
                Err(_) => Err(self.timed_out(task_id, started)),
            },
        }
    }

    fn timed_out(&self, task_id: &str, started: Instant) -> GenerationError {
        GenerationError::TimedOut {
            task_id: task_id.to_string(),
            waited: started.elapsed(),
        }
    }
}

#[async_trait]
impl VideoGenerator for RunwayGenerator {
    fn name(&self) -> &'static str {
        "hosted"
    }

    fn compose_prompt(&self, song: &str, artist: &str, style: &str) -> String {
        format!(
            "Transform {} album art by {} into a {} video",
            song, artist, style
        )
    }

    async fn generate(&self, job: &GenerationJob) -> Result<VideoOutput, GenerationError> {
        let bytes = async_fs::read(&job.image_path)
            .await
            .map_err(|source| GenerationError::Source {
                path: job.image_path.clone(),
                source,
            })?;

        let started = Instant::now();
        let task_id = self
            .bounded(
                UNSUBMITTED,
                started,
                self.submit(utils::data_url(&bytes), &job.prompt),
            )
            .await?;
        info!("Submitted Runway task {} for request {}", task_id, job.request_id);

        let task = self.wait_for_task(&task_id, started).await?;
        match task.status {
            TaskStatus::Succeeded => task
                .output
                .and_then(|urls| urls.into_iter().next())
                .map(|location| VideoOutput { location })
                .ok_or_else(|| GenerationError::Failed(format!("task {} has no output", task_id))),
            _ => {
                let reason = task.failure.unwrap_or_else(|| "no reason given".to_string());
                warning!("Runway task {} failed: {}", task_id, reason);
                Err(GenerationError::Failed(reason))
            }
        }
    }
}
