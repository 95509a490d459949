use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use coverreel::{
    config::{Config, PipelineConfig, PollConfig, RunwayConfig},
    management::ScratchStorage,
    video::{
        GenerationError, GenerationJob, LocalPipeline, RunwayGenerator, VideoGenerator,
        build_generator,
        runway::TaskStatus,
    },
};
use image::{Rgba, RgbaImage};
use reqwest::Client;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, body_string_contains, header, method, path},
};

fn write_cover(dir: &Path) -> PathBuf {
    let cover = dir.join("cover.png");
    RgbaImage::from_pixel(8, 8, Rgba([200, 30, 30, 255]))
        .save(&cover)
        .unwrap();
    cover
}

fn job(image_path: &Path, prompt: &str) -> GenerationJob {
    GenerationJob {
        request_id: Uuid::new_v4(),
        image_path: image_path.to_path_buf(),
        prompt: prompt.to_string(),
    }
}

fn runway(server: &MockServer, poll: PollConfig, cancel: CancellationToken) -> RunwayGenerator {
    RunwayGenerator::new(
        Client::new(),
        RunwayConfig {
            api_key: "runway-key".to_string(),
            api_url: format!("{}/v1", server.uri()),
            model: "gen3a_turbo".to_string(),
        },
        poll,
        cancel,
    )
}

fn fast_poll() -> PollConfig {
    PollConfig {
        initial_delay: Duration::from_millis(10),
        interval: Duration::from_millis(10),
        max_wait: Duration::from_secs(5),
    }
}

async fn mount_submit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/image_to_video"))
        .and(header("authorization", "Bearer runway-key"))
        .and(header("x-runway-version", "2024-11-06"))
        .and(body_partial_json(json!({
            "model": "gen3a_turbo",
            "promptText": "Transform Song album art by Artist into a anime video"
        })))
        .and(body_string_contains("data:image/png;base64,"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "task-1" })))
        .expect(1)
        .mount(server)
        .await;
}

fn task(status: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "task-1",
        "status": status,
        "createdAt": "2024-11-06T00:00:00Z"
    }))
}

#[test]
fn test_task_status() {
    assert!(TaskStatus::Succeeded.is_terminal());
    assert!(TaskStatus::Failed.is_terminal());
    assert!(!TaskStatus::Running.is_terminal());
    assert!(!TaskStatus::Cancelled.is_terminal());

    let status: TaskStatus = serde_json::from_value(json!("THROTTLED")).unwrap();
    assert_eq!(status, TaskStatus::Throttled);
    let status: TaskStatus = serde_json::from_value(json!("SOMETHING_NEW")).unwrap();
    assert_eq!(status, TaskStatus::Unknown);
}

#[tokio::test]
async fn test_prompts() {
    let server = MockServer::start().await;
    let hosted = runway(&server, fast_poll(), CancellationToken::new());
    assert_eq!(
        hosted.compose_prompt("Song", "Artist", "watercolor"),
        "Transform Song album art by Artist into a watercolor video"
    );

    let local = LocalPipeline::new(
        PipelineConfig::default(),
        ScratchStorage::new("static"),
        CancellationToken::new(),
    );
    assert_eq!(
        local.compose_prompt("Song", "Artist", "anime"),
        "Transform the album art of Song by Artist into a anime style video. \
         Smooth, cinematic movement revealing musical essence."
    );
}

#[tokio::test]
async fn test_runway_polls_until_succeeded() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/task-1"))
        .respond_with(task("RUNNING"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/task-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "task-1",
            "status": "SUCCEEDED",
            "output": ["https://cdn.runway.test/video.mp4"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cover = write_cover(dir.path());
    let generator = runway(&server, fast_poll(), CancellationToken::new());

    let prompt = generator.compose_prompt("Song", "Artist", "anime");
    let output = generator.generate(&job(&cover, &prompt)).await.unwrap();
    assert_eq!(output.location, "https://cdn.runway.test/video.mp4");
}

#[tokio::test]
async fn test_runway_failed_task() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/task-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "task-1",
            "status": "FAILED",
            "failure": "content moderation"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cover = write_cover(dir.path());
    let generator = runway(&server, fast_poll(), CancellationToken::new());

    let prompt = generator.compose_prompt("Song", "Artist", "anime");
    let err = generator.generate(&job(&cover, &prompt)).await.unwrap_err();
    assert!(matches!(err, GenerationError::Failed(reason) if reason == "content moderation"));
}

#[tokio::test]
async fn test_runway_cancelled_task_keeps_polling_until_deadline() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/task-1"))
        .respond_with(task("CANCELLED"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cover = write_cover(dir.path());
    let poll = PollConfig {
        initial_delay: Duration::from_millis(10),
        interval: Duration::from_millis(20),
        max_wait: Duration::from_millis(150),
    };
    let generator = runway(&server, poll, CancellationToken::new());

    let prompt = generator.compose_prompt("Song", "Artist", "anime");
    let err = generator.generate(&job(&cover, &prompt)).await.unwrap_err();
    assert!(matches!(err, GenerationError::TimedOut { ref task_id, .. } if task_id == "task-1"));

    let polls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/v1/tasks/task-1")
        .count();
    assert!(polls > 1);
}

#[tokio::test]
async fn test_runway_shutdown_cancels_wait() {
    let server = MockServer::start().await;
    mount_submit(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let cover = write_cover(dir.path());
    let poll = PollConfig {
        initial_delay: Duration::from_secs(30),
        interval: Duration::from_secs(30),
        max_wait: Duration::from_secs(600),
    };
    let cancel = CancellationToken::new();
    let generator = runway(&server, poll, cancel.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let prompt = generator.compose_prompt("Song", "Artist", "anime");
    let err = tokio::time::timeout(Duration::from_secs(5), generator.generate(&job(&cover, &prompt)))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, GenerationError::Cancelled));
}

#[tokio::test]
async fn test_runway_stalled_status_request_hits_deadline() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/task-1"))
        .respond_with(task("RUNNING").set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cover = write_cover(dir.path());
    let poll = PollConfig {
        initial_delay: Duration::from_millis(10),
        interval: Duration::from_millis(10),
        max_wait: Duration::from_millis(300),
    };
    let generator = runway(&server, poll, CancellationToken::new());

    let prompt = generator.compose_prompt("Song", "Artist", "anime");
    let err = tokio::time::timeout(Duration::from_secs(3), generator.generate(&job(&cover, &prompt)))
        .await
        .unwrap()
        .unwrap_err();
    match err {
        GenerationError::TimedOut { task_id, waited } => {
            assert_eq!(task_id, "task-1");
            assert!(waited >= Duration::from_millis(300));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_runway_stalled_status_request_is_cancelled() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/task-1"))
        .respond_with(task("RUNNING").set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cover = write_cover(dir.path());
    let poll = PollConfig {
        initial_delay: Duration::from_millis(10),
        interval: Duration::from_millis(10),
        max_wait: Duration::from_millis(300),
    };
    let cancel = CancellationToken::new();
    let generator = runway(&server, poll, cancel.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let prompt = generator.compose_prompt("Song", "Artist", "anime");
    let err = tokio::time::timeout(Duration::from_secs(3), generator.generate(&job(&cover, &prompt)))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, GenerationError::Cancelled));
}

#[tokio::test]
async fn test_runway_stalled_submission_hits_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/image_to_video"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "task-1" }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cover = write_cover(dir.path());
    let poll = PollConfig {
        initial_delay: Duration::from_millis(10),
        interval: Duration::from_millis(10),
        max_wait: Duration::from_millis(200),
    };
    let generator = runway(&server, poll, CancellationToken::new());

    let err = tokio::time::timeout(Duration::from_secs(3), generator.generate(&job(&cover, "prompt")))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, GenerationError::TimedOut { .. }));
}

#[tokio::test]
async fn test_runway_cancellation_wins_over_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/image_to_video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "task-1" })))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cover = write_cover(dir.path());
    let poll = PollConfig {
        initial_delay: Duration::ZERO,
        interval: Duration::ZERO,
        max_wait: Duration::ZERO,
    };
    let cancel = CancellationToken::new();
    cancel.cancel();
    let generator = runway(&server, poll, cancel);

    let err = generator.generate(&job(&cover, "prompt")).await.unwrap_err();
    assert!(matches!(err, GenerationError::Cancelled));
}

#[tokio::test]
async fn test_runway_rejected_submission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/image_to_video"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cover = write_cover(dir.path());
    let generator = runway(&server, fast_poll(), CancellationToken::new());

    let err = generator.generate(&job(&cover, "prompt")).await.unwrap_err();
    assert!(matches!(err, GenerationError::Api { status, .. } if status.as_u16() == 401));
}

#[tokio::test]
async fn test_missing_source_image() {
    let server = MockServer::start().await;
    let generator = runway(&server, fast_poll(), CancellationToken::new());

    let err = generator
        .generate(&job(Path::new("/nonexistent/cover.png"), "prompt"))
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::Source { .. }));
}

#[test]
fn test_build_generator_follows_backend() {
    let lookup = |key: &str| match key {
        "SPOTIFY_API_AUTH_CLIENT_ID" => Some("id".to_string()),
        "SPOTIFY_API_AUTH_CLIENT_SECRET" => Some("secret".to_string()),
        "VIDEO_BACKEND" => Some("local".to_string()),
        _ => None,
    };
    let config = Config::from_lookup(lookup).unwrap();
    let generator = build_generator(
        &config,
        Client::new(),
        ScratchStorage::new("static"),
        CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(generator.name(), "local");

    let mut config = config;
    config.backend = coverreel::config::Backend::Hosted;
    assert!(
        build_generator(
            &config,
            Client::new(),
            ScratchStorage::new("static"),
            CancellationToken::new(),
        )
        .is_err()
    );
}

#[cfg(unix)]
mod local_pipeline {
    use super::*;

    // Stand-in for the diffusion worker: copies the source frame to the output
    // path, so identical inputs produce identical files.
    fn fake_worker(log: &Path) -> PipelineConfig {
        let script = format!(
            r#"echo spawned >> "{log}"
echo '{{"ready":true,"model":"'"$2"'"}}'
while IFS= read -r line; do
  case "$line" in
    *FAIL_PLEASE*) echo '{{"ok":false,"error":"out of memory"}}'; continue;;
  esac
  img=$(printf '%s' "$line" | sed -n 's/.*"image":"\([^"]*\)".*/\1/p')
  out=$(printf '%s' "$line" | sed -n 's/.*"output":"\([^"]*\)".*/\1/p')
  cp "$img" "$out"
  echo '{{"ok":true,"frames":16}}'
done
"#,
            log = log.display()
        );

        PipelineConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script, "worker".to_string()],
            ..PipelineConfig::default()
        }
    }

    fn spawn_count(log: &Path) -> usize {
        std::fs::read_to_string(log)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_loads_once_and_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("spawn.log");
        let cover = write_cover(dir.path());
        let storage = ScratchStorage::new(dir.path().join("static"));
        let pipeline = LocalPipeline::new(fake_worker(&log), storage.clone(), CancellationToken::new());
        assert!(!pipeline.is_loaded().await);

        let prompt = pipeline.compose_prompt("Song", "Artist", "cinematic");
        let first = job(&cover, &prompt);
        let second = job(&cover, &prompt);

        let out1 = pipeline.generate(&first).await.unwrap();
        let out2 = pipeline.generate(&second).await.unwrap();
        assert!(pipeline.is_loaded().await);
        assert_eq!(spawn_count(&log), 1);

        assert_eq!(
            out1.location,
            format!("/static/generated_videos/{}.mp4", first.request_id)
        );
        let bytes1 = std::fs::read(storage.video_path(first.request_id)).unwrap();
        let bytes2 = std::fs::read(storage.video_path(second.request_id)).unwrap();
        assert!(!bytes1.is_empty());
        assert_eq!(bytes1, bytes2);
        assert_ne!(out1.location, out2.location);

        // the source frame is an RGB png
        let source = image::open(storage.source_frame_path(first.request_id)).unwrap();
        assert_eq!(source.color(), image::ColorType::Rgb8);

        pipeline.shutdown().await;
        assert!(!pipeline.is_loaded().await);

        pipeline.generate(&job(&cover, &prompt)).await.unwrap();
        assert_eq!(spawn_count(&log), 2);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_worker_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("spawn.log");
        let cover = write_cover(dir.path());
        let pipeline = LocalPipeline::new(
            fake_worker(&log),
            ScratchStorage::new(dir.path().join("static")),
            CancellationToken::new(),
        );

        let err = pipeline
            .generate(&job(&cover, "FAIL_PLEASE"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Failed(reason) if reason == "out of memory"));

        // a reported failure keeps the model loaded
        assert!(pipeline.is_loaded().await);
        pipeline.generate(&job(&cover, "fine")).await.unwrap();
        assert_eq!(spawn_count(&log), 1);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_crashed_worker_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let cover = write_cover(dir.path());
        let config = PipelineConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"echo '{"ready":true}'"#.to_string(),
                "worker".to_string(),
            ],
            ..PipelineConfig::default()
        };
        let pipeline = LocalPipeline::new(
            config,
            ScratchStorage::new(dir.path().join("static")),
            CancellationToken::new(),
        );

        let err = pipeline.generate(&job(&cover, "prompt")).await.unwrap_err();
        assert!(matches!(err, GenerationError::Worker(_)));
        assert!(!pipeline.is_loaded().await);
    }

    #[tokio::test]
    async fn test_undecodable_cover() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("spawn.log");
        let cover = dir.path().join("cover.img");
        std::fs::write(&cover, b"definitely not an image").unwrap();
        let pipeline = LocalPipeline::new(
            fake_worker(&log),
            ScratchStorage::new(dir.path().join("static")),
            CancellationToken::new(),
        );

        let err = pipeline.generate(&job(&cover, "prompt")).await.unwrap_err();
        assert!(matches!(err, GenerationError::Image(_)));
        assert_eq!(spawn_count(&log), 0);
    }

    fn scripted_worker(script: &str) -> PipelineConfig {
        PipelineConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "worker".to_string()],
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_shutdown_cancels_unanswered_render() {
        let dir = tempfile::tempdir().unwrap();
        let cover = write_cover(dir.path());
        // loads, then swallows every request without answering
        let config = scripted_worker(
            r#"echo '{"ready":true}'
while IFS= read -r line; do :; done"#,
        );
        let cancel = CancellationToken::new();
        let pipeline = LocalPipeline::new(
            config,
            ScratchStorage::new(dir.path().join("static")),
            cancel.clone(),
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), pipeline.generate(&job(&cover, "prompt")))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, GenerationError::Cancelled));
        assert!(!pipeline.is_loaded().await);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_model_load() {
        let dir = tempfile::tempdir().unwrap();
        let cover = write_cover(dir.path());
        let cancel = CancellationToken::new();
        let pipeline = LocalPipeline::new(
            scripted_worker("exec sleep 30"),
            ScratchStorage::new(dir.path().join("static")),
            cancel.clone(),
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), pipeline.generate(&job(&cover, "prompt")))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, GenerationError::Cancelled));
        assert!(!pipeline.is_loaded().await);
    }

    #[tokio::test]
    async fn test_worker_that_never_loads_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let cover = write_cover(dir.path());
        let config = PipelineConfig {
            ready_timeout: Duration::from_millis(200),
            ..scripted_worker("exec sleep 30")
        };
        let pipeline = LocalPipeline::new(
            config,
            ScratchStorage::new(dir.path().join("static")),
            CancellationToken::new(),
        );

        let err = tokio::time::timeout(Duration::from_secs(5), pipeline.generate(&job(&cover, "prompt")))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, GenerationError::Worker(reason) if reason.contains("did not load")));
        assert!(!pipeline.is_loaded().await);
    }
}
