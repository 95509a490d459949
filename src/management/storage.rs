//! Per-request scratch files.
//!
//! Downloaded covers and locally rendered videos are written below the static
//! directory, which the server exposes under `/static`. Every path is keyed by
//! the id of the request that produced it, so concurrent generations never
//! write to the same file.

use std::path::{Path, PathBuf};

use uuid::Uuid;

pub const COVERS_DIR: &str = "album_covers";
pub const VIDEOS_DIR: &str = "generated_videos";
pub const STATIC_ROUTE: &str = "/static";

#[derive(Debug, Clone)]
pub struct ScratchStorage {
    root: PathBuf,
}

impl ScratchStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artwork_path(&self, request_id: Uuid, extension: &str) -> PathBuf {
        self.root
            .join(COVERS_DIR)
            .join(format!("{}.{}", request_id, extension))
    }

    /// RGB copy of the cover handed to the local pipeline.
    pub fn source_frame_path(&self, request_id: Uuid) -> PathBuf {
        self.root
            .join(VIDEOS_DIR)
            .join(format!("{}.source.png", request_id))
    }

    pub fn video_path(&self, request_id: Uuid) -> PathBuf {
        self.root.join(VIDEOS_DIR).join(format!("{}.mp4", request_id))
    }

    /// URL under which a file below the root is served, `None` for paths
    /// outside of it.
    pub fn public_url(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(format!("{}/{}", STATIC_ROUTE, segments.join("/")))
    }

    pub async fn ensure_parent(path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}
