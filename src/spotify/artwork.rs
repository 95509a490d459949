use std::path::PathBuf;

use reqwest::{Client, StatusCode};
use uuid::Uuid;

use crate::{
    management::ScratchStorage,
    spotify::{SpotifyClient, SpotifyError},
    types::Track,
    utils,
};

/// URL of the largest album cover of a track, `None` if the album has no images.
pub fn album_cover_url(track: &Track) -> Option<String> {
    track
        .album
        .as_ref()
        .and_then(utils::largest_image)
        .map(str::to_string)
}

/// Looks a track up and returns its cover URL.
pub async fn fetch_artwork(
    client: &SpotifyClient,
    track_id: &str,
) -> Result<Option<String>, SpotifyError> {
    let track = client.track(track_id).await?;
    Ok(album_cover_url(&track))
}

/// Downloads an image into the scratch storage of one request.
///
/// The file lands in `album_covers/{request_id}.{ext}`, with the extension
/// guessed from the content. Parent directories are created as needed and a
/// file left behind by an earlier run with the same id is overwritten.
///
/// # Returns
///
/// * `Ok(Some(path))` - A non-empty image was written to `path`
/// * `Ok(None)` - The server answered with anything other than `200 OK`, or
///   with an empty body; nothing is written
///
/// # Errors
///
/// [`SpotifyError::Http`] when the request fails and [`SpotifyError::Io`]
/// when the file cannot be written.
pub async fn download_image(
    http: &Client,
    url: &str,
    storage: &ScratchStorage,
    request_id: Uuid,
) -> Result<Option<PathBuf>, SpotifyError> {
    let response = http.get(url).send().await?;
    if response.status() != StatusCode::OK {
        return Ok(None);
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(None);
    }
    let path = storage.artwork_path(request_id, utils::image_extension(&bytes));

    ScratchStorage::ensure_parent(&path)
        .await
        .map_err(|source| SpotifyError::Io {
            path: path.clone(),
            source,
        })?;
    async_fs::write(&path, &bytes)
        .await
        .map_err(|source| SpotifyError::Io {
            path: path.clone(),
            source,
        })?;

    Ok(Some(path))
}
