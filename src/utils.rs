use base64::{Engine, engine::general_purpose::STANDARD};
use rand::{Rng, distr::Alphanumeric};

use crate::types::{Album, Track, TrackView};

/// Length of the OAuth `state` parameter.
pub const STATE_LENGTH: usize = 32;

/// Generates the random `state` value that ties a `/callback` to its `/login`.
pub fn generate_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}

/// Returns the first image of the album.
///
/// The Web API orders album images by size, largest first.
pub fn largest_image(album: &Album) -> Option<&str> {
    album.images.first().map(|i| i.url.as_str())
}

/// Projects a catalog track into the view model shown on the dashboard.
///
/// Returns `None` for tracks without an id (local files), which cannot be
/// looked up again when the user picks them.
pub fn track_view(track: &Track) -> Option<TrackView> {
    let id = track.id.clone()?;
    Some(TrackView {
        id,
        name: track.name.clone(),
        artists: track.artists.iter().map(|a| a.name.clone()).collect(),
        album_cover: track
            .album
            .as_ref()
            .and_then(largest_image)
            .map(str::to_string),
    })
}

/// Encodes raw image bytes as a `data:` URL, sniffing the mime type.
pub fn data_url(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("image/png");
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// File extension for downloaded image bytes; `img` when the format is unknown.
pub fn image_extension(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("img")
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}
