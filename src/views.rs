//! HTML views.
//!
//! Plain projections of view models into markup, no business logic. Every
//! piece of user or catalog text goes through [`escape_html`].

use axum::response::Html;

use crate::{
    types::{Library, TrackView, VideoResult},
    utils::escape_html,
};

/// Styles offered on the dashboard. The form falls back to `cinematic`.
pub const ART_STYLES: &[&str] = &[
    "cinematic",
    "anime",
    "watercolor",
    "cyberpunk",
    "oil painting",
    "claymation",
];

const STYLE: &str = "body{font-family:sans-serif;max-width:960px;margin:2rem auto;padding:0 1rem;background:#121212;color:#eee}\
a{color:#1db954}\
.track{display:flex;align-items:center;gap:1rem;padding:.5rem 0;border-bottom:1px solid #333}\
.track img{width:64px;height:64px;object-fit:cover}\
.track .meta{flex:1}\
button{background:#1db954;color:#fff;border:0;padding:.4rem .8rem;border-radius:4px;cursor:pointer}\
video{max-width:100%}";

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{style}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape_html(title),
        style = STYLE,
        body = body
    ))
}

pub fn login() -> Html<String> {
    page(
        "Album Art Video Generator",
        "<h1>Album Art Video Generator</h1>\n\
         <p>Turn the cover of any song in your library into a short video.</p>\n\
         <p><a href=\"/login\">Log in with Spotify</a></p>",
    )
}

fn style_options() -> String {
    ART_STYLES
        .iter()
        .map(|s| {
            let s = escape_html(s);
            format!("<option value=\"{s}\">{s}</option>")
        })
        .collect()
}

fn track_row(track: &TrackView, options: &str) -> String {
    let cover = match &track.album_cover {
        Some(url) => format!("<img src=\"{}\" alt=\"\">", escape_html(url)),
        None => "<div class=\"no-cover\"></div>".to_string(),
    };

    format!(
        "<div class=\"track\">{cover}<div class=\"meta\"><strong>{name}</strong><br>{artists}</div>\
         <form method=\"post\" action=\"/generate_video\">\
         <input type=\"hidden\" name=\"song_id\" value=\"{id}\">\
         <select name=\"art_style\">{options}</select>\
         <button type=\"submit\">Generate video</button></form></div>\n",
        cover = cover,
        name = escape_html(&track.name),
        artists = escape_html(&track.artists.join(", ")),
        id = escape_html(&track.id),
        options = options
    )
}

pub fn dashboard(library: &Library) -> Html<String> {
    let options = style_options();
    let mut body = String::from(
        "<h1>Your music</h1>\n<p><a href=\"/logout\">Log out</a></p>\n<h2>Liked Songs</h2>\n",
    );

    if library.liked_songs.is_empty() {
        body.push_str("<p>No liked songs.</p>\n");
    }
    for track in &library.liked_songs {
        body.push_str(&track_row(track, &options));
    }

    for playlist in &library.playlists {
        body.push_str(&format!("<h2>{}</h2>\n", escape_html(&playlist.name)));
        if playlist.tracks.is_empty() {
            body.push_str("<p>This playlist is empty.</p>\n");
        }
        for track in &playlist.tracks {
            body.push_str(&track_row(track, &options));
        }
    }

    page("Dashboard", &body)
}

pub fn video_result(result: &VideoResult) -> Html<String> {
    let body = format!(
        "<h1>{song}</h1>\n<h2>{artist}</h2>\n\
         <video src=\"{video}\" controls autoplay loop playsinline></video>\n\
         <p><img src=\"{cover}\" alt=\"Album cover\" width=\"200\"></p>\n\
         <p><a href=\"{video}\" download>Download video</a> | <a href=\"/dashboard\">Back to dashboard</a></p>",
        song = escape_html(&result.song_name),
        artist = escape_html(&result.artist_name),
        video = escape_html(&result.video_url),
        cover = escape_html(&result.album_cover_url)
    );
    page("Your video", &body)
}

pub fn error(message: &str) -> Html<String> {
    let body = format!(
        "<h1>Something went wrong</h1>\n<p class=\"error\">{}</p>\n<p><a href=\"/dashboard\">Back to dashboard</a></p>",
        escape_html(message)
    );
    page("Error", &body)
}
