//! YouTube-facing collaborators: the quota-limited Data API client and the
//! `yt-dlp` based scraper/locator resolver.

pub mod api;
pub mod ytdlp;

pub use api::YoutubeApiClient;
pub use ytdlp::YtDlp;

/// Request headers sent with media fetches so the CDN treats the capture
/// like a browser session.
pub const BROWSER_HEADERS: [(&str, &str); 5] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0 Safari/537.36",
    ),
    ("Accept", "*/*"),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Origin", "https://www.youtube.com"),
    ("Referer", "https://www.youtube.com/"),
];

const YOUTUBE_BASE: &str = "https://www.youtube.com";

/// Whether `channel_id` looks like a canonical `UC…` channel id rather than
/// a handle or URL.
pub fn is_canonical_channel_id(channel_id: &str) -> bool {
    channel_id.len() > 2
        && channel_id.starts_with("UC")
        && channel_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Watch page URL of a stream.
pub fn watch_url(stream_id: &str) -> String {
    format!("{}/watch?v={}", YOUTUBE_BASE, stream_id)
}

/// URL that redirects to the channel's current live stream.
///
/// Accepts full URLs, `@handle`s and canonical channel ids.
pub fn channel_live_url(channel: &str) -> String {
    let base = if channel.starts_with("http://") || channel.starts_with("https://") {
        channel.to_string()
    } else if is_canonical_channel_id(channel) {
        format!("{}/channel/{}", YOUTUBE_BASE, channel)
    } else {
        format!("{}/{}", YOUTUBE_BASE, channel.trim_start_matches('/'))
    };

    if base.contains("/live") {
        base
    } else {
        format!("{}/live", base.trim_end_matches('/'))
    }
}
