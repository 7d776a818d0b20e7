pub mod extractor;
pub mod observer;

pub fn is_youtube_host(host: &str) -> bool {
    let host = host.to_lowercase();
    host == "youtube.com"
        || host.ends_with(".youtube.com")
        || host == "youtu.be"
        || host == "youtube-nocookie.com"
        || host.ends_with(".youtube-nocookie.com")
}

/// Video id of a media-detail page, or `None` for any other location.
pub fn extract_video_id(location: &str) -> Option<String> {
    let parsed = url::Url::parse(location).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if !is_youtube_host(&host) {
        return None;
    }

    let segments: Vec<&str> = parsed.path().split('/').filter(|s| !s.is_empty()).collect();

    let candidate = if host.contains("youtu.be") {
        segments.first().map(|s| s.to_string())
    } else if matches!(segments.first(), Some(&"embed") | Some(&"shorts") | Some(&"live")) {
        segments.get(1).map(|s| s.to_string())
    } else if segments.first() == Some(&"watch") {
        parsed
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.to_string())
    } else {
        None
    };

    candidate.filter(|id| is_valid_id(id))
}

pub fn is_detail_page(location: &str) -> bool {
    extract_video_id(location).is_some()
}

pub fn fallback_thumbnail(video_id: &str) -> String {
    format!("https://img.youtube.com/vi/{}/mqdefault.jpg", video_id)
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
