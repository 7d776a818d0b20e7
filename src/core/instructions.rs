//! Plain-text download sheet for when no stream can be dispatched directly.
//! It tells the user how to fetch the video with an external tool.

use chrono::{DateTime, Local};
use serde::Serialize;

use super::filename::sanitize_component;
use crate::models::media::{FormatKind, VideoIdentity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstructionSheet {
    pub filename: String,
    pub body: String,
}

pub fn render(
    identity: &VideoIdentity,
    kind: FormatKind,
    fallback_title: &str,
    generated_at: DateTime<Local>,
) -> InstructionSheet {
    let mut base = sanitize_component(&identity.title);
    if base.is_empty() {
        base = sanitize_component(fallback_title);
    }

    let (heading, suffix, steps) = match kind {
        FormatKind::Video => (
            "Video Download Information",
            "_download_info.txt",
            format!(
                "1. Copy the video URL above\n\
                 2. Paste it into yt-dlp or a similar tool\n\n\
                 Video:\n  yt-dlp \"{url}\"\n\
                 Audio only:\n  yt-dlp -x --audio-format mp3 \"{url}\"\n",
                url = identity.source_url
            ),
        ),
        FormatKind::Audio => (
            "Audio Download Information",
            "_audio_download_info.txt",
            format!(
                "1. Copy the video URL above\n\
                 2. Extract the audio track with yt-dlp:\n  yt-dlp -x --audio-format mp3 \"{url}\"\n",
                url = identity.source_url
            ),
        ),
    };

    let body = format!(
        "{heading}\n{rule}\n\n\
         Title:    {title}\n\
         Channel:  {author}\n\
         URL:      {url}\n\
         Video ID: {id}\n\n\
         {steps}\n\
         Generated on: {when}\n",
        heading = heading,
        rule = "=".repeat(heading.len()),
        title = identity.title,
        author = identity.author,
        url = identity.source_url,
        id = identity.id,
        steps = steps,
        when = generated_at.format("%Y-%m-%d %H:%M:%S"),
    );

    InstructionSheet {
        filename: format!("{}{}", base, suffix),
        body,
    }
}
