use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_AUTHOR: &str = "Unknown Channel";

/// Identity of the media item the page currently shows.
///
/// `id` is the stable key. An identity with a blank id is treated as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoIdentity {
    pub id: String,
    pub title: String,
    pub author: String,
    pub thumbnail_url: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
}

impl VideoIdentity {
    pub fn is_present(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Fills gaps left by markup scraping with what the player configuration
    /// reported. Only placeholders and absent fields are overwritten.
    pub fn enrich(&mut self, details: &VideoDetails) {
        if let Some(title) = details.title.as_deref().filter(|t| !t.is_empty()) {
            if self.title.is_empty() || self.title == UNKNOWN_TITLE {
                self.title = title.to_string();
            }
        }
        if let Some(author) = details.author.as_deref().filter(|a| !a.is_empty()) {
            if self.author.is_empty() || self.author == UNKNOWN_AUTHOR {
                self.author = author.to_string();
            }
        }
        if self.duration_seconds.is_none() {
            self.duration_seconds = details.duration_seconds;
        }
        if self.thumbnail_url.is_empty() {
            if let Some(thumb) = &details.thumbnail_url {
                self.thumbnail_url = thumb.clone();
            }
        }
    }
}

/// Metadata echoed by the page's own player configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoDetails {
    pub title: Option<String>,
    pub author: Option<String>,
    pub duration_seconds: Option<u64>,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Video,
    Audio,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatKind::Video => write!(f, "video"),
            FormatKind::Audio => write!(f, "audio"),
        }
    }
}

impl FromStr for FormatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" => Ok(FormatKind::Video),
            "audio" => Ok(FormatKind::Audio),
            other => Err(format!("unknown format kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFormat {
    pub itag: String,
    pub kind: FormatKind,
    pub label: String,
    pub container: String,
    /// Absent when the descriptor only carried a ciphered locator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
}

impl ResolvedFormat {
    /// File extension implied by the container mime type.
    pub fn extension(&self) -> &'static str {
        let mime = self
            .container
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match mime.as_str() {
            "audio/mp4" => "m4a",
            "audio/webm" => "weba",
            "video/webm" => "webm",
            "video/3gpp" => "3gp",
            _ => "mp4",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatCatalog {
    pub video: Vec<ResolvedFormat>,
    pub audio: Vec<ResolvedFormat>,
}

impl FormatCatalog {
    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }

    pub fn len(&self) -> usize {
        self.video.len() + self.audio.len()
    }

    pub fn find(&self, kind: FormatKind, itag: &str) -> Option<&ResolvedFormat> {
        let list = match kind {
            FormatKind::Video => &self.video,
            FormatKind::Audio => &self.audio,
        };
        list.iter().find(|f| f.itag == itag)
    }
}
