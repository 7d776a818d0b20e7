use serde_json::Value;

use super::media::VideoDetails;

/// Outcome of reading stream configuration from a page. Every failure mode,
/// including host errors and panics around the read, collapses into `Failure`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    Success {
        raw_descriptors: Vec<RawDescriptor>,
        /// Video id embedded in the configuration itself.
        identity_echo: String,
        details: VideoDetails,
    },
    Failure {
        error: String,
    },
}

/// Tolerant view over one stream entry of the page's player configuration.
///
/// The schema belongs to the hosting platform and changes without notice, so
/// every field is optional. Numbers may arrive as JSON numbers or as numeric
/// strings (`contentLength` usually does); anything unparseable is absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDescriptor {
    pub itag: Option<String>,
    pub quality_label: Option<String>,
    pub height: Option<u32>,
    pub audio_quality: Option<String>,
    pub quality: Option<String>,
    pub mime_type: Option<String>,
    pub content_length: Option<u64>,
    pub bitrate: Option<u64>,
    pub average_bitrate: Option<u64>,
    pub fps: Option<u32>,
    pub url: Option<String>,
}

impl RawDescriptor {
    pub fn from_value(value: &Value) -> Self {
        Self {
            itag: identifier(value.get("itag")),
            quality_label: text(value, "qualityLabel"),
            height: number(value.get("height")).and_then(|n| u32::try_from(n).ok()),
            audio_quality: text(value, "audioQuality"),
            quality: text(value, "quality"),
            mime_type: text(value, "mimeType"),
            content_length: number(value.get("contentLength")),
            bitrate: number(value.get("bitrate")),
            average_bitrate: number(value.get("averageBitrate")),
            fps: number(value.get("fps")).and_then(|n| u32::try_from(n).ok()),
            url: text(value, "url"),
        }
    }

    /// Parses every entry of a JSON array; non-arrays yield nothing.
    pub fn list_from_value(value: Option<&Value>) -> Vec<Self> {
        value
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().map(Self::from_value).collect())
            .unwrap_or_default()
    }

    /// Quality label or height marks a video stream.
    pub fn has_dimension(&self) -> bool {
        self.quality_label.is_some() || self.height.is_some()
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn number(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}
