use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::models::descriptor::{ExtractionResult, RawDescriptor};
use crate::models::media::VideoDetails;
use crate::platforms::traits::{PageDocument, PageHost};

pub const CONFIG_VARIABLE: &str = "ytInitialPlayerResponse";

static ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:window\[\s*["']ytInitialPlayerResponse["']\s*\]|\bytInitialPlayerResponse)\s*=\s*"#)
        .unwrap()
});

/// Reads the active page from the host and extracts from it. Host errors
/// become `Failure` like any other.
pub async fn run(host: &dyn PageHost) -> ExtractionResult {
    match host.active_page().await {
        Ok(page) => execute(&page),
        Err(e) => {
            tracing::warn!("[extract] could not read active page: {}", e);
            ExtractionResult::Failure {
                error: format!("Could not read page: {}", e),
            }
        }
    }
}

pub fn execute(page: &PageDocument) -> ExtractionResult {
    let config: Cow<'_, Value> = match page.player_config.as_ref().filter(|v| v.is_object()) {
        Some(exposed) => {
            tracing::debug!("[extract] using exposed player configuration");
            Cow::Borrowed(exposed)
        }
        None => match find_in_scripts(&page.html) {
            Some(parsed) => {
                tracing::debug!("[extract] player configuration recovered from inline script");
                Cow::Owned(parsed)
            }
            None => {
                return ExtractionResult::Failure {
                    error: format!("Could not find {}", CONFIG_VARIABLE),
                }
            }
        },
    };

    from_config(&config)
}

fn find_in_scripts(html: &str) -> Option<Value> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("script").ok()?;

    doc.select(&sel)
        .map(|script| script.text().collect::<String>())
        .filter(|body| body.contains(CONFIG_VARIABLE))
        .find_map(|body| parse_assignment(&body))
}

/// First JSON object assigned to the configuration variable in a script
/// body. Trailing script text after the object is ignored.
pub fn parse_assignment(body: &str) -> Option<Value> {
    for m in ASSIGNMENT_RE.find_iter(body) {
        let tail = &body[m.end()..];
        if !tail.starts_with('{') {
            continue;
        }

        let mut stream = serde_json::Deserializer::from_str(tail).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) if value.is_object() => return Some(value),
            Some(Err(e)) => {
                tracing::debug!("[extract] assignment did not parse: {}", e);
            }
            _ => {}
        }
    }
    None
}

fn from_config(config: &Value) -> ExtractionResult {
    let Some(video_id) = config
        .pointer("/videoDetails/videoId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
    else {
        return ExtractionResult::Failure {
            error: "Player configuration carries no video id".to_string(),
        };
    };

    let streaming = config.get("streamingData");

    if streaming.is_none() {
        let status = config
            .pointer("/playabilityStatus/status")
            .and_then(|v| v.as_str())
            .unwrap_or("OK");
        if status != "OK" {
            let reason = config
                .pointer("/playabilityStatus/reason")
                .and_then(|v| v.as_str())
                .unwrap_or(status);
            return ExtractionResult::Failure {
                error: format!("Video not playable: {}", reason),
            };
        }
    }

    let mut raw_descriptors = RawDescriptor::list_from_value(streaming.and_then(|s| s.get("formats")));
    raw_descriptors.extend(RawDescriptor::list_from_value(
        streaming.and_then(|s| s.get("adaptiveFormats")),
    ));

    tracing::debug!(
        "[extract] {} raw descriptors for {}",
        raw_descriptors.len(),
        video_id
    );

    ExtractionResult::Success {
        raw_descriptors,
        identity_echo: video_id.to_string(),
        details: details_from(config),
    }
}

fn details_from(config: &Value) -> VideoDetails {
    let text = |ptr: &str| {
        config
            .pointer(ptr)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    };

    VideoDetails {
        title: text("/videoDetails/title"),
        author: text("/videoDetails/author"),
        duration_seconds: text("/videoDetails/lengthSeconds").and_then(|s| s.parse().ok()),
        thumbnail_url: text("/videoDetails/thumbnail/thumbnails/0/url"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(id: &str) -> Value {
        json!({
            "playabilityStatus": {"status": "OK"},
            "videoDetails": {
                "videoId": id,
                "title": "Config Title",
                "author": "Config Channel",
                "lengthSeconds": "213",
            },
            "streamingData": {
                "formats": [
                    {"itag": 18, "qualityLabel": "360p", "mimeType": "video/mp4", "url": "https://cdn/18"}
                ],
                "adaptiveFormats": [
                    {"itag": 137, "height": 1080, "mimeType": "video/mp4", "url": "https://cdn/137"},
                    {"itag": 140, "audioQuality": "AUDIO_QUALITY_MEDIUM", "mimeType": "audio/mp4"}
                ]
            }
        })
    }

    fn page_with_script(script: &str) -> PageDocument {
        PageDocument {
            location: "https://www.youtube.com/watch?v=abc".into(),
            html: format!(
                "<html><head><script>var other = 1;</script></head><body><script>{}</script></body></html>",
                script
            ),
            player_config: None,
        }
    }

    #[test]
    fn exposed_config_takes_priority() {
        let page = PageDocument {
            location: "https://www.youtube.com/watch?v=abc".into(),
            html: String::new(),
            player_config: Some(config("abc")),
        };
        match execute(&page) {
            ExtractionResult::Success {
                raw_descriptors,
                identity_echo,
                details,
            } => {
                assert_eq!(identity_echo, "abc");
                assert_eq!(raw_descriptors.len(), 3);
                assert_eq!(raw_descriptors[0].itag.as_deref(), Some("18"));
                assert_eq!(details.duration_seconds, Some(213));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn falls_back_to_inline_script() {
        let script = format!(
            "var ytInitialPlayerResponse = {};var meta = {{\"a\": 1}};",
            config("xyz")
        );
        match execute(&page_with_script(&script)) {
            ExtractionResult::Success { identity_echo, .. } => assert_eq!(identity_echo, "xyz"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn window_bracket_assignment_is_recognized() {
        let script = format!("window[\"ytInitialPlayerResponse\"] = {};", config("w1"));
        assert!(parse_assignment(&script).is_some());
    }

    #[test]
    fn object_containing_brace_semicolon_in_string_parses_whole() {
        let script = r#"ytInitialPlayerResponse = {"videoDetails": {"videoId": "q", "title": "a};b"}};"#;
        let value = parse_assignment(script).unwrap();
        assert_eq!(value.pointer("/videoDetails/title").unwrap(), "a};b");
    }

    #[test]
    fn null_assignment_is_skipped_in_favor_of_later_one() {
        let script = format!(
            "ytInitialPlayerResponse = null; if (x) {{ ytInitialPlayerResponse = {}; }}",
            config("late")
        );
        let value = parse_assignment(&script).unwrap();
        assert_eq!(value.pointer("/videoDetails/videoId").unwrap(), "late");
    }

    #[test]
    fn missing_everything_is_a_failure() {
        assert!(matches!(
            execute(&page_with_script("console.log('nothing here')")),
            ExtractionResult::Failure { .. }
        ));
    }

    #[test]
    fn malformed_payload_is_a_failure_not_a_panic() {
        let result = execute(&page_with_script("var ytInitialPlayerResponse = {\"broken\": ;"));
        assert!(matches!(result, ExtractionResult::Failure { .. }));
    }

    #[test]
    fn config_without_video_id_fails() {
        let page = PageDocument {
            player_config: Some(json!({"streamingData": {}})),
            ..Default::default()
        };
        assert!(matches!(execute(&page), ExtractionResult::Failure { .. }));
    }

    #[test]
    fn unplayable_video_reports_reason() {
        let page = PageDocument {
            player_config: Some(json!({
                "playabilityStatus": {"status": "LOGIN_REQUIRED", "reason": "Sign in to confirm your age"},
                "videoDetails": {"videoId": "age"}
            })),
            ..Default::default()
        };
        match execute(&page) {
            ExtractionResult::Failure { error } => assert!(error.contains("Sign in")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn playable_config_without_streams_is_empty_success() {
        let page = PageDocument {
            player_config: Some(json!({"videoDetails": {"videoId": "empty"}})),
            ..Default::default()
        };
        match execute(&page) {
            ExtractionResult::Success { raw_descriptors, .. } => assert!(raw_descriptors.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
