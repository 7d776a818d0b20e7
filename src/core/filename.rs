use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use crate::models::media::ResolvedFormat;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const SEPARATOR: &str = "_";
const SUBSTITUTE: char = '-';
const FORBIDDEN: &[char] = &['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>'];

/// One file-name component: NFC, unsafe characters replaced by `-`, any
/// whitespace run collapsed to a single `_`.
pub fn sanitize_component(name: &str) -> String {
    let name: String = name.nfc().collect();
    let name = WS_RE.replace_all(name.trim(), SEPARATOR);

    let replaced: String = name
        .chars()
        .map(|c| {
            if FORBIDDEN.contains(&c) || c.is_control() {
                SUBSTITUTE
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced
        .trim_start_matches('.')
        .trim_end_matches(['_', '-', '.', ';', ' ']);

    sanitize_filename::sanitize(trimmed)
}

/// `"{title}_{label}.{ext}"`, falling back to `fallback_title` when the title
/// sanitizes to nothing.
pub fn download_filename(title: &str, format: &ResolvedFormat, fallback_title: &str) -> String {
    let mut base = sanitize_component(title);
    if base.is_empty() {
        base = sanitize_component(fallback_title);
    }
    if base.is_empty() {
        base = "video".to_string();
    }

    let label = sanitize_component(&format.label);
    if label.is_empty() {
        format!("{}.{}", base, format.extension())
    } else {
        format!("{}{}{}.{}", base, SEPARATOR, label, format.extension())
    }
}
